#![cfg(feature = "runtime-benchmarks")]

use crate::*;
use frame::prelude::*;
use polkadot_sdk::frame_benchmarking::{account, v2::*};
use polkadot_sdk::frame_support::traits::EnsureOrigin;
use polkadot_sdk::frame_system::RawOrigin;
use polkadot_sdk::sp_runtime::traits::Zero;

const SEED: u32 = 0;

#[benchmarks]
mod benches {
  use super::*;

  fn units<T: Config>(amount: u32) -> BalanceOf<T> {
    BalanceOf::<T>::from(amount)
  }

  fn funded_trader<T: Config>(name: &'static str, index: u32) -> T::AccountId {
    let who: T::AccountId = account(name, index, SEED);
    let plenty = units::<T>(1_000_000_000);
    for asset in [
      T::QuoteAsset::get(),
      T::FeeAsset::get(),
      T::BenchmarkHelper::traded_asset(),
    ] {
      T::BenchmarkHelper::fund(&who, asset, plenty).unwrap();
    }
    who
  }

  /// Creates the pool and the ledger, and lifts the cap to the storage ceiling.
  fn setup_ledger<T: Config>() -> LedgerId {
    let token = T::BenchmarkHelper::traded_asset();
    let reserve = units::<T>(1_000_000_000);
    T::BenchmarkHelper::create_pool(T::QuoteAsset::get(), token, reserve, reserve).unwrap();
    Configuration::<T>::mutate(|config| {
      config.trading_enabled = true;
      config.max_orders_per_ledger = T::MaxOrdersCeiling::get();
    });
    let caller: T::AccountId = whitelisted_caller();
    Pallet::<T>::resolve_ledger(RawOrigin::Signed(caller).into(), token).unwrap();
    LedgerByToken::<T>::get(token).unwrap()
  }

  fn buy_terms<T: Config>() -> OrderTerms<BalanceOf<T>> {
    OrderTerms {
      side: Side::Buy,
      interval_seconds: 60,
      tranches_total: 2,
      // Far above any pool price so the tranche never trips the bound
      worst_price: T::PricePrecision::get().saturating_mul(1_000_000),
      amount_per_tranche: units::<T>(1_000),
    }
  }

  #[benchmark]
  fn submit_order() {
    let caller = funded_trader::<T>("trader", 0);
    let token = T::BenchmarkHelper::traded_asset();
    let terms = buy_terms::<T>();

    #[extrinsic_call]
    _(
      RawOrigin::Signed(caller),
      token,
      terms.side,
      terms.interval_seconds,
      terms.tranches_total,
      terms.worst_price,
      terms.amount_per_tranche,
    );

    let ledger_id = LedgerByToken::<T>::get(token).unwrap();
    assert_eq!(Pallet::<T>::live_count(ledger_id), 1);
  }

  #[benchmark]
  fn cancel_order() {
    let ledger_id = setup_ledger::<T>();
    let caller = funded_trader::<T>("trader", 0);
    Pallet::<T>::do_submit(ledger_id, caller.clone(), buy_terms::<T>()).unwrap();

    #[extrinsic_call]
    _(RawOrigin::Signed(caller), ledger_id, 0);

    assert_eq!(Pallet::<T>::live_count(ledger_id), 0);
  }

  #[benchmark]
  fn execute_due_orders(n: Linear<1, { T::MaxOrdersCeiling::get() }>) {
    let ledger_id = setup_ledger::<T>();
    for index in 0..n {
      let trader = funded_trader::<T>("trader", index);
      Pallet::<T>::do_submit(ledger_id, trader, buy_terms::<T>()).unwrap();
    }
    let caller: T::AccountId = whitelisted_caller();

    #[extrinsic_call]
    _(RawOrigin::Signed(caller), ledger_id, Side::Buy);

    assert_eq!(Pallet::<T>::filled_total(ledger_id), u64::from(n));
  }

  #[benchmark]
  fn resolve_ledger() {
    let caller: T::AccountId = whitelisted_caller();
    let token = T::BenchmarkHelper::traded_asset();

    #[extrinsic_call]
    _(RawOrigin::Signed(caller), token);

    assert!(LedgerByToken::<T>::get(token).is_some());
  }

  #[benchmark]
  fn set_configuration() -> Result<(), BenchmarkError> {
    let origin = T::AdminOrigin::try_successful_origin().map_err(|_| BenchmarkError::Weightless)?;
    let fee = units::<T>(42);

    #[extrinsic_call]
    set_entry_fee(origin as T::RuntimeOrigin, fee);

    assert_eq!(Configuration::<T>::get().entry_fee, fee);
    Ok(())
  }

  #[benchmark]
  fn burn_accrued_fees() {
    let registry = Pallet::<T>::registry_account();
    T::BenchmarkHelper::fund(&registry, T::FeeAsset::get(), units::<T>(1_000)).unwrap();
    let caller: T::AccountId = whitelisted_caller();

    #[extrinsic_call]
    _(RawOrigin::Signed(caller));

    assert!(T::AssetOps::balance(&registry, T::FeeAsset::get()).is_zero());
  }

  #[cfg(test)]
  use crate::mock::{Test, new_test_ext};
  #[cfg(test)]
  impl_benchmark_test_suite!(Pallet, new_test_ext(), Test);
}
