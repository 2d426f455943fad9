#![cfg_attr(not(feature = "std"), no_std)]

//! # DCA pallet
//!
//! Recurring dollar-cost-averaging orders executed against an AMM.
//!
//! A trader escrows `amount_per_tranche * tranches_total` of the input asset
//! into a per-token ledger. Any signed caller (usually the relayer) can later
//! run `execute_due_orders` for one side of a ledger: every order of that side
//! whose interval has elapsed swaps one tranche through the `TradeRouter`,
//! bounded by the trader's worst price, and the output is paid straight to the
//! trader. An order is removed in the same call that fills its last tranche,
//! or when its trader cancels it and takes the unexecuted escrow back.
//!
//! ## Ledgers
//!
//! One ledger exists per traded token, always quoted against
//! `Config::QuoteAsset`. Ledgers are created lazily on first use and receive
//! sequential ids starting at 1. Orders live in a dense vector: deleting an
//! order moves the last order into the freed slot, so slot indices are only
//! valid until the next deletion. Every order also carries a stable `OrderId`.
//!
//! ## Fees
//!
//! Each submission pays `entry_fee` in `Config::FeeAsset`, which is burned.
//! Holders of the configured exemption collection pay nothing.

extern crate alloc;

pub use pallet::*;

pub mod adapters;
pub use adapters::{AssetOps, ExemptionOracle, TradeRouter};

pub mod weights;
pub use weights::WeightInfo;

#[cfg(test)]
mod mock;

#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;

pub const LOG_TARGET: &str = "runtime::dca";

#[cfg(feature = "runtime-benchmarks")]
pub trait BenchmarkHelper<AccountId, AssetId, Balance> {
  /// Token the benchmark ledger trades against the quote asset.
  fn traded_asset() -> AssetId;

  fn fund(
    who: &AccountId,
    asset: AssetId,
    amount: Balance,
  ) -> Result<(), polkadot_sdk::sp_runtime::DispatchError>;

  fn create_pool(
    asset_a: AssetId,
    asset_b: AssetId,
    reserve_a: Balance,
    reserve_b: Balance,
  ) -> Result<(), polkadot_sdk::sp_runtime::DispatchError>;
}

#[frame::pallet]
pub mod pallet {
  use super::{AssetOps, ExemptionOracle, LOG_TARGET, TradeRouter, WeightInfo};
  use alloc::{vec, vec::Vec};
  use core::marker::PhantomData;
  use frame::prelude::*;
  use polkadot_sdk::{
    frame_support::{
      PalletId,
      storage::with_storage_layer,
      traits::{ConstU32, EnsureOrigin, UnixTime},
    },
    sp_runtime::{
      Rounding,
      helpers_128bit::multiply_by_rational_with_rounding,
      traits::{AccountIdConversion, CheckedAdd, CheckedMul, SaturatedConversion, Saturating, Zero},
    },
  };
  use primitives::params::SECONDS_PER_HOUR;

  pub type LedgerId = u32;
  pub type OrderId = u64;

  #[derive(
    Clone,
    Copy,
    Debug,
    Decode,
    DecodeWithMemTracking,
    Encode,
    Eq,
    PartialEq,
    TypeInfo,
    MaxEncodedLen,
  )]
  pub enum Side {
    /// Spend the quote asset, receive the ledger token.
    Buy,
    /// Spend the ledger token, receive the quote asset.
    Sell,
  }

  /// A live DCA order.
  ///
  /// Exists in its ledger only while `tranches_filled < tranches_total`.
  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, PartialEq, TypeInfo, MaxEncodedLen,
  )]
  pub struct Order<AccountId, Balance> {
    pub id: OrderId,
    pub trader: AccountId,
    pub side: Side,
    pub interval_seconds: u64,
    pub tranches_total: u32,
    pub tranches_filled: u32,
    pub amount_per_tranche: Balance,
    /// Quote per token scaled by `Config::PricePrecision`. Upper bound for
    /// buys, lower bound for sells.
    pub worst_price: u128,
    /// Unix seconds of the last filled tranche, or of submission.
    pub last_executed_at: u64,
  }

  impl<AccountId, Balance: AtLeast32BitUnsigned + Copy> Order<AccountId, Balance> {
    pub fn tranches_remaining(&self) -> u32 {
      self.tranches_total.saturating_sub(self.tranches_filled)
    }

    /// Input still held in escrow for this order.
    pub fn escrowed(&self) -> Balance {
      self
        .amount_per_tranche
        .saturating_mul(self.tranches_remaining().into())
    }

    /// The first tranche is due right away, later ones once the interval
    /// has elapsed since the previous fill.
    pub fn is_due(&self, now: u64) -> bool {
      self.tranches_filled == 0 || now.saturating_sub(self.last_executed_at) >= self.interval_seconds
    }
  }

  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, PartialEq, TypeInfo, MaxEncodedLen,
  )]
  pub struct LedgerInfo<AssetId> {
    pub token: AssetId,
    /// Orders ever created. Doubles as the last assigned `OrderId`.
    pub submitted_total: u64,
    /// Tranches ever executed.
    pub filled_total: u64,
  }

  /// Owner-mutated settings shared by all ledgers.
  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, PartialEq, TypeInfo, MaxEncodedLen,
  )]
  pub struct DcaConfig<AccountId, Balance, CollectionId> {
    /// Circuit breaker for new submissions.
    pub trading_enabled: bool,
    pub max_orders_per_ledger: u32,
    pub entry_fee: Balance,
    /// Recorded for off-chain coordination only. Execution is permissionless.
    pub relayer: Option<AccountId>,
    pub exemption_collection: Option<CollectionId>,
  }

  /// Parameters of a submission, shared by every submit entry point.
  #[derive(Clone, Copy, Debug, Eq, PartialEq)]
  pub struct OrderTerms<Balance> {
    pub side: Side,
    pub interval_seconds: u64,
    pub tranches_total: u32,
    pub worst_price: u128,
    pub amount_per_tranche: Balance,
  }

  pub type BalanceOf<T> = <T as Config>::Balance;
  pub type OrderOf<T> = Order<<T as frame_system::Config>::AccountId, BalanceOf<T>>;
  pub type LedgerInfoOf<T> = LedgerInfo<<T as Config>::AssetId>;
  pub type DcaConfigOf<T> =
    DcaConfig<<T as frame_system::Config>::AccountId, BalanceOf<T>, <T as Config>::CollectionId>;
  pub type OrdersOf<T> = BoundedVec<OrderOf<T>, <T as Config>::MaxOrdersCeiling>;

  /// Empty value of `Configuration`, taken from the config defaults.
  pub struct DefaultConfiguration<T>(PhantomData<T>);
  impl<T: Config> Get<DcaConfigOf<T>> for DefaultConfiguration<T> {
    fn get() -> DcaConfigOf<T> {
      DcaConfig {
        trading_enabled: true,
        max_orders_per_ledger: T::DefaultMaxOrders::get(),
        entry_fee: T::DefaultEntryFee::get(),
        relayer: None,
        exemption_collection: None,
      }
    }
  }

  #[pallet::config]
  pub trait Config: frame_system::Config {
    type AssetId: Parameter + Member + Copy + MaybeSerializeDeserialize + MaxEncodedLen;

    type Balance: Parameter
      + Member
      + AtLeast32BitUnsigned
      + Default
      + Copy
      + MaybeSerializeDeserialize
      + MaxEncodedLen;

    /// Identifier of the NFT collection that grants fee exemption.
    type CollectionId: Parameter + Member + Copy + MaybeSerializeDeserialize + MaxEncodedLen;

    /// Asset every ledger is quoted against.
    #[pallet::constant]
    type QuoteAsset: Get<Self::AssetId>;

    /// Asset the entry fee is charged and burned in.
    #[pallet::constant]
    type FeeAsset: Get<Self::AssetId>;

    type AssetOps: AssetOps<Self::AccountId, Self::AssetId, Self::Balance>;

    type TradeRouter: TradeRouter<Self::AccountId, Self::AssetId, Self::Balance>;

    type ExemptionOracle: ExemptionOracle<Self::AccountId, Self::CollectionId>;

    type TimeProvider: UnixTime;

    /// Origin allowed to change `Configuration`.
    type AdminOrigin: EnsureOrigin<Self::RuntimeOrigin>;

    /// Factory origin allowed to submit orders on behalf of a trader.
    type RegistryOrigin: EnsureOrigin<Self::RuntimeOrigin>;

    #[pallet::constant]
    type PalletId: Get<PalletId>;

    /// Storage bound of one ledger's order vector. `max_orders_per_ledger`
    /// can never exceed it.
    #[pallet::constant]
    type MaxOrdersCeiling: Get<u32>;

    #[pallet::constant]
    type DefaultMaxOrders: Get<u32>;

    #[pallet::constant]
    type DefaultEntryFee: Get<Self::Balance>;

    /// Fixed-point scale of `worst_price`.
    #[pallet::constant]
    type PricePrecision: Get<u128>;

    type WeightInfo: WeightInfo;

    #[cfg(feature = "runtime-benchmarks")]
    type BenchmarkHelper: crate::BenchmarkHelper<Self::AccountId, Self::AssetId, Self::Balance>;
  }

  #[pallet::pallet]
  pub struct Pallet<T>(_);

  /// Id the next created ledger receives.
  #[pallet::storage]
  #[pallet::getter(fn next_ledger_id)]
  pub type NextLedgerId<T: Config> = StorageValue<_, LedgerId, ValueQuery, ConstU32<1>>;

  #[pallet::storage]
  #[pallet::getter(fn ledger_by_token)]
  pub type LedgerByToken<T: Config> =
    StorageMap<_, Blake2_128Concat, T::AssetId, LedgerId, OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn ledgers)]
  pub type Ledgers<T: Config> =
    StorageMap<_, Blake2_128Concat, LedgerId, LedgerInfoOf<T>, OptionQuery>;

  /// Live orders of each ledger, densely packed.
  #[pallet::storage]
  pub type Orders<T: Config> = StorageMap<_, Blake2_128Concat, LedgerId, OrdersOf<T>, ValueQuery>;

  #[pallet::storage]
  #[pallet::getter(fn configuration)]
  pub type Configuration<T: Config> =
    StorageValue<_, DcaConfigOf<T>, ValueQuery, DefaultConfiguration<T>>;

  #[pallet::genesis_config]
  #[derive(frame::prelude::DefaultNoBound)]
  pub struct GenesisConfig<T: Config> {
    pub trading_paused: bool,
    pub relayer: Option<T::AccountId>,
    pub exemption_collection: Option<T::CollectionId>,
  }

  #[pallet::genesis_build]
  impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
    fn build(&self) {
      Configuration::<T>::mutate(|config| {
        config.trading_enabled = !self.trading_paused;
        config.relayer = self.relayer.clone();
        config.exemption_collection = self.exemption_collection;
      });
      // Registry account holds fees transiently and must survive a zero native balance
      frame_system::Pallet::<T>::inc_providers(&Pallet::<T>::registry_account());
    }
  }

  #[pallet::event]
  #[pallet::generate_deposit(pub(super) fn deposit_event)]
  pub enum Event<T: Config> {
    LedgerCreated {
      ledger_id: LedgerId,
      token: T::AssetId,
      account: T::AccountId,
    },
    OrderSubmitted {
      ledger_id: LedgerId,
      order_id: OrderId,
      slot: u32,
      trader: T::AccountId,
      side: Side,
      tranches_total: u32,
      amount_per_tranche: BalanceOf<T>,
      entry_fee: BalanceOf<T>,
    },
    EntryFeeBurned {
      who: T::AccountId,
      amount: BalanceOf<T>,
    },
    OrderCancelled {
      ledger_id: LedgerId,
      order_id: OrderId,
      trader: T::AccountId,
      refunded: BalanceOf<T>,
    },
    TrancheExecuted {
      ledger_id: LedgerId,
      order_id: OrderId,
      trader: T::AccountId,
      /// 1-based number of the tranche just filled.
      tranche: u32,
      amount_in: BalanceOf<T>,
      amount_out: BalanceOf<T>,
    },
    /// The order is untouched and will be retried on the next pass.
    TrancheFailed {
      ledger_id: LedgerId,
      order_id: OrderId,
      error: DispatchError,
    },
    OrderCompleted {
      ledger_id: LedgerId,
      order_id: OrderId,
      trader: T::AccountId,
    },
    DueOrdersExecuted {
      ledger_id: LedgerId,
      side: Side,
      executed: u32,
      failed: u32,
    },
    TradingEnabledSet {
      enabled: bool,
    },
    EntryFeeUpdated {
      old_fee: BalanceOf<T>,
      new_fee: BalanceOf<T>,
    },
    MaxOrdersUpdated {
      old_max: u32,
      new_max: u32,
    },
    RelayerUpdated {
      old: Option<T::AccountId>,
      new: Option<T::AccountId>,
    },
    ExemptionCollectionUpdated {
      old: Option<T::CollectionId>,
      new: Option<T::CollectionId>,
    },
    AccruedFeesBurned {
      amount: BalanceOf<T>,
    },
  }

  #[pallet::error]
  pub enum Error<T> {
    /// Submissions are paused by the circuit breaker
    TradingDisabled,
    /// Ledger already holds `max_orders_per_ledger` live orders
    LedgerFull,
    /// Requested cap exceeds `MaxOrdersCeiling`
    MaxOrdersAboveCeiling,
    ZeroTranches,
    ZeroAmount,
    ZeroInterval,
    ZeroWorstPrice,
    /// Slot index is past the end of the ledger's order list
    InsufficientOrderListLength,
    UnknownLedger,
    UnknownOrder,
    /// The quote asset cannot be traded against itself
    QuoteAssetNotTradable,
    /// Origin does not satisfy `RegistryOrigin`
    OnlyFromRegistry,
    NotOrderOwner,
    /// Trader cannot cover escrow plus entry fee
    InsufficientBalance,
    ArithmeticOverflow,
    LedgerIdOverflow,
  }

  #[pallet::hooks]
  impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
    fn integrity_test() {
      assert!(
        T::DefaultMaxOrders::get() <= T::MaxOrdersCeiling::get(),
        "DefaultMaxOrders must not exceed MaxOrdersCeiling"
      );
      assert!(T::PricePrecision::get() > 0, "PricePrecision must be non-zero");
    }
  }

  #[pallet::call]
  impl<T: Config> Pallet<T> {
    /// Submit an order for `token`, creating its ledger if needed.
    #[pallet::call_index(0)]
    #[pallet::weight(T::WeightInfo::submit_order())]
    pub fn submit_order(
      origin: OriginFor<T>,
      token: T::AssetId,
      side: Side,
      interval_seconds: u64,
      tranches_total: u32,
      worst_price: u128,
      amount_per_tranche: BalanceOf<T>,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(
        Configuration::<T>::get().trading_enabled,
        Error::<T>::TradingDisabled
      );
      let ledger_id = Self::ensure_ledger_for_token(token)?;
      Self::do_submit(
        ledger_id,
        who,
        OrderTerms {
          side,
          interval_seconds,
          tranches_total,
          worst_price,
          amount_per_tranche,
        },
      )?;
      Ok(())
    }

    /// Submit an order spread over `hours`, one tranche every
    /// `interval_seconds`.
    #[pallet::call_index(1)]
    #[pallet::weight(T::WeightInfo::submit_order())]
    pub fn submit_order_over_window(
      origin: OriginFor<T>,
      token: T::AssetId,
      side: Side,
      interval_seconds: u64,
      hours: u32,
      worst_price: u128,
      amount_per_tranche: BalanceOf<T>,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(
        Configuration::<T>::get().trading_enabled,
        Error::<T>::TradingDisabled
      );
      let tranches_total = Self::tranches_over_window(interval_seconds, hours)?;
      let ledger_id = Self::ensure_ledger_for_token(token)?;
      Self::do_submit(
        ledger_id,
        who,
        OrderTerms {
          side,
          interval_seconds,
          tranches_total,
          worst_price,
          amount_per_tranche,
        },
      )?;
      Ok(())
    }

    #[pallet::call_index(2)]
    #[pallet::weight(T::WeightInfo::submit_order())]
    pub fn submit_order_to_ledger(
      origin: OriginFor<T>,
      ledger_id: LedgerId,
      side: Side,
      interval_seconds: u64,
      tranches_total: u32,
      worst_price: u128,
      amount_per_tranche: BalanceOf<T>,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      Self::do_submit(
        ledger_id,
        who,
        OrderTerms {
          side,
          interval_seconds,
          tranches_total,
          worst_price,
          amount_per_tranche,
        },
      )?;
      Ok(())
    }

    /// `RegistryOrigin` entry point: submit on behalf of `trader`, who funds
    /// the escrow and the fee.
    #[pallet::call_index(3)]
    #[pallet::weight(T::WeightInfo::submit_order())]
    pub fn submit_order_on_behalf(
      origin: OriginFor<T>,
      ledger_id: LedgerId,
      trader: T::AccountId,
      side: Side,
      interval_seconds: u64,
      tranches_total: u32,
      worst_price: u128,
      amount_per_tranche: BalanceOf<T>,
    ) -> DispatchResult {
      T::RegistryOrigin::ensure_origin(origin).map_err(|_| Error::<T>::OnlyFromRegistry)?;
      Self::do_submit(
        ledger_id,
        trader,
        OrderTerms {
          side,
          interval_seconds,
          tranches_total,
          worst_price,
          amount_per_tranche,
        },
      )?;
      Ok(())
    }

    /// Cancel the order at `slot` and refund its unexecuted escrow.
    #[pallet::call_index(4)]
    #[pallet::weight(T::WeightInfo::cancel_order())]
    pub fn cancel_order(origin: OriginFor<T>, ledger_id: LedgerId, slot: u32) -> DispatchResult {
      let who = ensure_signed(origin)?;
      Self::do_cancel(ledger_id, &who, slot)
    }

    /// Cancel by stable order id, resolving the current slot first.
    #[pallet::call_index(5)]
    #[pallet::weight(T::WeightInfo::cancel_order())]
    pub fn cancel_order_by_id(
      origin: OriginFor<T>,
      ledger_id: LedgerId,
      order_id: OrderId,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      let slot = Self::slot_of(ledger_id, order_id)?;
      Self::do_cancel(ledger_id, &who, slot)
    }

    /// Execute one tranche of every due order of `side`. Callable by anyone.
    #[pallet::call_index(6)]
    #[pallet::weight(T::WeightInfo::execute_due_orders(T::MaxOrdersCeiling::get()))]
    pub fn execute_due_orders(
      origin: OriginFor<T>,
      ledger_id: LedgerId,
      side: Side,
    ) -> DispatchResultWithPostInfo {
      ensure_signed(origin)?;
      let scanned = Orders::<T>::decode_len(ledger_id).unwrap_or(0) as u32;
      let (executed, failed) = Self::do_execute_due(ledger_id, side)?;
      Self::deposit_event(Event::DueOrdersExecuted {
        ledger_id,
        side,
        executed,
        failed,
      });
      Ok(Some(T::WeightInfo::execute_due_orders(scanned.max(1))).into())
    }

    /// Create-or-get the ledger for `token`.
    #[pallet::call_index(7)]
    #[pallet::weight(T::WeightInfo::resolve_ledger())]
    pub fn resolve_ledger(origin: OriginFor<T>, token: T::AssetId) -> DispatchResult {
      ensure_signed(origin)?;
      Self::ensure_ledger_for_token(token)?;
      Ok(())
    }

    #[pallet::call_index(8)]
    #[pallet::weight(T::WeightInfo::set_configuration())]
    pub fn set_trading_enabled(origin: OriginFor<T>, enabled: bool) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      Configuration::<T>::mutate(|config| config.trading_enabled = enabled);
      log::info!(target: LOG_TARGET, "DCA trading enabled: {}", enabled);
      Self::deposit_event(Event::TradingEnabledSet { enabled });
      Ok(())
    }

    #[pallet::call_index(9)]
    #[pallet::weight(T::WeightInfo::set_configuration())]
    pub fn set_entry_fee(origin: OriginFor<T>, fee: BalanceOf<T>) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      let old_fee =
        Configuration::<T>::mutate(|config| core::mem::replace(&mut config.entry_fee, fee));
      Self::deposit_event(Event::EntryFeeUpdated {
        old_fee,
        new_fee: fee,
      });
      Ok(())
    }

    /// Lowering the cap below a ledger's live count keeps existing orders and
    /// only blocks new ones.
    #[pallet::call_index(10)]
    #[pallet::weight(T::WeightInfo::set_configuration())]
    pub fn set_max_orders(origin: OriginFor<T>, max_orders: u32) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      ensure!(
        max_orders <= T::MaxOrdersCeiling::get(),
        Error::<T>::MaxOrdersAboveCeiling
      );
      let old_max = Configuration::<T>::mutate(|config| {
        core::mem::replace(&mut config.max_orders_per_ledger, max_orders)
      });
      Self::deposit_event(Event::MaxOrdersUpdated {
        old_max,
        new_max: max_orders,
      });
      Ok(())
    }

    #[pallet::call_index(11)]
    #[pallet::weight(T::WeightInfo::set_configuration())]
    pub fn set_relayer(origin: OriginFor<T>, relayer: Option<T::AccountId>) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      let old =
        Configuration::<T>::mutate(|config| core::mem::replace(&mut config.relayer, relayer.clone()));
      Self::deposit_event(Event::RelayerUpdated { old, new: relayer });
      Ok(())
    }

    #[pallet::call_index(12)]
    #[pallet::weight(T::WeightInfo::set_configuration())]
    pub fn set_exemption_collection(
      origin: OriginFor<T>,
      collection: Option<T::CollectionId>,
    ) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      let old = Configuration::<T>::mutate(|config| {
        core::mem::replace(&mut config.exemption_collection, collection)
      });
      Self::deposit_event(Event::ExemptionCollectionUpdated {
        old,
        new: collection,
      });
      Ok(())
    }

    /// Burn any fee asset left on the registry account.
    #[pallet::call_index(13)]
    #[pallet::weight(T::WeightInfo::burn_accrued_fees())]
    pub fn burn_accrued_fees(origin: OriginFor<T>) -> DispatchResult {
      ensure_signed(origin)?;
      let registry = Self::registry_account();
      let amount = T::AssetOps::balance(&registry, T::FeeAsset::get());
      if !amount.is_zero() {
        T::AssetOps::burn(&registry, T::FeeAsset::get(), amount)?;
        Self::deposit_event(Event::AccruedFeesBurned { amount });
      }
      Ok(())
    }
  }

  impl<T: Config> Pallet<T> {
    /// Registry identity: receives and burns entry fees.
    pub fn registry_account() -> T::AccountId {
      T::PalletId::get().into_account_truncating()
    }

    /// Escrow account of an existing ledger.
    pub fn ledger_account(ledger_id: LedgerId) -> Result<T::AccountId, DispatchError> {
      ensure!(
        Ledgers::<T>::contains_key(ledger_id),
        Error::<T>::UnknownLedger
      );
      Ok(Self::escrow_account(ledger_id))
    }

    /// Derives the escrow account of `ledger_id` whether or not it was assigned.
    pub(crate) fn escrow_account(ledger_id: LedgerId) -> T::AccountId {
      let mut seed_input = b"dca/ledger".to_vec();
      seed_input.extend_from_slice(&ledger_id.to_le_bytes());
      let seed = frame::hashing::blake2_256(&seed_input);
      // Fold the seed into the PalletId so small AccountId types keep distinct ledger accounts
      let mut id_bytes = T::PalletId::get().0;
      for (i, b) in seed.iter().enumerate() {
        id_bytes[i % 8] ^= b;
      }
      PalletId(id_bytes).into_sub_account_truncating(ledger_id)
    }

    pub fn ledger_token(ledger_id: LedgerId) -> Result<T::AssetId, DispatchError> {
      Ledgers::<T>::get(ledger_id)
        .map(|ledger| ledger.token)
        .ok_or_else(|| Error::<T>::UnknownLedger.into())
    }

    /// Number of ledgers created so far.
    pub fn ledger_count() -> u32 {
      NextLedgerId::<T>::get().saturating_sub(1)
    }

    pub fn live_count(ledger_id: LedgerId) -> u32 {
      Orders::<T>::decode_len(ledger_id).unwrap_or(0) as u32
    }

    pub fn submitted_total(ledger_id: LedgerId) -> u64 {
      Ledgers::<T>::get(ledger_id).map_or(0, |ledger| ledger.submitted_total)
    }

    pub fn filled_total(ledger_id: LedgerId) -> u64 {
      Ledgers::<T>::get(ledger_id).map_or(0, |ledger| ledger.filled_total)
    }

    /// Snapshot of the order currently occupying `slot`.
    pub fn order(ledger_id: LedgerId, slot: u32) -> Result<OrderOf<T>, DispatchError> {
      ensure!(
        Ledgers::<T>::contains_key(ledger_id),
        Error::<T>::UnknownLedger
      );
      Orders::<T>::get(ledger_id)
        .get(slot as usize)
        .cloned()
        .ok_or_else(|| Error::<T>::InsufficientOrderListLength.into())
    }

    /// Live orders in slot order, optionally filtered by side and trader.
    pub fn list_orders(
      ledger_id: LedgerId,
      side: Option<Side>,
      trader: Option<&T::AccountId>,
    ) -> Vec<OrderOf<T>> {
      Orders::<T>::get(ledger_id)
        .into_iter()
        .filter(|order| side.is_none_or(|side| order.side == side))
        .filter(|order| trader.is_none_or(|trader| &order.trader == trader))
        .collect()
    }

    /// Orders of `trader`. Fails on a ledger with no live orders at all.
    pub fn trader_orders(
      ledger_id: LedgerId,
      trader: &T::AccountId,
    ) -> Result<Vec<OrderOf<T>>, DispatchError> {
      ensure!(
        Self::live_count(ledger_id) > 0,
        Error::<T>::InsufficientOrderListLength
      );
      Ok(Self::list_orders(ledger_id, None, Some(trader)))
    }

    /// Entry fee `who` would pay right now.
    pub fn entry_fee_for(who: &T::AccountId) -> BalanceOf<T> {
      Self::entry_fee_with(&Configuration::<T>::get(), who)
    }

    fn entry_fee_with(config: &DcaConfigOf<T>, who: &T::AccountId) -> BalanceOf<T> {
      match &config.exemption_collection {
        Some(collection) if T::ExemptionOracle::holds(collection, who) => Zero::zero(),
        _ => config.entry_fee,
      }
    }

    pub fn tranches_over_window(interval_seconds: u64, hours: u32) -> Result<u32, DispatchError> {
      ensure!(interval_seconds > 0, Error::<T>::ZeroInterval);
      let window = u64::from(hours).saturating_mul(SECONDS_PER_HOUR);
      u32::try_from(window / interval_seconds).map_err(|_| Error::<T>::ArithmeticOverflow.into())
    }

    fn now() -> u64 {
      T::TimeProvider::now().as_secs()
    }

    /// Asset a tranche of `side` spends, which is also the escrow asset.
    fn input_asset(token: T::AssetId, side: Side) -> T::AssetId {
      match side {
        Side::Buy => T::QuoteAsset::get(),
        Side::Sell => token,
      }
    }

    fn swap_path(token: T::AssetId, side: Side) -> Vec<T::AssetId> {
      match side {
        Side::Buy => vec![T::QuoteAsset::get(), token],
        Side::Sell => vec![token, T::QuoteAsset::get()],
      }
    }

    /// Smallest output that keeps a tranche within `worst_price`.
    pub fn min_amount_out(
      side: Side,
      amount_in: BalanceOf<T>,
      worst_price: u128,
    ) -> Result<BalanceOf<T>, DispatchError> {
      let amount: u128 = amount_in.saturated_into();
      let precision = T::PricePrecision::get();
      let min_out = match side {
        Side::Buy => multiply_by_rational_with_rounding(amount, precision, worst_price, Rounding::Up),
        Side::Sell => {
          multiply_by_rational_with_rounding(amount, worst_price, precision, Rounding::Up)
        }
      }
      .ok_or(Error::<T>::ArithmeticOverflow)?;
      Ok(min_out.max(1).saturated_into())
    }

    fn ensure_ledger_for_token(token: T::AssetId) -> Result<LedgerId, DispatchError> {
      if let Some(ledger_id) = LedgerByToken::<T>::get(token) {
        return Ok(ledger_id);
      }
      ensure!(
        token != T::QuoteAsset::get(),
        Error::<T>::QuoteAssetNotTradable
      );
      let ledger_id = NextLedgerId::<T>::get();
      let next = ledger_id
        .checked_add(1)
        .ok_or(Error::<T>::LedgerIdOverflow)?;
      NextLedgerId::<T>::put(next);
      LedgerByToken::<T>::insert(token, ledger_id);
      Ledgers::<T>::insert(
        ledger_id,
        LedgerInfo {
          token,
          submitted_total: 0,
          filled_total: 0,
        },
      );
      let account = Self::escrow_account(ledger_id);
      // Escrow survives a zero native balance between orders
      frame_system::Pallet::<T>::inc_providers(&account);
      log::debug!(target: LOG_TARGET, "created DCA ledger {} for {:?}", ledger_id, token);
      Self::deposit_event(Event::LedgerCreated {
        ledger_id,
        token,
        account,
      });
      Ok(ledger_id)
    }

    fn ensure_can_pay(
      trader: &T::AccountId,
      escrow_asset: T::AssetId,
      escrow_total: BalanceOf<T>,
      fee: BalanceOf<T>,
    ) -> DispatchResult {
      let fee_asset = T::FeeAsset::get();
      if !fee.is_zero() && fee_asset == escrow_asset {
        let needed = escrow_total
          .checked_add(&fee)
          .ok_or(Error::<T>::ArithmeticOverflow)?;
        ensure!(
          T::AssetOps::balance(trader, escrow_asset) >= needed,
          Error::<T>::InsufficientBalance
        );
        return Ok(());
      }
      ensure!(
        T::AssetOps::balance(trader, escrow_asset) >= escrow_total,
        Error::<T>::InsufficientBalance
      );
      ensure!(
        fee.is_zero() || T::AssetOps::balance(trader, fee_asset) >= fee,
        Error::<T>::InsufficientBalance
      );
      Ok(())
    }

    fn charge_entry_fee(trader: &T::AccountId, fee: BalanceOf<T>) -> DispatchResult {
      let registry = Self::registry_account();
      let fee_asset = T::FeeAsset::get();
      T::AssetOps::transfer(trader, &registry, fee_asset, fee)?;
      T::AssetOps::burn(&registry, fee_asset, fee)?;
      Self::deposit_event(Event::EntryFeeBurned {
        who: trader.clone(),
        amount: fee,
      });
      Ok(())
    }

    pub(crate) fn do_submit(
      ledger_id: LedgerId,
      trader: T::AccountId,
      terms: OrderTerms<BalanceOf<T>>,
    ) -> Result<OrderId, DispatchError> {
      let config = Configuration::<T>::get();
      ensure!(config.trading_enabled, Error::<T>::TradingDisabled);
      ensure!(terms.tranches_total > 0, Error::<T>::ZeroTranches);
      ensure!(!terms.amount_per_tranche.is_zero(), Error::<T>::ZeroAmount);
      ensure!(terms.worst_price > 0, Error::<T>::ZeroWorstPrice);

      let mut ledger = Ledgers::<T>::get(ledger_id).ok_or(Error::<T>::UnknownLedger)?;
      let mut orders = Orders::<T>::get(ledger_id);
      ensure!(
        (orders.len() as u32) < config.max_orders_per_ledger,
        Error::<T>::LedgerFull
      );

      let escrow_total = terms
        .amount_per_tranche
        .checked_mul(&terms.tranches_total.into())
        .ok_or(Error::<T>::ArithmeticOverflow)?;
      let fee = Self::entry_fee_with(&config, &trader);
      let escrow_asset = Self::input_asset(ledger.token, terms.side);
      Self::ensure_can_pay(&trader, escrow_asset, escrow_total, fee)?;

      let order_id = ledger
        .submitted_total
        .checked_add(1)
        .ok_or(Error::<T>::ArithmeticOverflow)?;

      T::AssetOps::transfer(
        &trader,
        &Self::escrow_account(ledger_id),
        escrow_asset,
        escrow_total,
      )?;
      if !fee.is_zero() {
        Self::charge_entry_fee(&trader, fee)?;
      }

      orders
        .try_push(Order {
          id: order_id,
          trader: trader.clone(),
          side: terms.side,
          interval_seconds: terms.interval_seconds,
          tranches_total: terms.tranches_total,
          tranches_filled: 0,
          amount_per_tranche: terms.amount_per_tranche,
          worst_price: terms.worst_price,
          last_executed_at: Self::now(),
        })
        .map_err(|_| Error::<T>::LedgerFull)?;
      let slot = (orders.len() as u32).saturating_sub(1);
      ledger.submitted_total = order_id;
      Orders::<T>::insert(ledger_id, orders);
      Ledgers::<T>::insert(ledger_id, ledger);

      Self::deposit_event(Event::OrderSubmitted {
        ledger_id,
        order_id,
        slot,
        trader,
        side: terms.side,
        tranches_total: terms.tranches_total,
        amount_per_tranche: terms.amount_per_tranche,
        entry_fee: fee,
      });
      Ok(order_id)
    }

    fn slot_of(ledger_id: LedgerId, order_id: OrderId) -> Result<u32, DispatchError> {
      Orders::<T>::get(ledger_id)
        .iter()
        .position(|order| order.id == order_id)
        .map(|slot| slot as u32)
        .ok_or_else(|| Error::<T>::UnknownOrder.into())
    }

    pub(crate) fn do_cancel(ledger_id: LedgerId, who: &T::AccountId, slot: u32) -> DispatchResult {
      let token = Self::ledger_token(ledger_id)?;
      let mut orders = Orders::<T>::get(ledger_id).into_inner();
      let order = orders
        .get(slot as usize)
        .cloned()
        .ok_or(Error::<T>::InsufficientOrderListLength)?;
      ensure!(&order.trader == who, Error::<T>::NotOrderOwner);

      let refunded = order.escrowed();
      if !refunded.is_zero() {
        T::AssetOps::transfer(
          &Self::escrow_account(ledger_id),
          who,
          Self::input_asset(token, order.side),
          refunded,
        )?;
      }

      orders.swap_remove(slot as usize);
      Self::store_orders(ledger_id, orders)?;

      Self::deposit_event(Event::OrderCancelled {
        ledger_id,
        order_id: order.id,
        trader: order.trader,
        refunded,
      });
      Ok(())
    }

    fn store_orders(ledger_id: LedgerId, orders: Vec<OrderOf<T>>) -> DispatchResult {
      if orders.is_empty() {
        Orders::<T>::remove(ledger_id);
      } else {
        let orders = OrdersOf::<T>::try_from(orders).map_err(|_| Error::<T>::LedgerFull)?;
        Orders::<T>::insert(ledger_id, orders);
      }
      Ok(())
    }

    /// Runs one swap in its own storage layer so a failure leaves no trace.
    fn execute_tranche(
      token: T::AssetId,
      escrow: &T::AccountId,
      order: &OrderOf<T>,
      now: u64,
    ) -> Result<BalanceOf<T>, DispatchError> {
      let min_out = Self::min_amount_out(order.side, order.amount_per_tranche, order.worst_price)?;
      with_storage_layer(|| {
        T::TradeRouter::swap_exact_in(
          escrow,
          Self::swap_path(token, order.side),
          order.amount_per_tranche,
          min_out,
          &order.trader,
          now,
        )
      })
    }

    /// Returns `(executed, failed)` tranche counts.
    pub(crate) fn do_execute_due(
      ledger_id: LedgerId,
      side: Side,
    ) -> Result<(u32, u32), DispatchError> {
      let mut ledger = Ledgers::<T>::get(ledger_id).ok_or(Error::<T>::UnknownLedger)?;
      let escrow = Self::escrow_account(ledger_id);
      let now = Self::now();
      let mut orders = Orders::<T>::get(ledger_id).into_inner();
      let (mut executed, mut failed) = (0u32, 0u32);

      let mut index = 0;
      while index < orders.len() {
        let order = orders[index].clone();
        if order.side != side || !order.is_due(now) {
          index += 1;
          continue;
        }

        match Self::execute_tranche(ledger.token, &escrow, &order, now) {
          Ok(amount_out) => {
            executed = executed.saturating_add(1);
            let tranche = order.tranches_filled.saturating_add(1);
            Self::deposit_event(Event::TrancheExecuted {
              ledger_id,
              order_id: order.id,
              trader: order.trader.clone(),
              tranche,
              amount_in: order.amount_per_tranche,
              amount_out,
            });
            if tranche >= order.tranches_total {
              // The order swapped into `index` has not been visited yet
              orders.swap_remove(index);
              Self::deposit_event(Event::OrderCompleted {
                ledger_id,
                order_id: order.id,
                trader: order.trader,
              });
            } else {
              orders[index].tranches_filled = tranche;
              orders[index].last_executed_at = now;
              index += 1;
            }
          }
          Err(error) => {
            failed = failed.saturating_add(1);
            log::debug!(
              target: LOG_TARGET,
              "tranche of order {} on ledger {} failed: {:?}",
              order.id,
              ledger_id,
              error
            );
            Self::deposit_event(Event::TrancheFailed {
              ledger_id,
              order_id: order.id,
              error,
            });
            index += 1;
          }
        }
      }

      if executed > 0 {
        ledger.filled_total = ledger.filled_total.saturating_add(u64::from(executed));
        Ledgers::<T>::insert(ledger_id, ledger);
        Self::store_orders(ledger_id, orders)?;
      }
      Ok((executed, failed))
    }
  }
}
