use crate as pallet_dca;
use alloc::{collections::BTreeMap, collections::BTreeSet, vec, vec::Vec};
use core::{cell::RefCell, time::Duration};
use polkadot_sdk::frame_support::{
  PalletId, construct_runtime, derive_impl, ord_parameter_types, parameter_types,
  traits::{
    ConstU32, ConstU128, Currency, UnixTime,
    fungible::Inspect as NativeInspect,
    fungibles::{Inspect as FungiblesInspect, Mutate as FungiblesMutate},
    tokens::{Fortitude, Precision, Preservation},
  },
};
use polkadot_sdk::frame_system::{self, EnsureRoot, EnsureSignedBy};
use polkadot_sdk::sp_runtime::{
  BuildStorage, DispatchError, TokenError,
  testing::H256,
  traits::{BlakeTwo256, IdentityLookup},
};
use primitives::{AssetKind, ecosystem, well_known};

use crate::{AssetOps, ExemptionOracle, TradeRouter};

type Block = frame_system::mocking::MockBlock<Test>;
pub type AccountId = u64;
pub type Balance = u128;
pub type CollectionId = u32;

pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const CHARLIE: AccountId = 3;
pub const RELAYER: AccountId = 4;
/// Factory contract authorised to submit on behalf of traders.
pub const FACTORY: AccountId = 5;

pub const QUOTE: AssetKind = AssetKind::Local(well_known::QUOTE_STABLE);
pub const FEE_TOKEN: AssetKind = AssetKind::Local(well_known::FEE_TOKEN);
pub const XYZ: AssetKind = AssetKind::Local(7);
pub const ABC: AssetKind = AssetKind::Local(8);

pub const PROFILE_NFT: CollectionId = 42;
pub const ENTRY_FEE: Balance = 10;
pub const INITIAL_BALANCE: Balance = 1_000_000_000;
pub const POOL_RESERVE: Balance = 1_000_000_000;
pub const GENESIS_TIME: u64 = 1_700_000_000;

construct_runtime!(
  pub enum Test {
    System: frame_system,
    Balances: polkadot_sdk::pallet_balances,
    Assets: polkadot_sdk::pallet_assets,
    Dca: pallet_dca,
  }
);

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
  type Block = Block;
  type AccountId = AccountId;
  type Lookup = IdentityLookup<Self::AccountId>;
  type Hash = H256;
  type Hashing = BlakeTwo256;
  type AccountData = polkadot_sdk::pallet_balances::AccountData<Balance>;
}

impl polkadot_sdk::pallet_balances::Config for Test {
  type MaxLocks = ();
  type MaxReserves = ();
  type ReserveIdentifier = [u8; 8];
  type Balance = Balance;
  type DustRemoval = ();
  type RuntimeEvent = RuntimeEvent;
  type ExistentialDeposit = ConstU128<1>;
  type AccountStore = System;
  type WeightInfo = ();
  type FreezeIdentifier = ();
  type MaxFreezes = ();
  type RuntimeHoldReason = ();
  type RuntimeFreezeReason = ();
  type DoneSlashHandler = ();
}

impl polkadot_sdk::pallet_assets::Config for Test {
  type RuntimeEvent = RuntimeEvent;
  type Balance = Balance;
  type AssetId = u32;
  type AssetIdParameter = u32;
  type Currency = Balances;
  type CreateOrigin = polkadot_sdk::frame_support::traits::AsEnsureOriginWithArg<
    frame_system::EnsureSigned<Self::AccountId>,
  >;
  type ForceOrigin = EnsureRoot<Self::AccountId>;
  type AssetDeposit = ConstU128<1>;
  type AssetAccountDeposit = ConstU128<1>;
  type MetadataDepositBase = ConstU128<1>;
  type MetadataDepositPerByte = ConstU128<1>;
  type ApprovalDeposit = ConstU128<1>;
  type StringLimit = ConstU32<50>;
  type Freezer = ();
  type Extra = ();
  type ReserveData = ();
  type CallbackHandle = ();
  type WeightInfo = ();
  type RemoveItemsLimit = ConstU32<5>;
  type Holder = ();
  #[cfg(feature = "runtime-benchmarks")]
  type BenchmarkHelper = AssetBenchmarkHelper;
}

#[cfg(feature = "runtime-benchmarks")]
pub struct AssetBenchmarkHelper;

#[cfg(feature = "runtime-benchmarks")]
impl polkadot_sdk::pallet_assets::BenchmarkHelper<u32, ()> for AssetBenchmarkHelper {
  fn create_asset_id_parameter(id: u32) -> u32 {
    id
  }
  fn create_reserve_id_parameter(_id: u32) -> () {
    ()
  }
}

// Stateful mocks for the clock, pools and the profile NFT
thread_local! {
  static NOW: RefCell<u64> = const { RefCell::new(GENESIS_TIME) };

  // Sorted asset pair -> account holding the pool reserves
  static POOLS: RefCell<BTreeMap<(AssetKind, AssetKind), AccountId>> = const { RefCell::new(BTreeMap::new()) };

  static NFT_HOLDERS: RefCell<BTreeSet<(CollectionId, AccountId)>> = const { RefCell::new(BTreeSet::new()) };
}

fn sorted_pair(a: AssetKind, b: AssetKind) -> (AssetKind, AssetKind) {
  if a < b { (a, b) } else { (b, a) }
}

pub fn now() -> u64 {
  NOW.with(|n| *n.borrow())
}

pub fn set_now(seconds: u64) {
  NOW.with(|n| *n.borrow_mut() = seconds);
}

pub fn advance_time(seconds: u64) {
  NOW.with(|n| {
    let mut now = n.borrow_mut();
    *now = now.saturating_add(seconds);
  });
}

pub fn give_nft(collection: CollectionId, who: AccountId) {
  NFT_HOLDERS.with(|h| h.borrow_mut().insert((collection, who)));
}

pub fn balance_of(who: AccountId, asset: AssetKind) -> Balance {
  MockAssetOps::balance(&who, asset)
}

pub fn total_issuance(asset: AssetKind) -> Balance {
  match asset.asset_id() {
    None => <Balances as NativeInspect<AccountId>>::total_issuance(),
    Some(id) => <Assets as FungiblesInspect<AccountId>>::total_issuance(id),
  }
}

pub fn fund(who: AccountId, asset: AssetKind, amount: Balance) -> Result<(), DispatchError> {
  match asset.asset_id() {
    None => {
      let _ = <Balances as Currency<AccountId>>::deposit_creating(&who, amount);
      Ok(())
    }
    Some(id) => {
      <Assets as FungiblesMutate<AccountId>>::mint_into(id, &who, amount)?;
      Ok(())
    }
  }
}

/// Create a constant-product pool whose reserves are the balances of a
/// dedicated pool account.
pub fn create_pool(
  asset_a: AssetKind,
  asset_b: AssetKind,
  reserve_a: Balance,
  reserve_b: Balance,
) -> Result<(), DispatchError> {
  let key = sorted_pair(asset_a, asset_b);
  let account = POOLS.with(|p| {
    let mut pools = p.borrow_mut();
    let next = 1_000 + pools.len() as AccountId;
    *pools.entry(key).or_insert(next)
  });
  fund(account, asset_a, reserve_a)?;
  fund(account, asset_b, reserve_b)
}

pub fn pool_account(asset_a: AssetKind, asset_b: AssetKind) -> Option<AccountId> {
  POOLS.with(|p| p.borrow().get(&sorted_pair(asset_a, asset_b)).copied())
}

pub fn reset_mocks() {
  set_now(GENESIS_TIME);
  POOLS.with(|p| p.borrow_mut().clear());
  NFT_HOLDERS.with(|h| h.borrow_mut().clear());
}

pub struct MockTime;
impl UnixTime for MockTime {
  fn now() -> Duration {
    Duration::from_secs(now())
  }
}

pub struct MockAssetOps;

impl AssetOps<AccountId, AssetKind, Balance> for MockAssetOps {
  fn transfer(
    from: &AccountId,
    to: &AccountId,
    asset: AssetKind,
    amount: Balance,
  ) -> Result<(), DispatchError> {
    match asset.asset_id() {
      None => <Balances as Currency<AccountId>>::transfer(
        from,
        to,
        amount,
        polkadot_sdk::frame_support::traits::ExistenceRequirement::AllowDeath,
      ),
      Some(id) => {
        <Assets as FungiblesMutate<AccountId>>::transfer(
          id,
          from,
          to,
          amount,
          Preservation::Expendable,
        )?;
        Ok(())
      }
    }
  }

  fn burn(who: &AccountId, asset: AssetKind, amount: Balance) -> Result<(), DispatchError> {
    match asset.asset_id() {
      None => {
        let (_, remainder) = <Balances as Currency<AccountId>>::slash(who, amount);
        if remainder > 0 {
          return Err(DispatchError::Token(TokenError::FundsUnavailable));
        }
        Ok(())
      }
      Some(id) => {
        <Assets as FungiblesMutate<AccountId>>::burn_from(
          id,
          who,
          amount,
          Preservation::Expendable,
          Precision::Exact,
          Fortitude::Polite,
        )?;
        Ok(())
      }
    }
  }

  fn balance(who: &AccountId, asset: AssetKind) -> Balance {
    match asset.asset_id() {
      None => <Balances as NativeInspect<AccountId>>::balance(who),
      Some(id) => <Assets as FungiblesInspect<AccountId>>::balance(id, who),
    }
  }
}

/// Constant-product router over the mock pools.
pub struct MockRouter;

impl TradeRouter<AccountId, AssetKind, Balance> for MockRouter {
  fn swap_exact_in(
    who: &AccountId,
    path: Vec<AssetKind>,
    amount_in: Balance,
    min_out: Balance,
    recipient: &AccountId,
    deadline: u64,
  ) -> Result<Balance, DispatchError> {
    if deadline < now() {
      return Err(DispatchError::Other("Expired"));
    }
    let [asset_in, asset_out] = path[..] else {
      return Err(DispatchError::Other("UnsupportedPath"));
    };
    let pool = pool_account(asset_in, asset_out).ok_or(DispatchError::Other("NoPool"))?;
    let reserve_in = MockAssetOps::balance(&pool, asset_in);
    let reserve_out = MockAssetOps::balance(&pool, asset_out);
    let amount_out = amount_in.saturating_mul(reserve_out) / reserve_in.saturating_add(amount_in);
    if amount_out < min_out {
      return Err(DispatchError::Other("SlippageExceeded"));
    }
    MockAssetOps::transfer(who, &pool, asset_in, amount_in)?;
    MockAssetOps::transfer(&pool, recipient, asset_out, amount_out)?;
    Ok(amount_out)
  }
}

pub struct MockProfileNft;

impl ExemptionOracle<AccountId, CollectionId> for MockProfileNft {
  fn holds(collection: &CollectionId, who: &AccountId) -> bool {
    NFT_HOLDERS.with(|h| h.borrow().contains(&(*collection, *who)))
  }
}

#[cfg(feature = "runtime-benchmarks")]
pub struct MockBenchmarkHelper;

#[cfg(feature = "runtime-benchmarks")]
impl crate::BenchmarkHelper<AccountId, AssetKind, Balance> for MockBenchmarkHelper {
  fn traded_asset() -> AssetKind {
    XYZ
  }

  fn fund(who: &AccountId, asset: AssetKind, amount: Balance) -> Result<(), DispatchError> {
    fund(*who, asset, amount)
  }

  fn create_pool(
    asset_a: AssetKind,
    asset_b: AssetKind,
    reserve_a: Balance,
    reserve_b: Balance,
  ) -> Result<(), DispatchError> {
    create_pool(asset_a, asset_b, reserve_a, reserve_b)
  }
}

parameter_types! {
  pub const DcaPalletId: PalletId = PalletId(*ecosystem::pallet_ids::DCA_PALLET_ID);
  pub const QuoteAsset: AssetKind = QUOTE;
  pub const FeeAsset: AssetKind = FEE_TOKEN;
  pub const DefaultEntryFee: Balance = ENTRY_FEE;
  pub const PricePrecision: u128 = ecosystem::params::PRECISION;
}

ord_parameter_types! {
  pub const Factory: AccountId = FACTORY;
}

impl pallet_dca::Config for Test {
  type AssetId = AssetKind;
  type Balance = Balance;
  type CollectionId = CollectionId;
  type QuoteAsset = QuoteAsset;
  type FeeAsset = FeeAsset;
  type AssetOps = MockAssetOps;
  type TradeRouter = MockRouter;
  type ExemptionOracle = MockProfileNft;
  type TimeProvider = MockTime;
  type AdminOrigin = EnsureRoot<AccountId>;
  type RegistryOrigin = EnsureSignedBy<Factory, AccountId>;
  type PalletId = DcaPalletId;
  type MaxOrdersCeiling = ConstU32<{ ecosystem::params::DCA_MAX_ORDERS_CEILING }>;
  type DefaultMaxOrders = ConstU32<{ ecosystem::params::DCA_DEFAULT_MAX_ORDERS }>;
  type DefaultEntryFee = DefaultEntryFee;
  type PricePrecision = PricePrecision;
  type WeightInfo = ();
  #[cfg(feature = "runtime-benchmarks")]
  type BenchmarkHelper = MockBenchmarkHelper;
}

pub fn new_test_ext() -> polkadot_sdk::sp_io::TestExternalities {
  let mut t = frame_system::GenesisConfig::<Test>::default()
    .build_storage()
    .unwrap();

  polkadot_sdk::pallet_balances::GenesisConfig::<Test> {
    balances: vec![
      (ALICE, INITIAL_BALANCE),
      (BOB, INITIAL_BALANCE),
      (CHARLIE, INITIAL_BALANCE),
    ],
    dev_accounts: None,
  }
  .assimilate_storage(&mut t)
  .unwrap();

  let traders = [ALICE, BOB, CHARLIE];
  let funded_assets = [well_known::QUOTE_STABLE, well_known::FEE_TOKEN, 7, 8];
  polkadot_sdk::pallet_assets::GenesisConfig::<Test> {
    // Sufficient assets with min balance 1, so escrow accounts need no native deposit
    assets: funded_assets.iter().map(|id| (*id, ALICE, true, 1)).collect(),
    metadata: vec![],
    accounts: funded_assets
      .iter()
      .flat_map(|id| traders.iter().map(move |who| (*id, *who, INITIAL_BALANCE)))
      .collect(),
    reserves: vec![],
    next_asset_id: None,
  }
  .assimilate_storage(&mut t)
  .unwrap();

  pallet_dca::GenesisConfig::<Test> {
    trading_paused: false,
    relayer: Some(RELAYER),
    exemption_collection: Some(PROFILE_NFT),
  }
  .assimilate_storage(&mut t)
  .unwrap();

  let mut ext = polkadot_sdk::sp_io::TestExternalities::new(t);
  ext.execute_with(|| {
    reset_mocks();
    System::set_block_number(1);
    create_pool(QUOTE, XYZ, POOL_RESERVE, POOL_RESERVE).unwrap();
    create_pool(ABC, QUOTE, POOL_RESERVE, POOL_RESERVE).unwrap();
    create_pool(AssetKind::Native, QUOTE, POOL_RESERVE, POOL_RESERVE).unwrap();
  });
  ext
}
