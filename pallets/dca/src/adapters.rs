//! Adapter traits for the DCA pallet
//!
//! The pallet never touches a token, an AMM or an NFT collection directly.
//! A runtime wires these three traits to its concrete pallets, which keeps
//! pallet-dca generic over asset types and independent of any runtime.

use alloc::vec::Vec;
use frame::prelude::*;

/// Settlement token operations used for escrow, payout and fee burning.
pub trait AssetOps<AccountId, AssetId, Balance> {
  fn transfer(
    from: &AccountId,
    to: &AccountId,
    asset: AssetId,
    amount: Balance,
  ) -> Result<(), DispatchError>;

  /// Irrevocably remove `amount` of `asset` from `who`.
  fn burn(who: &AccountId, asset: AssetId, amount: Balance) -> Result<(), DispatchError>;

  fn balance(who: &AccountId, asset: AssetId) -> Balance;
}

/// Single exact-input swap along `path` at the pool's current price.
///
/// Input is taken from `who`, output is delivered to `recipient`. The swap
/// must fail without side effects if it would yield less than `min_out` or
/// if `deadline` (unix seconds) has passed.
pub trait TradeRouter<AccountId, AssetId, Balance> {
  fn swap_exact_in(
    who: &AccountId,
    path: Vec<AssetId>,
    amount_in: Balance,
    min_out: Balance,
    recipient: &AccountId,
    deadline: u64,
  ) -> Result<Balance, DispatchError>;
}

/// Reports whether `who` holds any item of the exemption `collection`.
pub trait ExemptionOracle<AccountId, CollectionId> {
  fn holds(collection: &CollectionId, who: &AccountId) -> bool;
}

/// No-op `AssetOps` for configurations without a settlement token.
impl<AccountId, AssetId, Balance: Default> AssetOps<AccountId, AssetId, Balance> for () {
  fn transfer(_: &AccountId, _: &AccountId, _: AssetId, _: Balance) -> Result<(), DispatchError> {
    Ok(())
  }

  fn burn(_: &AccountId, _: AssetId, _: Balance) -> Result<(), DispatchError> {
    Ok(())
  }

  fn balance(_: &AccountId, _: AssetId) -> Balance {
    Balance::default()
  }
}

/// Router that refuses every swap.
impl<AccountId, AssetId, Balance> TradeRouter<AccountId, AssetId, Balance> for () {
  fn swap_exact_in(
    _: &AccountId,
    _: Vec<AssetId>,
    _: Balance,
    _: Balance,
    _: &AccountId,
    _: u64,
  ) -> Result<Balance, DispatchError> {
    Err(DispatchError::Other("TradeRouter not configured"))
  }
}

/// Nobody is exempt.
impl<AccountId, CollectionId> ExemptionOracle<AccountId, CollectionId> for () {
  fn holds(_: &CollectionId, _: &AccountId) -> bool {
    false
  }
}
