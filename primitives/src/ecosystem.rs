//! Ecosystem constants for DCA deployments
//!
//! Pallet ids and the economic defaults a runtime binds into `pallet-dca`
//! through its `parameter_types!`.

/// Balance type alias for consistency across the ecosystem
pub type Balance = u128;

/// Pallet identifiers for deriving pallet-owned accounts.
///
/// Used with `PalletId::into_account_truncating()` and
/// `into_sub_account_truncating()` to derive the registry account and the
/// per-ledger escrow accounts.
pub mod pallet_ids {
  /// DCA registry pallet ID
  pub const DCA_PALLET_ID: &[u8; 8] = b"py/dca00";
}

/// Parameters shared by every DCA ledger.
pub mod params {
  use super::Balance;

  /// Precision scalar for prices (10^12).
  ///
  /// A worst price of `PRECISION` means one unit of quote asset per unit of
  /// traded token.
  pub const PRECISION: Balance = 1_000_000_000_000;

  /// Seconds in one hour, used to split an order window into tranches.
  pub const SECONDS_PER_HOUR: u64 = 3_600;

  /// Storage bound of a single ledger's order vector.
  ///
  /// The runtime-adjustable cap can never exceed this value, which keeps
  /// the cost of a full execution scan bounded.
  pub const DCA_MAX_ORDERS_CEILING: u32 = 256;

  /// Cap on live orders per ledger applied until governance changes it.
  pub const DCA_DEFAULT_MAX_ORDERS: u32 = 100;
}
