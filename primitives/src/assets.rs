use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

/// Asset identity shared by the DCA pallet and the runtimes that host it.
///
/// - `Native`: the chain's native token (managed by pallet-balances).
/// - `Local(u32)`: a local fungible asset (managed by pallet-assets).
/// - `Foreign(u32)`: a foreign asset mapped into the local id space.
#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Default,
  Encode,
  Eq,
  MaxEncodedLen,
  Ord,
  PartialEq,
  PartialOrd,
  TypeInfo,
  Serialize,
  Deserialize,
)]
pub enum AssetKind {
  /// Native token managed by pallet-balances
  #[default]
  Native,
  /// Local asset managed by pallet-assets
  Local(u32),
  /// Foreign asset registered under a local id
  Foreign(u32),
}

impl AssetKind {
  /// Numeric id of a non-native asset.
  pub fn asset_id(&self) -> Option<u32> {
    match self {
      AssetKind::Native => None,
      AssetKind::Local(id) | AssetKind::Foreign(id) => Some(*id),
    }
  }
}

/// Well-known asset ids used by DCA deployments.
pub mod well_known {
  /// Stable quote asset every ledger trades against.
  pub const QUOTE_STABLE: u32 = 0x2000_0001;
  /// Fee token charged on order entry and burned.
  pub const FEE_TOKEN: u32 = 0x1000_0001;
}
