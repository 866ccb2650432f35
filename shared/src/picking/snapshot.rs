//! Picking snapshot: server-provided description of what an operation expects

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{LineId, LocationId, LotId, PickingId, ProductId};

/// Picking type code, decides which location side is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Receipt (vendor → stock)
    Incoming,
    /// Delivery (stock → customer)
    Outgoing,
    /// Internal transfer
    #[default]
    Internal,
}

/// Product tracking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tracking {
    #[default]
    None,
    Lot,
    Serial,
}

impl Tracking {
    /// Lot/serial tracked products must be identified by their lot barcode
    pub fn requires_lot(&self) -> bool {
        !matches!(self, Tracking::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: LocationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub tracking: Tracking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRef {
    pub id: LotId,
    pub name: String,
    pub product_id: ProductId,
}

/// One expected movement of the picking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub id: LineId,
    pub product_id: ProductId,
    /// Reserved lot, `None` when any lot of the product is acceptable
    #[serde(default)]
    pub lot_id: Option<LotId>,
    pub source_location_id: LocationId,
    pub dest_location_id: LocationId,
    /// Required quantity
    pub qty_reserved: Decimal,
    /// Quantity already confirmed server-side
    #[serde(default)]
    pub qty_done: Decimal,
    pub available_qty_at_source: Decimal,
}

/// Immutable-per-load picking snapshot
///
/// Barcode maps are keyed by the scannable token; keys are unique per map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub picking_id: PickingId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operation: OperationKind,
    pub lines: Vec<SnapshotLine>,
    #[serde(default)]
    pub locations_by_barcode: HashMap<String, LocationRef>,
    #[serde(default)]
    pub products_by_barcode: HashMap<String, ProductRef>,
    #[serde(default)]
    pub lots_by_barcode: HashMap<String, LotRef>,
}
