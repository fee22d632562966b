//! Coldcast Data: CSV records and the cold-start split.
//!
//! Inputs are a target time series (`timestamp,target_value,item_id`) and
//! item metadata (`item_id,category`). Cold-start items keep their metadata
//! but lose their history, so the service can only forecast them through the
//! metadata signal shared with warm items.

pub mod export;
pub mod records;
pub mod split;

pub use export::{parse_export, ExportRow, ExportedForecast};
pub use records::{
    encode_item_metadata, encode_target_series, read_item_metadata, read_target_series,
    ItemMetadata, SeriesSummary, TargetRecord,
};
pub use split::{split_cold_start, ColdStartSelection, ColdStartSplit};
