//! Cold-start item selection.

use std::collections::{BTreeMap, BTreeSet};

use coldcast_core::{ColdStartSettings, Error, Result};
use tracing::{info, warn};

use crate::records::{ItemMetadata, TargetRecord};

/// Which items lose their history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColdStartSelection {
    /// Exactly these item ids.
    Items(Vec<String>),
    /// The last `n` metadata item ids in sorted order.
    LastN(usize),
}

impl From<&ColdStartSettings> for ColdStartSelection {
    fn from(settings: &ColdStartSettings) -> Self {
        if settings.items.is_empty() {
            Self::LastN(settings.count)
        } else {
            Self::Items(settings.items.clone())
        }
    }
}

/// Training series with cold-start history removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ColdStartSplit {
    pub training: Vec<TargetRecord>,
    pub cold_items: Vec<String>,
    /// History of the cold items, kept locally to compare against the forecast.
    pub held_out: Vec<TargetRecord>,
    /// Warm items with history but no metadata row.
    pub items_without_metadata: Vec<String>,
}

impl ColdStartSplit {
    pub fn is_cold(&self, item_id: &str) -> bool {
        self.cold_items.iter().any(|i| i == item_id)
    }
}

/// Remove the selected items' history from `series`.
///
/// Every cold item must have metadata, and at least one warm item must
/// remain in the training series.
pub fn split_cold_start(
    series: &[TargetRecord],
    metadata: &[ItemMetadata],
    selection: &ColdStartSelection,
) -> Result<ColdStartSplit> {
    let categories: BTreeMap<&str, &str> = metadata
        .iter()
        .map(|m| (m.item_id.as_str(), m.category.as_str()))
        .collect();
    if categories.len() != metadata.len() {
        warn!(
            "Item metadata has {} duplicate item ids; the last row wins",
            metadata.len() - categories.len()
        );
    }

    let cold_items: Vec<String> = match selection {
        ColdStartSelection::Items(items) => {
            let unknown: Vec<&str> = items
                .iter()
                .map(String::as_str)
                .filter(|i| !categories.contains_key(i))
                .collect();
            if !unknown.is_empty() {
                return Err(Error::InvalidData(format!(
                    "cold-start items without metadata: {}",
                    unknown.join(", ")
                )));
            }
            let unique: BTreeSet<&String> = items.iter().collect();
            unique.into_iter().cloned().collect()
        }
        ColdStartSelection::LastN(n) => {
            let skip = categories.len().saturating_sub(*n);
            categories.keys().skip(skip).map(|s| s.to_string()).collect()
        }
    };

    if cold_items.is_empty() {
        return Err(Error::InvalidData("no cold-start items selected".into()));
    }
    let cold: BTreeSet<&str> = cold_items.iter().map(String::as_str).collect();

    let (held_out, training): (Vec<TargetRecord>, Vec<TargetRecord>) = series
        .iter()
        .cloned()
        .partition(|r| cold.contains(r.item_id.as_str()));

    if training.is_empty() {
        return Err(Error::InvalidData(
            "every item with history was selected as cold-start; nothing left to train on".into(),
        ));
    }

    let warm_items: BTreeSet<&str> = training.iter().map(|r| r.item_id.as_str()).collect();
    let items_without_metadata: Vec<String> = warm_items
        .iter()
        .filter(|i| !categories.contains_key(*i))
        .map(|i| i.to_string())
        .collect();
    if !items_without_metadata.is_empty() {
        warn!(
            "{} items have history but no metadata",
            items_without_metadata.len()
        );
    }

    let warm_categories: BTreeSet<&str> = warm_items
        .iter()
        .filter_map(|i| categories.get(i).copied())
        .collect();
    for item in &cold_items {
        let category = categories.get(item.as_str()).copied().unwrap_or_default();
        if !warm_categories.contains(category) {
            warn!(
                "Cold-start item {} is the only member of category '{}'; no warm item shares its metadata",
                item, category
            );
        }
    }

    info!(
        "Cold-start split: {} cold items, {} training records, {} held out",
        cold_items.len(),
        training.len(),
        held_out.len()
    );

    Ok(ColdStartSplit {
        training,
        cold_items,
        held_out,
        items_without_metadata,
    })
}
