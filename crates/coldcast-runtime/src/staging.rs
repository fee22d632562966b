//! Local input preparation: read the CSVs, hold out the cold-start items.

use std::path::{Path, PathBuf};

use coldcast_core::{ColdcastConfig, Result};
use coldcast_data::{
    encode_item_metadata, encode_target_series, read_item_metadata, read_target_series,
    split_cold_start, ColdStartSelection, ColdStartSplit, ItemMetadata, SeriesSummary,
};
use tracing::info;

pub const TARGET_SERIES_OBJECT: &str = "target_time_series.csv";
pub const ITEM_METADATA_OBJECT: &str = "item_metadata.csv";
pub const HELD_OUT_FILE: &str = "cold_start_history.csv";

/// Training inputs with the cold-start items' history removed.
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    pub split: ColdStartSplit,
    /// All metadata, cold items included.
    pub metadata: Vec<ItemMetadata>,
}

impl PreparedInputs {
    pub fn target_series_csv(&self) -> Result<Vec<u8>> {
        encode_target_series(&self.split.training)
    }

    pub fn item_metadata_csv(&self) -> Result<Vec<u8>> {
        encode_item_metadata(&self.metadata)
    }

    pub fn training_summary(&self) -> SeriesSummary {
        SeriesSummary::of(&self.split.training)
    }

    /// Write the import-ready CSVs and the held-out history into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let files = [
            (TARGET_SERIES_OBJECT, self.target_series_csv()?),
            (ITEM_METADATA_OBJECT, self.item_metadata_csv()?),
            (HELD_OUT_FILE, encode_target_series(&self.split.held_out)?),
        ];
        let mut written = Vec::new();
        for (name, bytes) in files {
            let path = dir.join(name);
            std::fs::write(&path, bytes)?;
            written.push(path);
        }
        info!("Prepared inputs written to {}", dir.display());
        Ok(written)
    }
}

/// Read the configured CSVs and split off the cold-start items.
pub fn prepare_inputs(config: &ColdcastConfig) -> Result<PreparedInputs> {
    let series = read_target_series(&config.target_series_file)?;
    let metadata = read_item_metadata(&config.item_metadata_file)?;
    let selection = ColdStartSelection::from(&config.cold_start);
    let split = split_cold_start(&series, &metadata, &selection)?;

    let summary = SeriesSummary::of(&split.training);
    info!(
        "Training series: {} items, {} records ({} .. {}); cold-start items: {:?}",
        summary.items,
        summary.records,
        summary.start.as_deref().unwrap_or("-"),
        summary.end.as_deref().unwrap_or("-"),
        split.cold_items
    );

    Ok(PreparedInputs { split, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldcast_core::ColdStartSettings;

    fn write_inputs(dir: &Path) -> ColdcastConfig {
        let series = dir.join("tts.csv");
        let metadata = dir.join("meta.csv");
        std::fs::write(
            &series,
            "timestamp,target_value,item_id\n\
             2020-01-01,1,a\n2020-01-02,2,a\n\
             2020-01-01,3,b\n2020-01-02,4,b\n\
             2020-01-01,5,c\n",
        )
        .unwrap();
        std::fs::write(&metadata, "item_id,category\na,x\nb,y\nc,x\n").unwrap();
        ColdcastConfig {
            target_series_file: series,
            item_metadata_file: metadata,
            cold_start: ColdStartSettings {
                items: vec!["c".into()],
                count: 1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_holds_out_cold_items() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path());

        let prepared = prepare_inputs(&config).unwrap();
        assert_eq!(prepared.split.cold_items, vec!["c"]);
        assert_eq!(prepared.training_summary().records, 4);
        assert_eq!(prepared.metadata.len(), 3);

        let csv = String::from_utf8(prepared.target_series_csv().unwrap()).unwrap();
        assert!(!csv.contains(",c\n"));
        assert!(csv.starts_with("2020-01-01,1"));
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn test_write_to_creates_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path());
        let prepared = prepare_inputs(&config).unwrap();

        let out = dir.path().join("prepared");
        let written = prepared.write_to(&out).unwrap();
        assert_eq!(written.len(), 3);
        let held_out = std::fs::read_to_string(out.join(HELD_OUT_FILE)).unwrap();
        let held_out = held_out.trim();
        assert!(held_out.starts_with("2020-01-01,5"));
        assert!(held_out.ends_with(",c"));
    }

    #[test]
    fn test_missing_input_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ColdcastConfig {
            target_series_file: dir.path().join("absent.csv"),
            ..Default::default()
        };
        assert!(prepare_inputs(&config).is_err());
    }
}
