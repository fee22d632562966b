//! Runtime types.

use std::path::{Path, PathBuf};

use coldcast_client::{AccuracyMetrics, ForecastPrediction};
use coldcast_core::{LifecycleStatus, ResourceArn, ResourceKind, Result, S3Uri};
use coldcast_data::SeriesSummary;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A remote resource created by this workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub kind: ResourceKind,
    pub arn: ResourceArn,
    pub name: String,
}

/// Ordered record of created resources.
///
/// When bound to a file the ledger is rewritten after every change, so a run
/// that aborts halfway can still be torn down from a later process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLedger {
    resources: Vec<TrackedResource>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl ResourceLedger {
    /// In-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty ledger persisted at `path`.
    pub fn persistent(path: impl AsRef<Path>) -> Self {
        Self {
            resources: Vec::new(),
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Load from `path`; a missing file yields an empty ledger bound to it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut ledger: ResourceLedger = match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        ledger.path = Some(path.to_path_buf());
        Ok(ledger)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Ledger saved to {} ({} resources)", path.display(), self.resources.len());
        Ok(())
    }

    pub fn record(&mut self, kind: ResourceKind, arn: &ResourceArn, name: &str) -> Result<()> {
        self.resources.push(TrackedResource {
            kind,
            arn: arn.clone(),
            name: name.to_string(),
        });
        self.save()
    }

    /// Drop a deleted resource.
    pub fn forget(&mut self, arn: &ResourceArn) -> Result<()> {
        self.resources.retain(|r| &r.arn != arn);
        self.save()
    }

    pub fn resources(&self) -> &[TrackedResource] {
        &self.resources
    }

    /// Most recently recorded resource of `kind`.
    pub fn latest(&self, kind: ResourceKind) -> Option<&TrackedResource> {
        self.resources.iter().rev().find(|r| r.kind == kind)
    }

    /// Reverse creation order.
    pub fn teardown_order(&self) -> Vec<TrackedResource> {
        self.resources.iter().rev().cloned().collect()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Locations of the uploaded training inputs.
#[derive(Debug, Clone, Serialize)]
pub struct StagedInputs {
    pub target_series: S3Uri,
    pub item_metadata: S3Uri,
    pub cold_items: Vec<String>,
    pub training: SeriesSummary,
    pub held_out_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetArns {
    pub target_series: ResourceArn,
    pub item_metadata: ResourceArn,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColdStartForecast {
    pub item_id: String,
    pub prediction: ForecastPrediction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub parts: Vec<S3Uri>,
    pub forecast_types: Vec<String>,
    pub items: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeardownFailure {
    pub resource: TrackedResource,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub deleted: Vec<TrackedResource>,
    pub failed: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything a full run produced.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub staged: StagedInputs,
    pub dataset_group: ResourceArn,
    pub datasets: DatasetArns,
    pub predictor: ResourceArn,
    pub metrics: AccuracyMetrics,
    pub forecast: ResourceArn,
    pub cold_start: Vec<ColdStartForecast>,
    pub export: ExportSummary,
    /// `None` when resources were kept.
    pub teardown: Option<TeardownReport>,
}

/// Current state of a ledger entry; `status` is `None` once it is gone.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceState {
    pub resource: TrackedResource,
    pub status: Option<LifecycleStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arn(s: &str) -> ResourceArn {
        ResourceArn::new(format!("arn:aws:forecast:us-east-1:1:{}", s))
    }

    #[test]
    fn test_ledger_persists_every_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work").join("ledger.json");

        let mut ledger = ResourceLedger::persistent(&path);
        ledger
            .record(ResourceKind::DatasetGroup, &arn("dataset-group/g"), "g")
            .unwrap();
        ledger
            .record(ResourceKind::Dataset, &arn("dataset/d"), "d")
            .unwrap();

        let reloaded = ResourceLedger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.path(), Some(path.as_path()));
        assert_eq!(reloaded.resources()[1].kind, ResourceKind::Dataset);

        ledger.forget(&arn("dataset/d")).unwrap();
        assert_eq!(ResourceLedger::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_teardown_order_is_reverse() {
        let mut ledger = ResourceLedger::new();
        ledger
            .record(ResourceKind::DatasetGroup, &arn("dataset-group/g"), "g")
            .unwrap();
        ledger
            .record(ResourceKind::Predictor, &arn("predictor/p"), "p")
            .unwrap();
        ledger
            .record(ResourceKind::Forecast, &arn("forecast/f"), "f")
            .unwrap();

        let kinds: Vec<ResourceKind> = ledger.teardown_order().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Forecast,
                ResourceKind::Predictor,
                ResourceKind::DatasetGroup
            ]
        );
        assert_eq!(ledger.latest(ResourceKind::Predictor).unwrap().name, "p");
        assert!(ledger.latest(ResourceKind::Dataset).is_none());
    }

    #[test]
    fn test_missing_ledger_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResourceLedger::load(dir.path().join("none.json")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_in_memory_ledger_writes_nothing() {
        let mut ledger = ResourceLedger::new();
        ledger
            .record(ResourceKind::Forecast, &arn("forecast/f"), "f")
            .unwrap();
        assert!(ledger.path().is_none());
    }
}
