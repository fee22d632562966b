//! Forecasting service operations and their request/response shapes.
//!
//! Field names follow the service's JSON protocol, so the request structs
//! serialize straight into request bodies.

use std::collections::BTreeMap;

use async_trait::async_trait;
use coldcast_core::{
    DataFrequency, ResourceArn, ResourceDescription, ResourceKind, Result, S3Uri, Schema,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetType {
    TargetTimeSeries,
    ItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDatasetGroupRequest {
    pub dataset_group_name: String,
    pub domain: Domain,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dataset_arns: Vec<ResourceArn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDatasetRequest {
    pub dataset_name: String,
    pub domain: Domain,
    pub dataset_type: DatasetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_frequency: Option<DataFrequency>,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Config {
    pub path: String,
    pub role_arn: String,
}

impl S3Config {
    pub fn new(uri: &S3Uri, role_arn: &str) -> Self {
        Self {
            path: uri.to_string(),
            role_arn: role_arn.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSource {
    pub s3_config: S3Config,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataDestination {
    pub s3_config: S3Config,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDatasetImportJobRequest {
    pub dataset_import_job_name: String,
    pub dataset_arn: ResourceArn,
    pub data_source: DataSource,
    /// Only meaningful for time series datasets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputDataConfig {
    pub dataset_group_arn: ResourceArn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeaturizationConfig {
    pub forecast_frequency: DataFrequency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatePredictorRequest {
    pub predictor_name: String,
    pub algorithm_arn: String,
    pub forecast_horizon: u32,
    #[serde(rename = "PerformAutoML")]
    pub perform_auto_ml: bool,
    pub input_data_config: InputDataConfig,
    pub featurization_config: FeaturizationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forecast_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateForecastRequest {
    pub forecast_name: String,
    pub predictor_arn: ResourceArn,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forecast_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateForecastExportJobRequest {
    pub forecast_export_job_name: String,
    pub forecast_arn: ResourceArn,
    pub destination: DataDestination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryForecastRequest {
    pub forecast_arn: ResourceArn,
    pub filters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl QueryForecastRequest {
    /// Query a single item by its `item_id` dimension.
    pub fn for_item(forecast_arn: &ResourceArn, item_id: &str) -> Self {
        Self {
            forecast_arn: forecast_arn.clone(),
            filters: BTreeMap::from([("item_id".to_string(), item_id.to_string())]),
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataPoint {
    pub timestamp: String,
    pub value: f64,
}

/// Predictions keyed by forecast type (`p10`, `p50`, `mean`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForecastPrediction {
    #[serde(default)]
    pub predictions: BTreeMap<String, Vec<DataPoint>>,
}

impl ForecastPrediction {
    pub fn horizon(&self) -> usize {
        self.predictions.values().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeightedQuantileLoss {
    pub quantile: f64,
    pub loss_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metrics {
    #[serde(rename = "RMSE", default)]
    pub rmse: Option<f64>,
    #[serde(default)]
    pub weighted_quantile_losses: Vec<WeightedQuantileLoss>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestWindow {
    #[serde(default)]
    pub evaluation_type: Option<String>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredictorEvaluation {
    #[serde(default)]
    pub algorithm_arn: Option<String>,
    #[serde(default)]
    pub test_windows: Vec<TestWindow>,
}

/// Backtest results of a trained predictor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccuracyMetrics {
    #[serde(default)]
    pub predictor_evaluation_results: Vec<PredictorEvaluation>,
}

impl AccuracyMetrics {
    /// Metrics of the `SUMMARY` window, falling back to the first window.
    pub fn summary(&self) -> Option<&Metrics> {
        let windows = self
            .predictor_evaluation_results
            .iter()
            .flat_map(|e| e.test_windows.iter());
        let mut first = None;
        for window in windows {
            if window.evaluation_type.as_deref() == Some("SUMMARY") {
                return window.metrics.as_ref();
            }
            if first.is_none() {
                first = window.metrics.as_ref();
            }
        }
        first
    }
}

/// Operations of the managed forecasting service used by the workflow.
#[async_trait]
pub trait ForecastApi: Send + Sync {
    async fn create_dataset_group(&self, req: &CreateDatasetGroupRequest) -> Result<ResourceArn>;

    async fn create_dataset(&self, req: &CreateDatasetRequest) -> Result<ResourceArn>;

    /// Replace the dataset references of a dataset group.
    async fn update_dataset_group(
        &self,
        dataset_group: &ResourceArn,
        datasets: &[ResourceArn],
    ) -> Result<()>;

    async fn create_dataset_import_job(
        &self,
        req: &CreateDatasetImportJobRequest,
    ) -> Result<ResourceArn>;

    async fn create_predictor(&self, req: &CreatePredictorRequest) -> Result<ResourceArn>;

    async fn get_accuracy_metrics(&self, predictor: &ResourceArn) -> Result<AccuracyMetrics>;

    async fn create_forecast(&self, req: &CreateForecastRequest) -> Result<ResourceArn>;

    async fn create_forecast_export_job(
        &self,
        req: &CreateForecastExportJobRequest,
    ) -> Result<ResourceArn>;

    /// Current lifecycle status. Read-only and safe to repeat.
    async fn describe(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<ResourceDescription>;

    async fn delete(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<()>;

    async fn query_forecast(&self, req: &QueryForecastRequest) -> Result<ForecastPrediction>;

    /// `describe`, with "resource not found" mapped to `None`.
    async fn describe_if_exists(
        &self,
        kind: ResourceKind,
        arn: &ResourceArn,
    ) -> Result<Option<ResourceDescription>> {
        match self.describe(kind, arn).await {
            Ok(description) => Ok(Some(description)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_summary_prefers_summary_window() {
        let metrics: AccuracyMetrics = serde_json::from_value(serde_json::json!({
            "PredictorEvaluationResults": [{
                "AlgorithmArn": "arn:aws:forecast:::algorithm/Deep_AR_Plus",
                "TestWindows": [
                    {"EvaluationType": "COMPUTED", "Metrics": {"RMSE": 9.0}},
                    {"EvaluationType": "SUMMARY", "Metrics": {
                        "RMSE": 4.5,
                        "WeightedQuantileLosses": [{"Quantile": 0.5, "LossValue": 0.2}]
                    }}
                ]
            }]
        }))
        .unwrap();
        let summary = metrics.summary().unwrap();
        assert_eq!(summary.rmse, Some(4.5));
        assert_eq!(summary.weighted_quantile_losses[0].loss_value, 0.2);

        assert!(AccuracyMetrics::default().summary().is_none());
    }

    #[test]
    fn test_prediction_horizon() {
        let prediction: ForecastPrediction = serde_json::from_value(serde_json::json!({
            "Predictions": {
                "p50": [
                    {"Timestamp": "2020-02-01T00:00:00", "Value": 1.0},
                    {"Timestamp": "2020-02-02T00:00:00", "Value": 2.0}
                ]
            }
        }))
        .unwrap();
        assert_eq!(prediction.horizon(), 2);
    }
}
