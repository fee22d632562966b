//! Remote resource handles and lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque identifier assigned by the forecasting service at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceArn(String);

impl ResourceArn {
    pub fn new(arn: impl Into<String>) -> Self {
        Self(arn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing resource name (`.../predictor/my_predictor` → `my_predictor`).
    pub fn resource_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceArn {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceArn {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of service-managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    DatasetGroup,
    Dataset,
    DatasetImportJob,
    Predictor,
    Forecast,
    ForecastExportJob,
}

impl ResourceKind {
    pub fn all() -> &'static [ResourceKind] {
        &[
            Self::DatasetGroup,
            Self::Dataset,
            Self::DatasetImportJob,
            Self::Predictor,
            Self::Forecast,
            Self::ForecastExportJob,
        ]
    }

    /// Operation-name stem used by the service API (`Describe<Stem>`, `Delete<Stem>`).
    pub fn operation_stem(&self) -> &'static str {
        match self {
            Self::DatasetGroup => "DatasetGroup",
            Self::Dataset => "Dataset",
            Self::DatasetImportJob => "DatasetImportJob",
            Self::Predictor => "Predictor",
            Self::Forecast => "Forecast",
            Self::ForecastExportJob => "ForecastExportJob",
        }
    }

    pub fn describe_operation(&self) -> String {
        format!("Describe{}", self.operation_stem())
    }

    pub fn delete_operation(&self) -> String {
        format!("Delete{}", self.operation_stem())
    }

    /// Request/response field carrying this resource's ARN.
    pub fn arn_field(&self) -> String {
        format!("{}Arn", self.operation_stem())
    }

    /// Resource-type segment inside an ARN.
    pub fn arn_segment(&self) -> &'static str {
        match self {
            Self::DatasetGroup => "dataset-group",
            Self::Dataset => "dataset",
            Self::DatasetImportJob => "dataset-import-job",
            Self::Predictor => "predictor",
            Self::Forecast => "forecast",
            Self::ForecastExportJob => "forecast-export-job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation_stem())
    }
}

/// Lifecycle status reported by the service for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleStatus {
    Active,
    CreatePending,
    CreateInProgress,
    CreateFailed,
    CreateStopping,
    CreateStopped,
    UpdatePending,
    UpdateInProgress,
    UpdateFailed,
    DeletePending,
    DeleteInProgress,
    DeleteFailed,
    /// A status string this client does not know about.
    Other(String),
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::CreatePending => "CREATE_PENDING",
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateFailed => "CREATE_FAILED",
            Self::CreateStopping => "CREATE_STOPPING",
            Self::CreateStopped => "CREATE_STOPPED",
            Self::UpdatePending => "UPDATE_PENDING",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::DeletePending => "DELETE_PENDING",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::Other(s) => s,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed | Self::UpdateFailed | Self::DeleteFailed
        )
    }
}

impl From<&str> for LifecycleStatus {
    fn from(s: &str) -> Self {
        match s {
            "ACTIVE" => Self::Active,
            "CREATE_PENDING" => Self::CreatePending,
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_FAILED" => Self::CreateFailed,
            "CREATE_STOPPING" => Self::CreateStopping,
            "CREATE_STOPPED" => Self::CreateStopped,
            "UPDATE_PENDING" => Self::UpdatePending,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "DELETE_PENDING" => Self::DeletePending,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_FAILED" => Self::DeleteFailed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for LifecycleStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<LifecycleStatus> for String {
    fn from(status: LifecycleStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status snapshot returned by a describe call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub arn: ResourceArn,
    pub kind: ResourceKind,
    pub status: LifecycleStatus,
    /// Service-provided detail, usually set on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Object-storage location (`s3://bucket/key`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Append a path segment to the key, inserting a `/` separator if needed.
    pub fn join(&self, segment: &str) -> Self {
        let key = if self.key.is_empty() {
            segment.to_string()
        } else if self.key.ends_with('/') {
            format!("{}{}", self.key, segment)
        } else {
            format!("{}/{}", self.key, segment)
        };
        Self::new(self.bucket.clone(), key)
    }
}

impl FromStr for S3Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("s3://")
            .ok_or_else(|| Error::InvalidData(format!("not an s3:// URI: {}", s)))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::InvalidData(format!("missing bucket in {}", s)));
        }
        Ok(Self::new(bucket, key))
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        assert_eq!(LifecycleStatus::from("ACTIVE"), LifecycleStatus::Active);
        assert_eq!(
            LifecycleStatus::from("CREATE_IN_PROGRESS"),
            LifecycleStatus::CreateInProgress
        );
        let other = LifecycleStatus::from("SOMETHING_NEW");
        assert_eq!(other, LifecycleStatus::Other("SOMETHING_NEW".into()));
        assert_eq!(other.as_str(), "SOMETHING_NEW");
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&LifecycleStatus::CreateFailed).unwrap();
        assert_eq!(json, "\"CREATE_FAILED\"");
        let parsed: LifecycleStatus = serde_json::from_str("\"DELETE_PENDING\"").unwrap();
        assert_eq!(parsed, LifecycleStatus::DeletePending);
    }

    #[test]
    fn test_kind_operations() {
        let kind = ResourceKind::DatasetImportJob;
        assert_eq!(kind.describe_operation(), "DescribeDatasetImportJob");
        assert_eq!(kind.delete_operation(), "DeleteDatasetImportJob");
        assert_eq!(kind.arn_field(), "DatasetImportJobArn");
        assert_eq!(kind.arn_segment(), "dataset-import-job");
    }

    #[test]
    fn test_arn_resource_name() {
        let arn = ResourceArn::new("arn:aws:forecast:us-east-1:123:predictor/coldstart_deeparp");
        assert_eq!(arn.resource_name(), "coldstart_deeparp");
    }

    #[test]
    fn test_s3_uri() {
        let uri: S3Uri = "s3://my-bucket/coldstart/train.csv".parse().unwrap();
        assert_eq!(uri.bucket, "my-bucket");
        assert_eq!(uri.key, "coldstart/train.csv");
        assert_eq!(uri.to_string(), "s3://my-bucket/coldstart/train.csv");

        let root: S3Uri = "s3://my-bucket".parse().unwrap();
        assert_eq!(root.key, "");
        assert_eq!(root.join("a.csv").key, "a.csv");
        assert_eq!(
            S3Uri::new("b", "prefix/").join("x").to_string(),
            "s3://b/prefix/x"
        );

        assert!("http://bucket/key".parse::<S3Uri>().is_err());
        assert!("s3:///key".parse::<S3Uri>().is_err());
    }
}
