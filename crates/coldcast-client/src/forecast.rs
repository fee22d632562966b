//! Forecasting service client over the JSON 1.1 protocol.
//!
//! Every operation is a signed `POST /` with an `X-Amz-Target` header naming
//! the operation. Queries go to a separate runtime endpoint.

use async_trait::async_trait;
use coldcast_core::{ColdcastConfig, Error, ResourceArn, ResourceDescription, ResourceKind, Result};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::api::*;
use crate::http::{json_error, parse_endpoint, SignedClient};
use crate::sigv4::Credentials;

const SIGNING_NAME: &str = "forecast";
const SERVICE_TARGET: &str = "AmazonForecast";
const QUERY_TARGET: &str = "AmazonForecastRuntime";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

pub struct HttpForecastClient {
    signer: SignedClient,
    endpoint: Url,
    query_endpoint: Url,
}

impl HttpForecastClient {
    pub fn new(config: &ColdcastConfig, credentials: Credentials) -> Result<Self> {
        let endpoint = config
            .forecast_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://forecast.{}.amazonaws.com/", config.region));
        let query_endpoint = config
            .forecast_query_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://forecastquery.{}.amazonaws.com/", config.region));

        info!("Forecast endpoint: {}", endpoint);
        Ok(Self {
            signer: SignedClient::new(credentials, &config.region, SIGNING_NAME),
            endpoint: parse_endpoint(&endpoint)?,
            query_endpoint: parse_endpoint(&query_endpoint)?,
        })
    }

    async fn call<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &Url,
        target: &str,
        body: &T,
    ) -> Result<R> {
        let payload = serde_json::to_vec(body)?;
        let headers = vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("x-amz-target".to_string(), target.to_string()),
        ];

        let response = self
            .signer
            .send(Method::POST, endpoint.clone(), headers, payload)
            .await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            debug!("{} failed with {}: {}", target, status, text);
            return Err(json_error(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::from_value(Value::Object(Default::default()))?);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn service<T: Serialize, R: DeserializeOwned>(&self, operation: &str, body: &T) -> Result<R> {
        let target = format!("{}.{}", SERVICE_TARGET, operation);
        self.call(&self.endpoint, &target, body).await
    }

    /// Call a `Create*` operation and pull the new ARN out of `field`.
    async fn create<T: Serialize>(&self, kind: ResourceKind, body: &T) -> Result<ResourceArn> {
        let response: Value = self
            .service(&format!("Create{}", kind.operation_stem()), body)
            .await?;
        let field = kind.arn_field();
        let arn = response[field.as_str()]
            .as_str()
            .ok_or_else(|| Error::Http(format!("response is missing {}", field)))?;
        info!("Created {} {}", kind, arn);
        Ok(ResourceArn::new(arn))
    }
}

#[async_trait]
impl ForecastApi for HttpForecastClient {
    async fn create_dataset_group(&self, req: &CreateDatasetGroupRequest) -> Result<ResourceArn> {
        self.create(ResourceKind::DatasetGroup, req).await
    }

    async fn create_dataset(&self, req: &CreateDatasetRequest) -> Result<ResourceArn> {
        self.create(ResourceKind::Dataset, req).await
    }

    async fn update_dataset_group(
        &self,
        dataset_group: &ResourceArn,
        datasets: &[ResourceArn],
    ) -> Result<()> {
        let _: Value = self
            .service(
                "UpdateDatasetGroup",
                &json!({"DatasetGroupArn": dataset_group, "DatasetArns": datasets}),
            )
            .await?;
        Ok(())
    }

    async fn create_dataset_import_job(
        &self,
        req: &CreateDatasetImportJobRequest,
    ) -> Result<ResourceArn> {
        self.create(ResourceKind::DatasetImportJob, req).await
    }

    async fn create_predictor(&self, req: &CreatePredictorRequest) -> Result<ResourceArn> {
        self.create(ResourceKind::Predictor, req).await
    }

    async fn get_accuracy_metrics(&self, predictor: &ResourceArn) -> Result<AccuracyMetrics> {
        self.service("GetAccuracyMetrics", &json!({"PredictorArn": predictor}))
            .await
    }

    async fn create_forecast(&self, req: &CreateForecastRequest) -> Result<ResourceArn> {
        self.create(ResourceKind::Forecast, req).await
    }

    async fn create_forecast_export_job(
        &self,
        req: &CreateForecastExportJobRequest,
    ) -> Result<ResourceArn> {
        self.create(ResourceKind::ForecastExportJob, req).await
    }

    async fn describe(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<ResourceDescription> {
        let mut body = serde_json::Map::new();
        body.insert(kind.arn_field(), json!(arn));
        let response: Value = self.service(&kind.describe_operation(), &body).await?;
        parse_description(kind, arn, &response)
    }

    async fn delete(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<()> {
        let mut body = serde_json::Map::new();
        body.insert(kind.arn_field(), json!(arn));
        let _: Value = self.service(&kind.delete_operation(), &body).await?;
        info!("Requested deletion of {} {}", kind, arn);
        Ok(())
    }

    async fn query_forecast(&self, req: &QueryForecastRequest) -> Result<ForecastPrediction> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct QueryResponse {
            forecast: ForecastPrediction,
        }

        let target = format!("{}.QueryForecast", QUERY_TARGET);
        let response: QueryResponse = self.call(&self.query_endpoint, &target, req).await?;
        Ok(response.forecast)
    }
}

/// Build a `ResourceDescription` from a `Describe*` response body.
pub fn parse_description(
    kind: ResourceKind,
    arn: &ResourceArn,
    response: &Value,
) -> Result<ResourceDescription> {
    let status = response["Status"]
        .as_str()
        .ok_or_else(|| Error::Http(format!("{} response has no Status", kind.describe_operation())))?;
    Ok(ResourceDescription {
        arn: arn.clone(),
        kind,
        status: status.into(),
        message: response["Message"].as_str().map(str::to_string),
    })
}
