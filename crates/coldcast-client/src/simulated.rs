//! In-process stand-in for the forecasting service.
//!
//! Resources move one lifecycle step per `describe` call, import jobs really
//! read their CSV from the object store, forecasts for cold-start items are
//! derived from warm items sharing their metadata category, and export jobs
//! write CSV parts back to the store. Deletes are refused while dependent
//! resources still exist, so teardown order is enforced the way the real
//! service enforces it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use coldcast_core::schema::parse_timestamp;
use coldcast_core::{
    DataFrequency, Error, LifecycleStatus, ResourceArn, ResourceDescription, ResourceKind, Result,
    S3Uri,
};
use coldcast_data::records::{parse_item_metadata, parse_target_series};
use coldcast_data::{ItemMetadata, TargetRecord};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::api::*;
use crate::storage::ObjectStore;

const DEFAULT_FORECAST_TYPES: [&str; 3] = ["0.1", "0.5", "0.9"];

enum Detail {
    DatasetGroup {
        datasets: Vec<ResourceArn>,
    },
    Dataset {
        dataset_type: DatasetType,
        series: Vec<TargetRecord>,
        metadata: Vec<ItemMetadata>,
    },
    ImportJob {
        dataset: ResourceArn,
        load: std::result::Result<Loaded, String>,
    },
    Predictor {
        group: ResourceArn,
        horizon: u32,
        frequency: DataFrequency,
        forecast_types: Vec<String>,
    },
    Forecast {
        predictor: ResourceArn,
        forecast_types: Vec<String>,
    },
    ExportJob {
        forecast: ResourceArn,
        destination: S3Uri,
    },
}

enum Loaded {
    Series(Vec<TargetRecord>),
    Metadata(Vec<ItemMetadata>),
}

struct SimResource {
    kind: ResourceKind,
    name: String,
    status: LifecycleStatus,
    message: Option<String>,
    polls: u32,
    detail: Detail,
}

#[derive(Default)]
struct SimState {
    resources: BTreeMap<ResourceArn, SimResource>,
    creation_failures: HashMap<ResourceKind, String>,
    deletion_failures: HashSet<ResourceKind>,
    operations: Vec<String>,
}

/// Everything needed to produce point forecasts for one forecast resource.
struct ForecastModel {
    start: NaiveDateTime,
    horizon: u32,
    frequency: DataFrequency,
    forecast_types: Vec<String>,
    item_levels: BTreeMap<String, f64>,
}

pub struct SimulatedForecastService {
    store: Arc<dyn ObjectStore>,
    region: String,
    account: String,
    polls_to_settle: u32,
    state: Mutex<SimState>,
}

fn api_error(code: &str, message: impl Into<String>) -> Error {
    Error::Api {
        code: code.to_string(),
        message: message.into(),
    }
}

/// `0.1` → `p10`, `mean` stays `mean`.
pub fn forecast_type_label(forecast_type: &str) -> String {
    match forecast_type.parse::<f64>() {
        Ok(q) => format!("p{}", (q * 100.0).round() as u32),
        Err(_) => forecast_type.to_string(),
    }
}

fn forecast_type_multiplier(forecast_type: &str) -> f64 {
    forecast_type.parse::<f64>().map(|q| 0.5 + q).unwrap_or(1.0)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

impl SimulatedForecastService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            region: "us-east-1".into(),
            account: "000000000000".into(),
            polls_to_settle: 2,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Number of describe calls before an asynchronous operation settles.
    pub fn with_polls_to_settle(mut self, polls: u32) -> Self {
        self.polls_to_settle = polls.max(1);
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    /// Make every future creation of `kind` end in CREATE_FAILED.
    pub fn fail_creation(&self, kind: ResourceKind, message: &str) {
        self.state
            .lock()
            .creation_failures
            .insert(kind, message.to_string());
    }

    /// Make every future deletion of `kind` end in DELETE_FAILED.
    pub fn fail_deletion(&self, kind: ResourceKind) {
        self.state.lock().deletion_failures.insert(kind);
    }

    /// Mutating operations received so far, e.g. `DeleteForecast <arn>`.
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    /// ARNs of resources that still exist.
    pub fn live_resources(&self) -> Vec<(ResourceKind, ResourceArn)> {
        self.state
            .lock()
            .resources
            .iter()
            .map(|(arn, r)| (r.kind, arn.clone()))
            .collect()
    }

    fn arn(&self, kind: ResourceKind, path: &str) -> ResourceArn {
        ResourceArn::new(format!(
            "arn:aws:forecast:{}:{}:{}/{}",
            self.region,
            self.account,
            kind.arn_segment(),
            path
        ))
    }

    fn insert(
        &self,
        state: &mut SimState,
        kind: ResourceKind,
        name: &str,
        arn: ResourceArn,
        status: LifecycleStatus,
        detail: Detail,
    ) -> Result<ResourceArn> {
        if state.resources.contains_key(&arn)
            || state
                .resources
                .values()
                .any(|r| r.kind == kind && r.name == name)
        {
            return Err(api_error(
                "ResourceAlreadyExistsException",
                format!("{} {} already exists", kind, name),
            ));
        }
        state
            .operations
            .push(format!("Create{} {}", kind.operation_stem(), arn));
        state.resources.insert(
            arn.clone(),
            SimResource {
                kind,
                name: name.to_string(),
                status,
                message: None,
                polls: 0,
                detail,
            },
        );
        info!("Simulated {} created: {}", kind, arn);
        Ok(arn)
    }
}

fn lookup<'a>(state: &'a SimState, kind: ResourceKind, arn: &ResourceArn) -> Result<&'a SimResource> {
    state
        .resources
        .get(arn)
        .filter(|r| r.kind == kind)
        .ok_or_else(|| Error::NotFound(format!("{} {} does not exist", kind, arn)))
}

fn require_active(resource: &SimResource, arn: &ResourceArn) -> Result<()> {
    if resource.status != LifecycleStatus::Active {
        return Err(api_error(
            "ResourceInUseException",
            format!("{} {} is {}", resource.kind, arn, resource.status),
        ));
    }
    Ok(())
}

/// Target series and metadata currently loaded into a dataset group.
fn group_data<'a>(
    state: &'a SimState,
    group: &ResourceArn,
) -> Result<(Vec<&'a TargetRecord>, Vec<&'a ItemMetadata>)> {
    let Detail::DatasetGroup { datasets } = &lookup(state, ResourceKind::DatasetGroup, group)?.detail
    else {
        return Err(Error::Internal("dataset group detail mismatch".into()));
    };
    let mut series = Vec::new();
    let mut metadata = Vec::new();
    for arn in datasets {
        if let Some(SimResource {
            detail:
                Detail::Dataset {
                    series: s,
                    metadata: m,
                    ..
                },
            ..
        }) = state.resources.get(arn)
        {
            series.extend(s.iter());
            metadata.extend(m.iter());
        }
    }
    Ok((series, metadata))
}

fn predictor_model(
    state: &SimState,
    predictor: &ResourceArn,
    forecast_types: &[String],
) -> Result<ForecastModel> {
    let Detail::Predictor {
        group,
        horizon,
        frequency,
        forecast_types: predictor_types,
    } = &lookup(state, ResourceKind::Predictor, predictor)?.detail
    else {
        return Err(Error::Internal("predictor detail mismatch".into()));
    };
    let (series, metadata) = group_data(state, group)?;

    let mut per_item: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut last: Option<NaiveDateTime> = None;
    for record in &series {
        let ts = parse_timestamp(&record.timestamp)?;
        last = Some(last.map_or(ts, |l| l.max(ts)));
        if let Some(v) = record.target_value {
            per_item.entry(record.item_id.as_str()).or_default().push(v);
        }
    }
    let last = last.ok_or_else(|| {
        Error::InvalidData("dataset group has no imported target time series".into())
    })?;

    let item_means: BTreeMap<&str, f64> = per_item
        .iter()
        .filter_map(|(item, values)| mean(values.iter().copied()).map(|m| (*item, m)))
        .collect();
    let categories: BTreeMap<&str, &str> = metadata
        .iter()
        .map(|m| (m.item_id.as_str(), m.category.as_str()))
        .collect();
    let mut per_category: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (item, m) in &item_means {
        if let Some(category) = categories.get(item) {
            per_category.entry(*category).or_default().push(*m);
        }
    }
    let global = mean(item_means.values().copied()).unwrap_or(0.0);

    let items: BTreeSet<&str> = series
        .iter()
        .map(|r| r.item_id.as_str())
        .chain(metadata.iter().map(|m| m.item_id.as_str()))
        .collect();
    let item_levels = items
        .into_iter()
        .map(|item| {
            let level = item_means.get(item).copied().unwrap_or_else(|| {
                categories
                    .get(item)
                    .and_then(|c| per_category.get(c))
                    .and_then(|v| mean(v.iter().copied()))
                    .unwrap_or(global)
            });
            (item.to_string(), level)
        })
        .collect();

    let forecast_types = if !forecast_types.is_empty() {
        forecast_types.to_vec()
    } else if !predictor_types.is_empty() {
        predictor_types.clone()
    } else {
        DEFAULT_FORECAST_TYPES.iter().map(|s| s.to_string()).collect()
    };

    let start = frequency
        .advance(last, 1)
        .ok_or_else(|| Error::InvalidData("forecast start overflows".into()))?;

    Ok(ForecastModel {
        start,
        horizon: *horizon,
        frequency: *frequency,
        forecast_types,
        item_levels,
    })
}

fn forecast_model(state: &SimState, forecast: &ResourceArn) -> Result<ForecastModel> {
    let Detail::Forecast {
        predictor,
        forecast_types,
    } = &lookup(state, ResourceKind::Forecast, forecast)?.detail
    else {
        return Err(Error::Internal("forecast detail mismatch".into()));
    };
    predictor_model(state, predictor, forecast_types)
}

impl ForecastModel {
    fn timestamps(&self) -> Vec<String> {
        (0..self.horizon)
            .filter_map(|i| self.frequency.advance(self.start, i))
            .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string())
            .collect()
    }

    fn predict(&self, item_id: &str) -> Option<ForecastPrediction> {
        let level = *self.item_levels.get(item_id)?;
        let timestamps = self.timestamps();
        let predictions = self
            .forecast_types
            .iter()
            .map(|t| {
                let value = level * forecast_type_multiplier(t);
                let points = timestamps
                    .iter()
                    .map(|ts| DataPoint {
                        timestamp: ts.clone(),
                        value,
                    })
                    .collect();
                (forecast_type_label(t), points)
            })
            .collect();
        Some(ForecastPrediction { predictions })
    }

    fn export_csv(&self) -> Vec<u8> {
        let labels: Vec<String> = self
            .forecast_types
            .iter()
            .map(|t| forecast_type_label(t))
            .collect();
        let mut out = format!("item_id,date,{}\n", labels.join(","));
        let timestamps = self.timestamps();
        for (item, level) in &self.item_levels {
            for ts in &timestamps {
                let values: Vec<String> = self
                    .forecast_types
                    .iter()
                    .map(|t| format!("{}", level * forecast_type_multiplier(t)))
                    .collect();
                out.push_str(&format!("{},{}Z,{}\n", item, ts, values.join(",")));
            }
        }
        out.into_bytes()
    }
}

/// Resources that must be deleted before `arn`.
fn dependents(state: &SimState, arn: &ResourceArn) -> Vec<ResourceArn> {
    let mut out: Vec<ResourceArn> = state
        .resources
        .iter()
        .filter(|(_, r)| match &r.detail {
            Detail::ImportJob { dataset, .. } => dataset == arn,
            Detail::Predictor { group, .. } => group == arn,
            Detail::Forecast { predictor, .. } => predictor == arn,
            Detail::ExportJob { forecast, .. } => forecast == arn,
            _ => false,
        })
        .map(|(a, _)| a.clone())
        .collect();
    if let Some(SimResource {
        detail: Detail::DatasetGroup { datasets },
        ..
    }) = state.resources.get(arn)
    {
        out.extend(
            datasets
                .iter()
                .filter(|d| state.resources.contains_key(*d))
                .cloned(),
        );
    }
    out
}

enum Settled {
    Active,
    Failed(String),
    /// Active once the export part is written.
    Export(S3Uri, Vec<u8>),
}

impl SimulatedForecastService {
    /// Work out how a finished creation ends.
    fn settle_creation(&self, state: &SimState, arn: &ResourceArn) -> Settled {
        let Some(resource) = state.resources.get(arn) else {
            return Settled::Failed("resource vanished".into());
        };
        if let Some(message) = state.creation_failures.get(&resource.kind) {
            return Settled::Failed(message.clone());
        }
        match &resource.detail {
            Detail::ImportJob { load: Err(e), .. } => Settled::Failed(e.clone()),
            Detail::Predictor { .. } => match predictor_model(state, arn, &[]) {
                Ok(_) => Settled::Active,
                Err(e) => Settled::Failed(e.to_string()),
            },
            Detail::ExportJob {
                forecast,
                destination,
            } => match forecast_model(state, forecast) {
                Ok(model) => Settled::Export(
                    destination.join(&format!("{}_part0.csv", resource.name)),
                    model.export_csv(),
                ),
                Err(e) => Settled::Failed(e.to_string()),
            },
            _ => Settled::Active,
        }
    }

    /// Move an import job's parsed rows into its dataset.
    fn apply_import(state: &mut SimState, job: &ResourceArn) {
        let Some(SimResource {
            detail: Detail::ImportJob { dataset, load },
            ..
        }) = state.resources.get_mut(job)
        else {
            return;
        };
        let dataset = dataset.clone();
        let loaded = std::mem::replace(load, Err("already applied".into()));
        if let (
            Ok(loaded),
            Some(SimResource {
                detail: Detail::Dataset {
                    series, metadata, ..
                },
                ..
            }),
        ) = (loaded, state.resources.get_mut(&dataset))
        {
            match loaded {
                Loaded::Series(rows) => series.extend(rows),
                Loaded::Metadata(rows) => metadata.extend(rows),
            }
        }
    }

    /// Advance one lifecycle step. Returns an export part to write, if any.
    fn advance(&self, state: &mut SimState, arn: &ResourceArn) -> Result<Option<(S3Uri, Vec<u8>)>> {
        let settle_after = self.polls_to_settle;
        let (status, polls) = {
            let resource = state
                .resources
                .get_mut(arn)
                .ok_or_else(|| Error::NotFound(arn.to_string()))?;
            resource.polls += 1;
            (resource.status.clone(), resource.polls)
        };
        let settled = polls >= settle_after;

        let mut write = None;
        let next = match status {
            LifecycleStatus::CreatePending | LifecycleStatus::CreateInProgress if settled => {
                match self.settle_creation(state, arn) {
                    Settled::Active => {
                        Self::apply_import(state, arn);
                        Some((LifecycleStatus::Active, None))
                    }
                    Settled::Failed(message) => Some((LifecycleStatus::CreateFailed, Some(message))),
                    Settled::Export(uri, bytes) => {
                        write = Some((uri, bytes));
                        Some((LifecycleStatus::Active, None))
                    }
                }
            }
            LifecycleStatus::CreatePending => Some((LifecycleStatus::CreateInProgress, None)),
            LifecycleStatus::UpdatePending | LifecycleStatus::UpdateInProgress if settled => {
                Some((LifecycleStatus::Active, None))
            }
            LifecycleStatus::UpdatePending => Some((LifecycleStatus::UpdateInProgress, None)),
            LifecycleStatus::DeletePending | LifecycleStatus::DeleteInProgress if settled => {
                let kind = state.resources.get(arn).map(|r| r.kind);
                if kind.is_some_and(|k| state.deletion_failures.contains(&k)) {
                    Some((
                        LifecycleStatus::DeleteFailed,
                        Some("simulated deletion failure".to_string()),
                    ))
                } else {
                    state.resources.remove(arn);
                    debug!("Simulated resource removed: {}", arn);
                    return Err(Error::NotFound(format!("{} has been deleted", arn)));
                }
            }
            LifecycleStatus::DeletePending => Some((LifecycleStatus::DeleteInProgress, None)),
            _ => None,
        };

        if let Some((status, message)) = next {
            if let Some(resource) = state.resources.get_mut(arn) {
                if resource.status != status {
                    debug!("Simulated {} {} -> {}", resource.kind, arn, status);
                }
                resource.status = status;
                resource.message = message;
            }
        }
        Ok(write)
    }

    fn description(state: &SimState, arn: &ResourceArn) -> Result<ResourceDescription> {
        let resource = state
            .resources
            .get(arn)
            .ok_or_else(|| Error::NotFound(arn.to_string()))?;
        Ok(ResourceDescription {
            arn: arn.clone(),
            kind: resource.kind,
            status: resource.status.clone(),
            message: resource.message.clone(),
        })
    }
}

#[async_trait]
impl ForecastApi for SimulatedForecastService {
    async fn create_dataset_group(&self, req: &CreateDatasetGroupRequest) -> Result<ResourceArn> {
        let mut state = self.state.lock();
        for dataset in &req.dataset_arns {
            lookup(&state, ResourceKind::Dataset, dataset)?;
        }
        let arn = self.arn(ResourceKind::DatasetGroup, &req.dataset_group_name);
        self.insert(
            &mut state,
            ResourceKind::DatasetGroup,
            &req.dataset_group_name,
            arn,
            LifecycleStatus::Active,
            Detail::DatasetGroup {
                datasets: req.dataset_arns.clone(),
            },
        )
    }

    async fn create_dataset(&self, req: &CreateDatasetRequest) -> Result<ResourceArn> {
        if req.dataset_type != DatasetType::ItemMetadata && req.data_frequency.is_none() {
            return Err(api_error(
                "InvalidInputException",
                "DataFrequency is required for time series datasets",
            ));
        }
        let mut state = self.state.lock();
        let arn = self.arn(ResourceKind::Dataset, &req.dataset_name);
        self.insert(
            &mut state,
            ResourceKind::Dataset,
            &req.dataset_name,
            arn,
            LifecycleStatus::Active,
            Detail::Dataset {
                dataset_type: req.dataset_type,
                series: Vec::new(),
                metadata: Vec::new(),
            },
        )
    }

    async fn update_dataset_group(
        &self,
        dataset_group: &ResourceArn,
        datasets: &[ResourceArn],
    ) -> Result<()> {
        let mut state = self.state.lock();
        let mut types = HashSet::new();
        for dataset in datasets {
            if let Detail::Dataset { dataset_type, .. } =
                &lookup(&state, ResourceKind::Dataset, dataset)?.detail
            {
                if !types.insert(*dataset_type) {
                    return Err(api_error(
                        "InvalidInputException",
                        format!("more than one {:?} dataset", dataset_type),
                    ));
                }
            }
        }
        require_active(
            lookup(&state, ResourceKind::DatasetGroup, dataset_group)?,
            dataset_group,
        )?;
        state
            .operations
            .push(format!("UpdateDatasetGroup {}", dataset_group));
        if let Some(group) = state.resources.get_mut(dataset_group) {
            group.detail = Detail::DatasetGroup {
                datasets: datasets.to_vec(),
            };
            group.status = LifecycleStatus::UpdatePending;
            group.polls = 0;
        }
        Ok(())
    }

    async fn create_dataset_import_job(
        &self,
        req: &CreateDatasetImportJobRequest,
    ) -> Result<ResourceArn> {
        let (dataset_type, dataset_name) = {
            let state = self.state.lock();
            let dataset = lookup(&state, ResourceKind::Dataset, &req.dataset_arn)?;
            require_active(dataset, &req.dataset_arn)?;
            match &dataset.detail {
                Detail::Dataset { dataset_type, .. } => (*dataset_type, dataset.name.clone()),
                _ => return Err(Error::Internal("dataset detail mismatch".into())),
            }
        };

        let source: S3Uri = req.data_source.s3_config.path.parse()?;
        let load = match self.store.get_object(&source).await {
            Ok(bytes) => match dataset_type {
                DatasetType::ItemMetadata => parse_item_metadata(&bytes).map(Loaded::Metadata),
                _ => parse_target_series(&bytes).map(Loaded::Series),
            }
            .map_err(|e| format!("Failed to parse {}: {}", source, e)),
            Err(e) => Err(format!("Failed to read {}: {}", source, e)),
        };

        let mut state = self.state.lock();
        let arn = self.arn(
            ResourceKind::DatasetImportJob,
            &format!("{}/{}", dataset_name, req.dataset_import_job_name),
        );
        self.insert(
            &mut state,
            ResourceKind::DatasetImportJob,
            &req.dataset_import_job_name,
            arn,
            LifecycleStatus::CreatePending,
            Detail::ImportJob {
                dataset: req.dataset_arn.clone(),
                load,
            },
        )
    }

    async fn create_predictor(&self, req: &CreatePredictorRequest) -> Result<ResourceArn> {
        let group = &req.input_data_config.dataset_group_arn;
        let mut state = self.state.lock();
        let Detail::DatasetGroup { datasets } =
            &lookup(&state, ResourceKind::DatasetGroup, group)?.detail
        else {
            return Err(Error::Internal("dataset group detail mismatch".into()));
        };
        let has_target = datasets.iter().any(|d| {
            matches!(
                state.resources.get(d).map(|r| &r.detail),
                Some(Detail::Dataset {
                    dataset_type: DatasetType::TargetTimeSeries,
                    ..
                })
            )
        });
        if !has_target {
            return Err(api_error(
                "InvalidInputException",
                format!("dataset group {} has no target time series dataset", group),
            ));
        }
        if req.forecast_horizon == 0 {
            return Err(api_error("InvalidInputException", "ForecastHorizon must be positive"));
        }

        let arn = self.arn(ResourceKind::Predictor, &req.predictor_name);
        self.insert(
            &mut state,
            ResourceKind::Predictor,
            &req.predictor_name,
            arn,
            LifecycleStatus::CreatePending,
            Detail::Predictor {
                group: group.clone(),
                horizon: req.forecast_horizon,
                frequency: req.featurization_config.forecast_frequency,
                forecast_types: req.forecast_types.clone(),
            },
        )
    }

    async fn get_accuracy_metrics(&self, predictor: &ResourceArn) -> Result<AccuracyMetrics> {
        let state = self.state.lock();
        require_active(lookup(&state, ResourceKind::Predictor, predictor)?, predictor)?;
        let Detail::Predictor {
            group,
            forecast_types,
            ..
        } = &lookup(&state, ResourceKind::Predictor, predictor)?.detail
        else {
            return Err(Error::Internal("predictor detail mismatch".into()));
        };
        let model = predictor_model(&state, predictor, &[])?;
        let (series, _) = group_data(&state, group)?;

        let residuals: Vec<f64> = series
            .iter()
            .filter_map(|r| {
                let level = model.item_levels.get(&r.item_id)?;
                r.target_value.map(|v| (v - level).powi(2))
            })
            .collect();
        let rmse = mean(residuals.into_iter()).map(f64::sqrt);
        let scale = mean(model.item_levels.values().map(|v| v.abs()))
            .filter(|s| *s > 0.0)
            .unwrap_or(1.0);

        let types = if forecast_types.is_empty() {
            DEFAULT_FORECAST_TYPES.iter().map(|s| s.to_string()).collect()
        } else {
            forecast_types.clone()
        };
        let weighted_quantile_losses = types
            .iter()
            .filter_map(|t| t.parse::<f64>().ok())
            .map(|q| WeightedQuantileLoss {
                quantile: q,
                loss_value: rmse.unwrap_or(0.0) / scale * (0.5 + (q - 0.5).abs()),
            })
            .collect();

        Ok(AccuracyMetrics {
            predictor_evaluation_results: vec![PredictorEvaluation {
                algorithm_arn: None,
                test_windows: vec![TestWindow {
                    evaluation_type: Some("SUMMARY".into()),
                    metrics: Some(Metrics {
                        rmse,
                        weighted_quantile_losses,
                    }),
                }],
            }],
        })
    }

    async fn create_forecast(&self, req: &CreateForecastRequest) -> Result<ResourceArn> {
        let mut state = self.state.lock();
        require_active(
            lookup(&state, ResourceKind::Predictor, &req.predictor_arn)?,
            &req.predictor_arn,
        )?;
        let arn = self.arn(ResourceKind::Forecast, &req.forecast_name);
        self.insert(
            &mut state,
            ResourceKind::Forecast,
            &req.forecast_name,
            arn,
            LifecycleStatus::CreatePending,
            Detail::Forecast {
                predictor: req.predictor_arn.clone(),
                forecast_types: req.forecast_types.clone(),
            },
        )
    }

    async fn create_forecast_export_job(
        &self,
        req: &CreateForecastExportJobRequest,
    ) -> Result<ResourceArn> {
        let destination: S3Uri = req.destination.s3_config.path.parse()?;
        let mut state = self.state.lock();
        let forecast = lookup(&state, ResourceKind::Forecast, &req.forecast_arn)?;
        require_active(forecast, &req.forecast_arn)?;
        let arn = self.arn(
            ResourceKind::ForecastExportJob,
            &format!("{}/{}", forecast.name, req.forecast_export_job_name),
        );
        self.insert(
            &mut state,
            ResourceKind::ForecastExportJob,
            &req.forecast_export_job_name,
            arn,
            LifecycleStatus::CreatePending,
            Detail::ExportJob {
                forecast: req.forecast_arn.clone(),
                destination,
            },
        )
    }

    async fn describe(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<ResourceDescription> {
        let write = {
            let mut state = self.state.lock();
            lookup(&state, kind, arn)?;
            self.advance(&mut state, arn)?
        };

        if let Some((uri, bytes)) = write {
            if let Err(e) = self.store.put_object(&uri, bytes).await {
                let mut state = self.state.lock();
                if let Some(resource) = state.resources.get_mut(arn) {
                    resource.status = LifecycleStatus::CreateFailed;
                    resource.message = Some(format!("Failed to write {}: {}", uri, e));
                }
            } else {
                info!("Simulated export written to {}", uri);
            }
        }

        let state = self.state.lock();
        Self::description(&state, arn)
    }

    async fn delete(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<()> {
        let mut state = self.state.lock();
        let resource = lookup(&state, kind, arn)?;
        match resource.status {
            LifecycleStatus::Active
            | LifecycleStatus::CreateFailed
            | LifecycleStatus::CreateStopped
            | LifecycleStatus::UpdateFailed
            | LifecycleStatus::DeleteFailed => {}
            ref other => {
                return Err(api_error(
                    "ResourceInUseException",
                    format!("{} {} is {}", kind, arn, other),
                ))
            }
        }
        let blocking = dependents(&state, arn);
        if !blocking.is_empty() {
            return Err(api_error(
                "ResourceInUseException",
                format!(
                    "{} {} is referenced by {}",
                    kind,
                    arn,
                    blocking
                        .iter()
                        .map(ResourceArn::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }

        state.operations.push(format!("{} {}", kind.delete_operation(), arn));
        if let Some(resource) = state.resources.get_mut(arn) {
            resource.status = LifecycleStatus::DeletePending;
            resource.message = None;
            resource.polls = 0;
        }
        Ok(())
    }

    async fn query_forecast(&self, req: &QueryForecastRequest) -> Result<ForecastPrediction> {
        let state = self.state.lock();
        require_active(
            lookup(&state, ResourceKind::Forecast, &req.forecast_arn)?,
            &req.forecast_arn,
        )?;
        let item_id = req.filters.get("item_id").ok_or_else(|| {
            api_error("InvalidInputException", "Filters must include item_id")
        })?;
        let model = forecast_model(&state, &req.forecast_arn)?;
        model
            .predict(item_id)
            .ok_or_else(|| Error::NotFound(format!("no forecast for item {}", item_id)))
    }
}
