//! The cold-start workflow.
//!
//! Each step issues one kind of create call, records the new ARN in the
//! ledger before waiting on it, and only returns once the resource is ACTIVE.
//! A failed or timed-out step aborts the run with everything created so far
//! still in the ledger, so `teardown` can clean up.

use std::sync::Arc;

use coldcast_client::{
    AccuracyMetrics, CreateDatasetGroupRequest, CreateDatasetImportJobRequest,
    CreateDatasetRequest, CreateForecastExportJobRequest, CreateForecastRequest,
    CreatePredictorRequest, DataDestination, DataSource, DatasetType, Domain,
    FeaturizationConfig, ForecastApi, InputDataConfig, ObjectStore, QueryForecastRequest,
    S3Config,
};
use coldcast_core::{
    ColdcastConfig, Error, LifecycleStatus, ResourceArn, ResourceDescription, ResourceKind, Result,
    S3Uri, Schema,
};
use coldcast_data::{parse_export, ExportedForecast, SeriesSummary};
use coldcast_lifecycle::{StatusSets, WaitPolicy, Waiter};
use tracing::{error, info, warn};

use crate::staging::{prepare_inputs, ITEM_METADATA_OBJECT, TARGET_SERIES_OBJECT};
use crate::types::*;

/// Remote handles, configuration and the ledger of one workflow.
pub struct WorkflowContext {
    api: Arc<dyn ForecastApi>,
    store: Arc<dyn ObjectStore>,
    config: ColdcastConfig,
    waiter: Waiter,
    ledger: ResourceLedger,
}

impl WorkflowContext {
    pub fn new(
        api: Arc<dyn ForecastApi>,
        store: Arc<dyn ObjectStore>,
        config: ColdcastConfig,
        ledger: ResourceLedger,
    ) -> Self {
        let waiter = Waiter::new(WaitPolicy::from(&config.poll));
        Self {
            api,
            store,
            config,
            waiter,
            ledger,
        }
    }

    pub fn config(&self) -> &ColdcastConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    // ---------------------------------------------------------------
    // Waiting
    // ---------------------------------------------------------------

    async fn await_status(
        &self,
        sets: &StatusSets,
        kind: ResourceKind,
        arn: &ResourceArn,
    ) -> Result<ResourceDescription> {
        let api = &self.api;
        let report = self
            .waiter
            .wait(sets, move || api.describe(kind, arn))
            .await?;
        info!(
            "{} {} settled after {} polls ({}s)",
            kind,
            arn.resource_name(),
            report.polls,
            report.elapsed.as_secs()
        );
        report.into_result(kind, arn)
    }

    async fn await_active(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<ResourceDescription> {
        self.await_status(&StatusSets::creation(), kind, arn).await
    }

    async fn await_gone(&self, kind: ResourceKind, arn: &ResourceArn) -> Result<()> {
        let api = &self.api;
        let report = self
            .waiter
            .wait_until_gone(&StatusSets::deletion(), move || {
                api.describe_if_exists(kind, arn)
            })
            .await?;
        report.into_deleted(kind, arn)
    }

    /// Ledger first, then wait, so an aborted wait leaves the ARN recorded.
    async fn track(&mut self, kind: ResourceKind, arn: &ResourceArn, name: &str) -> Result<()> {
        self.ledger.record(kind, arn, name)?;
        self.await_active(kind, arn).await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Steps
    // ---------------------------------------------------------------

    /// Prepare the local CSVs and upload them to the staging prefix.
    pub async fn stage_inputs(&mut self) -> Result<StagedInputs> {
        let prepared = prepare_inputs(&self.config)?;

        let target_series = self.config.staging_uri(TARGET_SERIES_OBJECT);
        let item_metadata = self.config.staging_uri(ITEM_METADATA_OBJECT);
        self.store
            .put_object(&target_series, prepared.target_series_csv()?)
            .await?;
        self.store
            .put_object(&item_metadata, prepared.item_metadata_csv()?)
            .await?;
        info!("Staged inputs under {}", target_series);

        Ok(StagedInputs {
            target_series,
            item_metadata,
            cold_items: prepared.split.cold_items.clone(),
            training: SeriesSummary::of(&prepared.split.training),
            held_out_records: prepared.split.held_out.len(),
        })
    }

    pub async fn create_dataset_group(&mut self) -> Result<ResourceArn> {
        let name = self.config.resource_name("dataset_group");
        let arn = self
            .api
            .create_dataset_group(&CreateDatasetGroupRequest {
                dataset_group_name: name.clone(),
                domain: Domain::Custom,
                dataset_arns: Vec::new(),
            })
            .await?;
        self.track(ResourceKind::DatasetGroup, &arn, &name).await?;
        Ok(arn)
    }

    async fn create_dataset(&mut self, req: CreateDatasetRequest) -> Result<ResourceArn> {
        let arn = self.api.create_dataset(&req).await?;
        self.track(ResourceKind::Dataset, &arn, &req.dataset_name)
            .await?;
        Ok(arn)
    }

    /// Target time series and item metadata datasets.
    pub async fn create_datasets(&mut self) -> Result<DatasetArns> {
        let target_series = self
            .create_dataset(CreateDatasetRequest {
                dataset_name: self.config.resource_name("target_time_series"),
                domain: Domain::Custom,
                dataset_type: DatasetType::TargetTimeSeries,
                data_frequency: Some(self.config.data_frequency),
                schema: Schema::target_time_series(),
            })
            .await?;
        let item_metadata = self
            .create_dataset(CreateDatasetRequest {
                dataset_name: self.config.resource_name("item_metadata"),
                domain: Domain::Custom,
                dataset_type: DatasetType::ItemMetadata,
                data_frequency: None,
                schema: Schema::item_metadata(),
            })
            .await?;
        Ok(DatasetArns {
            target_series,
            item_metadata,
        })
    }

    /// Point the dataset group at its datasets and wait for the update.
    pub async fn attach_datasets(
        &mut self,
        dataset_group: &ResourceArn,
        datasets: &DatasetArns,
    ) -> Result<()> {
        let arns = [datasets.target_series.clone(), datasets.item_metadata.clone()];
        self.api.update_dataset_group(dataset_group, &arns).await?;
        // The first describe may still return the pre-update ACTIVE status.
        // Nothing depends on the group until the predictor is created, after
        // both imports have completed.
        self.await_status(&StatusSets::update(), ResourceKind::DatasetGroup, dataset_group)
            .await?;
        info!("Attached {} datasets to {}", arns.len(), dataset_group.resource_name());
        Ok(())
    }

    /// One import job per dataset, each awaited before the next starts.
    pub async fn import_datasets(
        &mut self,
        datasets: &DatasetArns,
        staged: &StagedInputs,
    ) -> Result<Vec<ResourceArn>> {
        let jobs = [
            (
                "target_time_series_import",
                &datasets.target_series,
                &staged.target_series,
                Some(self.config.data_frequency.timestamp_format().to_string()),
            ),
            (
                "item_metadata_import",
                &datasets.item_metadata,
                &staged.item_metadata,
                None,
            ),
        ];

        let mut arns = Vec::with_capacity(jobs.len());
        for (suffix, dataset, source, timestamp_format) in jobs {
            let name = self.config.resource_name(suffix);
            let arn = self
                .api
                .create_dataset_import_job(&CreateDatasetImportJobRequest {
                    dataset_import_job_name: name.clone(),
                    dataset_arn: dataset.clone(),
                    data_source: DataSource {
                        s3_config: S3Config::new(source, &self.config.role_arn),
                    },
                    timestamp_format,
                })
                .await?;
            self.track(ResourceKind::DatasetImportJob, &arn, &name)
                .await?;
            arns.push(arn);
        }
        Ok(arns)
    }

    pub async fn train_predictor(&mut self, dataset_group: &ResourceArn) -> Result<ResourceArn> {
        let name = self.config.resource_name("predictor");
        info!(
            "Training predictor {} (horizon {}, frequency {})",
            name, self.config.forecast_horizon, self.config.data_frequency
        );
        let arn = self
            .api
            .create_predictor(&CreatePredictorRequest {
                predictor_name: name.clone(),
                algorithm_arn: self.config.algorithm_arn.clone(),
                forecast_horizon: self.config.forecast_horizon,
                perform_auto_ml: false,
                input_data_config: InputDataConfig {
                    dataset_group_arn: dataset_group.clone(),
                },
                featurization_config: FeaturizationConfig {
                    forecast_frequency: self.config.data_frequency,
                },
                forecast_types: self.config.forecast_types.clone(),
            })
            .await?;
        self.track(ResourceKind::Predictor, &arn, &name).await?;
        Ok(arn)
    }

    pub async fn predictor_metrics(&self, predictor: &ResourceArn) -> Result<AccuracyMetrics> {
        let metrics = self.api.get_accuracy_metrics(predictor).await?;
        match metrics.summary() {
            Some(summary) => {
                info!(
                    "Predictor RMSE: {}",
                    summary
                        .rmse
                        .map(|v| format!("{:.4}", v))
                        .unwrap_or_else(|| "n/a".into())
                );
                for loss in &summary.weighted_quantile_losses {
                    info!("  wQL[{}] = {:.4}", loss.quantile, loss.loss_value);
                }
            }
            None => warn!("Predictor {} reported no accuracy metrics", predictor),
        }
        Ok(metrics)
    }

    pub async fn create_forecast(&mut self, predictor: &ResourceArn) -> Result<ResourceArn> {
        let name = self.config.resource_name("forecast");
        let arn = self
            .api
            .create_forecast(&CreateForecastRequest {
                forecast_name: name.clone(),
                predictor_arn: predictor.clone(),
                forecast_types: self.config.forecast_types.clone(),
            })
            .await?;
        self.track(ResourceKind::Forecast, &arn, &name).await?;
        Ok(arn)
    }

    /// Query the forecast for each item, in order.
    pub async fn query_cold_start(
        &self,
        forecast: &ResourceArn,
        items: &[String],
    ) -> Result<Vec<ColdStartForecast>> {
        let mut out = Vec::with_capacity(items.len());
        for item_id in items {
            let prediction = self
                .api
                .query_forecast(&QueryForecastRequest::for_item(forecast, item_id))
                .await?;
            info!(
                "Forecast for {}: {} types x {} steps",
                item_id,
                prediction.predictions.len(),
                prediction.horizon()
            );
            out.push(ColdStartForecast {
                item_id: item_id.clone(),
                prediction,
            });
        }
        Ok(out)
    }

    pub async fn export_forecast(&mut self, forecast: &ResourceArn) -> Result<ResourceArn> {
        let name = self.config.resource_name("export");
        let destination = self.config.export_uri();
        let arn = self
            .api
            .create_forecast_export_job(&CreateForecastExportJobRequest {
                forecast_export_job_name: name.clone(),
                forecast_arn: forecast.clone(),
                destination: DataDestination {
                    s3_config: S3Config::new(&destination, &self.config.role_arn),
                },
            })
            .await?;
        self.track(ResourceKind::ForecastExportJob, &arn, &name)
            .await?;
        info!("Forecast exported to {}", destination);
        Ok(arn)
    }

    /// Download every exported CSV part into `<data_dir>/export` and merge them.
    pub async fn fetch_export(&self) -> Result<(ExportSummary, ExportedForecast)> {
        let export = self.config.export_uri();
        let prefix = S3Uri::new(export.bucket.clone(), format!("{}/", export.key));
        let parts: Vec<S3Uri> = self
            .store
            .list_objects(&prefix)
            .await?
            .into_iter()
            .filter(|uri| uri.key.ends_with(".csv"))
            .collect();
        if parts.is_empty() {
            return Err(Error::NotFound(format!("no export parts under {}", prefix)));
        }

        let local_dir = self.config.data_dir.join("export");
        std::fs::create_dir_all(&local_dir)?;

        let mut merged = ExportedForecast::default();
        for part in &parts {
            let bytes = self.store.get_object(part).await?;
            let file_name = part.key.rsplit('/').next().unwrap_or(&part.key);
            std::fs::write(local_dir.join(file_name), &bytes)?;
            merged.merge(parse_export(&bytes)?)?;
        }

        let summary = ExportSummary {
            parts,
            forecast_types: merged.forecast_types.clone(),
            items: merged.item_count(),
            rows: merged.rows.len(),
        };
        info!(
            "Fetched {} export parts: {} items, {} rows",
            summary.parts.len(),
            summary.items,
            summary.rows
        );
        Ok((summary, merged))
    }

    // ---------------------------------------------------------------
    // Teardown and status
    // ---------------------------------------------------------------

    /// Delete every ledger resource in reverse creation order.
    ///
    /// A failed delete is recorded and teardown moves on; resources that
    /// depend on it will then fail too and stay in the ledger.
    pub async fn teardown(&mut self) -> Result<TeardownReport> {
        let mut report = TeardownReport::default();

        for resource in self.ledger.teardown_order() {
            let kind = resource.kind;
            let arn = resource.arn.clone();

            let outcome = match self.api.describe_if_exists(kind, &arn).await {
                Ok(None) => {
                    info!("{} {} already gone", kind, arn.resource_name());
                    Ok(())
                }
                Ok(Some(description)) => {
                    self.delete_resource(kind, &arn, &description.status).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    info!("Deleted {} {}", kind, arn.resource_name());
                    self.ledger.forget(&arn)?;
                    report.deleted.push(resource);
                }
                Err(e) => {
                    error!("Failed to delete {} {}: {}", kind, arn, e);
                    report.failed.push(TeardownFailure {
                        resource,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.is_clean() {
            info!("Teardown complete: {} resources deleted", report.deleted.len());
        } else {
            warn!(
                "Teardown finished with {} failures; {} resources remain in the ledger",
                report.failed.len(),
                self.ledger.len()
            );
        }
        Ok(report)
    }

    /// Delete one resource observed in `status` and wait until it is gone.
    ///
    /// The service rejects deletes while a create or update is running, so
    /// those are waited out first. A resource already being deleted (left by
    /// an interrupted teardown) is only waited on.
    async fn delete_resource(
        &self,
        kind: ResourceKind,
        arn: &ResourceArn,
        status: &LifecycleStatus,
    ) -> Result<()> {
        let settle = match status {
            LifecycleStatus::DeletePending | LifecycleStatus::DeleteInProgress => {
                info!("{} {} is already {}", kind, arn.resource_name(), status);
                return self.await_gone(kind, arn).await;
            }
            LifecycleStatus::CreatePending
            | LifecycleStatus::CreateInProgress
            | LifecycleStatus::CreateStopping => Some(StatusSets::creation()),
            LifecycleStatus::UpdatePending | LifecycleStatus::UpdateInProgress => {
                Some(StatusSets::update())
            }
            _ => None,
        };

        if let Some(sets) = settle {
            info!(
                "{} {} is {}, waiting before deleting",
                kind,
                arn.resource_name(),
                status
            );
            // A failed create or update can still be deleted.
            match self.await_status(&sets, kind, arn).await {
                Ok(_) | Err(Error::ResourceFailed { .. }) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        match self.api.delete(kind, arn).await {
            Ok(()) => self.await_gone(kind, arn).await,
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Describe every ledger resource without waiting.
    pub async fn status(&self) -> Result<Vec<ResourceState>> {
        let mut states = Vec::with_capacity(self.ledger.len());
        for resource in self.ledger.resources() {
            let description = self
                .api
                .describe_if_exists(resource.kind, &resource.arn)
                .await?;
            states.push(ResourceState {
                resource: resource.clone(),
                status: description.as_ref().map(|d| d.status.clone()),
                message: description.and_then(|d| d.message),
            });
        }
        Ok(states)
    }

    // ---------------------------------------------------------------
    // Full run
    // ---------------------------------------------------------------

    /// Every step in order. With `keep`, resources are left for later querying.
    pub async fn run(&mut self, keep: bool) -> Result<WorkflowReport> {
        let result = self.run_steps().await;
        let mut report = match result {
            Ok(report) => report,
            Err(e) => {
                error!("Workflow failed: {}", e);
                if !self.ledger.is_empty() {
                    warn!(
                        "{} resources were created and left in place; run teardown to delete them",
                        self.ledger.len()
                    );
                }
                return Err(e);
            }
        };

        if !keep {
            report.teardown = Some(self.teardown().await?);
        }
        Ok(report)
    }

    async fn run_steps(&mut self) -> Result<WorkflowReport> {
        let staged = self.stage_inputs().await?;
        let dataset_group = self.create_dataset_group().await?;
        let datasets = self.create_datasets().await?;
        self.attach_datasets(&dataset_group, &datasets).await?;
        self.import_datasets(&datasets, &staged).await?;
        let predictor = self.train_predictor(&dataset_group).await?;
        let metrics = self.predictor_metrics(&predictor).await?;
        let forecast = self.create_forecast(&predictor).await?;
        let cold_start = self.query_cold_start(&forecast, &staged.cold_items).await?;
        self.export_forecast(&forecast).await?;
        let (export, _) = self.fetch_export().await?;

        Ok(WorkflowReport {
            staged,
            dataset_group,
            datasets,
            predictor,
            metrics,
            forecast,
            cold_start,
            export,
            teardown: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldcast_client::{LocalObjectStore, SimulatedForecastService};
    use coldcast_core::{ColdStartSettings, LifecycleStatus, PollSettings};
    use std::path::Path;

    struct Harness {
        ctx: WorkflowContext,
        sim: Arc<SimulatedForecastService>,
        store: Arc<dyn ObjectStore>,
        dir: tempfile::TempDir,
    }

    fn write_inputs(dir: &Path) {
        let mut series = String::from("timestamp,target_value,item_id\n");
        for day in 1..=5 {
            series.push_str(&format!("2021-03-0{},{},shoe_a\n", day, 10 * day));
            series.push_str(&format!("2021-03-0{},{},hat_a\n", day, day));
            series.push_str(&format!("2021-03-0{},{},shoe_new\n", day, 7));
        }
        std::fs::write(dir.join("tts.csv"), series).unwrap();
        std::fs::write(
            dir.join("meta.csv"),
            "item_id,category\nshoe_a,shoes\nhat_a,hats\nshoe_new,shoes\n",
        )
        .unwrap();
    }

    fn harness_with(configure: impl FnOnce(&mut ColdcastConfig, &SimulatedForecastService)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());

        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path().join("s3")));
        let sim = Arc::new(SimulatedForecastService::new(store.clone()).with_polls_to_settle(3));
        let mut config = ColdcastConfig {
            bucket: "bucket".into(),
            role_arn: "arn:aws:iam::1:role/ForecastRole".into(),
            forecast_horizon: 4,
            target_series_file: dir.path().join("tts.csv"),
            item_metadata_file: dir.path().join("meta.csv"),
            data_dir: dir.path().join("work"),
            cold_start: ColdStartSettings {
                items: vec!["shoe_new".into()],
                count: 1,
            },
            ..Default::default()
        };
        configure(&mut config, &sim);

        let ledger = ResourceLedger::persistent(config.ledger_path());
        let ctx = WorkflowContext::new(sim.clone(), store.clone(), config, ledger);
        Harness {
            ctx,
            sim,
            store,
            dir,
        }
    }

    fn harness() -> Harness {
        harness_with(|_, _| {})
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_with_teardown() {
        let mut h = harness();
        let report = h.ctx.run(false).await.unwrap();

        assert_eq!(report.staged.cold_items, vec!["shoe_new"]);
        assert_eq!(report.staged.held_out_records, 5);
        assert_eq!(report.staged.training.items, 2);
        assert!(report.metrics.summary().is_some());

        // The cold item has no history, so it borrows the shoes category level.
        let cold = &report.cold_start[0];
        assert_eq!(cold.item_id, "shoe_new");
        assert_eq!(cold.prediction.horizon(), 4);
        assert_eq!(cold.prediction.predictions["p50"][0].value, 30.0);

        assert_eq!(report.export.items, 3);
        assert_eq!(report.export.rows, 12);
        assert_eq!(report.export.forecast_types, vec!["p10", "p50", "p90"]);
        assert!(h.dir.path().join("work/export/coldstart_export_part0.csv").exists());

        let teardown = report.teardown.unwrap();
        assert!(teardown.is_clean());
        // group, 2 datasets, 2 imports, predictor, forecast, export job
        assert_eq!(teardown.deleted.len(), 8);
        assert!(h.ctx.ledger().is_empty());
        assert!(h.sim.live_resources().is_empty());
        assert!(ResourceLedger::load(h.ctx.config().ledger_path())
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_deletes_in_reverse_creation_order() {
        let mut h = harness();
        h.ctx.run(true).await.unwrap();
        assert_eq!(h.ctx.ledger().len(), 8);

        let created: Vec<ResourceArn> =
            h.ctx.ledger().resources().iter().map(|r| r.arn.clone()).collect();
        let report = h.ctx.teardown().await.unwrap();
        assert!(report.is_clean());

        let deletes: Vec<String> = h
            .sim
            .operations()
            .into_iter()
            .filter(|op| op.starts_with("Delete"))
            .collect();
        let expected: Vec<String> = created
            .iter()
            .rev()
            .zip(report.deleted.iter())
            .map(|(arn, r)| format!("{} {}", r.kind.delete_operation(), arn))
            .collect();
        assert_eq!(deletes, expected);
        assert_eq!(deletes[0].split(' ').next(), Some("DeleteForecastExportJob"));
        assert_eq!(deletes[7].split(' ').next(), Some("DeleteDatasetGroup"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_step_keeps_ledger_for_teardown() {
        let mut h = harness_with(|_, sim| {
            sim.fail_creation(ResourceKind::Predictor, "insufficient data");
        });

        let err = h.ctx.run(false).await.unwrap_err();
        match &err {
            Error::ResourceFailed {
                kind,
                status,
                message,
                ..
            } => {
                assert_eq!(*kind, ResourceKind::Predictor);
                assert_eq!(*status, LifecycleStatus::CreateFailed);
                assert_eq!(message.as_deref(), Some("insufficient data"));
            }
            other => panic!("unexpected error: {}", other),
        }

        // The failed predictor is recorded too.
        assert_eq!(h.ctx.ledger().len(), 6);
        assert_eq!(
            h.ctx.ledger().latest(ResourceKind::Predictor).map(|r| r.name.as_str()),
            Some("coldstart_predictor")
        );

        // A later process picks up the persisted ledger.
        let ledger = ResourceLedger::load(h.ctx.config().ledger_path()).unwrap();
        assert_eq!(ledger.len(), 6);
        let mut later = WorkflowContext::new(
            h.sim.clone(),
            h.store.clone(),
            h.ctx.config().clone(),
            ledger,
        );
        let report = later.teardown().await.unwrap();
        assert!(report.is_clean());
        assert!(h.sim.live_resources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_aborts_run() {
        let mut h = harness_with(|config, _| {
            config.poll = PollSettings {
                interval_secs: 10,
                max_wait_secs: Some(15),
            };
        });
        // Updates now need 10 describes; the budget allows polls at 0s, 10s and 15s.
        let sim = Arc::new(SimulatedForecastService::new(h.store.clone()).with_polls_to_settle(10));
        h.ctx = WorkflowContext::new(
            sim.clone(),
            h.store.clone(),
            h.ctx.config().clone(),
            ResourceLedger::new(),
        );

        let err = h.ctx.run(true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::WaitTimeout {
                kind: ResourceKind::DatasetGroup,
                waited_secs: 15,
                ..
            }
        ));
        // Group and both datasets were recorded before the wait gave up.
        assert_eq!(h.ctx.ledger().len(), 3);
        assert_eq!(sim.live_resources().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_after_wait_timeout() {
        let h = harness();
        let sim = Arc::new(SimulatedForecastService::new(h.store.clone()).with_polls_to_settle(10));
        let mut config = h.ctx.config().clone();
        config.poll = PollSettings {
            interval_secs: 10,
            max_wait_secs: Some(15),
        };
        let mut ctx = WorkflowContext::new(
            sim.clone(),
            h.store.clone(),
            config.clone(),
            ResourceLedger::persistent(config.ledger_path()),
        );
        let err = ctx.run(false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::WaitTimeout {
                kind: ResourceKind::DatasetGroup,
                ..
            }
        ));

        // The group is still mid-update; teardown waits it out before deleting.
        config.poll.max_wait_secs = None;
        let ledger = ResourceLedger::load(config.ledger_path()).unwrap();
        assert_eq!(ledger.len(), 3);
        let mut later = WorkflowContext::new(sim.clone(), h.store.clone(), config, ledger);
        let report = later.teardown().await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(report.deleted[2].kind, ResourceKind::DatasetGroup);
        assert!(later.ledger().is_empty());
        assert!(sim.live_resources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_resumes_interrupted_deletes() {
        let mut h = harness();
        h.ctx.run(true).await.unwrap();

        // No wait budget: every delete is issued but none is seen to finish.
        let mut config = h.ctx.config().clone();
        config.poll.max_wait_secs = Some(0);
        let ledger = ResourceLedger::load(config.ledger_path()).unwrap();
        let mut hasty = WorkflowContext::new(h.sim.clone(), h.store.clone(), config, ledger);
        let first = hasty.teardown().await.unwrap();
        assert!(!first.is_clean());
        assert!(first.deleted.is_empty());
        assert_eq!(first.failed[0].resource.kind, ResourceKind::ForecastExportJob);
        assert!(first.failed[0].error.contains("Timed out"));

        let second = h.ctx.teardown().await.unwrap();
        assert!(second.is_clean());
        assert_eq!(second.deleted.len(), 8);
        assert!(h.sim.live_resources().is_empty());

        // Deletes already in flight are waited on, not reissued.
        let export_deletes = h
            .sim
            .operations()
            .iter()
            .filter(|op| op.starts_with("DeleteForecastExportJob"))
            .count();
        assert_eq!(export_deletes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_continues_after_failure() {
        let mut h = harness();
        h.ctx.run(true).await.unwrap();
        h.sim.fail_deletion(ResourceKind::Predictor);

        let report = h.ctx.teardown().await.unwrap();
        assert!(!report.is_clean());

        let failed: Vec<ResourceKind> = report.failed.iter().map(|f| f.resource.kind).collect();
        // The predictor fails; the dataset group still depends on it.
        assert_eq!(failed, vec![ResourceKind::Predictor, ResourceKind::DatasetGroup]);
        assert!(report.failed[0].error.contains("DELETE_FAILED"));
        // Export job, forecast, both imports and both datasets went through.
        assert_eq!(report.deleted.len(), 6);
        assert_eq!(h.ctx.ledger().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_ledger_resources() {
        let mut h = harness();
        h.ctx.run(true).await.unwrap();

        let states = h.ctx.status().await.unwrap();
        assert_eq!(states.len(), 8);
        assert!(states
            .iter()
            .all(|s| s.status == Some(LifecycleStatus::Active)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_unknown_item_fails() {
        let mut h = harness();
        let report = h.ctx.run(true).await.unwrap();
        let err = h
            .ctx
            .query_cold_start(&report.forecast, &["nope".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_export_without_parts() {
        let h = harness();
        let err = h.ctx.fetch_export().await.unwrap_err();
        assert!(err.is_not_found());
    }
}
