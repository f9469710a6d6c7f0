use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use color_eyre::eyre::{Context, Result};

use crate::{
    aggregator::{Aggregator, GoCardlessClient},
    config::{Config, StorageBackend},
    ingest::IngestionPipeline,
    mapper::DefaultMapper,
    notifier::{CommandHook, WebhookNotifier},
    payee::{PayeeSanitizer, PayeeStrip},
    requisition::RequisitionManager,
    storage::RequisitionStore,
};

/// Components shared by a run, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
}

/// Build the application state from the configuration
pub async fn setup(config: &Config) -> Result<AppState> {
    config.validate().wrap_err("Invalid configuration")?;

    let aggregator: Arc<dyn Aggregator> = Arc::new(
        GoCardlessClient::new(
            config.aggregator.base_url.clone(),
            config.aggregator.secret_id.clone(),
            config.aggregator.secret_key.clone(),
            config.aggregator.timeout(),
        )
        .wrap_err("Failed to create aggregator client")?,
    );

    let store = requisition_store(config).await;
    let requisitions = Arc::new(build_manager(config, aggregator.clone(), store)?);

    let strip = PayeeStrip::new(&config.payee.strip).wrap_err("Invalid payee strip pattern")?;
    let mapper = DefaultMapper::new(PayeeSanitizer::new(config.payee.masked_card));
    let pipeline = IngestionPipeline::new(aggregator, requisitions, Arc::new(mapper))
        .with_strip(strip)
        .with_debug(config.debug);

    Ok(AppState {
        pipeline: Arc::new(pipeline),
    })
}

async fn requisition_store(config: &Config) -> RequisitionStore {
    let requisition = &config.requisition;
    match requisition.storage {
        StorageBackend::File => {
            tracing::info!("Using requisition file in {}", config.data_dir.display());
            RequisitionStore::filesystem(
                &config.data_dir,
                requisition.file.as_deref(),
                &requisition.institution_id,
            )
        }
        StorageBackend::S3 => {
            let bucket = requisition.bucket.as_deref().unwrap_or_default();
            tracing::info!("Using requisition object in S3 bucket {bucket}");
            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.aws.region.clone()))
                .load()
                .await;
            RequisitionStore::s3(&sdk_config, bucket, &requisition.institution_id)
        }
    }
}

fn build_manager(
    config: &Config,
    aggregator: Arc<dyn Aggregator>,
    store: RequisitionStore,
) -> Result<RequisitionManager> {
    let requisition = &config.requisition;
    let manager = RequisitionManager::new(aggregator, store, &requisition.institution_id)
        .with_poll_policy(requisition.poll_policy());

    let manager = match (&requisition.hook, &requisition.webhook) {
        (Some(hook), _) if !hook.as_os_str().is_empty() => {
            manager.with_notifier(CommandHook::new(hook))
        }
        (_, Some(url)) if !url.is_empty() => manager.with_notifier(
            WebhookNotifier::new(url, config.aggregator.timeout())
                .wrap_err("Failed to create webhook notifier")?,
        ),
        _ => manager,
    };
    Ok(manager)
}
