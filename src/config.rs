use std::{path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment};
use secrecy::SecretString;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_vec_from_string_or_vec;

use crate::{aggregator::DEFAULT_BASE_URL, requisition::PollPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub aggregator: AggregatorConfig,
    pub requisition: RequisitionConfig,
    pub payee: PayeeConfig,
    pub aws: AwsConfig,
    pub data_dir: PathBuf,
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub secret_id: SecretString,
    pub secret_key: SecretString,
    pub timeout_secs: u64,
}

/// Where the requisition is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequisitionConfig {
    pub institution_id: String,
    pub file: Option<String>,
    pub storage: StorageBackend,
    pub bucket: Option<String>,
    pub hook: Option<PathBuf>,
    pub webhook: Option<String>,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: Option<u32>,
    pub poll_deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayeeConfig {
    #[serde(deserialize_with = "deserialize_vec_from_string_or_vec")]
    #[serde(default)]
    pub strip: Vec<String>,
    pub masked_card: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
}

impl AggregatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RequisitionConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.poll_max_attempts,
            deadline: self.poll_deadline_secs.map(Duration::from_secs),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        // Build the config
        let config = ConfigLib::builder()
            // Set default values
            .set_default("aggregator.base_url", DEFAULT_BASE_URL)?
            .set_default("aggregator.secret_id", "")?
            .set_default("aggregator.secret_key", "")?
            .set_default("aggregator.timeout_secs", 30)?
            .set_default("requisition.institution_id", "")?
            .set_default("requisition.storage", "file")?
            .set_default("requisition.poll_interval_secs", 2)?
            .set_default("payee.masked_card", true)?
            .set_default("aws.region", "us-east-1")?
            .set_default("data_dir", ".")?
            .set_default("debug", false)?
            // Override config values via environment variables
            // The environment variables should be prefixed with 'APP_' and use '__' as a separator
            // Example: APP_REQUISITION__INSTITUTION_ID=SANDBOXFINANCE_SFIN0000
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Check the settings that have no usable default
    pub fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        if self.aggregator.secret_id.expose_secret().is_empty()
            || self.aggregator.secret_key.expose_secret().is_empty()
        {
            return Err(ConfigError::Message(
                "aggregator.secret_id and aggregator.secret_key must be set".into(),
            ));
        }
        if self.requisition.institution_id.is_empty() {
            return Err(ConfigError::Message(
                "requisition.institution_id must be set".into(),
            ));
        }
        if self.requisition.storage == StorageBackend::S3
            && self.requisition.bucket.as_deref().unwrap_or_default().is_empty()
        {
            return Err(ConfigError::Message(
                "requisition.bucket must be set when using s3 storage".into(),
            ));
        }
        Ok(())
    }
}
