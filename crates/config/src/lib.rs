use anyhow::{Context, Result};
use config_rs::{Config as RawConfig, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level service configuration.
///
/// Values are layered in increasing priority: built-in defaults, an optional
/// TOML file, then `S3_*` and `SCANNER_*` environment variables. Credentials
/// left empty fall back to the standard `AWS_*` variables last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub s3: S3Config,
    pub scanner: ScannerConfig,
}

/// Connection settings for the S3-compatible store holding the blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Endpoint URL. Leave empty on AWS to use the regional default; set it
    /// for S3-compatible stores like Minio.
    pub endpoint: String,

    /// Bucket name
    pub bucket: String,

    /// Prefix inside the bucket under which tenants live; empty means the
    /// bucket root
    pub prefix: String,

    /// AWS region
    pub region: String,

    pub access_key_id: String,

    pub secret_access_key: String,

    /// Session token for temporary credentials
    pub session_token: Option<String>,

    /// Allow plain-HTTP endpoints (local Minio)
    pub allow_http: bool,

    /// Resolve credentials through the AWS credential chain instead of the
    /// static keys above
    pub use_env_credentials: bool,

    /// Maximum idle HTTP connections kept per host
    pub pool_max_idle_per_host: usize,

    /// Idle HTTP connection timeout, in seconds
    pub pool_idle_timeout_secs: u64,
}

/// Settings of the blocks scanner itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Wall-clock period between periodic scans, in seconds
    pub scan_interval_secs: u64,

    /// Maximum number of tenants scanned concurrently
    pub tenants_concurrency: usize,

    /// Maximum number of block metadata fetches in flight per tenant
    pub metas_concurrency: usize,

    /// Grace period, in seconds, before a deletion mark should be considered
    /// effective by consumers. The scanner reports every mark it sees;
    /// hiding is up to the query path.
    pub ignore_deletion_marks_delay_secs: u64,

    /// Root directory of the on-disk block metadata cache
    pub cache_dir: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket: "blocks".to_string(),
            prefix: String::new(),
            region: "us-east-1".to_string(),
            access_key_id: "blocks".to_string(),
            secret_access_key: "supersecret".to_string(),
            session_token: None,
            allow_http: true,
            use_env_credentials: false,
            pool_max_idle_per_host: 30,
            pool_idle_timeout_secs: 120,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            tenants_concurrency: 10,
            metas_concurrency: 10,
            ignore_deletion_marks_delay_secs: 3600,
            cache_dir: "./blocks-scanner-cache".to_string(),
        }
    }
}

impl Config {
    /// Load the layered configuration. `config_file` points at a TOML file;
    /// passing `None` uses defaults and environment variables only.
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let defaults = RawConfig::try_from(&Config::default())
            .context("failed to encode default configuration")?;

        let mut builder = RawConfig::builder().add_source(defaults);
        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder = builder
            .add_source(
                Environment::with_prefix("S3")
                    .separator("_")
                    .try_parsing(true),
            )
            .add_source(
                Environment::with_prefix("SCANNER")
                    .separator("_")
                    .try_parsing(true),
            );

        let mut config: Config = builder
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("configuration has invalid values")?;

        config.s3.fill_credentials_from_env();
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.s3.validate()?;
        self.scanner.validate()?;
        Ok(())
    }
}

impl S3Config {
    /// Human-readable location of the bucket, for logs.
    pub fn base_url(&self) -> String {
        if self.prefix.is_empty() {
            format!("{}/{}", self.endpoint, self.bucket)
        } else {
            format!("{}/{}/{}", self.endpoint, self.bucket, self.prefix)
        }
    }

    /// Take any credentials the config left blank from the standard `AWS_*`
    /// variables.
    fn fill_credentials_from_env(&mut self) {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if self.access_key_id.is_empty() {
            if let Some(key) = env("AWS_ACCESS_KEY_ID") {
                self.access_key_id = key;
            }
        }
        if self.secret_access_key.is_empty() {
            if let Some(secret) = env("AWS_SECRET_ACCESS_KEY") {
                self.secret_access_key = secret;
            }
        }
        if self.session_token.is_none() {
            self.session_token = env("AWS_SESSION_TOKEN");
        }
    }

    /// Validate the S3 configuration
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.bucket.is_empty(), "s3.bucket must be set");

        // Static credentials need every piece present; the env credential
        // chain resolves them on its own.
        if !self.use_env_credentials {
            for (value, name) in [
                (&self.endpoint, "s3.endpoint"),
                (&self.access_key_id, "s3.access_key_id"),
                (&self.secret_access_key, "s3.secret_access_key"),
            ] {
                anyhow::ensure!(
                    !value.is_empty(),
                    "{} must be set when static credentials are used",
                    name
                );
            }
        }

        Ok(())
    }
}

impl ScannerConfig {
    /// Period between periodic scans
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Grace period before a deletion mark becomes effective for consumers
    pub fn ignore_deletion_marks_delay(&self) -> Duration {
        Duration::from_secs(self.ignore_deletion_marks_delay_secs)
    }

    /// Validate the scanner configuration
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.scan_interval_secs > 0,
            "scanner.scan_interval_secs must be at least 1"
        );
        anyhow::ensure!(
            self.tenants_concurrency > 0,
            "scanner.tenants_concurrency must be at least 1"
        );
        anyhow::ensure!(
            self.metas_concurrency > 0,
            "scanner.metas_concurrency must be at least 1"
        );
        anyhow::ensure!(!self.cache_dir.is_empty(), "scanner.cache_dir must be set");
        Ok(())
    }
}
