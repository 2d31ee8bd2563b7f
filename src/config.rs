use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Region reported for new buckets and in event messages.
    pub region: String,
    /// How often the delivery worker polls for pending jobs.
    pub poll_interval: Duration,
    /// Per-request timeout of webhook deliveries.
    pub delivery_timeout: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Local S3 emulator with bucket event notifications")]
pub struct Args {
    /// Host to bind to (overrides S3LOCAL_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides S3LOCAL_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides S3LOCAL_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Default region (overrides S3LOCAL_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Delivery worker poll interval in milliseconds (overrides S3LOCAL_POLL_INTERVAL_MS)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Webhook request timeout in seconds (overrides S3LOCAL_DELIVERY_TIMEOUT_SECS)
    #[arg(long)]
    pub delivery_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            database_url: "sqlite://./data/s3local.db".into(),
            region: "us-east-1".into(),
            poll_interval: Duration::from_millis(1000),
            delivery_timeout: Duration::from_secs(10),
        }
    }
}

/// Read and parse an optional environment variable.
fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(args: Args) -> Result<Self> {
        let defaults = Self::default();

        let host = args
            .host
            .or(env_parsed("S3LOCAL_HOST")?)
            .unwrap_or(defaults.host);
        let port = args
            .port
            .or(env_parsed("S3LOCAL_PORT")?)
            .unwrap_or(defaults.port);
        let database_url = args
            .database_url
            .or(env_parsed("S3LOCAL_DATABASE_URL")?)
            .unwrap_or(defaults.database_url);
        let region = args
            .region
            .or(env_parsed("S3LOCAL_REGION")?)
            .unwrap_or(defaults.region);
        let poll_interval = args
            .poll_interval_ms
            .or(env_parsed("S3LOCAL_POLL_INTERVAL_MS")?)
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let delivery_timeout = args
            .delivery_timeout_secs
            .or(env_parsed("S3LOCAL_DELIVERY_TIMEOUT_SECS")?)
            .map(Duration::from_secs)
            .unwrap_or(defaults.delivery_timeout);

        if poll_interval.is_zero() {
            anyhow::bail!("poll interval must be greater than zero");
        }

        Ok(Self {
            host,
            port,
            database_url,
            region,
            poll_interval,
            delivery_timeout,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
