use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub store: StoreConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "FLEETING_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "FLEETING_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Maximum time a single HTTP request may take
    #[arg(long, env = "FLEETING_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// How long to wait for in-flight requests on shutdown
    #[arg(long, env = "FLEETING_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Amazon DynamoDB or a compatible endpoint
    Dynamodb,
    /// Process-local store; contents are lost on exit
    Memory,
}

#[derive(Clone, Debug, Args)]
pub struct StoreConfig {
    /// Which backing store holds messages
    #[arg(long = "store-backend", env = "FLEETING_STORE_BACKEND", value_enum, default_value_t = StoreBackend::Dynamodb)]
    pub backend: StoreBackend,

    /// Table holding messages
    #[arg(long = "store-table", env = "FLEETING_STORE_TABLE", default_value = "Chat")]
    pub table: String,

    /// Secondary index on (username, expiration_date)
    #[arg(long = "store-index", env = "FLEETING_STORE_INDEX", default_value = "UnexpiredRequests")]
    pub index: String,

    /// Store region
    #[arg(long = "store-region", env = "FLEETING_STORE_REGION", default_value = "us-west-2")]
    pub region: String,

    /// Custom store endpoint (useful for a local emulator such as http://localhost:8000)
    #[arg(long = "store-endpoint", env = "FLEETING_STORE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Store access key
    #[arg(long = "store-access-key", env = "FLEETING_STORE_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// Store secret key
    #[arg(long = "store-secret-key", env = "FLEETING_STORE_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Create the table and index at startup if missing
    #[arg(long = "store-create-table", env = "FLEETING_STORE_CREATE_TABLE", default_value_t = false)]
    pub create_table: bool,

    /// Maximum messages returned per query page (store default when unset)
    #[arg(long = "store-page-size", env = "FLEETING_STORE_PAGE_SIZE")]
    pub page_size: Option<u16>,

    /// Deadline for each individual store call
    #[arg(long = "store-call-timeout-ms", env = "FLEETING_STORE_CALL_TIMEOUT_MS", default_value_t = 3000)]
    pub call_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeliveryMode {
    /// Deliver every message seen live; concurrent readers may both receive it
    AtLeastOnce,
    /// Deliver only messages this reader managed to mark first
    Exclusive,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Time-to-live applied when a message is created without a timeout
    #[arg(long, env = "FLEETING_DEFAULT_TTL_SECS", default_value_t = 60)]
    pub default_ttl_secs: u64,

    /// Maximum in-flight consumption marks per query page
    #[arg(long, env = "FLEETING_CONSUME_CONCURRENCY", default_value_t = 16)]
    pub consume_concurrency: usize,

    /// Retries for a consumption mark that failed
    #[arg(long, env = "FLEETING_CONSUME_RETRIES", default_value_t = 2)]
    pub consume_retries: usize,

    /// Delivery guarantee for list-and-consume
    #[arg(long, env = "FLEETING_DELIVERY", value_enum, default_value_t = DeliveryMode::AtLeastOnce)]
    pub delivery: DeliveryMode,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { default_ttl_secs: 60, consume_concurrency: 16, consume_retries: 2, delivery: DeliveryMode::AtLeastOnce }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "FLEETING_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint for traces and metrics (disabled when unset)
    #[arg(long, env = "FLEETING_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
