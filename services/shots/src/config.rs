use serde::Deserialize;

/// Main configuration for the shot service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// AWS account and endpoint configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// Shot table configuration
    pub dynamodb: DynamoDbConfig,
    /// Downstream stitcher configuration
    #[serde(default)]
    pub stitcher: StitcherConfig,
    /// HTTP configuration for the local server runtime
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port, only bound by the local server runtime
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// AWS configuration shared by the DynamoDB and Lambda clients
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Account owning the stitcher function
    pub account_id: Option<String>,
    /// Custom endpoint URL (DynamoDB Local, LocalStack, etc.)
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Dynamodb,
    /// Process-local table, for local runs only
    Memory,
}

/// Shot table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DynamoDbConfig {
    /// Table holding one item per shot
    pub table_name: String,
    /// Partition key attribute name
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    /// Sort key attribute name
    #[serde(default = "default_sort_key")]
    pub sort_key: String,
    /// Create the table on startup when it does not exist
    #[serde(default)]
    pub create_table: bool,
    /// Storage backend
    #[serde(default)]
    pub backend: StoreBackend,
}

/// Downstream stitcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StitcherConfig {
    /// Name of the stitcher Lambda function; notifications are disabled when unset
    pub function_name: Option<String>,
    /// Master switch for stitch notifications
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// API configuration for the local server runtime
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Prefix every route is mounted under, e.g. an API Gateway stage (`/prod`)
    pub base_path: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "shot-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

fn default_partition_key() -> String {
    "PK".to_string()
}

fn default_sort_key() -> String {
    "SK".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

/// Deployment variables of the Lambda, applied last: (variable, config key)
const LAMBDA_ENV_OVERRIDES: [(&str, &str); 4] = [
    ("DDB_TABLE_NAME", "dynamodb.table_name"),
    ("AWS_REGION", "aws.region"),
    ("AWS_ACCOUNT_ID", "aws.account_id"),
    ("LAMBDA_STITCHER", "stitcher.function_name"),
];

impl Config {
    /// Load configuration from config files and environment
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .set_default("service.name", "shot-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/shots").required(false))
            .add_source(config::File::with_name("/etc/tikee/shots").required(false))
            // Override with environment variables
            // SHOTS__DYNAMODB__TABLE_NAME -> dynamodb.table_name
            .add_source(
                config::Environment::with_prefix("SHOTS")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LAMBDA_ENV_OVERRIDES {
            builder = builder.set_override_option(key, std::env::var(var).ok())?;
        }

        builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Function reference of the stitcher, if notifications are configured
    ///
    /// A full ARN when the account is known, the bare function name otherwise.
    pub fn stitcher_function(&self) -> Option<String> {
        if !self.stitcher.enabled {
            return None;
        }
        let name = self.stitcher.function_name.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        Some(match self.aws.account_id.as_deref() {
            Some(account) if !account.is_empty() => {
                format!("arn:aws:lambda:{}:{}:function:{}", self.aws.region, account, name)
            }
            _ => name.to_string(),
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            account_id: None,
            endpoint_url: None,
        }
    }
}

impl Default for StitcherConfig {
    fn default() -> Self {
        Self {
            function_name: None,
            enabled: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            base_path: None,
        }
    }
}

impl ApiConfig {
    /// Normalized mount prefix: leading slash, no trailing slash, `None` for the root
    pub fn mount_path(&self) -> Option<String> {
        let path = self.base_path.as_deref()?.trim().trim_matches('/');
        if path.is_empty() {
            None
        } else {
            Some(format!("/{path}"))
        }
    }
}

impl DynamoDbConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key: default_partition_key(),
            sort_key: default_sort_key(),
            create_table: false,
            backend: StoreBackend::default(),
        }
    }
}
