use crate::config::{AwsConfig, DynamoDbConfig};
use crate::keys::ShotKey;
use crate::model::{GeoMetadata, ShootingDate, StoredShot};
use crate::shot_path;
use crate::validator::parse_decimal;
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::query::builders::QueryFluentBuilder;
use aws_sdk_dynamodb::operation::scan::builders::ScanFluentBuilder;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_types::SdkConfig;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

pub type Item = HashMap<String, AttributeValue>;

/// Errors raised by a shot repository
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("DynamoDB {operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("Corrupt shot item: {0}")]
    Corrupt(String),
}

impl StoreError {
    fn backend<E: std::error::Error>(operation: &'static str) -> impl FnOnce(E) -> StoreError {
        move |err| StoreError::Backend {
            operation,
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

/// Key-value table of stored shots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShotRepository: Send + Sync {
    /// Write a shot, replacing any shot with the same key
    async fn put(&self, shot: &StoredShot) -> Result<(), StoreError>;

    async fn get(&self, key: &ShotKey) -> Result<Option<StoredShot>, StoreError>;

    /// Shots of one partition whose sort key starts with `sk_prefix`
    async fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<StoredShot>, StoreError>;

    /// Shots of every partition starting with `pk_prefix`
    async fn scan(&self, pk_prefix: &str) -> Result<Vec<StoredShot>, StoreError>;
}

/// DynamoDB-backed shot table
pub struct DynamoShotStore {
    client: DynamoClient,
    table_name: String,
    partition_key: String,
    sort_key: String,
}

impl DynamoShotStore {
    /// Create a store on top of a loaded AWS configuration
    pub fn new(sdk_config: &SdkConfig, aws: &AwsConfig, config: &DynamoDbConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        // Configure custom endpoint for DynamoDB Local/LocalStack
        if let Some(ref endpoint_url) = aws.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        info!(
            table = %config.table_name,
            region = %aws.region,
            "DynamoDB shot store initialized"
        );

        Self::from_client(DynamoClient::from_conf(builder.build()), config)
    }

    pub fn from_client(client: DynamoClient, config: &DynamoDbConfig) -> Self {
        Self {
            client,
            table_name: config.table_name.clone(),
            partition_key: config.partition_key.clone(),
            sort_key: config.sort_key.clone(),
        }
    }

    /// Create the table (string hash and range keys, on-demand billing) if missing
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        match self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
        {
            Ok(_) => {
                debug!(table = %self.table_name, "Shot table already exists");
                return Ok(());
            }
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if !missing {
                    return Err(StoreError::backend("describe_table")(e));
                }
            }
        }

        let mut request = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .billing_mode(BillingMode::PayPerRequest);

        for (attribute, key_type) in [
            (&self.partition_key, KeyType::Hash),
            (&self.sort_key, KeyType::Range),
        ] {
            request = request
                .attribute_definitions(
                    AttributeDefinition::builder()
                        .attribute_name(attribute)
                        .attribute_type(ScalarAttributeType::S)
                        .build()
                        .map_err(StoreError::backend("create_table"))?,
                )
                .key_schema(
                    KeySchemaElement::builder()
                        .attribute_name(attribute)
                        .key_type(key_type)
                        .build()
                        .map_err(StoreError::backend("create_table"))?,
                );
        }

        request
            .send()
            .await
            .map_err(StoreError::backend("create_table"))?;

        info!(table = %self.table_name, "Shot table created");
        Ok(())
    }

    /// Key condition on the partition, narrowed to a sort key prefix when one is given
    fn query_request(&self, pk: &str, sk_prefix: &str) -> QueryFluentBuilder {
        let request = self
            .client
            .query()
            .table_name(&self.table_name)
            .expression_attribute_names("#pk", &self.partition_key)
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()));

        // DynamoDB rejects an empty string as a key condition value
        if sk_prefix.is_empty() {
            return request.key_condition_expression("#pk = :pk");
        }

        request
            .key_condition_expression("#pk = :pk AND begins_with(#sk, :sk)")
            .expression_attribute_names("#sk", &self.sort_key)
            .expression_attribute_values(":sk", AttributeValue::S(sk_prefix.to_string()))
    }

    fn scan_request(&self, pk_prefix: &str) -> ScanFluentBuilder {
        self.client
            .scan()
            .table_name(&self.table_name)
            .filter_expression("begins_with(#pk, :pk)")
            .expression_attribute_names("#pk", &self.partition_key)
            .expression_attribute_values(":pk", AttributeValue::S(pk_prefix.to_string()))
    }

    fn decode_all(&self, items: Vec<Item>) -> Result<Vec<StoredShot>, StoreError> {
        items.iter().map(from_item).collect()
    }
}

#[async_trait]
impl ShotRepository for DynamoShotStore {
    #[instrument(skip(self, shot), fields(path = %shot.path()))]
    async fn put(&self, shot: &StoredShot) -> Result<(), StoreError> {
        let item = to_item(shot, &self.partition_key, &self.sort_key);

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(StoreError::backend("put_item"))?;

        debug!("Shot written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &ShotKey) -> Result<Option<StoredShot>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(&self.partition_key, AttributeValue::S(key.pk.clone()))
            .key(&self.sort_key, AttributeValue::S(key.sk.clone()))
            .send()
            .await
            .map_err(StoreError::backend("get_item"))?;

        output.item.as_ref().map(from_item).transpose()
    }

    #[instrument(skip(self))]
    async fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<StoredShot>, StoreError> {
        let mut items = Vec::new();
        let mut start_key = None;

        loop {
            let output = self
                .query_request(pk, sk_prefix)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(StoreError::backend("query"))?;

            items.extend(output.items.unwrap_or_default());
            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        debug!(count = items.len(), "Queried shots");
        self.decode_all(items)
    }

    #[instrument(skip(self))]
    async fn scan(&self, pk_prefix: &str) -> Result<Vec<StoredShot>, StoreError> {
        let mut items = Vec::new();
        let mut start_key = None;

        loop {
            let output = self
                .scan_request(pk_prefix)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(StoreError::backend("scan"))?;

            items.extend(output.items.unwrap_or_default());
            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        debug!(count = items.len(), "Scanned shots");
        self.decode_all(items)
    }
}

/// Process-local shot table, ordered like a DynamoDB partition
#[derive(Default)]
pub struct MemoryShotStore {
    shots: RwLock<BTreeMap<(String, String), StoredShot>>,
}

impl MemoryShotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.shots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shots.read().await.is_empty()
    }
}

#[async_trait]
impl ShotRepository for MemoryShotStore {
    async fn put(&self, shot: &StoredShot) -> Result<(), StoreError> {
        let key = shot.key();
        self.shots
            .write()
            .await
            .insert((key.pk, key.sk), shot.clone());
        Ok(())
    }

    async fn get(&self, key: &ShotKey) -> Result<Option<StoredShot>, StoreError> {
        let shots = self.shots.read().await;
        Ok(shots.get(&(key.pk.clone(), key.sk.clone())).cloned())
    }

    async fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<StoredShot>, StoreError> {
        let shots = self.shots.read().await;
        Ok(shots
            .iter()
            .filter(|((p, s), _)| p == pk && s.starts_with(sk_prefix))
            .map(|(_, shot)| shot.clone())
            .collect())
    }

    async fn scan(&self, pk_prefix: &str) -> Result<Vec<StoredShot>, StoreError> {
        let shots = self.shots.read().await;
        Ok(shots
            .iter()
            .filter(|((p, _), _)| p.starts_with(pk_prefix))
            .map(|(_, shot)| shot.clone())
            .collect())
    }
}

/// Encode a shot as a DynamoDB item. Absent optional values are omitted.
pub fn to_item(shot: &StoredShot, partition_key: &str, sort_key: &str) -> Item {
    let key = shot.key();
    let identity = shot.identity();
    let metadata = shot.metadata();

    let mut item = Item::new();
    item.insert(partition_key.to_string(), AttributeValue::S(key.pk));
    item.insert(sort_key.to_string(), AttributeValue::S(key.sk));
    item.insert(
        "camera_id".to_string(),
        AttributeValue::S(identity.camera_id().to_string()),
    );
    item.insert(
        "sequence".to_string(),
        AttributeValue::S(identity.sequence().to_string()),
    );
    item.insert(
        "side".to_string(),
        AttributeValue::S(identity.side().as_str().to_string()),
    );
    item.insert(
        "photo_name".to_string(),
        AttributeValue::S(identity.photo_name().to_string()),
    );
    if let Some(index) = identity.photo_index() {
        item.insert("photo_index".to_string(), AttributeValue::N(index.to_string()));
    }
    item.insert(
        "resolution".to_string(),
        AttributeValue::S(shot.resolution().to_string()),
    );
    item.insert(
        "file_size".to_string(),
        AttributeValue::N(shot.file_size().to_string()),
    );
    item.insert(
        "shooting_date".to_string(),
        AttributeValue::S(shot.shooting_date().to_string()),
    );

    let decimals = [
        ("gps_latitude", metadata.gps_latitude),
        ("gps_longitude", metadata.gps_longitude),
        ("gps_altitude", metadata.gps_altitude),
    ];
    for (name, value) in decimals {
        if let Some(value) = value {
            item.insert(name.to_string(), AttributeValue::N(value.to_string()));
        }
    }
    let texts = [
        ("camera_model_name", &metadata.camera_model_name),
        ("make", &metadata.make),
    ];
    for (name, value) in texts {
        if let Some(value) = value {
            item.insert(name.to_string(), AttributeValue::S(value.clone()));
        }
    }

    item
}

/// Decode a DynamoDB item, re-validating the identity it carries
pub fn from_item(item: &Item) -> Result<StoredShot, StoreError> {
    let path = format!(
        "{}/{}/{}/{}",
        required_s(item, "camera_id")?,
        required_s(item, "sequence")?,
        required_s(item, "side")?,
        required_s(item, "photo_name")?,
    );
    let identity =
        shot_path::parse(&path).map_err(|e| StoreError::Corrupt(format!("{path}: {e}")))?;

    let resolution = required_s(item, "resolution")?.to_string();
    let file_size = required_n(item, "file_size")?
        .parse::<u64>()
        .map_err(|_| StoreError::Corrupt(format!("{path}: file_size is not an unsigned integer")))?;
    let shooting_date = ShootingDate::parse(required_s(item, "shooting_date")?)
        .ok_or_else(|| StoreError::Corrupt(format!("{path}: invalid shooting_date")))?;

    let metadata = GeoMetadata {
        gps_latitude: optional_decimal(item, "gps_latitude")?,
        gps_longitude: optional_decimal(item, "gps_longitude")?,
        gps_altitude: optional_decimal(item, "gps_altitude")?,
        camera_model_name: optional_s(item, "camera_model_name")?,
        make: optional_s(item, "make")?,
    };

    Ok(StoredShot::new(
        identity,
        resolution,
        file_size,
        shooting_date,
        metadata,
    ))
}

fn required_s<'a>(item: &'a Item, name: &str) -> Result<&'a str, StoreError> {
    item.get(name)
        .ok_or_else(|| StoreError::Corrupt(format!("missing attribute {name}")))?
        .as_s()
        .map(String::as_str)
        .map_err(|_| StoreError::Corrupt(format!("attribute {name} is not a string")))
}

fn required_n<'a>(item: &'a Item, name: &str) -> Result<&'a str, StoreError> {
    item.get(name)
        .ok_or_else(|| StoreError::Corrupt(format!("missing attribute {name}")))?
        .as_n()
        .map(String::as_str)
        .map_err(|_| StoreError::Corrupt(format!("attribute {name} is not a number")))
}

fn optional_s(item: &Item, name: &str) -> Result<Option<String>, StoreError> {
    item.get(name)
        .map(|value| {
            value
                .as_s()
                .cloned()
                .map_err(|_| StoreError::Corrupt(format!("attribute {name} is not a string")))
        })
        .transpose()
}

fn optional_decimal(item: &Item, name: &str) -> Result<Option<Decimal>, StoreError> {
    item.get(name)
        .map(|value| {
            value
                .as_n()
                .ok()
                .and_then(|n| parse_decimal(n))
                .ok_or_else(|| StoreError::Corrupt(format!("attribute {name} is not a decimal")))
        })
        .transpose()
}
