//! kafka_topic - topics of a Kafka service
//!
//! `termination_protection` is never sent to Aiven; it is kept in state and
//! checked before a topic is destroyed.

use std::collections::HashMap;

use aivenctl_core::resource::Value;
use aivenctl_core::schema::{AttributeSchema, AttributeType, DiffSuppress, ResourceSchema, types};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::service::service_path;
use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, Result, is_already_exists, is_not_found};
use crate::schemautil::{
    build_resource_id, get_block, get_int, get_str, get_tags, require_str, resource_data_set,
    split3,
};

pub const TYPE_NAME: &str = "kafka_topic";

const ACTIVE: &str = "ACTIVE";
const CONFIGURING: &str = "CONFIGURING";

/// Topic config entries, all optional
fn config_fields() -> Vec<AttributeSchema> {
    let choice = |name: &str, values: &[&str], desc: &str| {
        AttributeSchema::new(
            name,
            AttributeType::Enum(values.iter().map(|v| v.to_string()).collect()),
        )
        .with_description(desc)
    };
    let int = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::Int).with_description(desc);
    let flag = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::Bool).with_description(desc);

    vec![
        choice(
            "cleanup_policy",
            &["compact", "compact,delete", "delete"],
            "The retention policy to use on old segments.",
        ),
        choice(
            "compression_type",
            &["gzip", "lz4", "producer", "snappy", "uncompressed", "zstd"],
            "Specify the final compression type for a given topic.",
        ),
        int(
            "delete_retention_ms",
            "The amount of time to retain delete tombstone markers for log compacted topics.",
        ),
        int("file_delete_delay_ms", "The time to wait before deleting a file from the filesystem."),
        int("flush_messages", "Interval of messages at which an fsync of written data is forced."),
        int("flush_ms", "Time interval at which an fsync of written data is forced."),
        int(
            "max_compaction_lag_ms",
            "The maximum time a message will remain ineligible for compaction in the log.",
        ),
        int(
            "max_message_bytes",
            "The largest record batch size allowed by Kafka (after compression if compression is enabled).",
        ),
        choice(
            "message_timestamp_type",
            &["CreateTime", "LogAppendTime"],
            "Define whether the timestamp in the message is message create time or log append time.",
        ),
        int(
            "min_compaction_lag_ms",
            "The minimum time a message will remain uncompacted in the log.",
        ),
        int(
            "min_insync_replicas",
            "The minimum number of replicas that must acknowledge a write with acks=all.",
        ),
        flag(
            "preallocate",
            "True if we should preallocate the file on disk when creating a new log segment.",
        ),
        int(
            "retention_bytes",
            "The maximum size a partition can grow to before old log segments are discarded.",
        ),
        int(
            "retention_ms",
            "The maximum time a log is retained before old log segments are discarded.",
        ),
        int("segment_bytes", "The segment file size for the log."),
        int(
            "segment_ms",
            "The period of time after which Kafka will force the log to roll even if the segment file isn't full.",
        ),
        flag(
            "unclean_leader_election_enable",
            "Whether replicas not in the ISR set may be elected as leader as a last resort.",
        ),
        flag("remote_storage_enable", "Indicates whether tiered storage should be enabled."),
        int(
            "local_retention_bytes",
            "The maximum bytes tiered storage will retain segment files locally.",
        ),
        int(
            "local_retention_ms",
            "The maximum time tiered storage will retain segment files locally.",
        ),
    ]
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Creates and manages an Aiven for Apache Kafka topic.")
        .attribute(
            AttributeSchema::new("project", AttributeType::String)
                .required()
                .force_new()
                .with_description("The name of the project this resource belongs to."),
        )
        .attribute(
            AttributeSchema::new("service_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("The name of the service that this resource belongs to."),
        )
        .attribute(
            AttributeSchema::new("topic_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("The name of the topic."),
        )
        .attribute(
            AttributeSchema::new("partitions", types::positive_int())
                .required()
                .with_description("The number of partitions to create in the topic."),
        )
        .attribute(
            AttributeSchema::new("replication", types::positive_int())
                .required()
                .with_description("The replication factor for the topic."),
        )
        .attribute(
            AttributeSchema::new("topic_description", AttributeType::String)
                .with_description("The description of the topic"),
        )
        .attribute(
            AttributeSchema::new("owner_user_group_id", AttributeType::String)
                .with_description("The ID of the user group that owns the topic."),
        )
        .attribute(
            AttributeSchema::new("termination_protection", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description(
                    "Prevents topics from being deleted by aivenctl. Topics can still be \
                     deleted in the Aiven Console.",
                ),
        )
        .attribute(AttributeSchema::new("tag", types::tag()).with_description("Tags for the topic."))
        .attribute(
            AttributeSchema::new(
                "config",
                AttributeType::List(Box::new(AttributeType::Struct(config_fields()))),
            )
            .diff_suppress(DiffSuppress::EmptyObject)
            .with_description("Advanced parameters to configure topics."),
        )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicTag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigEntry {
    #[serde(default)]
    pub value: JsonValue,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct KafkaTopic {
    pub topic_name: String,
    #[serde(default)]
    pub partitions: Vec<JsonValue>,
    #[serde(default)]
    pub replication: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub config: HashMap<String, ConfigEntry>,
    #[serde(default)]
    pub tags: Vec<TopicTag>,
    #[serde(default)]
    pub topic_description: Option<String>,
    #[serde(default)]
    pub owner_user_group_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TopicRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    topic_name: Option<&'a str>,
    partitions: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    replication: Option<i64>,
    config: JsonMap<String, JsonValue>,
    tags: Vec<TopicTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic_description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_user_group_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct TopicView<'a> {
    project: &'a str,
    service_name: &'a str,
    topic_name: &'a str,
    partitions: usize,
    replication: i64,
    config: JsonMap<String, JsonValue>,
    tag: &'a [TopicTag],
    topic_description: Option<&'a str>,
    owner_user_group_id: Option<&'a str>,
}

fn topic_path(project: &str, service: &str, topic: &str) -> String {
    format!("{}/topic/{}", service_path(project, service), escape(topic))
}

pub async fn get_topic(client: &AivenClient, project: &str, service: &str, topic: &str) -> Result<KafkaTopic> {
    let body = client.get(&topic_path(project, service, topic)).await?;
    Ok(serde_json::from_value(take_field(body, "topic")?)?)
}

/// Topic attributes as the resource and data source expose them
pub fn topic_attributes(project: &str, service: &str, topic: &KafkaTopic) -> Result<Attributes> {
    let config = topic
        .config
        .iter()
        .filter(|(_, entry)| !entry.value.is_null())
        .map(|(k, entry)| (k.clone(), entry.value.clone()))
        .collect();
    let view = TopicView {
        project,
        service_name: service,
        topic_name: &topic.topic_name,
        partitions: topic.partitions.len(),
        replication: topic.replication,
        config,
        tag: &topic.tags,
        topic_description: topic.topic_description.as_deref().filter(|d| !d.is_empty()),
        owner_user_group_id: topic.owner_user_group_id.as_deref().filter(|d| !d.is_empty()),
    };
    resource_data_set(
        &schema(),
        &build_resource_id(&[project, service, &topic.topic_name]),
        &view,
        &[],
    )
}

/// Configured `config` block; only keys that were set are sent
fn topic_config(attrs: &Attributes) -> Result<JsonMap<String, JsonValue>> {
    let config: JsonMap<String, JsonValue> = get_block(attrs, "config")
        .map(|block| {
            block
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .filter(|(_, v)| !v.is_null())
                .collect()
        })
        .unwrap_or_default();

    let retention = config.get("retention_bytes").and_then(JsonValue::as_i64);
    let local_retention = config.get("local_retention_bytes").and_then(JsonValue::as_i64);
    match (retention, local_retention) {
        (None, Some(_)) => Err(AivenError::Config(
            "local_retention_bytes can't be set without retention_bytes".to_string(),
        )),
        (Some(r), Some(l)) if r < l => Err(AivenError::Config(
            "local_retention_bytes must not be more than retention_bytes value".to_string(),
        )),
        _ => Ok(config),
    }
}

fn topic_tags(attrs: &Attributes) -> Result<Vec<TopicTag>> {
    Ok(get_tags(attrs, "tag")?
        .into_iter()
        .map(|(key, value)| TopicTag { key, value })
        .collect())
}

pub struct KafkaTopicHandler;

impl KafkaTopicHandler {
    async fn wait_until_active(
        &self,
        ctx: &HandlerContext<'_>,
        project: &str,
        service: &str,
        topic: &str,
    ) -> Result<()> {
        ctx.state_change(&[CONFIGURING], &[ACTIVE], ctx.timeouts.create)
            .wait(|| async move {
                match get_topic(ctx.client, project, service, topic).await {
                    Ok(t) => {
                        log::debug!("got {} state while waiting for topic {} to be up", t.state, topic);
                        Ok(Some(((), t.state)))
                    }
                    // The topic list lags behind creation
                    Err(e) if is_not_found(&e) => Ok(Some(((), CONFIGURING.to_string()))),
                    Err(e) => Err(e),
                }
            })
            .await
    }
}

#[async_trait]
impl ResourceHandler for KafkaTopicHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn local_attributes(&self) -> &'static [&'static str] {
        &["termination_protection"]
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let project = require_str(attrs, "project")?;
        let service = require_str(attrs, "service_name")?;
        let topic = require_str(attrs, "topic_name")?;
        ctx.cache.check(ctx.client, project, service).await?;

        let request = TopicRequest {
            topic_name: Some(topic),
            partitions: get_int(attrs, "partitions").unwrap_or(1),
            replication: get_int(attrs, "replication"),
            config: topic_config(attrs)?,
            tags: topic_tags(attrs)?,
            topic_description: get_str(attrs, "topic_description"),
            owner_user_group_id: get_str(attrs, "owner_user_group_id"),
        };
        match ctx
            .client
            .post(&format!("{}/topic", service_path(project, service)), &request)
            .await
        {
            Ok(_) => {}
            Err(e) if is_already_exists(&e) => {
                log::debug!("topic {} already exists, waiting for it", topic);
            }
            Err(e) => return Err(e),
        }

        self.wait_until_active(ctx, project, service, topic).await?;
        Ok(build_resource_id(&[project, service, topic]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, service, topic) = split3(id)?;
        ctx.cache.check(ctx.client, &project, &service).await?;
        let topic = get_topic(ctx.client, &project, &service, &topic).await?;
        topic_attributes(&project, &service, &topic)
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let (project, service, topic) = split3(id)?;
        let partitions = get_int(attrs, "partitions").unwrap_or(1);

        let current = get_topic(ctx.client, &project, &service, &topic).await?;
        if (partitions as usize) < current.partitions.len() {
            return Err(AivenError::Config(
                "number of partitions cannot be decreased".to_string(),
            ));
        }

        let request = TopicRequest {
            topic_name: None,
            partitions,
            replication: get_int(attrs, "replication"),
            config: topic_config(attrs)?,
            tags: topic_tags(attrs)?,
            topic_description: get_str(attrs, "topic_description"),
            owner_user_group_id: get_str(attrs, "owner_user_group_id"),
        };
        ctx.client
            .put(&topic_path(&project, &service, &topic), &request)
            .await?;
        Ok(id.to_string())
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, service, topic) = split3(id)?;
        match ctx.client.delete(&topic_path(&project, &service, &topic)).await {
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(AivenError::Other(format!(
                "error waiting for Aiven Kafka Topic to be DELETED: {}",
                e
            ))),
            Ok(()) => Ok(()),
        }
    }
}
