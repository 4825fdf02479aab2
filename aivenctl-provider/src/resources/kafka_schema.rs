//! kafka_schema - schema registry subjects of a Kafka service

use aivenctl_core::resource::Value;
use aivenctl_core::schema::{AttributeSchema, AttributeType, DiffSuppress, ResourceSchema, types};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::service::service_path;
use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, ApiError, Result, is_critical, is_not_found};
use crate::schemautil::{build_resource_id, get_str, require_str, resource_data_set, split3};

pub const TYPE_NAME: &str = "kafka_schema";

const COMPATIBILITY_LEVELS: &[&str] = &[
    "BACKWARD",
    "BACKWARD_TRANSITIVE",
    "FORWARD",
    "FORWARD_TRANSITIVE",
    "FULL",
    "FULL_TRANSITIVE",
    "NONE",
];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description(
            "The Kafka Schema resource allows the creation and management of Aiven Kafka Schemas.",
        )
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
            AttributeSchema::new("subject_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("The Kafka Schema Subject name."),
        )
        .attribute(
            AttributeSchema::new("schema", types::json_string())
                .required()
                .diff_suppress(DiffSuppress::JsonEquivalent)
                .with_description(
                    "Kafka Schema configuration. Should be a valid Avro or JSON schema, \
                     depending on the schema type.",
                ),
        )
        .attribute(
            AttributeSchema::new(
                "schema_type",
                AttributeType::Enum(vec!["AVRO".to_string(), "JSON".to_string()]),
            )
            .force_new()
            .with_default(Value::String("AVRO".to_string()))
            .diff_suppress(DiffSuppress::CreateOnly)
            .with_description("Kafka Schema configuration type. Defaults to AVRO."),
        )
        .attribute(
            AttributeSchema::new("version", AttributeType::Int)
                .computed()
                .with_description("Kafka Schema configuration version."),
        )
        .attribute(
            AttributeSchema::new(
                "compatibility_level",
                AttributeType::Enum(COMPATIBILITY_LEVELS.iter().map(|s| s.to_string()).collect()),
            )
            .diff_suppress(DiffSuppress::EmptyNew)
            .with_description("Kafka Schemas compatibility level."),
        )
}

#[derive(Debug, Serialize)]
struct SubjectRequest<'a> {
    schema: &'a str,
    #[serde(rename = "schemaType")]
    schema_type: &'a str,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SchemaVersion {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub schema: String,
    #[serde(default, rename = "schemaType")]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Deserialize)]
struct CompatibilityOut {
    #[serde(default)]
    is_compatible: bool,
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SchemaView<'a> {
    project: &'a str,
    service_name: &'a str,
    subject_name: &'a str,
    schema: &'a str,
    schema_type: &'a str,
    version: i64,
    compatibility_level: Option<String>,
}

fn subject_path(project: &str, service: &str, subject: &str) -> String {
    format!(
        "{}/kafka/schema/subjects/{}",
        service_path(project, service),
        escape(subject)
    )
}

fn config_path(project: &str, service: &str, subject: &str) -> String {
    format!(
        "{}/kafka/schema/config/{}",
        service_path(project, service),
        escape(subject)
    )
}

async fn list_versions(client: &AivenClient, project: &str, service: &str, subject: &str) -> Result<Vec<i64>> {
    let body = client
        .get(&format!("{}/versions", subject_path(project, service, subject)))
        .await?;
    Ok(serde_json::from_value(take_field(body, "versions")?)?)
}

async fn get_version(
    client: &AivenClient,
    project: &str,
    service: &str,
    subject: &str,
    version: i64,
) -> Result<SchemaVersion> {
    let body = client
        .get(&format!(
            "{}/versions/{}",
            subject_path(project, service, subject),
            version
        ))
        .await?;
    Ok(serde_json::from_value(take_field(body, "version")?)?)
}

/// Subject compatibility; `None` when the subject inherits the global level
async fn get_compatibility(
    client: &AivenClient,
    project: &str,
    service: &str,
    subject: &str,
) -> Result<Option<String>> {
    match client.get(&config_path(project, service, subject)).await {
        Ok(body) => Ok(body["compatibilityLevel"].as_str().map(str::to_string)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn set_compatibility(
    client: &AivenClient,
    project: &str,
    service: &str,
    subject: &str,
    level: &str,
) -> Result<()> {
    client
        .put(
            &config_path(project, service, subject),
            &serde_json::json!({ "compatibility": level }),
        )
        .await
        .map_err(|e| AivenError::Other(format!("unable to update configuration: {}", e)))?;
    Ok(())
}

/// Latest registered version of the subject
async fn latest_version(
    client: &AivenClient,
    project: &str,
    service: &str,
    subject: &str,
) -> Result<Option<SchemaVersion>> {
    let versions = list_versions(client, project, service, subject).await?;
    match versions.into_iter().max() {
        Some(v) => Ok(Some(get_version(client, project, service, subject, v).await?)),
        None => Ok(None),
    }
}

pub async fn schema_attributes(
    client: &AivenClient,
    project: &str,
    service: &str,
    subject: &str,
) -> Result<Attributes> {
    let latest = latest_version(client, project, service, subject)
        .await?
        .ok_or_else(|| {
            AivenError::from(ApiError::not_found(format!(
                "kafka schema subject {} has no versions",
                subject
            )))
        })?;
    let compatibility_level = get_compatibility(client, project, service, subject).await?;

    let view = SchemaView {
        project,
        service_name: service,
        subject_name: subject,
        schema: &latest.schema,
        schema_type: latest.schema_type.as_deref().unwrap_or("AVRO"),
        version: latest.version,
        compatibility_level,
    };
    resource_data_set(
        &schema(),
        &build_resource_id(&[project, service, subject]),
        &view,
        &[],
    )
}

fn schema_json_equal(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub struct KafkaSchemaHandler;

impl KafkaSchemaHandler {
    async fn add_version(
        &self,
        ctx: &HandlerContext<'_>,
        project: &str,
        service: &str,
        subject: &str,
        attrs: &Attributes,
    ) -> Result<()> {
        let request = SubjectRequest {
            schema: require_str(attrs, "schema")?,
            schema_type: get_str(attrs, "schema_type").unwrap_or("AVRO"),
        };
        ctx.client
            .post(
                &format!("{}/versions", subject_path(project, service, subject)),
                &request,
            )
            .await
            .map_err(|e| AivenError::Other(format!("unable to add schema: {}", e)))?;
        Ok(())
    }

    async fn check_compatibility(
        &self,
        ctx: &HandlerContext<'_>,
        project: &str,
        service: &str,
        subject: &str,
        version: i64,
        attrs: &Attributes,
    ) -> Result<()> {
        let request = SubjectRequest {
            schema: require_str(attrs, "schema")?,
            schema_type: get_str(attrs, "schema_type").unwrap_or("AVRO"),
        };
        let body = ctx
            .client
            .post(
                &format!(
                    "{}/kafka/schema/compatibility/subjects/{}/versions/{}",
                    service_path(project, service),
                    escape(subject),
                    version
                ),
                &request,
            )
            .await
            .map_err(|e| AivenError::Other(format!("unable to check schema validity: {}", e)))?;
        let out: CompatibilityOut = serde_json::from_value(body)?;
        if out.is_compatible {
            Ok(())
        } else {
            Err(AivenError::Config(format!(
                "schema is not compatible with previous version: {}",
                out.messages.join(", ")
            )))
        }
    }
}

#[async_trait]
impl ResourceHandler for KafkaSchemaHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let project = require_str(attrs, "project")?;
        let service = require_str(attrs, "service_name")?;
        let subject = require_str(attrs, "subject_name")?;

        self.add_version(ctx, project, service, subject, attrs).await?;
        if let Some(level) = get_str(attrs, "compatibility_level") {
            set_compatibility(ctx.client, project, service, subject, level).await?;
        }

        if list_versions(ctx.client, project, service, subject).await?.is_empty() {
            return Err(AivenError::Other(
                "kafka schema subject after creation has an empty list of versions".to_string(),
            ));
        }
        Ok(build_resource_id(&[project, service, subject]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, service, subject) = split3(id)?;
        schema_attributes(ctx.client, &project, &service, &subject).await
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let (project, service, subject) = split3(id)?;
        let desired = require_str(attrs, "schema")?;

        let latest = latest_version(ctx.client, &project, &service, &subject).await?;
        let changed = latest
            .as_ref()
            .is_none_or(|v| !schema_json_equal(&v.schema, desired));
        if changed {
            if let Some(latest) = &latest {
                self.check_compatibility(ctx, &project, &service, &subject, latest.version, attrs)
                    .await?;
            }
            self.add_version(ctx, &project, &service, &subject, attrs).await?;
        }

        if let Some(level) = get_str(attrs, "compatibility_level") {
            set_compatibility(ctx.client, &project, &service, &subject, level).await?;
        }
        Ok(id.to_string())
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, service, subject) = split3(id)?;
        match ctx
            .client
            .delete(&subject_path(&project, &service, &subject))
            .await
        {
            Err(e) if is_critical(&e) => Err(e),
            _ => Ok(()),
        }
    }
}
