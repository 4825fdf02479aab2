//! service_integration - links between services and integration endpoints
//!
//! Endpoint IDs are configured as `project/endpoint_id`; only the second part
//! is sent to the API. A `read_replica` integration created together with its
//! service is adopted instead of created twice.

use aivenctl_core::resource::Value;
use aivenctl_core::schema::{AttributeSchema, AttributeType, DiffSuppress, ResourceSchema, types};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::service::service_path;
use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, Result, is_critical, is_not_found};
use crate::schemautil::{build_resource_id, get_block, get_str, require_str, resource_data_set, split2};

pub const TYPE_NAME: &str = "service_integration";

const ACTIVE: &str = "ACTIVE";
const NOT_ACTIVE: &str = "NOTACTIVE";
const READ_REPLICA: &str = "read_replica";
const KAFKA_CONNECT: &str = "kafka_connect";
const CONTINUOUS_TARGET: u32 = 10;

const INTEGRATION_TYPES: &[&str] = &[
    "alertmanager",
    "autoscaler",
    "caching",
    "cassandra_cross_service_cluster",
    "clickhouse_credentials",
    "clickhouse_kafka",
    "clickhouse_postgresql",
    "dashboard",
    "datadog",
    "datasource",
    "disaster_recovery",
    "external_aws_cloudwatch_logs",
    "external_aws_cloudwatch_metrics",
    "external_elasticsearch_logs",
    "external_google_cloud_logging",
    "external_opensearch_logs",
    "flink",
    "flink_external_kafka",
    "flink_external_postgresql",
    "internal_connectivity",
    "jolokia",
    "kafka_connect",
    "kafka_connect_postgresql",
    "kafka_logs",
    "kafka_mirrormaker",
    "logs",
    "m3aggregator",
    "m3coordinator",
    "metrics",
    "opensearch_cross_cluster_replication",
    "opensearch_cross_cluster_search",
    "prometheus",
    "read_replica",
    "rsyslog",
    "schema_registry_proxy",
    "stresstester",
    "thanos_distributed_query",
    "thanos_migrate",
    "thanoscompactor",
    "thanosquery",
    "thanosruler",
    "thanosstore",
    "vector",
    "vmalert",
];

/// `<type>_user_config` blocks for the integration types that take settings
fn user_config_blocks() -> Vec<(&'static str, Vec<AttributeSchema>)> {
    let string = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::String).with_description(desc);
    let int = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::Int).with_description(desc);
    let flag = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::Bool).with_description(desc);

    vec![
        (
            "datadog",
            vec![
                flag("datadog_dbm_enabled", "Enable Datadog Database Monitoring."),
                flag("datadog_pgbouncer_enabled", "Enable Datadog PgBouncer Metric Tracking."),
                int("max_jmx_metrics", "Maximum number of JMX metrics to send."),
                int("max_partition_contexts", "Maximum number of partition contexts to send."),
            ],
        ),
        (
            "kafka_connect",
            vec![AttributeSchema::new(
                "kafka_connect",
                AttributeType::List(Box::new(AttributeType::Struct(vec![
                    string("config_storage_topic", "The name of the topic where connector and task configuration data are stored."),
                    string("group_id", "A unique string that identifies the Connect cluster group this worker belongs to."),
                    string("offset_storage_topic", "The name of the topic where connector and task configuration offsets are stored."),
                    string("status_storage_topic", "The name of the topic where connector and task configuration status updates are stored."),
                ]))),
            )
            .with_description("Kafka Connect service configuration values")],
        ),
        (
            "kafka_logs",
            vec![
                string("kafka_topic", "Topic name.").required(),
                AttributeSchema::new("selected_log_fields", AttributeType::List(Box::new(AttributeType::String)))
                    .with_description("The list of logging fields that will be sent to the integration logging service."),
            ],
        ),
        (
            "kafka_mirrormaker",
            vec![
                string("cluster_alias", "The alias under which the Kafka cluster is known to MirrorMaker."),
                AttributeSchema::new(
                    "kafka_mirrormaker",
                    AttributeType::List(Box::new(AttributeType::Struct(vec![
                        int("consumer_fetch_min_bytes", "The minimum amount of data the server should return for a fetch request."),
                        int("producer_batch_size", "The batch size in bytes producer will attempt to collect before publishing."),
                        int("producer_buffer_memory", "The amount of bytes producer can use for buffering data before publishing."),
                        string("producer_compression_type", "Specify the default compression type for producers."),
                        int("producer_linger_ms", "The linger time for the producer to wait for new data."),
                        int("producer_max_request_size", "The maximum request size in bytes."),
                    ]))),
                )
                .with_description("Kafka MirrorMaker configuration values"),
            ],
        ),
        (
            "logs",
            vec![
                int("elasticsearch_index_days_max", "Elasticsearch index retention limit. Default: 3."),
                string("elasticsearch_index_prefix", "Elasticsearch index prefix. Default: logs."),
                AttributeSchema::new("selected_log_fields", AttributeType::List(Box::new(AttributeType::String)))
                    .with_description("The list of logging fields that will be sent to the integration logging service."),
            ],
        ),
        (
            "metrics",
            vec![
                string("database", "Name of the database where to store metric datapoints."),
                int("retention_days", "Number of days to keep old metrics."),
                string("ro_username", "Name of a user that can be used to read metrics."),
                string("username", "Name of the user used to write metrics."),
            ],
        ),
    ]
}

fn user_config_key(integration_type: &str) -> String {
    format!("{}_user_config", integration_type)
}

pub fn schema() -> ResourceSchema {
    let endpoint = |name: &str, desc: &str| {
        AttributeSchema::new(name, types::project_scoped_id())
            .force_new()
            .with_description(desc)
    };
    let service = |name: &str, desc: &str| {
        AttributeSchema::new(name, AttributeType::String)
            .force_new()
            .with_description(desc)
    };

    ResourceSchema::new(TYPE_NAME)
        .with_description("Creates and manages an Aiven service integration.")
        .attribute(
            AttributeSchema::new("integration_id", AttributeType::String)
                .computed()
                .with_description("The ID of the Aiven service integration."),
        )
        .attribute(
            AttributeSchema::new("project", AttributeType::String)
                .required()
                .force_new()
                .with_description("Project the integration belongs to."),
        )
        .attribute(
            AttributeSchema::new(
                "integration_type",
                AttributeType::Enum(INTEGRATION_TYPES.iter().map(|s| s.to_string()).collect()),
            )
            .required()
            .force_new()
            .with_description("Type of the service integration"),
        )
        .attribute(endpoint("destination_endpoint_id", "Destination endpoint for the integration."))
        .attribute(service("destination_service_name", "Destination service for the integration."))
        .attribute(
            service("destination_service_project", "Destination service project name").optional_computed(),
        )
        .attribute(endpoint("source_endpoint_id", "Source endpoint for the integration."))
        .attribute(
            service("source_service_name", "Source service for the integration (if any)").optional_computed(),
        )
        .attribute(service("source_service_project", "Source service project name").optional_computed())
        .attributes(user_config_blocks().into_iter().map(|(kind, fields)| {
            AttributeSchema::new(
                user_config_key(kind),
                AttributeType::List(Box::new(AttributeType::Struct(fields))),
            )
            .diff_suppress(DiffSuppress::EmptyObject)
            .with_description(format!("{} user configurable settings", kind))
        }))
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServiceIntegration {
    pub service_integration_id: String,
    pub integration_type: String,
    #[serde(default)]
    pub source_service: Option<String>,
    #[serde(default)]
    pub dest_service: Option<String>,
    #[serde(default)]
    pub source_endpoint_id: Option<String>,
    #[serde(default)]
    pub dest_endpoint_id: Option<String>,
    #[serde(default)]
    pub source_project: Option<String>,
    #[serde(default)]
    pub dest_project: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub user_config: JsonMap<String, JsonValue>,
}

#[derive(Debug, Serialize)]
struct CreateIntegrationRequest<'a> {
    integration_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_service: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest_service: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_endpoint_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest_endpoint_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest_project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_config: Option<JsonMap<String, JsonValue>>,
}

#[derive(Debug, Serialize)]
struct UpdateIntegrationRequest {
    user_config: JsonMap<String, JsonValue>,
}

fn integration_path(project: &str, integration_id: &str) -> String {
    format!("/project/{}/integration/{}", escape(project), escape(integration_id))
}

pub async fn get_integration(client: &AivenClient, project: &str, integration_id: &str) -> Result<ServiceIntegration> {
    let body = client.get(&integration_path(project, integration_id)).await?;
    Ok(serde_json::from_value(take_field(body, "service_integration")?)?)
}

async fn list_integrations(client: &AivenClient, project: &str, service: &str) -> Result<Vec<ServiceIntegration>> {
    let body = client
        .get(&format!("{}/integration", service_path(project, service)))
        .await?;
    Ok(serde_json::from_value(take_field(body, "service_integrations")?)?)
}

/// Second part of a `project/endpoint_id` reference
fn plain_endpoint_id(full: Option<&str>) -> Option<&str> {
    full.and_then(|id| id.split_once('/')).map(|(_, endpoint)| endpoint)
}

/// Configured `<type>_user_config` block as JSON, if the type has one.
/// Nested blocks are single objects in the API.
fn user_config(attrs: &Attributes, integration_type: &str) -> Option<JsonMap<String, JsonValue>> {
    get_block(attrs, &user_config_key(integration_type)).map(|block| {
        block
            .iter()
            .map(|(k, v)| {
                let json = match v {
                    Value::List(items) if matches!(items.as_slice(), [Value::Map(_)]) => {
                        items[0].to_json()
                    }
                    other => other.to_json(),
                };
                (k.clone(), json)
            })
            .filter(|(_, v)| !v.is_null())
            .collect()
    })
}

pub fn integration_attributes(project: &str, integration: &ServiceIntegration) -> Result<Attributes> {
    let mut m = JsonMap::new();
    m.insert("project".to_string(), project.into());
    m.insert(
        "integration_id".to_string(),
        integration.service_integration_id.clone().into(),
    );
    m.insert(
        "integration_type".to_string(),
        integration.integration_type.clone().into(),
    );

    match (&integration.dest_endpoint_id, &integration.dest_service) {
        (Some(endpoint), _) => {
            m.insert(
                "destination_endpoint_id".to_string(),
                build_resource_id(&[project, endpoint]).into(),
            );
        }
        (None, Some(service)) => {
            m.insert("destination_service_name".to_string(), service.clone().into());
        }
        _ => {}
    }
    match (&integration.source_endpoint_id, &integration.source_service) {
        (Some(endpoint), _) => {
            m.insert(
                "source_endpoint_id".to_string(),
                build_resource_id(&[project, endpoint]).into(),
            );
        }
        (None, Some(service)) if !service.is_empty() => {
            m.insert("source_service_name".to_string(), service.clone().into());
        }
        _ => {}
    }
    if let Some(p) = &integration.dest_project {
        m.insert("destination_service_project".to_string(), p.clone().into());
    }
    if let Some(p) = &integration.source_project {
        m.insert("source_service_project".to_string(), p.clone().into());
    }
    if !integration.user_config.is_empty() {
        m.insert(
            user_config_key(&integration.integration_type),
            JsonValue::Object(integration.user_config.clone()),
        );
    }

    resource_data_set(
        &schema(),
        &build_resource_id(&[project, &integration.service_integration_id]),
        &m,
        &[],
    )
}

pub struct ServiceIntegrationHandler;

impl ServiceIntegrationHandler {
    /// An integration of the same type between the same services, created
    /// together with the service
    async fn find_preexisting(
        &self,
        ctx: &HandlerContext<'_>,
        project: &str,
        attrs: &Attributes,
    ) -> Result<Option<ServiceIntegration>> {
        let source = get_str(attrs, "source_service_name").unwrap_or_default();
        let dest = get_str(attrs, "destination_service_name").unwrap_or_default();

        let integrations = match list_integrations(ctx.client, project, source).await {
            Ok(list) => list,
            Err(e) if is_critical(&e) => {
                return Err(AivenError::Other(format!(
                    "unable to get list of service integrations: {}",
                    e
                )));
            }
            Err(_) => Vec::new(),
        };

        Ok(integrations.into_iter().find(|i| {
            i.integration_type == READ_REPLICA
                && !i.service_integration_id.is_empty()
                && i.source_service.as_deref() == Some(source)
                && i.dest_service.as_deref() == Some(dest)
        }))
    }

    async fn wait_until_active(
        &self,
        ctx: &HandlerContext<'_>,
        project: &str,
        integration_id: &str,
        timeout: std::time::Duration,
    ) -> Result<()> {
        ctx.state_change(&[NOT_ACTIVE], &[ACTIVE], timeout)
            .with_continuous_target_occurrence(CONTINUOUS_TARGET)
            .wait(|| async move {
                log::debug!("service integration {}: waiting until active", integration_id);
                let integration = match get_integration(ctx.client, project, integration_id).await {
                    Ok(i) => i,
                    // Freshly created integrations can briefly be missing
                    Err(e) if is_not_found(&e) => return Ok(Some(((), NOT_ACTIVE.to_string()))),
                    Err(e) => return Err(e),
                };
                if !integration.active {
                    return Ok(Some(((), NOT_ACTIVE.to_string())));
                }

                if integration.integration_type == KAFKA_CONNECT
                    && let Some(dest) = &integration.dest_service
                {
                    let connectors = format!("{}/connectors", service_path(project, dest));
                    if let Err(e) = ctx.client.get(&connectors).await {
                        log::debug!("service integration {}: error listing kafka connectors: {}", integration_id, e);
                        return Ok(Some(((), NOT_ACTIVE.to_string())));
                    }
                }
                Ok(Some(((), ACTIVE.to_string())))
            })
            .await
            .map_err(|e| {
                AivenError::Other(format!(
                    "unable to wait for service integration to become active: {}",
                    e
                ))
            })
    }
}

#[async_trait]
impl ResourceHandler for ServiceIntegrationHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let project = require_str(attrs, "project")?;
        let integration_type = require_str(attrs, "integration_type")?;

        if integration_type == READ_REPLICA
            && let Some(existing) = self.find_preexisting(ctx, project, attrs).await?
        {
            log::info!(
                "adopting read_replica integration {} created with the service",
                existing.service_integration_id
            );
            return Ok(build_resource_id(&[project, &existing.service_integration_id]));
        }

        let request = CreateIntegrationRequest {
            integration_type,
            source_service: get_str(attrs, "source_service_name"),
            dest_service: get_str(attrs, "destination_service_name"),
            source_endpoint_id: plain_endpoint_id(get_str(attrs, "source_endpoint_id")),
            dest_endpoint_id: plain_endpoint_id(get_str(attrs, "destination_endpoint_id")),
            source_project: get_str(attrs, "source_service_project"),
            dest_project: get_str(attrs, "destination_service_project"),
            user_config: user_config(attrs, integration_type),
        };
        let body = ctx
            .client
            .post(&format!("/project/{}/integration", escape(project)), &request)
            .await
            .map_err(|e| AivenError::Other(format!("error creating service integration: {}", e)))?;
        let created: ServiceIntegration =
            serde_json::from_value(take_field(body, "service_integration")?)?;

        self.wait_until_active(ctx, project, &created.service_integration_id, ctx.timeouts.create)
            .await?;
        Ok(build_resource_id(&[project, &created.service_integration_id]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, integration_id) = split2(id)?;
        let integration = get_integration(ctx.client, &project, &integration_id).await?;
        integration_attributes(&project, &integration)
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let (project, integration_id) = split2(id)?;
        let integration_type = require_str(attrs, "integration_type")?;

        let request = UpdateIntegrationRequest {
            user_config: user_config(attrs, integration_type).unwrap_or_default(),
        };
        ctx.client
            .put(&integration_path(&project, &integration_id), &request)
            .await
            .map_err(|e| AivenError::Other(format!("unable to update service integration: {}", e)))?;

        self.wait_until_active(ctx, &project, &integration_id, ctx.timeouts.update)
            .await?;
        Ok(id.to_string())
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, integration_id) = split2(id)?;
        match ctx
            .client
            .delete(&integration_path(&project, &integration_id))
            .await
        {
            Err(e) if is_critical(&e) => Err(AivenError::Other(format!(
                "cannot delete service integration: {}",
                e
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{TestEnv, s};
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn integration_json(integration_type: &str, active: bool) -> serde_json::Value {
        json!({
            "service_integration": {
                "service_integration_id": "si-1",
                "integration_type": integration_type,
                "source_service": "kafka-1",
                "dest_service": "connect-1",
                "source_project": "acme",
                "dest_project": "acme",
                "active": active,
                "user_config": {"kafka_connect": {"group_id": "connect"}}
            }
        })
    }

    #[tokio::test]
    async fn read_replica_reuses_existing_integration() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1/integration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "service_integrations": [
                    {"service_integration_id": "si-metrics", "integration_type": "metrics",
                     "source_service": "pg-1", "dest_service": "pg-replica"},
                    {"service_integration_id": "si-replica", "integration_type": "read_replica",
                     "source_service": "pg-1", "dest_service": "pg-replica"}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let attrs = HashMap::from([
            ("project".to_string(), s("acme")),
            ("integration_type".to_string(), s("read_replica")),
            ("source_service_name".to_string(), s("pg-1")),
            ("destination_service_name".to_string(), s("pg-replica")),
        ]);
        let id = ServiceIntegrationHandler
            .create(&env.ctx(), &attrs)
            .await
            .unwrap();
        assert_eq!(id, "acme/si-replica");
    }

    #[tokio::test]
    async fn create_strips_endpoint_project_and_waits_for_connectors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/project/acme/integration"))
            .and(body_json(json!({
                "integration_type": "kafka_connect",
                "source_service": "kafka-1",
                "dest_endpoint_id": "ep-1",
                "user_config": {"kafka_connect": {"group_id": "connect"}}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(integration_json("kafka_connect", false)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/integration/si-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/integration/si-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(integration_json("kafka_connect", true)),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/connect-1/connectors"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "starting"})))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/connect-1/connectors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"connectors": []})))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let attrs = HashMap::from([
            ("project".to_string(), s("acme")),
            ("integration_type".to_string(), s("kafka_connect")),
            ("source_service_name".to_string(), s("kafka-1")),
            ("destination_endpoint_id".to_string(), s("acme/ep-1")),
            (
                "kafka_connect_user_config".to_string(),
                Value::List(vec![Value::Map(HashMap::from([(
                    "kafka_connect".to_string(),
                    Value::List(vec![Value::Map(HashMap::from([(
                        "group_id".to_string(),
                        s("connect"),
                    )]))]),
                )]))]),
            ),
        ]);
        let id = ServiceIntegrationHandler
            .create(&env.ctx(), &attrs)
            .await
            .unwrap();
        assert_eq!(id, "acme/si-1");

        let requests = mock_server.received_requests().await.unwrap_or_default();
        let connector_checks = requests
            .iter()
            .filter(|r| r.url.path() == "/project/acme/service/connect-1/connectors")
            .count();
        assert!(connector_checks >= CONTINUOUS_TARGET as usize + 2);
    }

    #[tokio::test]
    async fn read_rebuilds_endpoint_ids() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/acme/integration/si-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "service_integration": {
                    "service_integration_id": "si-2",
                    "integration_type": "metrics",
                    "source_service": "pg-1",
                    "dest_endpoint_id": "ep-9",
                    "active": true,
                    "user_config": {"retention_days": 30, "unknown_setting": true}
                }
            })))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let read = ServiceIntegrationHandler
            .read(&env.ctx(), "acme/si-2")
            .await
            .unwrap();
        assert_eq!(read.get("destination_endpoint_id"), Some(&s("acme/ep-9")));
        assert_eq!(read.get("source_service_name"), Some(&s("pg-1")));
        assert!(!read.contains_key("destination_service_name"));
        let Some(Value::List(config)) = read.get("metrics_user_config") else {
            panic!("metrics_user_config missing");
        };
        let Value::Map(config) = &config[0] else {
            panic!("metrics_user_config is not a map");
        };
        assert_eq!(config.get("retention_days"), Some(&Value::Int(30)));
        assert!(!config.contains_key("unknown_setting"));
    }

    #[tokio::test]
    async fn update_sends_empty_user_config() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/project/acme/integration/si-1"))
            .and(body_json(json!({"user_config": {}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(integration_json("read_replica", true)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/integration/si-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(integration_json("read_replica", true)),
            )
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let attrs = HashMap::from([("integration_type".to_string(), s("read_replica"))]);
        ServiceIntegrationHandler
            .update(&env.ctx(), "acme/si-1", &attrs)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_ignores_missing_integration() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/project/acme/integration/si-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        ServiceIntegrationHandler
            .delete(&env.ctx(), "acme/si-1")
            .await
            .unwrap();
    }
}
