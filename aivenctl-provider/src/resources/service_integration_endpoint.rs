//! service_integration_endpoint - external systems services integrate with
//!
//! ID: `project/endpoint_id`, the form `service_integration` expects in its
//! `source_endpoint_id` and `destination_endpoint_id`.

use std::collections::HashMap;

use aivenctl_core::schema::{AttributeSchema, AttributeType, DiffSuppress, ResourceSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, ApiError, Result, is_critical};
use crate::schemautil::{build_resource_id, get_block, require_str, resource_data_set, split2};

pub const TYPE_NAME: &str = "service_integration_endpoint";

const ENDPOINT_TYPES: &[&str] = &[
    "autoscaler",
    "datadog",
    "external_aws_cloudwatch_logs",
    "external_aws_cloudwatch_metrics",
    "external_aws_s3",
    "external_azure_blob_storage",
    "external_clickhouse",
    "external_elasticsearch_logs",
    "external_google_cloud_bigquery",
    "external_google_cloud_logging",
    "external_kafka",
    "external_mysql",
    "external_opensearch_logs",
    "external_postgresql",
    "external_prometheus",
    "external_redis",
    "external_schema_registry",
    "external_sumologic_logs",
    "jolokia",
    "prometheus",
    "rsyslog",
];

/// `<type>_user_config` blocks for the endpoint types that take settings
fn user_config_blocks() -> Vec<(&'static str, Vec<AttributeSchema>)> {
    let string = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::String).with_description(desc);
    let secret = |name: &str, desc: &str| string(name, desc).sensitive();
    let int = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::Int).with_description(desc);
    let flag = |name: &str, desc: &str| AttributeSchema::new(name, AttributeType::Bool).with_description(desc);
    let choice = |name: &str, values: &[&str], desc: &str| {
        AttributeSchema::new(
            name,
            AttributeType::Enum(values.iter().map(|v| v.to_string()).collect()),
        )
        .with_description(desc)
    };
    let search_logs = || {
        vec![
            string("url", "Elasticsearch or OpenSearch connection URL.").required(),
            string("index_prefix", "Index prefix. Default: `logs`.").required(),
            int("index_days_max", "Maximum number of days of logs to keep. Default: `3`."),
            int("timeout", "Request timeout in seconds. Default: `10`."),
            string("ca", "PEM encoded CA certificate."),
        ]
    };

    vec![
        (
            "datadog",
            vec![
                secret("datadog_api_key", "Datadog API key.").required(),
                choice(
                    "site",
                    &["ap1.datadoghq.com", "datadoghq.com", "datadoghq.eu", "ddog-gov.com", "us3.datadoghq.com", "us5.datadoghq.com"],
                    "Datadog intake site.",
                ),
                flag("disable_consumer_stats", "Disable consumer group metrics."),
                int("max_partition_contexts", "Maximum number of partition contexts to send."),
            ],
        ),
        ("external_elasticsearch_logs", search_logs()),
        ("external_opensearch_logs", search_logs()),
        (
            "external_schema_registry",
            vec![
                string("url", "Schema Registry URL.").required(),
                choice("authentication", &["none", "basic"], "Authentication method.").required(),
                string("basic_auth_username", "Basic authentication user name."),
                secret("basic_auth_password", "Basic authentication password."),
            ],
        ),
        (
            "prometheus",
            vec![
                string("basic_auth_username", "Prometheus basic authentication username."),
                secret("basic_auth_password", "Prometheus basic authentication password."),
            ],
        ),
        (
            "rsyslog",
            vec![
                string("server", "Rsyslog server IP address or hostname.").required(),
                int("port", "Rsyslog server port. Default: `514`.").required(),
                choice("format", &["custom", "rfc3164", "rfc5424"], "Message format. Default: `rfc5424`.").required(),
                flag("tls", "Require TLS. Default: `true`.").required(),
                string("logline", "Custom syslog message format."),
                string("sd", "Structured data block for log message."),
                string("ca", "PEM encoded CA certificate."),
            ],
        ),
    ]
}

fn user_config_key(endpoint_type: &str) -> String {
    format!("{}_user_config", endpoint_type)
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Creates and manages an Aiven service integration endpoint.")
        .attribute(
            AttributeSchema::new("project", AttributeType::String)
                .required()
                .force_new()
                .with_description("Project the service integration endpoint belongs to"),
        )
        .attribute(
            AttributeSchema::new("endpoint_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("Name of the service integration endpoint"),
        )
        .attribute(
            AttributeSchema::new(
                "endpoint_type",
                AttributeType::Enum(ENDPOINT_TYPES.iter().map(|s| s.to_string()).collect()),
            )
            .required()
            .force_new()
            .with_description("Type of the service integration endpoint"),
        )
        .attribute(
            AttributeSchema::new("endpoint_config", AttributeType::Map(Box::new(AttributeType::String)))
                .computed()
                .with_description("Integration endpoint specific backend configuration"),
        )
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
pub struct IntegrationEndpoint {
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub endpoint_type: String,
    #[serde(default)]
    pub endpoint_config: JsonMap<String, JsonValue>,
    #[serde(default)]
    pub user_config: JsonMap<String, JsonValue>,
}

#[derive(Debug, Serialize)]
struct CreateEndpointRequest<'a> {
    endpoint_name: &'a str,
    endpoint_type: &'a str,
    user_config: JsonMap<String, JsonValue>,
}

#[derive(Debug, Serialize)]
struct UpdateEndpointRequest {
    user_config: JsonMap<String, JsonValue>,
}

fn endpoints_path(project: &str) -> String {
    format!("/project/{}/integration_endpoint", escape(project))
}

fn endpoint_path(project: &str, endpoint_id: &str) -> String {
    format!("{}/{}", endpoints_path(project), escape(endpoint_id))
}

pub async fn get_endpoint(client: &AivenClient, project: &str, endpoint_id: &str) -> Result<IntegrationEndpoint> {
    let body = client.get(&endpoint_path(project, endpoint_id)).await?;
    Ok(serde_json::from_value(take_field(body, "service_integration_endpoint")?)?)
}

pub async fn list_endpoints(client: &AivenClient, project: &str) -> Result<Vec<IntegrationEndpoint>> {
    let body = client.get(&endpoints_path(project)).await?;
    Ok(serde_json::from_value(take_field(body, "service_integration_endpoints")?)?)
}

/// Configured `<type>_user_config` block as the flat object the API takes
fn user_config(attrs: &Attributes, endpoint_type: &str) -> JsonMap<String, JsonValue> {
    get_block(attrs, &user_config_key(endpoint_type))
        .map(|block| {
            block
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .filter(|(_, v)| !v.is_null())
                .collect()
        })
        .unwrap_or_default()
}

pub fn endpoint_attributes(project: &str, endpoint: &IntegrationEndpoint) -> Result<Attributes> {
    // Every backend setting is exposed as a string
    let endpoint_config: HashMap<String, String> = endpoint
        .endpoint_config
        .iter()
        .map(|(k, v)| {
            let text = match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect();

    let mut m = JsonMap::new();
    m.insert("project".to_string(), project.into());
    m.insert("endpoint_name".to_string(), endpoint.endpoint_name.clone().into());
    m.insert("endpoint_type".to_string(), endpoint.endpoint_type.clone().into());
    m.insert("endpoint_config".to_string(), serde_json::to_value(endpoint_config)?);
    if !endpoint.user_config.is_empty() {
        m.insert(
            user_config_key(&endpoint.endpoint_type),
            JsonValue::Object(endpoint.user_config.clone()),
        );
    }

    resource_data_set(
        &schema(),
        &build_resource_id(&[project, &endpoint.endpoint_id]),
        &m,
        &[],
    )
}

pub struct ServiceIntegrationEndpointHandler;

#[async_trait]
impl ResourceHandler for ServiceIntegrationEndpointHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String> {
        let project = require_str(attrs, "project")?;
        let endpoint_type = require_str(attrs, "endpoint_type")?;
        let request = CreateEndpointRequest {
            endpoint_name: require_str(attrs, "endpoint_name")?,
            endpoint_type,
            user_config: user_config(attrs, endpoint_type),
        };

        let body = ctx.client.post(&endpoints_path(project), &request).await?;
        let created: IntegrationEndpoint =
            serde_json::from_value(take_field(body, "service_integration_endpoint")?)?;
        log::info!("created integration endpoint {} ({})", created.endpoint_name, created.endpoint_id);
        Ok(build_resource_id(&[project, &created.endpoint_id]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, endpoint_id) = split2(id)?;
        let endpoint = get_endpoint(ctx.client, &project, &endpoint_id).await?;
        endpoint_attributes(&project, &endpoint)
    }

    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes) -> Result<String> {
        let (project, endpoint_id) = split2(id)?;
        let endpoint_type = require_str(attrs, "endpoint_type")?;
        let request = UpdateEndpointRequest {
            user_config: user_config(attrs, endpoint_type),
        };
        ctx.client
            .put(&endpoint_path(&project, &endpoint_id), &request)
            .await?;
        Ok(id.to_string())
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, endpoint_id) = split2(id)?;
        match ctx.client.delete(&endpoint_path(&project, &endpoint_id)).await {
            Err(e) if is_critical(&e) => Err(AivenError::Other(format!(
                "cannot delete service integration endpoint: {}",
                e
            ))),
            _ => Ok(()),
        }
    }
}

/// Endpoints are looked up by name through the project's list
pub async fn find_endpoint_by_name(
    client: &AivenClient,
    project: &str,
    name: &str,
) -> Result<IntegrationEndpoint> {
    list_endpoints(client, project)
        .await?
        .into_iter()
        .find(|e| e.endpoint_name == name)
        .ok_or_else(|| {
            ApiError::not_found(format!("endpoint {:?} not found in project {}", name, project)).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{TestEnv, s};
    use aivenctl_core::resource::Value;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint_json() -> serde_json::Value {
        json!({
            "service_integration_endpoint": {
                "endpoint_id": "4d2e0bbf",
                "endpoint_name": "syslog",
                "endpoint_type": "rsyslog",
                "endpoint_config": {"port": 514, "server": "logs.example.com"},
                "user_config": {"server": "logs.example.com", "port": 514, "format": "rfc5424", "tls": true}
            }
        })
    }

    fn rsyslog_attrs() -> Attributes {
        HashMap::from([
            ("project".to_string(), s("acme")),
            ("endpoint_name".to_string(), s("syslog")),
            ("endpoint_type".to_string(), s("rsyslog")),
            (
                "rsyslog_user_config".to_string(),
                Value::List(vec![Value::Map(HashMap::from([
                    ("server".to_string(), s("logs.example.com")),
                    ("port".to_string(), Value::Int(514)),
                    ("format".to_string(), s("rfc5424")),
                    ("tls".to_string(), Value::Bool(true)),
                ]))]),
            ),
        ])
    }

    #[tokio::test]
    async fn create_sends_flat_user_config() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/project/acme/integration_endpoint"))
            .and(body_json(json!({
                "endpoint_name": "syslog",
                "endpoint_type": "rsyslog",
                "user_config": {"server": "logs.example.com", "port": 514, "format": "rfc5424", "tls": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(endpoint_json()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let id = ServiceIntegrationEndpointHandler
            .create(&env.ctx(), &rsyslog_attrs())
            .await
            .unwrap();
        assert_eq!(id, "acme/4d2e0bbf");
    }

    #[tokio::test]
    async fn read_stringifies_endpoint_config() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/acme/integration_endpoint/4d2e0bbf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(endpoint_json()))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let read = ServiceIntegrationEndpointHandler
            .read(&env.ctx(), "acme/4d2e0bbf")
            .await
            .unwrap();
        let Some(Value::Map(config)) = read.get("endpoint_config") else {
            panic!("endpoint_config missing: {:?}", read);
        };
        assert_eq!(config.get("port"), Some(&s("514")));
        assert_eq!(config.get("server"), Some(&s("logs.example.com")));
        assert_eq!(read.get("endpoint_type"), Some(&s("rsyslog")));
        assert!(read.contains_key("rsyslog_user_config"));
    }

    #[tokio::test]
    async fn update_puts_user_config() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/project/acme/integration_endpoint/4d2e0bbf"))
            .and(body_json(json!({
                "user_config": {"server": "logs.example.com", "port": 514, "format": "rfc5424", "tls": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(endpoint_json()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let id = ServiceIntegrationEndpointHandler
            .update(&env.ctx(), "acme/4d2e0bbf", &rsyslog_attrs())
            .await
            .unwrap();
        assert_eq!(id, "acme/4d2e0bbf");
    }

    #[tokio::test]
    async fn delete_ignores_missing_endpoint() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/project/acme/integration_endpoint/4d2e0bbf"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        ServiceIntegrationEndpointHandler
            .delete(&env.ctx(), "acme/4d2e0bbf")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_reports_other_failures() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/project/acme/integration_endpoint/4d2e0bbf"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "endpoint in use"})))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let err = ServiceIntegrationEndpointHandler
            .delete(&env.ctx(), "acme/4d2e0bbf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("endpoint in use"));
    }
}
