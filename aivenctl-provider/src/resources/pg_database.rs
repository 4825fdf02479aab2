//! pg_database - databases of a PostgreSQL service
//!
//! ID: `project/service_name/database_name`. Databases cannot be changed in
//! place; `termination_protection` only lives in state.

use aivenctl_core::resource::Value;
use aivenctl_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::service::service_path;
use super::{Attributes, HandlerContext, ResourceHandler};
use crate::client::{AivenClient, escape, take_field};
use crate::errors::{AivenError, ApiError, Result, is_already_exists, is_not_found};
use crate::schemautil::{build_resource_id, get_str, require_str, resource_data_set, split3};

pub const TYPE_NAME: &str = "pg_database";

/// Locale Aiven uses when none is given
pub const DEFAULT_LC: &str = "en_US.UTF-8";

const PRESENT: &str = "PRESENT";
const GONE: &str = "GONE";

pub fn schema() -> ResourceSchema {
    let locale = |name: &str, desc: &str| {
        AttributeSchema::new(name, AttributeType::String)
            .with_default(Value::String(DEFAULT_LC.to_string()))
            .force_new()
            .with_description(desc)
    };

    ResourceSchema::new(TYPE_NAME)
        .with_description("Creates and manages a database in an Aiven for PostgreSQL service.")
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
            AttributeSchema::new("database_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("The name of the service database."),
        )
        .attribute(locale(
            "lc_collate",
            "Default string sort order (`LC_COLLATE`) of the database.",
        ))
        .attribute(locale(
            "lc_ctype",
            "Default character classification (`LC_CTYPE`) of the database.",
        ))
        .attribute(
            AttributeSchema::new("termination_protection", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description(
                    "Client-side deletion protection, which prevents the database from being \
                     deleted by aivenctl.",
                ),
        )
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Database {
    pub database_name: String,
    #[serde(default)]
    pub lc_collate: String,
    #[serde(default)]
    pub lc_ctype: String,
}

#[derive(Debug, Serialize)]
struct CreateDatabaseRequest<'a> {
    database: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    lc_collate: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lc_ctype: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DatabaseView<'a> {
    project: &'a str,
    service_name: &'a str,
    database_name: &'a str,
    lc_collate: &'a str,
    lc_ctype: &'a str,
}

fn databases_path(project: &str, service: &str) -> String {
    format!("{}/db", service_path(project, service))
}

pub async fn list_databases(client: &AivenClient, project: &str, service: &str) -> Result<Vec<Database>> {
    let body = client.get(&databases_path(project, service)).await?;
    Ok(serde_json::from_value(take_field(body, "databases")?)?)
}

/// The database is only reachable through the service's database list
pub async fn get_database(
    client: &AivenClient,
    project: &str,
    service: &str,
    name: &str,
) -> Result<Database> {
    list_databases(client, project, service)
        .await?
        .into_iter()
        .find(|db| db.database_name == name)
        .ok_or_else(|| ApiError::not_found(format!("database {:?} not found", name)).into())
}

/// Not every service reports the locales, assume the default for those
pub fn database_attributes(project: &str, service: &str, db: &Database) -> Result<Attributes> {
    let or_default = |lc: &str| if lc.is_empty() { DEFAULT_LC.to_string() } else { lc.to_string() };
    let (lc_collate, lc_ctype) = (or_default(&db.lc_collate), or_default(&db.lc_ctype));
    let view = DatabaseView {
        project,
        service_name: service,
        database_name: &db.database_name,
        lc_collate: &lc_collate,
        lc_ctype: &lc_ctype,
    };
    resource_data_set(
        &schema(),
        &build_resource_id(&[project, service, &db.database_name]),
        &view,
        &[],
    )
}

pub struct PgDatabaseHandler;

#[async_trait]
impl ResourceHandler for PgDatabaseHandler {
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
        let name = require_str(attrs, "database_name")?;
        ctx.cache.check(ctx.client, project, service).await?;

        // A 409 on create below then only means the request was retried
        match get_database(ctx.client, project, service, name).await {
            Ok(_) => {
                return Err(AivenError::Config(format!(
                    "database {:?} already exists in {}/{}, import it instead",
                    name, project, service
                )));
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e),
        }

        let request = CreateDatabaseRequest {
            database: name,
            lc_collate: get_str(attrs, "lc_collate").filter(|v| !v.is_empty()),
            lc_ctype: get_str(attrs, "lc_ctype").filter(|v| !v.is_empty()),
        };
        match ctx.client.post(&databases_path(project, service), &request).await {
            Ok(_) => {}
            Err(e) if is_already_exists(&e) => {
                log::debug!("database {} already exists after a retried request", name);
            }
            Err(e) => return Err(e),
        }

        Ok(build_resource_id(&[project, service, name]))
    }

    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes> {
        let (project, service, name) = split3(id)?;
        ctx.cache.check(ctx.client, &project, &service).await?;
        let db = get_database(ctx.client, &project, &service, &name).await?;
        database_attributes(&project, &service, &db)
    }

    /// Only `termination_protection` can change, and Aiven never sees it
    async fn update(&self, _ctx: &HandlerContext<'_>, id: &str, _attrs: &Attributes) -> Result<String> {
        Ok(id.to_string())
    }

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()> {
        let (project, service, name) = split3(id)?;
        let (project, service, name) = (project.as_str(), service.as_str(), name.as_str());

        let path = format!("{}/{}", databases_path(project, service), escape(name));
        match ctx.client.delete(&path).await {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e),
        }

        ctx.state_change(&[PRESENT], &[GONE], ctx.timeouts.delete)
            .wait(|| async move {
                match get_database(ctx.client, project, service, name).await {
                    Ok(_) => Ok(Some(((), PRESENT.to_string()))),
                    Err(e) if is_not_found(&e) => Ok(Some(((), GONE.to_string()))),
                    Err(e) => Err(e),
                }
            })
            .await
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

    async fn mount_running_service(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "service": {"service_name": "pg-1", "state": "RUNNING"}
            })))
            .mount(server)
            .await;
    }

    fn db_attrs() -> Attributes {
        HashMap::from([
            ("project".to_string(), s("acme")),
            ("service_name".to_string(), s("pg-1")),
            ("database_name".to_string(), s("orders")),
            ("lc_collate".to_string(), s("C")),
            ("lc_ctype".to_string(), s(DEFAULT_LC)),
        ])
    }

    #[tokio::test]
    async fn create_checks_for_conflicts_then_reads_back() {
        let mock_server = MockServer::start().await;
        mount_running_service(&mock_server).await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "databases": [{"database_name": "defaultdb", "lc_collate": "en_US.UTF-8", "lc_ctype": "en_US.UTF-8"}]
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "databases": [{"database_name": "orders", "lc_collate": "C", "lc_ctype": ""}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/project/acme/service/pg-1/db"))
            .and(body_json(json!({
                "database": "orders",
                "lc_collate": "C",
                "lc_ctype": "en_US.UTF-8"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "created"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let id = PgDatabaseHandler.create(&env.ctx(), &db_attrs()).await.unwrap();
        assert_eq!(id, "acme/pg-1/orders");

        let read = PgDatabaseHandler.read(&env.ctx(), &id).await.unwrap();
        assert_eq!(read.get("lc_collate"), Some(&s("C")));
        assert_eq!(read.get("lc_ctype"), Some(&s(DEFAULT_LC)));
        assert_eq!(read.get("service_name"), Some(&s("pg-1")));
        assert!(!read.contains_key("termination_protection"));
    }

    #[tokio::test]
    async fn create_refuses_an_existing_database() {
        let mock_server = MockServer::start().await;
        mount_running_service(&mock_server).await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "databases": [{"database_name": "orders"}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/project/acme/service/pg-1/db"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let err = PgDatabaseHandler.create(&env.ctx(), &db_attrs()).await.unwrap_err();
        assert!(matches!(err, AivenError::Config(_)));
    }

    #[tokio::test]
    async fn read_of_missing_database_is_not_found() {
        let mock_server = MockServer::start().await;
        mount_running_service(&mock_server).await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"databases": []})))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        let err = PgDatabaseHandler
            .read(&env.ctx(), "acme/pg-1/orders")
            .await
            .unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn delete_waits_until_the_database_is_gone() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/project/acme/service/pg-1/db/orders"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "databases": [{"database_name": "orders"}]
            })))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"databases": []})))
            .mount(&mock_server)
            .await;

        let env = TestEnv::new(mock_server.uri());
        PgDatabaseHandler
            .delete(&env.ctx(), "acme/pg-1/orders")
            .await
            .unwrap();
    }

    #[test]
    fn locales_default_when_unset() {
        let mut attrs = HashMap::from([("database_name".to_string(), s("orders"))]);
        schema().apply_defaults(&mut attrs);
        assert_eq!(attrs.get("lc_collate"), Some(&s(DEFAULT_LC)));
        assert_eq!(attrs.get("termination_protection"), Some(&Value::Bool(false)));
    }
}
