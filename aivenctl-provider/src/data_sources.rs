//! Data sources - read-only lookups of existing Aiven objects
//!
//! Each data source reuses the schema of the resource with the same name:
//! the lookup keys become required and everything else is computed.

use aivenctl_core::schema::ResourceSchema;

use crate::errors::{ApiError, Result};
use crate::resources::service::{self, ServiceKind};
use crate::resources::service_user::{self, UserKind};
use crate::resources::{
    Attributes, HandlerContext, account, kafka_topic, pg_database, project, project_vpc,
    service_integration_endpoint,
};
use crate::schemautil::{build_resource_id, require_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Project,
    ProjectVpc,
    Service(ServiceKind),
    ServiceUser(UserKind),
    Account,
    KafkaTopic,
    PgDatabase,
    IntegrationEndpoint,
}

impl DataSourceKind {
    pub fn all() -> Vec<DataSourceKind> {
        let mut kinds = vec![
            DataSourceKind::Project,
            DataSourceKind::ProjectVpc,
            DataSourceKind::Account,
            DataSourceKind::KafkaTopic,
            DataSourceKind::PgDatabase,
            DataSourceKind::IntegrationEndpoint,
        ];
        kinds.extend(ServiceKind::ALL.iter().copied().map(DataSourceKind::Service));
        kinds.extend(
            [UserKind::Generic, UserKind::Pg, UserKind::Valkey]
                .into_iter()
                .map(DataSourceKind::ServiceUser),
        );
        kinds
    }

    pub fn from_type_name(name: &str) -> Option<DataSourceKind> {
        Self::all().into_iter().find(|k| k.type_name() == name)
    }

    pub fn type_name(self) -> &'static str {
        match self {
            DataSourceKind::Project => project::TYPE_NAME,
            DataSourceKind::ProjectVpc => project_vpc::TYPE_NAME,
            DataSourceKind::Service(kind) => kind.service_type(),
            DataSourceKind::ServiceUser(kind) => kind.type_name(),
            DataSourceKind::Account => account::TYPE_NAME,
            DataSourceKind::KafkaTopic => kafka_topic::TYPE_NAME,
            DataSourceKind::PgDatabase => pg_database::TYPE_NAME,
            DataSourceKind::IntegrationEndpoint => service_integration_endpoint::TYPE_NAME,
        }
    }

    /// Attributes identifying the object to look up
    fn lookup_keys(self) -> &'static [&'static str] {
        match self {
            DataSourceKind::Project => &["project"],
            DataSourceKind::ProjectVpc => &["project", "cloud_name"],
            DataSourceKind::Service(_) => &["project", "service_name"],
            DataSourceKind::ServiceUser(_) => &["project", "service_name", "username"],
            DataSourceKind::Account => &["name"],
            DataSourceKind::KafkaTopic => &["project", "service_name", "topic_name"],
            DataSourceKind::PgDatabase => &["project", "service_name", "database_name"],
            DataSourceKind::IntegrationEndpoint => &["project", "endpoint_name"],
        }
    }

    pub fn schema(self) -> ResourceSchema {
        let schema = match self {
            DataSourceKind::Project => project::schema(),
            DataSourceKind::ProjectVpc => project_vpc::schema(),
            DataSourceKind::Service(kind) => service::schema(kind),
            DataSourceKind::ServiceUser(kind) => service_user::schema(kind),
            DataSourceKind::Account => account::schema(),
            DataSourceKind::KafkaTopic => kafka_topic::schema(),
            DataSourceKind::PgDatabase => pg_database::schema(),
            DataSourceKind::IntegrationEndpoint => service_integration_endpoint::schema(),
        };
        data_source_schema(schema, self.lookup_keys())
    }

    /// Look the object up; returns its ID and attributes
    pub async fn read(self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<(String, Attributes)> {
        match self {
            DataSourceKind::Project => {
                let name = require_str(attrs, "project")?;
                Ok((name.to_string(), project::project_attributes(ctx, name).await?))
            }
            DataSourceKind::ProjectVpc => {
                let project = require_str(attrs, "project")?;
                let cloud = require_str(attrs, "cloud_name")?;
                let vpc = project_vpc::list_vpcs(ctx.client, project)
                    .await?
                    .into_iter()
                    .find(|v| v.cloud_name == cloud)
                    .ok_or_else(|| {
                        ApiError::not_found(format!(
                            "unable to find project VPC for project {} in cloud {}",
                            project, cloud
                        ))
                    })?;
                let id = build_resource_id(&[project, &vpc.project_vpc_id]);
                let attributes = project_vpc::vpc_attributes(&id, &vpc)?;
                Ok((id, attributes))
            }
            DataSourceKind::Service(kind) => {
                let project = require_str(attrs, "project")?;
                let name = require_str(attrs, "service_name")?;
                service::lookup_service(ctx.client, project, name).await?;
                let attributes = service::service_attributes(ctx, kind, project, name).await?;
                Ok((build_resource_id(&[project, name]), attributes))
            }
            DataSourceKind::ServiceUser(kind) => {
                let project = require_str(attrs, "project")?;
                let service = require_str(attrs, "service_name")?;
                let username = require_str(attrs, "username")?;
                service_user::lookup_user(ctx.client, project, service, username).await?;
                let user = service_user::get_user(ctx.client, project, service, username).await?;
                let attributes = service_user::user_attributes(kind, project, service, &user)?;
                Ok((build_resource_id(&[project, service, username]), attributes))
            }
            DataSourceKind::Account => {
                let name = require_str(attrs, "name")?;
                let found = account::find_account(ctx.client, name).await?;
                let attributes = account::account_attributes(&found)?;
                Ok((found.account_id, attributes))
            }
            DataSourceKind::KafkaTopic => {
                let project = require_str(attrs, "project")?;
                let service = require_str(attrs, "service_name")?;
                let topic = require_str(attrs, "topic_name")?;
                let found = kafka_topic::get_topic(ctx.client, project, service, topic).await?;
                let attributes = kafka_topic::topic_attributes(project, service, &found)?;
                Ok((build_resource_id(&[project, service, topic]), attributes))
            }
            DataSourceKind::PgDatabase => {
                let project = require_str(attrs, "project")?;
                let service = require_str(attrs, "service_name")?;
                let name = require_str(attrs, "database_name")?;
                let db = pg_database::get_database(ctx.client, project, service, name).await?;
                let attributes = pg_database::database_attributes(project, service, &db)?;
                Ok((build_resource_id(&[project, service, name]), attributes))
            }
            DataSourceKind::IntegrationEndpoint => {
                let project = require_str(attrs, "project")?;
                let name = require_str(attrs, "endpoint_name")?;
                let endpoint =
                    service_integration_endpoint::find_endpoint_by_name(ctx.client, project, name).await?;
                let attributes = service_integration_endpoint::endpoint_attributes(project, &endpoint)?;
                Ok((build_resource_id(&[project, &endpoint.endpoint_id]), attributes))
            }
        }
    }
}

/// Turn a resource schema into a lookup schema keyed by `lookup_keys`
pub fn data_source_schema(mut schema: ResourceSchema, lookup_keys: &[&str]) -> ResourceSchema {
    for (name, attr) in schema.attributes.iter_mut() {
        let is_key = lookup_keys.contains(&name.as_str());
        attr.required = is_key;
        attr.optional = false;
        attr.computed = !is_key;
        attr.force_new = false;
        attr.default = None;
        attr.diff_suppress = None;
        attr.required_with.clear();
    }
    schema
}
