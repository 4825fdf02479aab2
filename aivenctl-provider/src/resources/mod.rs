//! Resource handlers
//!
//! Each Aiven resource type is a [`ResourceHandler`]: a schema plus the four
//! lifecycle operations. Handlers receive the attribute map from the
//! configuration and return the attribute map read back from the API.

use std::collections::HashMap;
use std::time::Duration;

use aivenctl_core::provider::ResourceType;
use aivenctl_core::resource::Value;
use aivenctl_core::schema::ResourceSchema;
use async_trait::async_trait;

use crate::cache::ServicePoweredCache;
use crate::client::AivenClient;
use crate::errors::Result;
use crate::schemautil::Timeouts;
use crate::waiter::{DEFAULT_MIN_TIMEOUT, StateChangeConf};

pub mod account;
pub mod billing_group;
pub mod kafka_schema;
pub mod kafka_topic;
pub mod pg_database;
pub mod project;
pub mod project_vpc;
pub mod service;
pub mod service_integration;
pub mod service_integration_endpoint;
pub mod service_user;
pub mod static_ip;
pub mod vpc_peering;

pub type Attributes = HashMap<String, Value>;

/// Everything a handler needs to talk to Aiven
pub struct HandlerContext<'a> {
    pub client: &'a AivenClient,
    pub timeouts: &'a Timeouts,
    pub cache: &'a ServicePoweredCache,
    /// Fixed polling interval with no initial delay, used against mock APIs
    pub poll_interval: Option<Duration>,
}

impl HandlerContext<'_> {
    /// Waiter with the default delays, honouring `poll_interval`
    pub fn state_change(
        &self,
        pending: &[&str],
        target: &[&str],
        timeout: Duration,
    ) -> StateChangeConf {
        let conf = StateChangeConf::new(pending, target, timeout);
        match self.poll_interval {
            Some(interval) => conf
                .with_delay(Duration::ZERO)
                .with_poll_interval(interval),
            None => conf,
        }
    }

    /// Pause between retries of a rejected call
    pub fn retry_interval(&self) -> Duration {
        self.poll_interval.unwrap_or(DEFAULT_MIN_TIMEOUT)
    }
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Resource type name used in configuration (e.g., "project_vpc")
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Configuration-only attributes the API never reports back; they are
    /// carried from the desired attributes into state.
    fn local_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Create the resource and return its ID
    async fn create(&self, ctx: &HandlerContext<'_>, attrs: &Attributes) -> Result<String>;

    /// Read the resource; a vanished resource surfaces as a 404 error
    async fn read(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<Attributes>;

    /// Update in place and return the (possibly new) ID
    async fn update(&self, ctx: &HandlerContext<'_>, id: &str, attrs: &Attributes)
    -> Result<String>;

    async fn delete(&self, ctx: &HandlerContext<'_>, id: &str) -> Result<()>;
}

/// Returns all resource handlers supported by this provider
pub fn handlers() -> Vec<Box<dyn ResourceHandler>> {
    vec![
        Box::new(account::AccountHandler),
        Box::new(billing_group::BillingGroupHandler),
        Box::new(project::ProjectHandler),
        Box::new(project_vpc::ProjectVpcHandler),
        Box::new(static_ip::StaticIpHandler),
        Box::new(vpc_peering::VpcPeeringHandler::generic()),
        Box::new(vpc_peering::VpcPeeringHandler::aws()),
        Box::new(service::ServiceHandler::new(service::ServiceKind::Pg)),
        Box::new(service::ServiceHandler::new(service::ServiceKind::AlloyDbOmni)),
        Box::new(service::ServiceHandler::new(service::ServiceKind::Valkey)),
        Box::new(service::ServiceHandler::new(service::ServiceKind::Kafka)),
        Box::new(service_user::ServiceUserHandler::new(service_user::UserKind::Generic)),
        Box::new(service_user::ServiceUserHandler::new(service_user::UserKind::Pg)),
        Box::new(service_user::ServiceUserHandler::new(service_user::UserKind::Valkey)),
        Box::new(pg_database::PgDatabaseHandler),
        Box::new(service_integration::ServiceIntegrationHandler),
        Box::new(service_integration_endpoint::ServiceIntegrationEndpointHandler),
        Box::new(kafka_topic::KafkaTopicHandler),
        Box::new(kafka_schema::KafkaSchemaHandler),
    ]
}

/// Resource type definition exposed through the `Provider` trait
pub struct AivenResourceType {
    name: &'static str,
    schema: ResourceSchema,
    data_source: bool,
    local_attributes: &'static [&'static str],
}

impl AivenResourceType {
    pub fn resource(handler: &dyn ResourceHandler) -> Self {
        Self {
            name: handler.type_name(),
            schema: handler.schema(),
            data_source: false,
            local_attributes: handler.local_attributes(),
        }
    }

    pub fn data_source(name: &'static str, schema: ResourceSchema) -> Self {
        Self {
            name,
            schema,
            data_source: true,
            local_attributes: &[],
        }
    }
}

impl ResourceType for AivenResourceType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ResourceSchema {
        self.schema.clone()
    }

    fn is_data_source(&self) -> bool {
        self.data_source
    }

    fn local_attributes(&self) -> &'static [&'static str] {
        self.local_attributes
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Owned pieces of a `HandlerContext` pointed at a mock server
    pub struct TestEnv {
        pub client: AivenClient,
        pub timeouts: Timeouts,
        pub cache: ServicePoweredCache,
    }

    impl TestEnv {
        pub fn new(uri: String) -> Self {
            let short = Duration::from_secs(5);
            Self {
                client: AivenClient::new("test-token").unwrap().with_base_url(uri),
                timeouts: Timeouts {
                    create: short,
                    read: short,
                    update: short,
                    delete: short,
                },
                cache: ServicePoweredCache::new(),
            }
        }

        pub fn ctx(&self) -> HandlerContext<'_> {
            HandlerContext {
                client: &self.client,
                timeouts: &self.timeouts,
                cache: &self.cache,
                poll_interval: Some(Duration::from_millis(1)),
            }
        }
    }

    pub fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }
}
