//! Aiven provider implementation
//!
//! Dispatches resource operations to the per-type handlers and turns their
//! attribute maps into `State`s.

use std::time::Duration;

use aivenctl_core::provider::{ProviderError, ProviderResult};
use aivenctl_core::resource::{Resource, ResourceId, State};

use crate::cache::ServicePoweredCache;
use crate::client::AivenClient;
use crate::data_sources::DataSourceKind;
use crate::errors::read_handle_not_found;
use crate::resources::{HandlerContext, ResourceHandler, handlers};
use crate::schemautil::Timeouts;

/// Aiven Provider
pub struct AivenProvider {
    client: AivenClient,
    timeouts: Timeouts,
    cache: ServicePoweredCache,
    handlers: Vec<Box<dyn ResourceHandler>>,
    poll_interval: Option<Duration>,
}

impl AivenProvider {
    pub fn new(client: AivenClient, timeouts: Timeouts) -> Self {
        Self {
            client,
            timeouts,
            cache: ServicePoweredCache::new(),
            handlers: handlers(),
            poll_interval: None,
        }
    }

    /// Poll waiters at a fixed interval instead of backing off
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn ctx(&self) -> HandlerContext<'_> {
        HandlerContext {
            client: &self.client,
            timeouts: &self.timeouts,
            cache: &self.cache,
            poll_interval: self.poll_interval,
        }
    }

    fn handler(&self, id: &ResourceId) -> ProviderResult<&dyn ResourceHandler> {
        self.handlers
            .iter()
            .find(|h| h.type_name() == id.resource_type)
            .map(|h| h.as_ref())
            .ok_or_else(|| {
                ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                    .for_resource(id.clone())
            })
    }

    /// Read a resource by its Aiven ID. A vanished resource is `not_found`
    /// unless it was just written, in which case the error stands.
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        is_new: bool,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;
        let read = handler.read(&self.ctx(), identifier).await;
        match read_handle_not_found(read, is_new) {
            Ok(Some(attributes)) => {
                Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
            }
            Ok(None) => {
                log::debug!("{} ({}) is gone", id, identifier);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(ProviderError::from(e).for_resource(id.clone())),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let handler = self.handler(&resource.id)?;
        let mut attributes = resource.attributes.clone();
        handler.schema().apply_defaults(&mut attributes);

        log::info!("creating {}", resource.id);
        let identifier = handler
            .create(&self.ctx(), &attributes)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(resource.id.clone()))?;

        let state = self.read_resource(&resource.id, &identifier, true).await?;
        Ok(state.carry_attributes(&attributes, handler.local_attributes()))
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;
        let mut attributes = to.attributes.clone();
        handler.schema().apply_defaults(&mut attributes);

        log::info!("updating {} ({})", id, identifier);
        let identifier = handler
            .update(&self.ctx(), identifier, &attributes)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        let state = self.read_resource(id, &identifier, true).await?;
        Ok(state.carry_attributes(&attributes, handler.local_attributes()))
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let handler = self.handler(id)?;
        log::info!("deleting {} ({})", id, identifier);
        handler
            .delete(&self.ctx(), identifier)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))
    }

    pub async fn read_data_source_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let kind = DataSourceKind::from_type_name(&resource.id.resource_type).ok_or_else(|| {
            ProviderError::new(format!(
                "Unknown data source type: {}",
                resource.id.resource_type
            ))
            .for_resource(resource.id.clone())
        })?;

        let (identifier, attributes) = kind
            .read(&self.ctx(), &resource.attributes)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(resource.id.clone()))?;
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
    }
}
