//! aivenctl Aiven Provider
//!
//! Aiven REST API provider implementation.
//!
//! ## Module Structure
//!
//! - `client` - Authenticated HTTP client for the Aiven API
//! - `errors` - Error type and not-found / conflict classification
//! - `waiter` - Polling until a remote state settles, and retries
//! - `cache` - Memoised service power state
//! - `schemautil` - IDs, attribute helpers and DTO <-> attribute conversion
//! - `resources` - Resource handlers, one module per resource type
//! - `data_sources` - Read-only lookups
//! - `provider` - AivenProvider implementation

pub mod cache;
pub mod client;
pub mod data_sources;
pub mod errors;
pub mod provider;
pub mod resources;
pub mod schemautil;
pub mod waiter;

// Re-export main types
pub use client::AivenClient;
pub use errors::AivenError;
pub use provider::AivenProvider;
pub use schemautil::Timeouts;

use aivenctl_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use aivenctl_core::resource::{Resource, ResourceId, State};

use data_sources::DataSourceKind;
use resources::{AivenResourceType, handlers};

/// Every resource type and data source this provider supports. Needs no
/// credentials, so configurations can be validated offline.
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    let resources = handlers()
        .into_iter()
        .map(|h| Box::new(AivenResourceType::resource(h.as_ref())) as Box<dyn ResourceType>);
    let data_sources = DataSourceKind::all().into_iter().map(|kind| {
        Box::new(AivenResourceType::data_source(kind.type_name(), kind.schema()))
            as Box<dyn ResourceType>
    });
    resources.chain(data_sources).collect()
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AivenProvider {
    fn name(&self) -> &'static str {
        "aiven"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        crate::resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(&id, &identifier, false).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_resource(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
