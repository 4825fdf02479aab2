//! State file structures for persisting managed resources

use std::collections::{HashMap, HashSet};

use aivenctl_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage
    pub lineage: String,
    /// Version of aivenctl that last modified this state
    pub aivenctl_version: String,
    /// All managed resources and their last known state
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            aivenctl_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and record the current version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.aivenctl_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    fn find_resource_mut(&mut self, resource_type: &str, name: &str) -> Option<&mut ResourceState> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource in the state. Recorded dependencies are kept
    /// when the new entry carries none.
    pub fn upsert_resource(&mut self, mut resource: ResourceState) {
        if let Some(existing) = self.find_resource_mut(&resource.resource_type, &resource.name) {
            if resource.dependencies.is_empty() {
                resource.dependencies = std::mem::take(&mut existing.dependencies);
            }
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// Replace the recorded dependencies of a resource
    pub fn set_dependencies(&mut self, resource_type: &str, name: &str, dependencies: Vec<String>) {
        if let Some(existing) = self.find_resource_mut(resource_type, name) {
            existing.dependencies = dependencies;
        }
    }

    /// Resources in the order they can be deleted: dependents before the
    /// resources they depend on, otherwise newest first
    pub fn removal_order(&self) -> Vec<&ResourceState> {
        fn visit<'a>(
            index: usize,
            resources: &'a [ResourceState],
            visited: &mut HashSet<usize>,
            sorted: &mut Vec<&'a ResourceState>,
        ) {
            if !visited.insert(index) {
                return;
            }
            let resource = &resources[index];
            for dep in &resource.dependencies {
                if let Some(dep_index) = resources.iter().position(|r| &r.name == dep) {
                    visit(dep_index, resources, visited, sorted);
                }
            }
            sorted.push(resource);
        }

        let mut visited = HashSet::new();
        let mut sorted = Vec::new();
        for index in 0..self.resources.len() {
            visit(index, &self.resources, &mut visited, &mut sorted);
        }
        sorted.reverse();
        sorted
    }

    /// Remove a resource from the state
    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "pg", "kafka_topic")
    pub resource_type: String,
    /// Binding name from the configuration
    pub name: String,
    /// Provider name (e.g., "aiven")
    pub provider: String,
    /// Slash-joined Aiven identifier (e.g., "my-project/my-pg")
    pub identifier: String,
    /// All attributes of the resource as JSON values
    pub attributes: HashMap<String, serde_json::Value>,
    /// Binding names this resource referenced when it was last applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl ResourceState {
    /// Create a new resource state
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: identifier.into(),
            attributes: HashMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Set an attribute value
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Record a provider state. Returns `None` for states without an identifier.
    pub fn from_state(state: &State, provider: &str) -> Option<Self> {
        let identifier = state.identifier.as_ref()?;
        let mut resource = Self::new(
            &state.id.resource_type,
            &state.id.name,
            provider,
            identifier,
        );
        resource.attributes = state
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Some(resource)
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    /// The recorded state as the provider last returned it
    pub fn to_state(&self) -> State {
        let attributes: HashMap<String, Value> = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        State::existing(self.resource_id(), attributes).with_identifier(&self.identifier)
    }
}
