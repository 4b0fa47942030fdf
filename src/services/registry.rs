//! Registries of collaborator handles.
//!
//! Both registries are filled before the first run and only read
//! afterwards; engines share them behind `Arc`s.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ResourceTier;
use crate::domain::ports::{Resource, Tool};

/// Resource handles keyed by tier.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    resources: HashMap<ResourceTier, Arc<dyn Resource>>,
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self
            .resources
            .iter()
            .map(|(tier, r)| (tier.as_str(), r.name().to_string()))
            .collect();
        entries.sort();
        f.debug_struct("ResourceRegistry").field("resources", &entries).finish()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register both tiers at once.
    pub fn with_tiers(think: Arc<dyn Resource>, default: Arc<dyn Resource>) -> Self {
        let mut registry = Self::new();
        registry.register(ResourceTier::Think, think);
        registry.register(ResourceTier::Default, default);
        registry
    }

    /// Register or replace the handle for a tier.
    pub fn register(&mut self, tier: ResourceTier, resource: Arc<dyn Resource>) {
        self.resources.insert(tier, resource);
    }

    pub fn get(&self, tier: ResourceTier) -> Option<Arc<dyn Resource>> {
        self.resources.get(&tier).cloned()
    }

    /// Look up a tier, failing with a configuration error when unregistered.
    pub fn require(&self, tier: ResourceTier) -> DomainResult<Arc<dyn Resource>> {
        self.get(tier)
            .ok_or_else(|| DomainError::ResourceNotRegistered(tier.as_str().to_string()))
    }

    pub fn contains(&self, tier: ResourceTier) -> bool {
        self.resources.contains_key(&tier)
    }
}

/// Tool handles keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Register every entry of a name → tool map, replacing existing names.
    pub fn extend(&mut self, tools: HashMap<String, Arc<dyn Tool>>) {
        self.tools.extend(tools);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up a tool, failing with a configuration error when unregistered.
    pub fn require(&self, name: &str) -> DomainResult<Arc<dyn Tool>> {
        self.get(name)
            .ok_or_else(|| DomainError::ToolNotRegistered(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
