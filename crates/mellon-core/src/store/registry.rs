//! Serializer registry for choosing a store format by name

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use super::serializer::{JsonSerializer, Serializer, YamlSerializer};

/// Factory function type for creating serializers
pub type SerializerFactory = Box<dyn Fn() -> Arc<dyn Serializer> + Send + Sync>;

/// Definition of a registered serializer
pub struct SerializerDefinition {
    /// Unique name for this serializer
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Factory function to create instances
    pub factory: SerializerFactory,
}

impl std::fmt::Debug for SerializerDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Global registry of serializers
static REGISTRY: Lazy<RwLock<HashMap<String, SerializerDefinition>>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert(
        "yaml".to_string(),
        SerializerDefinition {
            name: "yaml".to_string(),
            description: "YAML document (default)".to_string(),
            factory: Box::new(|| Arc::new(YamlSerializer)),
        },
    );

    map.insert(
        "json".to_string(),
        SerializerDefinition {
            name: "json".to_string(),
            description: "Single-line JSON object".to_string(),
            factory: Box::new(|| Arc::new(JsonSerializer)),
        },
    );

    RwLock::new(map)
});

/// Register a serializer under `name`, replacing any previous one
///
/// # Example
///
/// ```
/// use mellon_core::store::{register_serializer, create_serializer, JsonSerializer};
/// use std::sync::Arc;
///
/// register_serializer("compact", "Alias for JSON", Box::new(|| Arc::new(JsonSerializer)));
/// assert!(create_serializer("compact").is_some());
/// ```
pub fn register_serializer(name: &str, description: &str, factory: SerializerFactory) {
    let mut registry = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    registry.insert(
        name.to_string(),
        SerializerDefinition {
            name: name.to_string(),
            description: description.to_string(),
            factory,
        },
    );
}

/// Create a serializer by name, or `None` if the name is not registered
pub fn create_serializer(name: &str) -> Option<Arc<dyn Serializer>> {
    let registry = REGISTRY.read().unwrap_or_else(|e| e.into_inner());
    registry.get(name).map(|def| (def.factory)())
}

/// All registered serializers as (name, description) pairs, sorted by name
pub fn list_serializers() -> Vec<(String, String)> {
    let registry = REGISTRY.read().unwrap_or_else(|e| e.into_inner());
    let mut list: Vec<_> = registry
        .values()
        .map(|def| (def.name.clone(), def.description.clone()))
        .collect();
    list.sort();
    list
}

/// Unregister a serializer (mainly for testing)
pub fn unregister_serializer(name: &str) -> bool {
    let mut registry = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    registry.remove(name).is_some()
}
