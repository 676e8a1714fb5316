//! Service descriptors for introspection and diagnostics.

use crate::key::Key;
use crate::lifetime::Lifetime;

/// Metadata about one registered provider.
///
/// Useful for debugging container configuration, asserting registrations
/// in tests, and generating documentation of the service graph.
///
/// # Examples
///
/// ```rust
/// use armature_di::{Lifetime, ServiceCollection};
///
/// struct Config;
///
/// let mut services = ServiceCollection::new();
/// services.add(Lifetime::Singleton, || Config);
///
/// let descriptors = services.descriptors();
/// assert_eq!(descriptors.len(), 1);
/// assert_eq!(descriptors[0].lifetime, Lifetime::Singleton);
/// assert!(descriptors[0].type_name().contains("Config"));
/// ```
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Primary service identity.
    pub key: Key,
    /// Registered lifetime.
    pub lifetime: Lifetime,
    /// Groups the provider contributes to.
    pub groups: Vec<&'static str>,
    /// Whether the constructor can fail.
    pub fallible: bool,
}

impl ServiceDescriptor {
    /// The type name of the primary service.
    pub fn type_name(&self) -> &'static str {
        self.key.display_name()
    }

    /// The service key for keyed registrations.
    pub fn service_key(&self) -> Option<&'static str> {
        self.key.service_key()
    }

    /// Whether this is a keyed registration.
    pub fn is_keyed(&self) -> bool {
        self.service_key().is_some()
    }
}
