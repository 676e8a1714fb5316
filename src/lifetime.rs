//! Service lifetime definitions.

/// Service lifetimes controlling instance caching and disposal behavior.
///
/// # Lifetime Characteristics
///
/// - **Singleton**: one instance per container, shared by every scope
/// - **Scoped**: one instance per scope, isolated between scopes
/// - **Transient**: a fresh instance per resolution, never cached
///
/// A dependency must live at least as long as its consumer: a Singleton
/// may only depend on Singletons, a Scoped service on Singletons or
/// Scoped services. Violations are rejected when the container is built.
///
/// # Examples
///
/// ```rust
/// use armature_di::{ServiceCollection, Resolver, Lifetime, Context};
/// use std::sync::Arc;
///
/// struct Database;
/// struct Session;
///
/// let mut services = ServiceCollection::new();
/// services.add(Lifetime::Singleton, || Database);
/// services.add(Lifetime::Scoped, |_db: Arc<Database>| Session);
///
/// let container = services.build().unwrap();
/// let scope = container.create_scope(Context::new()).unwrap();
///
/// let a = scope.get::<Session>().unwrap();
/// let b = scope.get::<Session>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b)); // Same scope, same instance
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Single instance per container, created in the root scope and
    /// reused for all resolutions.
    Singleton,
    /// Single instance per scope, cached for the scope's lifetime.
    Scoped,
    /// New instance per resolution; still tracked by the requesting
    /// scope for disposal.
    Transient,
}

impl Lifetime {
    // Singleton outlives Scoped outlives Transient.
    pub(crate) fn rank(self) -> u8 {
        match self {
            Lifetime::Singleton => 2,
            Lifetime::Scoped => 1,
            Lifetime::Transient => 0,
        }
    }

    /// Whether a dependency with this lifetime may be captured by a
    /// consumer with lifetime `consumer`.
    pub(crate) fn satisfies(self, consumer: Lifetime) -> bool {
        self.rank() >= consumer.rank()
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        };
        f.write_str(s)
    }
}
