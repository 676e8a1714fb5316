//! Error types for the dependency injection container.

use std::time::Duration;

use crate::key::Key;
use crate::lifetime::Lifetime;

/// Boxed error type carried by constructor failures and disposal hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependency injection errors.
///
/// Every failure mode of registration, build, resolution, and disposal is
/// a distinct kind so callers can match on it. Errors are surfaced, never
/// logged-and-swallowed; wrapping preserves the causal chain.
///
/// # Examples
///
/// ```rust
/// use armature_di::{DiError, Resolver, ServiceCollection};
///
/// let container = ServiceCollection::new().build().unwrap();
/// match container.get::<String>() {
///     Err(DiError::NotFound { type_name, .. }) => {
///         assert_eq!(type_name, "alloc::string::String");
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DiError {
    /// No provider is registered for the requested type and key.
    #[error("service not found: {type_name}{}", fmt_key(.key))]
    NotFound {
        type_name: &'static str,
        key: Option<&'static str>,
    },

    /// A resolved value could not be downcast to the requested type.
    #[error("type mismatch for: {0}")]
    TypeMismatch(&'static str),

    /// Circular dependency detected, with the full cycle path.
    #[error("circular dependency: {}", fmt_path(.path))]
    Circular { path: Vec<Key> },

    /// A provider captures a dependency with a shorter lifetime.
    #[error("lifetime conflict: {lifetime} {service} cannot depend on {dependency_lifetime} {dependency}")]
    LifetimeConflict {
        service: &'static str,
        lifetime: Lifetime,
        dependency: &'static str,
        dependency_lifetime: Lifetime,
    },

    /// A registration failed a build-time shape or resolvability check.
    #[error("invalid registration for {service}: {reason}")]
    Validation {
        service: &'static str,
        reason: String,
    },

    /// A constructor failed while producing a service.
    #[error("failed to construct {type_name}{}: {source}", fmt_key(.key))]
    Resolution {
        type_name: &'static str,
        key: Option<&'static str>,
        #[source]
        source: BoxError,
    },

    /// One or more disposal hooks failed while closing a scope. The
    /// remaining hooks still ran.
    #[error("{} disposal hook(s) failed", .0.len())]
    Disposal(Vec<DisposalFailure>),

    /// A provider is already registered under the same type and key.
    #[error("duplicate registration: {type_name}{}", fmt_key(.key))]
    DuplicateRegistration {
        type_name: &'static str,
        key: Option<&'static str>,
    },

    /// The container has been closed.
    #[error("container is disposed")]
    ContainerDisposed,

    /// The scope has been closed.
    #[error("scope is disposed")]
    ScopeDisposed,

    /// The container is already built; registrations are frozen.
    #[error("container is already built")]
    ContainerAlreadyBuilt,

    /// Building the container exceeded the configured timeout.
    #[error("container build timed out after {0:?}")]
    BuildTimeout(Duration),

    /// The resolution chain exceeded the maximum recursion depth.
    #[error("max resolution depth {0} exceeded")]
    DepthExceeded(usize),
}

/// A single failed disposal hook, collected into [`DiError::Disposal`].
#[derive(Debug)]
pub struct DisposalFailure {
    /// Type name of the instance whose hook failed.
    pub type_name: &'static str,
    /// The error the hook returned.
    pub source: BoxError,
}

fn fmt_key(key: &Option<&'static str>) -> String {
    match key {
        Some(k) => format!(" (key {:?})", k),
        None => String::new(),
    }
}

fn fmt_path(path: &[Key]) -> String {
    path.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for DI operations.
pub type DiResult<T> = Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_display_shows_path() {
        let err = DiError::Circular {
            path: vec![Key::of::<u32>(), Key::of::<u64>(), Key::of::<u32>()],
        };
        let msg = err.to_string();
        assert!(msg.contains("u32 -> u64 -> u32"));
    }

    #[test]
    fn not_found_display_includes_key() {
        let err = DiError::NotFound {
            type_name: "Cache",
            key: Some("redis"),
        };
        assert!(err.to_string().contains("redis"));
    }

    #[test]
    fn lifetime_conflict_names_both_sides() {
        let err = DiError::LifetimeConflict {
            service: "Cache",
            lifetime: Lifetime::Singleton,
            dependency: "ScopedCtx",
            dependency_lifetime: Lifetime::Scoped,
        };
        let msg = err.to_string();
        assert!(msg.contains("Cache"));
        assert!(msg.contains("ScopedCtx"));
        assert!(msg.contains("singleton"));
        assert!(msg.contains("scoped"));
    }

    #[test]
    fn resolution_preserves_source() {
        use std::error::Error;
        let err = DiError::Resolution {
            type_name: "Db",
            key: None,
            source: "connection refused".into(),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("connection refused"));
    }
}
