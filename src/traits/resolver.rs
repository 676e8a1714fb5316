//! Resolver traits for service resolution.

use std::any::TypeId;
use std::sync::Arc;

use crate::analyzer::AnyArc;
use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::traits::dispose::{disposer_for, Dispose, DisposerFn};

/// Core resolver trait for object-safe service resolution.
///
/// Implemented by [`Container`](crate::Container), [`Scope`](crate::Scope),
/// and [`ResolverContext`](crate::ResolverContext). Most callers should use
/// the generic methods on [`Resolver`] instead; this trait carries the
/// type-erased plumbing they are built on.
pub trait ResolverCore: Send + Sync {
    /// Resolves a single service by key.
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc>;

    /// Resolves every member of a group in registration order.
    ///
    /// `elem` is the element type of the group, not a slice type. An
    /// unregistered group resolves to an empty vector, not an error.
    fn resolve_group_any(
        &self,
        elem: TypeId,
        elem_name: &'static str,
        group: &'static str,
    ) -> DiResult<Vec<AnyArc>>;

    /// Tracks an instance for disposal by the resolver's owning scope.
    #[doc(hidden)]
    fn track_instance(&self, key: Key, instance: AnyArc, disposer: DisposerFn) -> DiResult<()>;
}

/// High-level resolver interface with type-safe generic methods.
///
/// Blanket-implemented for every [`ResolverCore`], so containers, scopes,
/// and the contexts handed to factories all expose the same API.
///
/// # Examples
///
/// ```rust
/// use armature_di::{Resolver, ServiceCollection};
///
/// struct Config {
///     port: u16,
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add_instance(Config { port: 8080 });
///
/// let container = services.build().unwrap();
/// let config = container.get::<Config>().unwrap();
/// assert_eq!(config.port, 8080);
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves a service by type.
    fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let any = self.resolve_any(&Key::of::<T>())?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a service registered under the given key.
    fn get_keyed<T: Send + Sync + 'static>(&self, key: &'static str) -> DiResult<Arc<T>> {
        let any = self.resolve_any(&Key::keyed::<T>(key))?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves all members of the named group, in registration order.
    ///
    /// A group with zero members resolves to an empty vector.
    fn get_group<T: Send + Sync + 'static>(&self, group: &'static str) -> DiResult<Vec<Arc<T>>> {
        let anys =
            self.resolve_group_any(TypeId::of::<T>(), std::any::type_name::<T>(), group)?;
        let mut out = Vec::with_capacity(anys.len());
        for any in anys {
            let arc = any
                .downcast::<T>()
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))?;
            out.push(arc);
        }
        Ok(out)
    }

    /// Resolves a service if registered, `None` when no provider exists.
    ///
    /// A missing provider yields `None`; a provider whose constructor
    /// fails still propagates the error.
    fn get_optional<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.get::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(DiError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolves a keyed service if registered, `None` when no provider
    /// exists under the key.
    fn get_keyed_optional<T: Send + Sync + 'static>(
        &self,
        key: &'static str,
    ) -> DiResult<Option<Arc<T>>> {
        match self.get_keyed::<T>(key) {
            Ok(value) => Ok(Some(value)),
            Err(DiError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolves a service by type, panicking on failure.
    ///
    /// # Panics
    ///
    /// Panics if the service cannot be resolved. Use this for services
    /// that are known to be registered, where failure is a programming
    /// error rather than a runtime condition.
    fn get_required<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.get::<T>().unwrap_or_else(|e| {
            panic!("failed to resolve {}: {}", std::any::type_name::<T>(), e)
        })
    }

    /// Resolves a keyed service, panicking on failure.
    fn get_keyed_required<T: Send + Sync + 'static>(&self, key: &'static str) -> Arc<T> {
        self.get_keyed::<T>(key).unwrap_or_else(|e| {
            panic!(
                "failed to resolve {} (key {:?}): {}",
                std::any::type_name::<T>(),
                key,
                e
            )
        })
    }

    /// Registers an already-built instance for disposal when the owning
    /// scope closes.
    ///
    /// Intended for factories that construct resources the container does
    /// not see, mirroring the tracking applied to
    /// [`disposable`](crate::ProviderOptions::disposable) registrations.
    fn register_disposer<T: Dispose>(&self, instance: Arc<T>) {
        let any: AnyArc = instance;
        // Scope-disposed failures here mean the scope raced its own close;
        // the instance is the caller's to clean up in that case.
        let _ = self.track_instance(Key::of::<T>(), any, disposer_for::<T>());
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}
