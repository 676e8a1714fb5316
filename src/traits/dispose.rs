//! Disposal trait for resource cleanup.

use std::sync::Arc;

use crate::analyzer::AnyArc;
use crate::error::BoxError;

/// Trait for structured teardown of services.
///
/// Implement this for services that hold resources (connections, file
/// handles, flushable caches). When the owning scope closes, the hooks of
/// its tracked instances run in reverse creation order; a failing hook is
/// recorded and the remaining hooks still run.
///
/// Disposal is opt-in at registration: mark the provider with
/// [`disposable`](crate::ProviderOptions::disposable), tag a result-object
/// field `#[di(disposable)]`, or hand an already-built instance to
/// [`Resolver::register_disposer`](crate::Resolver::register_disposer)
/// from inside a factory.
///
/// # Examples
///
/// ```rust
/// use armature_di::{Dispose, BoxError};
///
/// struct Connection {
///     addr: String,
/// }
///
/// impl Dispose for Connection {
///     fn dispose(&self) -> Result<(), BoxError> {
///         // Flush and close the connection.
///         Ok(())
///     }
/// }
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Performs cleanup. Errors are aggregated by the closing scope.
    fn dispose(&self) -> Result<(), BoxError>;
}

/// Type-erased disposal hook stored next to a tracked instance.
pub type DisposerFn = Arc<dyn Fn(&AnyArc) -> Result<(), BoxError> + Send + Sync>;

/// Builds the erased disposal hook for a disposable service type.
#[doc(hidden)]
pub fn disposer_for<T: Dispose>() -> DisposerFn {
    Arc::new(|any: &AnyArc| match any.downcast_ref::<T>() {
        Some(value) => value.dispose(),
        None => Ok(()),
    })
}
