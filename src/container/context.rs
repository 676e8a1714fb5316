//! Resolver context handed to factories and decorators.

use std::any::TypeId;

use crate::analyzer::AnyArc;
use crate::container::scope::{Context, ScopeInner};
use crate::error::DiResult;
use crate::key::Key;
use crate::traits::dispose::DisposerFn;
use crate::traits::resolver::ResolverCore;

/// Context passed to constructors, factories, and decorators.
///
/// Wraps the scope a resolution originated in, so dependencies resolved
/// from inside a constructor land in the right caches, and exposes the
/// scope's [`Context`] to user code. The full [`Resolver`] API is
/// available through the blanket impl.
///
/// [`Resolver`]: crate::Resolver
///
/// # Examples
///
/// ```rust
/// use armature_di::{Lifetime, Resolver, ResolverContext, ServiceCollection};
///
/// struct Config {
///     url: String,
/// }
/// struct Client {
///     url: String,
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add_instance(Config {
///     url: "postgres://localhost".to_string(),
/// });
/// // Manual factory style: dependencies resolved through the context.
/// services.add_factory(Lifetime::Singleton, |cx: &ResolverContext<'_>| Client {
///     url: cx.get_required::<Config>().url.clone(),
/// });
///
/// let container = services.build().unwrap();
/// assert_eq!(container.get::<Client>().unwrap().url, "postgres://localhost");
/// ```
pub struct ResolverContext<'a> {
    scope: &'a ScopeInner,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(scope: &'a ScopeInner) -> Self {
        Self { scope }
    }

    /// The context attached to the scope this resolution runs in.
    pub fn context(&self) -> &Context {
        self.scope.context()
    }
}

impl ResolverCore for ResolverContext<'_> {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.scope.resolve_key(key)
    }

    fn resolve_group_any(
        &self,
        elem: TypeId,
        elem_name: &'static str,
        group: &'static str,
    ) -> DiResult<Vec<AnyArc>> {
        self.scope.resolve_group(elem, elem_name, group)
    }

    fn track_instance(&self, key: Key, instance: AnyArc, disposer: DisposerFn) -> DiResult<()> {
        self.scope.track_instance(key, instance, disposer)
    }
}
