//! Scopes: isolation boundaries for scoped services and disposal frames
//! for everything created within them.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::analyzer::{AnyArc, Products};
use crate::analyzer::{Ctor, TryCtor};
use crate::container::context::ResolverContext;
use crate::container::ContainerShared;
use crate::error::{DiError, DiResult};
use crate::internal::InstanceTracker;
use crate::key::Key;
use crate::registry::ProviderId;
use crate::traits::dispose::DisposerFn;
use crate::traits::resolver::ResolverCore;

pub(crate) const STATE_ACTIVE: u8 = 0;
pub(crate) const STATE_DISPOSING: u8 = 1;
pub(crate) const STATE_DISPOSED: u8 = 2;

/// Opaque per-scope context supplied by the caller at scope creation.
///
/// Carries an optional application value (request id, trace context, a
/// deadline) that constructors and disposal hooks can read through
/// [`ResolverContext::context`]. The handle is cheap to clone. Creating a
/// scope stashes a backref on the context, so integration layers that
/// thread the context through their stack can recover the scope with
/// [`Scope::from_context`].
///
/// # Examples
///
/// ```rust
/// use armature_di::{Context, Scope, ServiceCollection};
///
/// let container = ServiceCollection::new().build().unwrap();
/// let ctx = Context::with_value("request-42".to_string());
/// let scope = container.create_scope(ctx.clone()).unwrap();
///
/// assert_eq!(*ctx.value::<String>().unwrap(), "request-42");
/// let recovered = Scope::from_context(&ctx).unwrap();
/// assert_eq!(recovered.id(), scope.id());
/// ```
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Default)]
struct ContextInner {
    value: Option<AnyArc>,
    scope: Mutex<Option<Weak<ScopeInner>>>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying an application value.
    pub fn with_value<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                value: Some(Arc::new(value)),
                scope: Mutex::new(None),
            }),
        }
    }

    /// The carried value, if it has type `T`.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .value
            .clone()
            .and_then(|any| any.downcast::<T>().ok())
    }

    // The scope most recently created from this context wins.
    pub(crate) fn attach(&self, scope: &Arc<ScopeInner>) {
        *self.inner.scope.lock() = Some(Arc::downgrade(scope));
    }

    pub(crate) fn attached(&self) -> Option<Arc<ScopeInner>> {
        self.inner.scope.lock().as_ref().and_then(Weak::upgrade)
    }
}

pub(crate) struct ScopeInner {
    pub(crate) id: u64,
    pub(crate) shared: Arc<ContainerShared>,
    pub(crate) parent: Option<Weak<ScopeInner>>,
    pub(crate) context: Context,
    pub(crate) state: AtomicU8,
    /// Per-provider single-flight cells for cached lifetimes.
    pub(crate) cells: Mutex<HashMap<ProviderId, Arc<OnceCell<Arc<Products>>>, ahash::RandomState>>,
    pub(crate) tracker: InstanceTracker,
    /// Children are held strongly until they are disposed, so closing a
    /// parent reliably closes everything beneath it.
    pub(crate) children: Mutex<Vec<Arc<ScopeInner>>>,
}

impl ScopeInner {
    pub(crate) fn new_root(shared: Arc<ContainerShared>, context: Context) -> Arc<Self> {
        Arc::new(Self {
            id: 0,
            shared,
            parent: None,
            context,
            state: AtomicU8::new(STATE_ACTIVE),
            cells: Mutex::new(HashMap::with_hasher(ahash::RandomState::new())),
            tracker: InstanceTracker::new(),
            children: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn ensure_active(&self) -> DiResult<()> {
        if self.shared.is_disposed() {
            return Err(DiError::ContainerDisposed);
        }
        if self.state.load(Ordering::Acquire) != STATE_ACTIVE {
            return Err(DiError::ScopeDisposed);
        }
        Ok(())
    }

    pub(crate) fn create_child(self: Arc<Self>, context: Context) -> DiResult<Arc<ScopeInner>> {
        self.ensure_active()?;
        let child = Arc::new(ScopeInner {
            id: self.shared.next_scope_id(),
            shared: self.shared.clone(),
            parent: Some(Arc::downgrade(&self)),
            context: context.clone(),
            state: AtomicU8::new(STATE_ACTIVE),
            cells: Mutex::new(HashMap::with_hasher(ahash::RandomState::new())),
            tracker: InstanceTracker::new(),
            children: Mutex::new(Vec::new()),
        });
        context.attach(&child);
        self.children.lock().push(child.clone());
        Ok(child)
    }

    /// Closes the scope: children first (newest-first, depth-first), then
    /// tracked instances in reverse creation order. Closing an already
    /// closed scope is a no-op.
    pub(crate) fn close(&self) -> DiResult<()> {
        if self
            .state
            .compare_exchange(
                STATE_ACTIVE,
                STATE_DISPOSING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        let mut failures = Vec::new();

        let children: Vec<Arc<ScopeInner>> = {
            let mut children = self.children.lock();
            children.drain(..).collect()
        };
        for child in children.iter().rev() {
            if let Err(DiError::Disposal(mut errs)) = child.close() {
                failures.append(&mut errs);
            }
        }

        failures.extend(self.tracker.dispose_all(&self.shared.observers));
        self.state.store(STATE_DISPOSED, Ordering::Release);

        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.children.lock().retain(|c| c.id != self.id);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::Disposal(failures))
        }
    }

    pub(crate) fn track_instance(
        &self,
        key: Key,
        instance: AnyArc,
        disposer: DisposerFn,
    ) -> DiResult<()> {
        self.ensure_active()?;
        self.tracker.track(key, instance, disposer);
        Ok(())
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) != STATE_DISPOSED && !self.tracker.is_empty() {
            tracing::warn!(
                scope = self.id,
                "scope dropped with undisposed instances; call close() first"
            );
        }
    }
}

/// An isolation boundary for scoped services and the disposal frame for
/// everything created within it.
///
/// Scoped services are cached per scope; transients created through the
/// scope are tracked here for disposal; singletons pass through to the
/// root. Scopes nest arbitrarily: closing a parent closes its children,
/// newest first, before the parent's own instances are disposed in
/// reverse creation order.
///
/// # Examples
///
/// ```rust
/// use armature_di::{Context, Lifetime, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Session;
///
/// let mut services = ServiceCollection::new();
/// services.add(Lifetime::Scoped, || Session);
///
/// let container = services.build().unwrap();
/// let scope_a = container.create_scope(Context::new()).unwrap();
/// let scope_b = container.create_scope(Context::new()).unwrap();
///
/// let a = scope_a.get::<Session>().unwrap();
/// let b = scope_b.get::<Session>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &b)); // isolated per scope
///
/// scope_a.close().unwrap();
/// assert!(scope_a.get::<Session>().is_err());
/// ```
pub struct Scope {
    pub(crate) inner: Arc<ScopeInner>,
}

impl Scope {
    /// Identifier of this scope, unique within its container.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The context supplied when the scope was created.
    pub fn context(&self) -> &Context {
        self.inner.context()
    }

    /// Whether the scope has been closed.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != STATE_ACTIVE
    }

    /// Creates a child scope carrying the given context.
    pub fn create_scope(&self, context: Context) -> DiResult<Scope> {
        Ok(Scope {
            inner: self.inner.clone().create_child(context)?,
        })
    }

    /// Closes the scope, disposing children and tracked instances.
    /// Disposal failures are aggregated; remaining hooks still run.
    /// Closing twice is a no-op.
    pub fn close(&self) -> DiResult<()> {
        self.inner.close()
    }

    /// Recovers the scope most recently created from `context`.
    pub fn from_context(context: &Context) -> Option<Scope> {
        context.attached().map(|inner| Scope { inner })
    }

    /// Resolves the function's declared dependencies and calls it.
    pub fn invoke<M, C: Ctor<M>>(&self, function: C) -> DiResult<C::Output> {
        self.inner.ensure_active()?;
        let cx = ResolverContext::new(&self.inner);
        function.call(&cx)
    }

    /// Like [`invoke`](Self::invoke), for fallible functions; the
    /// function's own error is propagated as [`DiError::Resolution`].
    pub fn invoke_try<M, C: TryCtor<M>>(&self, function: C) -> DiResult<C::Output> {
        self.inner.ensure_active()?;
        let cx = ResolverContext::new(&self.inner);
        function.call(&cx)
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ResolverCore for Scope {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.inner.resolve_key(key)
    }

    fn resolve_group_any(
        &self,
        elem: TypeId,
        elem_name: &'static str,
        group: &'static str,
    ) -> DiResult<Vec<AnyArc>> {
        self.inner.resolve_group(elem, elem_name, group)
    }

    fn track_instance(&self, key: Key, instance: AnyArc, disposer: DisposerFn) -> DiResult<()> {
        self.inner.track_instance(key, instance, disposer)
    }
}
