//! The built container: frozen registry and graph, root scope, and the
//! resolution engine.

pub mod context;
pub mod scope;

mod resolve;

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::analyzer::{Analyzer, AnyArc};
use crate::analyzer::{Ctor, TryCtor};
use crate::container::context::ResolverContext;
use crate::container::scope::{Context, Scope, ScopeInner};
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult};
use crate::graph::DependencyGraph;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::observer::Observers;
use crate::registry::Registry;
use crate::traits::dispose::DisposerFn;
use crate::traits::resolver::ResolverCore;

pub(crate) struct ContainerShared {
    pub(crate) registry: Registry,
    pub(crate) graph: RwLock<DependencyGraph>,
    pub(crate) analyzer: Analyzer,
    pub(crate) observers: Observers,
    disposed: AtomicBool,
    scope_ids: AtomicU64,
    root: OnceCell<Weak<ScopeInner>>,
}

impl ContainerShared {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn next_scope_id(&self) -> u64 {
        self.scope_ids.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn root_scope(&self) -> Option<Arc<ScopeInner>> {
        self.root.get().and_then(Weak::upgrade)
    }
}

/// The assembled dependency injection container.
///
/// Owns the provider registry, the dependency graph, and the root scope
/// (which holds every singleton). Cheap to clone and safe to share
/// across threads. Obtained from [`ServiceCollection::build`]; resolving
/// directly on the container uses the root scope, request-style work
/// should go through [`create_scope`](Container::create_scope).
///
/// [`ServiceCollection::build`]: crate::ServiceCollection::build
///
/// # Examples
///
/// ```rust
/// use armature_di::{Context, Lifetime, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Logger;
/// struct Db {
///     logger: Arc<Logger>,
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add(Lifetime::Singleton, || Logger);
/// services.add(Lifetime::Singleton, |logger: Arc<Logger>| Db { logger });
///
/// let container = services.build().unwrap();
/// let db = container.get::<Db>().unwrap();
/// let logger = container.get::<Logger>().unwrap();
/// assert!(Arc::ptr_eq(&db.logger, &logger));
///
/// container.close().unwrap();
/// assert!(container.get::<Db>().is_err());
/// ```
pub struct Container {
    shared: Arc<ContainerShared>,
    root: Arc<ScopeInner>,
}

impl Container {
    pub(crate) fn assemble(
        registry: Registry,
        graph: DependencyGraph,
        analyzer: Analyzer,
        observers: Observers,
    ) -> Self {
        let shared = Arc::new(ContainerShared {
            registry,
            graph: RwLock::new(graph),
            analyzer,
            observers,
            disposed: AtomicBool::new(false),
            scope_ids: AtomicU64::new(1),
            root: OnceCell::new(),
        });
        let root = ScopeInner::new_root(shared.clone(), Context::new());
        shared
            .root
            .set(Arc::downgrade(&root))
            .expect("root scope set once");
        Self { shared, root }
    }

    /// Instantiates every singleton in dependency-first order. A
    /// constructor failure or an exceeded deadline aborts the build.
    pub(crate) fn eager_singletons(
        &self,
        deadline: Option<(Instant, Duration)>,
    ) -> DiResult<()> {
        let order = self.shared.graph.write().topological_sort();
        for id in order {
            if let Some((started, timeout)) = deadline {
                if started.elapsed() >= timeout {
                    return Err(DiError::BuildTimeout(timeout));
                }
            }
            let record = self.shared.registry.record(id);
            if record.lifetime == Lifetime::Singleton {
                tracing::debug!(service = %record.key, "eagerly instantiating singleton");
                self.root.resolve_record(record)?;
            }
        }
        Ok(())
    }

    /// Creates a scope carrying the given context.
    pub fn create_scope(&self, context: Context) -> DiResult<Scope> {
        Ok(Scope {
            inner: self.root.clone().create_child(context)?,
        })
    }

    /// Closes the container: every descendant scope still alive is
    /// closed, then the singletons are disposed in reverse creation
    /// order. Subsequent operations fail with
    /// [`DiError::ContainerDisposed`].
    pub fn close(&self) -> DiResult<()> {
        if self
            .shared
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DiError::ContainerDisposed);
        }
        self.root.close()
    }

    /// Whether [`close`](Container::close) has been called.
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Descriptors of every registered provider.
    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        self.shared
            .registry
            .records()
            .map(|record| ServiceDescriptor {
                key: record.key,
                lifetime: record.lifetime,
                groups: record.groups.clone(),
                fallible: record.info.fallible,
            })
            .collect()
    }

    /// Resolves the function's declared dependencies and calls it,
    /// against the root scope.
    pub fn invoke<M, C: Ctor<M>>(&self, function: C) -> DiResult<C::Output> {
        self.root.ensure_active()?;
        let cx = ResolverContext::new(&self.root);
        function.call(&cx)
    }

    /// Like [`invoke`](Container::invoke), for fallible functions.
    pub fn invoke_try<M, C: TryCtor<M>>(&self, function: C) -> DiResult<C::Output> {
        self.root.ensure_active()?;
        let cx = ResolverContext::new(&self.root);
        function.call(&cx)
    }

    /// Size of the constructor analysis cache.
    pub fn analyzer_cache_size(&self) -> usize {
        self.shared.analyzer.cache_size()
    }

    fn keys_of(&self, ids: Vec<crate::registry::ProviderId>) -> Vec<Key> {
        ids.into_iter()
            .map(|id| self.shared.registry.record(id).key)
            .collect()
    }

    /// Direct dependencies of a registered service. Diagnostics only.
    pub fn dependencies_of(&self, key: &Key) -> Vec<Key> {
        match self.shared.registry.provider_for(key) {
            Some(record) => {
                let ids = self.shared.graph.read().dependencies_of(record.id);
                self.keys_of(ids)
            }
            None => Vec::new(),
        }
    }

    /// Services that directly depend on the given service.
    pub fn dependents_of(&self, key: &Key) -> Vec<Key> {
        match self.shared.registry.provider_for(key) {
            Some(record) => {
                let ids = self.shared.graph.read().dependents_of(record.id);
                self.keys_of(ids)
            }
            None => Vec::new(),
        }
    }

    /// Every service reachable through dependency edges from `key`.
    pub fn transitive_dependencies_of(&self, key: &Key) -> Vec<Key> {
        match self.shared.registry.provider_for(key) {
            Some(record) => {
                let ids = self.shared.graph.read().transitive_dependencies_of(record.id);
                self.keys_of(ids)
            }
            None => Vec::new(),
        }
    }

    /// Services nothing depends on (application entry points).
    pub fn graph_roots(&self) -> Vec<Key> {
        let ids = self.shared.graph.read().roots();
        self.keys_of(ids)
    }

    /// Services with no dependencies of their own.
    pub fn graph_leaves(&self) -> Vec<Key> {
        let ids = self.shared.graph.read().leaves();
        self.keys_of(ids)
    }

    /// Longest-path depth of every service, measured from the graph
    /// roots. Diagnostics only.
    pub fn service_depths(&self) -> Vec<(Key, usize)> {
        let mut graph = self.shared.graph.write();
        let depths = graph.calculate_depths();
        depths
            .into_iter()
            .map(|(id, depth)| (self.shared.registry.record(id).key, depth))
            .collect()
    }
}

impl Clone for Container {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            root: self.root.clone(),
        }
    }
}

impl ResolverCore for Container {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.root.resolve_key(key)
    }

    fn resolve_group_any(
        &self,
        elem: TypeId,
        elem_name: &'static str,
        group: &'static str,
    ) -> DiResult<Vec<AnyArc>> {
        self.root.resolve_group(elem, elem_name, group)
    }

    fn track_instance(&self, key: Key, instance: AnyArc, disposer: DisposerFn) -> DiResult<()> {
        self.root.track_instance(key, instance, disposer)
    }
}
