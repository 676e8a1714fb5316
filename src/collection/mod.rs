//! Registration façade: declare providers, then build the container.
//!
//! Registration is single-threaded by construction — the collection is a
//! plain mutable builder — and [`build`](ServiceCollection::build)
//! consumes it, so no registration can slip in after the container
//! exists. The build sequence is: assemble the registry, assemble the
//! graph (cycles rejected on insert), validate, then eagerly instantiate
//! singletons in dependency-first order.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::smallvec;

use crate::analyzer::{
    Analyzer, AnyArc, ConstructorId, ConstructorInfo, Ctor, Dependency, OutCtor, Product,
    Products, ResultObject, ReturnSpec, TryCtor, TryOutCtor,
};
use crate::container::context::ResolverContext;
use crate::container::Container;
use crate::decoration::Decorator;
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult};
use crate::graph::DependencyGraph;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::observer::{ContainerObserver, Observers};
use crate::registry::{spec_key, ApplyFn, DecoratorRecord, ProduceFn, ProviderId, Registry};
use crate::traits::dispose::{disposer_for, Dispose, DisposerFn};
use crate::validation;

type ConvertFn = Arc<dyn Fn(&AnyArc) -> Option<AnyArc> + Send + Sync>;

struct AliasEntry {
    key: Key,
    convert: ConvertFn,
}

struct PendingProvider {
    lifetime: Lifetime,
    info: Arc<ConstructorInfo>,
    base: ProduceFn,
    key: Option<&'static str>,
    groups: Vec<&'static str>,
    aliases: Vec<AliasEntry>,
    disposer: Option<DisposerFn>,
}

struct PendingDecorator {
    target: TypeId,
    target_name: &'static str,
    deps: Vec<Dependency>,
    apply: ApplyFn,
}

/// Options for [`ServiceCollection::build_with`].
///
/// # Examples
///
/// ```rust
/// use armature_di::{BuildOptions, ServiceCollection};
/// use std::time::Duration;
///
/// let services = ServiceCollection::new();
/// let container = services
///     .build_with(BuildOptions::new().timeout(Duration::from_secs(5)))
///     .unwrap();
/// container.close().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct BuildOptions {
    timeout: Option<Duration>,
    eager_singletons: bool,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the build with [`DiError::BuildTimeout`] when exceeded; no
    /// container is produced.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether to instantiate singletons during the build (default) or
    /// lazily on first resolution.
    pub fn eager_singletons(mut self, eager: bool) -> Self {
        self.eager_singletons = eager;
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            eager_singletons: true,
        }
    }
}

/// Options applied to one registration.
///
/// Returned by the `add*` registration methods; each option is
/// orthogonal and chainable.
pub struct ProviderOptions<'a, T> {
    pending: &'a mut PendingProvider,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> ProviderOptions<'a, T> {
    /// Registers the provider under a key; resolutions carrying the same
    /// key pick it up. Keyed and unkeyed registrations of one type are
    /// independent.
    pub fn keyed(self, key: &'static str) -> Self {
        self.pending.key = Some(key);
        self
    }

    /// Adds the provider to the named group, resolved as an ordered
    /// collection via [`Resolver::get_group`]. An unkeyed grouped
    /// provider does not claim the plain `(type, key)` slot; combined
    /// with [`keyed`](Self::keyed) it stays resolvable by key as well.
    ///
    /// [`Resolver::get_group`]: crate::Resolver::get_group
    pub fn in_group(self, group: &'static str) -> Self {
        self.pending.groups.push(group);
        self
    }

    /// Additionally registers the provider under `U`, converted from the
    /// primary service. The conversion runs once per constructed
    /// instance and the alias shares the provider's cache entry, so
    /// resolving either key observes the same underlying instance.
    /// Aliases collide with other registrations of `U` like primary
    /// registrations do.
    ///
    /// The usual alias target is a trait object:
    ///
    /// ```rust
    /// use armature_di::{Lifetime, Resolver, ServiceCollection};
    /// use std::sync::Arc;
    ///
    /// trait Store: Send + Sync {
    ///     fn name(&self) -> &str;
    /// }
    ///
    /// struct PgStore;
    /// impl Store for PgStore {
    ///     fn name(&self) -> &str {
    ///         "pg"
    ///     }
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services
    ///     .add(Lifetime::Singleton, || PgStore)
    ///     .as_type(|store: Arc<PgStore>| store as Arc<dyn Store>);
    ///
    /// let container = services.build().unwrap();
    /// let store = container.get::<Arc<dyn Store>>().unwrap();
    /// assert_eq!(store.name(), "pg");
    /// ```
    pub fn as_type<U: Send + Sync + 'static>(self, convert: fn(Arc<T>) -> U) -> Self {
        let convert_any: ConvertFn = Arc::new(move |any: &AnyArc| -> Option<AnyArc> {
            let typed = any.clone().downcast::<T>().ok()?;
            Some(Arc::new(convert(typed)) as AnyArc)
        });
        self.pending.aliases.push(AliasEntry {
            key: Key::of::<U>(),
            convert: convert_any,
        });
        self
    }

    /// Tracks produced instances for disposal when the owning scope
    /// closes. Requires the service to implement [`Dispose`].
    pub fn disposable(self) -> Self
    where
        T: Dispose,
    {
        self.pending.disposer = Some(disposer_for::<T>());
        self
    }
}

/// An empty registration builder — the entry point of the crate.
///
/// Declare constructors with [`add`](Self::add) and friends, then call
/// [`build`](Self::build) to validate the graph and obtain a
/// [`Container`].
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
/// struct UserService {
///     db: Arc<Db>,
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add(Lifetime::Singleton, || Logger);
/// services.add(Lifetime::Singleton, |logger: Arc<Logger>| Db { logger });
/// services.add(Lifetime::Scoped, |db: Arc<Db>| UserService { db });
///
/// let container = services.build().unwrap();
/// let scope = container.create_scope(Context::new()).unwrap();
/// let users = scope.get::<UserService>().unwrap();
/// let db = container.get::<Db>().unwrap();
/// assert!(Arc::ptr_eq(&users.db, &db));
/// ```
pub struct ServiceCollection {
    providers: Vec<PendingProvider>,
    decorators: Vec<PendingDecorator>,
    observers: Observers,
    analyzer: Analyzer,
}

impl ServiceCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            decorators: Vec::new(),
            observers: Observers::new(),
            analyzer: Analyzer::new(),
        }
    }

    fn push_pending(
        &mut self,
        lifetime: Lifetime,
        info: Arc<ConstructorInfo>,
        base: ProduceFn,
    ) -> &mut PendingProvider {
        self.providers.push(PendingProvider {
            lifetime,
            info,
            base,
            key: None,
            groups: Vec::new(),
            aliases: Vec::new(),
            disposer: None,
        });
        self.providers.last_mut().expect("just pushed")
    }

    /// Registers a constructor under the given lifetime.
    ///
    /// The constructor's parameters (each `Arc<T>` or `Option<Arc<T>>`,
    /// or a single parameter object) are its declared dependencies; its
    /// return value is the service.
    pub fn add<M, C: Ctor<M>>(
        &mut self,
        lifetime: Lifetime,
        ctor: C,
    ) -> ProviderOptions<'_, C::Output> {
        let info = self.analyzer.cached(ConstructorId::of::<C>(), C::info);
        let base: ProduceFn = Arc::new(move |cx: &ResolverContext<'_>| -> DiResult<Products> {
            Ok(smallvec![Product::new(ctor.call(cx)?)])
        });
        let pending = self.push_pending(lifetime, info, base);
        ProviderOptions {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers a fallible constructor (`Fn(..) -> Result<T, E>`). A
    /// constructor error aborts the resolution (and an eager build) as
    /// [`DiError::Resolution`]; nothing is cached.
    pub fn add_try<M, C: TryCtor<M>>(
        &mut self,
        lifetime: Lifetime,
        ctor: C,
    ) -> ProviderOptions<'_, C::Output> {
        let info = self.analyzer.cached(ConstructorId::of::<C>(), C::info);
        let base: ProduceFn = Arc::new(move |cx: &ResolverContext<'_>| -> DiResult<Products> {
            Ok(smallvec![Product::new(ctor.call(cx)?)])
        });
        let pending = self.push_pending(lifetime, info, base);
        ProviderOptions {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers a result-object constructor: every field of the returned
    /// object becomes its own registration, honoring the field's key,
    /// group, and disposal metadata.
    pub fn add_out<M, C: OutCtor<M>>(&mut self, lifetime: Lifetime, ctor: C) -> &mut Self {
        let info = self.analyzer.cached(ConstructorId::of::<C>(), C::info);
        let base: ProduceFn = Arc::new(move |cx: &ResolverContext<'_>| -> DiResult<Products> {
            Ok(ctor.call(cx)?.into_products())
        });
        self.push_pending(lifetime, info, base);
        self
    }

    /// Fallible variant of [`add_out`](Self::add_out).
    pub fn add_out_try<M, C: TryOutCtor<M>>(&mut self, lifetime: Lifetime, ctor: C) -> &mut Self {
        let info = self.analyzer.cached(ConstructorId::of::<C>(), C::info);
        let base: ProduceFn = Arc::new(move |cx: &ResolverContext<'_>| -> DiResult<Products> {
            Ok(ctor.call(cx)?.into_products())
        });
        self.push_pending(lifetime, info, base);
        self
    }

    /// Registers an already-built instance as a singleton.
    pub fn add_instance<T: Send + Sync + 'static>(&mut self, value: T) -> ProviderOptions<'_, T> {
        let info = self.analyzer.cached(ConstructorId::of::<T>(), || ConstructorInfo {
            id: ConstructorId::of::<T>(),
            params: Vec::new(),
            returns: vec![ReturnSpec::of::<T>()],
            fallible: false,
        });
        let instance: AnyArc = Arc::new(value);
        let key = Key::of::<T>();
        let base: ProduceFn = Arc::new(move |_: &ResolverContext<'_>| -> DiResult<Products> {
            Ok(smallvec![Product {
                key,
                group: None,
                value: instance.clone(),
                disposer: None,
            }])
        });
        let pending = self.push_pending(Lifetime::Singleton, info, base);
        ProviderOptions {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers a manual factory that resolves its own dependencies
    /// through the [`ResolverContext`].
    ///
    /// Factories declare no dependencies, so they are invisible to the
    /// build-time graph; cycles through them are still caught at
    /// resolution by the per-thread resolution stack.
    pub fn add_factory<T, F>(&mut self, lifetime: Lifetime, factory: F) -> ProviderOptions<'_, T>
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> T + Send + Sync + 'static,
    {
        let info = self.analyzer.cached(ConstructorId::of::<F>(), || ConstructorInfo {
            id: ConstructorId::of::<F>(),
            params: Vec::new(),
            returns: vec![ReturnSpec::of::<T>()],
            fallible: false,
        });
        let base: ProduceFn = Arc::new(move |cx: &ResolverContext<'_>| -> DiResult<Products> {
            Ok(smallvec![Product::new(factory(cx))])
        });
        let pending = self.push_pending(lifetime, info, base);
        ProviderOptions {
            pending,
            _marker: PhantomData,
        }
    }

    /// Fallible variant of [`add_factory`](Self::add_factory); the
    /// factory propagates resolution errors with `?` and may fail in its
    /// own right.
    pub fn add_factory_try<T, F>(
        &mut self,
        lifetime: Lifetime,
        factory: F,
    ) -> ProviderOptions<'_, T>
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<T> + Send + Sync + 'static,
    {
        let info = self.analyzer.cached(ConstructorId::of::<F>(), || ConstructorInfo {
            id: ConstructorId::of::<F>(),
            params: Vec::new(),
            returns: vec![ReturnSpec::of::<T>()],
            fallible: true,
        });
        let base: ProduceFn = Arc::new(move |cx: &ResolverContext<'_>| -> DiResult<Products> {
            Ok(smallvec![Product::new(factory(cx)?)])
        });
        let pending = self.push_pending(lifetime, info, base);
        ProviderOptions {
            pending,
            _marker: PhantomData,
        }
    }

    /// Shorthand for [`add`](Self::add) with [`Lifetime::Singleton`].
    pub fn add_singleton<M, C: Ctor<M>>(&mut self, ctor: C) -> ProviderOptions<'_, C::Output> {
        self.add(Lifetime::Singleton, ctor)
    }

    /// Shorthand for [`add`](Self::add) with [`Lifetime::Scoped`].
    pub fn add_scoped<M, C: Ctor<M>>(&mut self, ctor: C) -> ProviderOptions<'_, C::Output> {
        self.add(Lifetime::Scoped, ctor)
    }

    /// Shorthand for [`add`](Self::add) with [`Lifetime::Transient`].
    pub fn add_transient<M, C: Ctor<M>>(&mut self, ctor: C) -> ProviderOptions<'_, C::Output> {
        self.add(Lifetime::Transient, ctor)
    }

    /// Registers a decorator. Decorators for one target apply in
    /// registration order, innermost first, and inherit the lifetime of
    /// the provider they decorate.
    pub fn decorate<M, D: Decorator<M>>(&mut self, decorator: D) -> &mut Self {
        let apply: ApplyFn = Arc::new(move |any: AnyArc, cx: &ResolverContext<'_>| {
            let inner = any
                .downcast::<D::Target>()
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<D::Target>()))?;
            Ok(decorator.apply(inner, cx)? as AnyArc)
        });
        self.decorators.push(PendingDecorator {
            target: TypeId::of::<D::Target>(),
            target_name: std::any::type_name::<D::Target>(),
            deps: D::dependencies(),
            apply,
        });
        self
    }

    /// Registers an observer for resolution and disposal events.
    pub fn observe(&mut self, observer: Arc<dyn ContainerObserver>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// Descriptors of the registrations made so far.
    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        self.providers
            .iter()
            .filter_map(|pending| {
                let mut primary = pending.info.returns.first()?.clone();
                if pending.key.is_some() {
                    primary.key = pending.key;
                }
                Some(ServiceDescriptor {
                    key: spec_key(&primary),
                    lifetime: pending.lifetime,
                    groups: pending.groups.clone(),
                    fallible: pending.info.fallible,
                })
            })
            .collect()
    }

    /// Builds the container with default options.
    pub fn build(self) -> DiResult<Container> {
        self.build_with(BuildOptions::default())
    }

    /// Builds the container: registry assembly, graph assembly with
    /// cycle detection, validation, then eager singleton instantiation
    /// in dependency-first order. Any failure aborts the build and no
    /// container is produced.
    #[tracing::instrument(skip_all, name = "container_build")]
    pub fn build_with(self, options: BuildOptions) -> DiResult<Container> {
        let started = Instant::now();
        let deadline = options.timeout.map(|timeout| (started, timeout));
        let check_deadline = |phase: &'static str| -> DiResult<()> {
            if let Some(timeout) = options.timeout {
                if started.elapsed() >= timeout {
                    tracing::warn!(phase, ?timeout, "container build timed out");
                    return Err(DiError::BuildTimeout(timeout));
                }
            }
            Ok(())
        };

        let ServiceCollection {
            providers,
            decorators,
            observers,
            analyzer,
        } = self;

        let mut registry = Registry::new();
        for pending in providers {
            let (lifetime, info, outputs, groups, produce) = finalize(pending);
            registry.register_provider(lifetime, info, outputs, groups, produce)?;
        }
        for pending in decorators {
            registry.register_decorator(DecoratorRecord {
                target: pending.target,
                target_name: pending.target_name,
                deps: pending.deps,
                apply: pending.apply,
            });
        }
        check_deadline("register")?;

        let mut graph = DependencyGraph::new();
        for record in registry.records() {
            let edges = edge_targets(&registry, record);
            graph.add_provider(record.id, record.key, &edges)?;
        }
        check_deadline("graph")?;

        validation::validate(&registry, &mut graph)?;
        check_deadline("validate")?;

        tracing::debug!(providers = registry.len(), "container validated");
        let container = Container::assemble(registry, graph, analyzer, observers);
        if options.eager_singletons {
            if let Err(err) = container.eager_singletons(deadline) {
                // Dispose whatever the partial eager pass constructed.
                let _ = container.close();
                return Err(err);
            }
        }
        Ok(container)
    }
}

impl Default for ServiceCollection {
    fn default() -> Self {
        Self::new()
    }
}

fn rekey(key: Key, service_key: &'static str) -> Key {
    Key::Keyed(key.type_id(), key.display_name(), service_key)
}

/// Applies the registration options to the pending provider, producing
/// its effective outputs and final constructor closure.
fn finalize(
    pending: PendingProvider,
) -> (
    Lifetime,
    Arc<ConstructorInfo>,
    Vec<ReturnSpec>,
    Vec<&'static str>,
    ProduceFn,
) {
    let PendingProvider {
        lifetime,
        info,
        base,
        key,
        groups,
        aliases,
        disposer,
    } = pending;

    // Provider-level group membership lives in `groups`; the output
    // specs carry only field-level tags, so the registry's two group
    // paths stay disjoint.
    let mut outputs = info.returns.clone();
    if let Some(first) = outputs.first_mut() {
        if key.is_some() {
            first.key = key;
        }
    }
    for alias in &aliases {
        outputs.push(ReturnSpec {
            ty: alias.key.type_id(),
            type_name: alias.key.display_name(),
            key: alias.key.service_key(),
            group: None,
        });
    }

    let produce: ProduceFn =
        if key.is_none() && aliases.is_empty() && disposer.is_none() {
            base
        } else {
            Arc::new(move |cx: &ResolverContext<'_>| -> DiResult<Products> {
                let mut products = (base)(cx)?;
                if let Some(first) = products.first_mut() {
                    if let Some(service_key) = key {
                        first.key = rekey(first.key, service_key);
                    }
                    if first.disposer.is_none() {
                        first.disposer = disposer.clone();
                    }
                }
                let primary = products.first().map(|p| p.value.clone());
                for alias in &aliases {
                    let source = primary.as_ref().ok_or_else(|| DiError::TypeMismatch(
                        alias.key.display_name(),
                    ))?;
                    let value = (alias.convert)(source)
                        .ok_or(DiError::TypeMismatch(alias.key.display_name()))?;
                    products.push(Product {
                        key: alias.key,
                        group: None,
                        value,
                        disposer: None,
                    });
                }
                Ok(products)
            })
        };

    (lifetime, info, outputs, groups, produce)
}

fn push_dep(
    registry: &Registry,
    dep: &Dependency,
    edges: &mut Vec<(ProviderId, Key)>,
) {
    if let Some(group) = dep.group {
        for id in registry.group_providers(dep.ty, group) {
            edges.push((id, registry.record(id).key));
        }
    } else if let Some(target) = registry.provider_for(&dep.lookup_key()) {
        edges.push((target.id, target.key));
    }
    // Missing required dependencies are the validator's to report.
}

fn edge_targets(
    registry: &Registry,
    record: &crate::registry::ProviderRecord,
) -> Vec<(ProviderId, Key)> {
    let mut edges = Vec::new();
    for dep in &record.info.params {
        push_dep(registry, dep, &mut edges);
    }
    // A decorator's dependencies count against the node it decorates.
    for output in &record.outputs {
        for decorator in registry.decorators_for(output.ty) {
            for dep in &decorator.deps {
                push_dep(registry, dep, &mut edges);
            }
        }
    }
    edges
}
