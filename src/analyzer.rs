//! Constructor analysis.
//!
//! Rust has no runtime reflection over closures, so constructor shape is
//! captured through traits instead: every registerable constructor
//! implements [`Ctor`] (or one of its fallible / result-object variants),
//! which translates the signature into a frozen [`ConstructorInfo`] — the
//! typed parameter and return metadata the graph, validator, and resolver
//! consume. The [`Analyzer`] caches one `ConstructorInfo` per constructor
//! identity.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::container::context::ResolverContext;
use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::traits::dispose::DisposerFn;
use crate::traits::Resolver;

/// Type-erased shared instance, the currency of the resolution engine.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// One declared dependency of a constructor.
///
/// Derived from the parameter list, or from the fields of a parameter
/// object. A group dependency carries the element type, not a slice type.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Type of the dependency (element type for groups).
    pub ty: TypeId,
    /// Type name for diagnostics.
    pub type_name: &'static str,
    /// Resolve by key instead of the plain type registration.
    pub key: Option<&'static str>,
    /// Assemble every member of the named group.
    pub group: Option<&'static str>,
    /// Missing provider yields the zero value instead of an error.
    pub optional: bool,
}

impl Dependency {
    /// A required dependency on `T`.
    pub fn required<T: 'static>() -> Self {
        Self {
            ty: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            key: None,
            group: None,
            optional: false,
        }
    }

    /// An optional dependency on `T`.
    pub fn optional<T: 'static>() -> Self {
        Self {
            optional: true,
            ..Self::required::<T>()
        }
    }

    /// A dependency on `T` registered under `key`.
    pub fn keyed<T: 'static>(key: &'static str) -> Self {
        Self {
            key: Some(key),
            ..Self::required::<T>()
        }
    }

    /// A dependency on all members of `group` with element type `T`.
    pub fn grouped<T: 'static>(group: &'static str) -> Self {
        Self {
            group: Some(group),
            ..Self::required::<T>()
        }
    }

    /// The registry key this dependency resolves through. Meaningless for
    /// group dependencies, which fan out to every member.
    pub(crate) fn lookup_key(&self) -> Key {
        match self.key {
            Some(k) => Key::Keyed(self.ty, self.type_name, k),
            None => Key::Type(self.ty, self.type_name),
        }
    }
}

/// One value a constructor produces.
#[derive(Debug, Clone)]
pub struct ReturnSpec {
    /// Type of the produced service.
    pub ty: TypeId,
    /// Type name for diagnostics.
    pub type_name: &'static str,
    /// Register the value under this key.
    pub key: Option<&'static str>,
    /// Contribute the value to this group.
    pub group: Option<&'static str>,
}

impl ReturnSpec {
    /// A plain return of type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            ty: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            key: None,
            group: None,
        }
    }

    /// A return registered under `key`.
    pub fn keyed<T: 'static>(key: &'static str) -> Self {
        Self {
            key: Some(key),
            ..Self::of::<T>()
        }
    }

    /// A return contributed to `group`.
    pub fn grouped<T: 'static>(group: &'static str) -> Self {
        Self {
            group: Some(group),
            ..Self::of::<T>()
        }
    }
}

/// Stable identity of a constructor value.
///
/// Every fn item and closure has a unique type, so the `TypeId` of the
/// constructor's type distinguishes two different functions even when
/// their signatures are identical. Instance registrations use the
/// instance type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstructorId(TypeId);

impl ConstructorId {
    /// The identity of constructor type `F`.
    pub fn of<F: 'static>() -> Self {
        Self(TypeId::of::<F>())
    }
}

/// Frozen metadata describing a constructor: its typed parameters, its
/// typed returns, and whether it can fail.
#[derive(Debug, Clone)]
pub struct ConstructorInfo {
    /// Cache identity.
    pub id: ConstructorId,
    /// Declared dependencies, in parameter (or field) order.
    pub params: Vec<Dependency>,
    /// Produced services, primary first.
    pub returns: Vec<ReturnSpec>,
    /// Whether the constructor returns `Result`.
    pub fallible: bool,
}

// ===== Products =====

/// One produced service instance, keyed and optionally disposable.
pub struct Product {
    pub(crate) key: Key,
    pub(crate) group: Option<&'static str>,
    pub(crate) value: AnyArc,
    pub(crate) disposer: Option<DisposerFn>,
}

/// The full output of one constructor invocation. Almost always a single
/// product; result objects yield one per field.
pub type Products = SmallVec<[Product; 1]>;

impl Product {
    /// A plain product of type `T`.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::parts(None, None, value, None)
    }

    /// A product registered under `key`.
    pub fn keyed<T: Send + Sync + 'static>(key: &'static str, value: T) -> Self {
        Self::parts(Some(key), None, value, None)
    }

    /// A product contributed to `group`.
    pub fn grouped<T: Send + Sync + 'static>(group: &'static str, value: T) -> Self {
        Self::parts(None, Some(group), value, None)
    }

    /// Full-form constructor used by the derive macros.
    #[doc(hidden)]
    pub fn parts<T: Send + Sync + 'static>(
        key: Option<&'static str>,
        group: Option<&'static str>,
        value: T,
        disposer: Option<DisposerFn>,
    ) -> Self {
        let key = match key {
            Some(k) => Key::keyed::<T>(k),
            None => Key::of::<T>(),
        };
        Self {
            key,
            group,
            value: Arc::new(value),
            disposer,
        }
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.key.type_id()
    }
}

// ===== Resolvable parameters =====

/// A type that can appear as a plain constructor parameter.
///
/// Implemented for `Arc<T>` (required dependency) and `Option<Arc<T>>`
/// (optional dependency: a missing provider yields `None`, a failing
/// constructor still propagates its error). Keyed and grouped
/// dependencies are expressed through [`ParamObject`] fields.
pub trait Resolvable: Send + Sized + 'static {
    /// The dependency this parameter declares.
    fn dependency() -> Dependency;
    /// Resolves the parameter value.
    fn resolve(cx: &ResolverContext<'_>) -> DiResult<Self>;
}

impl<T: Send + Sync + 'static> Resolvable for Arc<T> {
    fn dependency() -> Dependency {
        Dependency::required::<T>()
    }

    fn resolve(cx: &ResolverContext<'_>) -> DiResult<Self> {
        cx.get::<T>()
    }
}

impl<T: Send + Sync + 'static> Resolvable for Option<Arc<T>> {
    fn dependency() -> Dependency {
        Dependency::optional::<T>()
    }

    fn resolve(cx: &ResolverContext<'_>) -> DiResult<Self> {
        cx.get_optional::<T>()
    }
}

// ===== Parameter and result objects =====

/// A struct whose fields are a constructor's dependencies.
///
/// A constructor taking exactly one `ParamObject` parameter declares the
/// object's fields as its dependencies, in field order. Field metadata
/// expresses keys (`#[di(key = "..")]`), groups (`#[di(group = "..")]`,
/// field type `Vec<Arc<T>>`), optional dependencies (`#[di(optional)]`,
/// field type `Option<Arc<T>>`), and skipped fields (`#[di(skip)]`,
/// filled from `Default`). Usually derived; hand implementations are
/// first-class.
///
/// # Examples
///
/// ```rust
/// use armature_di::{Dependency, DiResult, ParamObject, Resolver, ResolverContext};
/// use std::sync::Arc;
///
/// struct Db;
/// struct Metrics;
///
/// struct HandlerDeps {
///     db: Arc<Db>,
///     metrics: Option<Arc<Metrics>>,
/// }
///
/// impl ParamObject for HandlerDeps {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::required::<Db>(), Dependency::optional::<Metrics>()]
///     }
///
///     fn build(cx: &ResolverContext<'_>) -> DiResult<Self> {
///         Ok(Self {
///             db: cx.get::<Db>()?,
///             metrics: cx.get_optional::<Metrics>()?,
///         })
///     }
/// }
/// ```
pub trait ParamObject: Send + Sized + 'static {
    /// The declared dependencies, in field order.
    fn dependencies() -> Vec<Dependency>;
    /// Resolves every field and assembles the object.
    fn build(cx: &ResolverContext<'_>) -> DiResult<Self>;
}

/// A struct whose fields are a constructor's outputs.
///
/// Each non-skipped field becomes one registration, optionally keyed
/// (`#[di(key = "..")]`), contributed to a group (`#[di(group = "..")]`),
/// or tracked for disposal (`#[di(disposable)]`). Usually derived.
pub trait ResultObject: Sized + 'static {
    /// The produced services, in field order.
    fn returns() -> Vec<ReturnSpec>;
    /// Splits the object into its products.
    fn into_products(self) -> Products;
}

// ===== Constructor traits =====

/// Marker types that disambiguate the blanket constructor impls.
#[doc(hidden)]
pub mod marker {
    /// Plain positional parameters.
    pub struct Args;
    /// A single parameter-object parameter.
    pub struct Params;
}

/// An infallible constructor: `Fn(Deps...) -> T`.
///
/// Implemented for functions of up to eight [`Resolvable`] parameters and
/// for functions taking a single [`ParamObject`]. The marker type `M` is
/// inferred; callers never name it.
pub trait Ctor<M>: Send + Sync + 'static {
    /// The service type the constructor produces.
    type Output: Send + Sync + 'static;

    /// Translates the signature into constructor metadata.
    fn info() -> ConstructorInfo;

    /// Resolves the declared dependencies and invokes the constructor.
    fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Self::Output>;
}

/// A fallible constructor: `Fn(Deps...) -> Result<T, E>`.
///
/// The error position is the `Result` error — Rust's rendition of the
/// trailing-error convention; the type system already rejects an error
/// anywhere else. Constructor failures surface as
/// [`DiError::Resolution`] wrapping the original error.
pub trait TryCtor<M>: Send + Sync + 'static {
    /// The service type the constructor produces on success.
    type Output: Send + Sync + 'static;

    /// Translates the signature into constructor metadata.
    fn info() -> ConstructorInfo;

    /// Resolves the declared dependencies and invokes the constructor,
    /// wrapping a constructor error into [`DiError::Resolution`].
    fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Self::Output>;
}

/// An infallible result-object constructor: `Fn(Deps...) -> Bundle`.
pub trait OutCtor<M>: Send + Sync + 'static {
    /// The result object the constructor produces.
    type Bundle: ResultObject;

    /// Translates the signature into constructor metadata.
    fn info() -> ConstructorInfo;

    /// Resolves the declared dependencies and invokes the constructor.
    fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Self::Bundle>;
}

/// A fallible result-object constructor: `Fn(Deps...) -> Result<Bundle, E>`.
pub trait TryOutCtor<M>: Send + Sync + 'static {
    /// The result object the constructor produces on success.
    type Bundle: ResultObject;

    /// Translates the signature into constructor metadata.
    fn info() -> ConstructorInfo;

    /// Resolves the declared dependencies and invokes the constructor,
    /// wrapping a constructor error into [`DiError::Resolution`].
    fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Self::Bundle>;
}

fn ctor_error<T, E: std::error::Error + Send + Sync + 'static>(source: E) -> DiError {
    DiError::Resolution {
        type_name: std::any::type_name::<T>(),
        key: None,
        source: Box::new(source),
    }
}

macro_rules! impl_ctors {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg,)*> Ctor<(marker::Args, ($($arg,)*))> for Func
        where
            Func: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: Send + Sync + 'static,
            $($arg: Resolvable,)*
        {
            type Output = Ret;

            fn info() -> ConstructorInfo {
                ConstructorInfo {
                    id: ConstructorId::of::<Func>(),
                    params: vec![$($arg::dependency()),*],
                    returns: vec![ReturnSpec::of::<Ret>()],
                    fallible: false,
                }
            }

            #[allow(unused_variables)]
            fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Ret> {
                Ok((self)($($arg::resolve(cx)?),*))
            }
        }

        impl<Func, Ret, Err, $($arg,)*> TryCtor<(marker::Args, ($($arg,)*))> for Func
        where
            Func: Fn($($arg),*) -> Result<Ret, Err> + Send + Sync + 'static,
            Ret: Send + Sync + 'static,
            Err: std::error::Error + Send + Sync + 'static,
            $($arg: Resolvable,)*
        {
            type Output = Ret;

            fn info() -> ConstructorInfo {
                ConstructorInfo {
                    id: ConstructorId::of::<Func>(),
                    params: vec![$($arg::dependency()),*],
                    returns: vec![ReturnSpec::of::<Ret>()],
                    fallible: true,
                }
            }

            #[allow(unused_variables)]
            fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Ret> {
                (self)($($arg::resolve(cx)?),*).map_err(|e| ctor_error::<Ret, _>(e))
            }
        }

        impl<Func, Bundle, $($arg,)*> OutCtor<(marker::Args, ($($arg,)*))> for Func
        where
            Func: Fn($($arg),*) -> Bundle + Send + Sync + 'static,
            Bundle: ResultObject,
            $($arg: Resolvable,)*
        {
            type Bundle = Bundle;

            fn info() -> ConstructorInfo {
                ConstructorInfo {
                    id: ConstructorId::of::<Func>(),
                    params: vec![$($arg::dependency()),*],
                    returns: Bundle::returns(),
                    fallible: false,
                }
            }

            #[allow(unused_variables)]
            fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Bundle> {
                Ok((self)($($arg::resolve(cx)?),*))
            }
        }

        impl<Func, Bundle, Err, $($arg,)*> TryOutCtor<(marker::Args, ($($arg,)*))> for Func
        where
            Func: Fn($($arg),*) -> Result<Bundle, Err> + Send + Sync + 'static,
            Bundle: ResultObject,
            Err: std::error::Error + Send + Sync + 'static,
            $($arg: Resolvable,)*
        {
            type Bundle = Bundle;

            fn info() -> ConstructorInfo {
                ConstructorInfo {
                    id: ConstructorId::of::<Func>(),
                    params: vec![$($arg::dependency()),*],
                    returns: Bundle::returns(),
                    fallible: true,
                }
            }

            #[allow(unused_variables)]
            fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Bundle> {
                (self)($($arg::resolve(cx)?),*).map_err(|e| ctor_error::<Bundle, _>(e))
            }
        }
    };
}

impl_ctors!();
impl_ctors!(A1);
impl_ctors!(A1, A2);
impl_ctors!(A1, A2, A3);
impl_ctors!(A1, A2, A3, A4);
impl_ctors!(A1, A2, A3, A4, A5);
impl_ctors!(A1, A2, A3, A4, A5, A6);
impl_ctors!(A1, A2, A3, A4, A5, A6, A7);
impl_ctors!(A1, A2, A3, A4, A5, A6, A7, A8);

// Parameter-object family: exactly one parameter, the object's fields are
// the dependencies.
impl<Func, Ret, P> Ctor<(marker::Params, P)> for Func
where
    Func: Fn(P) -> Ret + Send + Sync + 'static,
    Ret: Send + Sync + 'static,
    P: ParamObject,
{
    type Output = Ret;

    fn info() -> ConstructorInfo {
        ConstructorInfo {
            id: ConstructorId::of::<Func>(),
            params: P::dependencies(),
            returns: vec![ReturnSpec::of::<Ret>()],
            fallible: false,
        }
    }

    fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Ret> {
        Ok((self)(P::build(cx)?))
    }
}

impl<Func, Ret, Err, P> TryCtor<(marker::Params, P)> for Func
where
    Func: Fn(P) -> Result<Ret, Err> + Send + Sync + 'static,
    Ret: Send + Sync + 'static,
    Err: std::error::Error + Send + Sync + 'static,
    P: ParamObject,
{
    type Output = Ret;

    fn info() -> ConstructorInfo {
        ConstructorInfo {
            id: ConstructorId::of::<Func>(),
            params: P::dependencies(),
            returns: vec![ReturnSpec::of::<Ret>()],
            fallible: true,
        }
    }

    fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Ret> {
        (self)(P::build(cx)?).map_err(|e| ctor_error::<Ret, _>(e))
    }
}

impl<Func, Bundle, P> OutCtor<(marker::Params, P)> for Func
where
    Func: Fn(P) -> Bundle + Send + Sync + 'static,
    Bundle: ResultObject,
    P: ParamObject,
{
    type Bundle = Bundle;

    fn info() -> ConstructorInfo {
        ConstructorInfo {
            id: ConstructorId::of::<Func>(),
            params: P::dependencies(),
            returns: Bundle::returns(),
            fallible: false,
        }
    }

    fn call(&self, cx: &ResolverContext<'_>) -> DiResult<Bundle> {
        Ok((self)(P::build(cx)?))
    }
}

// ===== Analyzer =====

/// Cache of constructor metadata, one entry per constructor identity.
///
/// Analysis is idempotent: analyzing the same constructor twice returns
/// the same `Arc<ConstructorInfo>`. Two different constructors with
/// identical signatures have distinct types, so they cache independently.
pub struct Analyzer {
    cache: DashMap<ConstructorId, Arc<ConstructorInfo>, ahash::RandomState>,
}

impl Analyzer {
    /// Creates an empty analyzer.
    pub fn new() -> Self {
        Self {
            cache: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Analyzes a constructor, returning the cached metadata.
    pub fn analyze<M, C: Ctor<M>>(&self, _ctor: &C) -> Arc<ConstructorInfo> {
        self.cached(ConstructorId::of::<C>(), C::info)
    }

    pub(crate) fn cached(
        &self,
        id: ConstructorId,
        make: impl FnOnce() -> ConstructorInfo,
    ) -> Arc<ConstructorInfo> {
        self.cache
            .entry(id)
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    /// Metadata for an already-analyzed constructor.
    pub fn info(&self, id: ConstructorId) -> Option<Arc<ConstructorInfo>> {
        self.cache.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Declared dependencies of an already-analyzed constructor.
    pub fn dependencies(&self, id: ConstructorId) -> Option<Vec<Dependency>> {
        self.info(id).map(|i| i.params.clone())
    }

    /// The primary service type an analyzed constructor produces.
    pub fn service_type(&self, id: ConstructorId) -> Option<TypeId> {
        self.info(id).and_then(|i| i.returns.first().map(|r| r.ty))
    }

    /// Every distinct type an analyzed constructor produces, flattening
    /// result-object fields.
    pub fn result_types(&self, id: ConstructorId) -> Option<Vec<TypeId>> {
        self.info(id).map(|i| {
            let mut seen = Vec::new();
            for ret in &i.returns {
                if !seen.contains(&ret.ty) {
                    seen.push(ret.ty);
                }
            }
            seen
        })
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of cached entries.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}
