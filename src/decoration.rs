//! Service decoration.
//!
//! A decorator wraps an already-constructed service with additional
//! behavior. Decorators for one target apply in registration order,
//! innermost first, and the decorated value is what lands in the
//! instance cache — so a singleton is decorated exactly once. A
//! decorator's extra parameters are ordinary dependencies: they are
//! analyzed like constructor parameters and take part in cycle detection
//! against the target's node. The decorator itself inherits the lifetime
//! of the provider it decorates.

use std::sync::Arc;

use crate::analyzer::{Dependency, Resolvable};
use crate::container::context::ResolverContext;
use crate::error::DiResult;

/// Marker types that disambiguate the blanket decorator impls.
#[doc(hidden)]
pub mod marker {
    /// Positional extra dependencies.
    pub struct Wrap;
}

/// A function that wraps an existing service.
///
/// Implemented for `Fn(Arc<T>, Deps...) -> T` with up to four extra
/// [`Resolvable`] dependencies. The first parameter is the service being
/// decorated; the return value replaces it.
///
/// # Examples
///
/// ```rust
/// use armature_di::{Lifetime, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Greeter {
///     prefix: String,
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add(Lifetime::Singleton, || Greeter {
///     prefix: "hello".to_string(),
/// });
/// services.decorate(|inner: Arc<Greeter>| Greeter {
///     prefix: format!("{}!", inner.prefix),
/// });
///
/// let container = services.build().unwrap();
/// let greeter = container.get::<Greeter>().unwrap();
/// assert_eq!(greeter.prefix, "hello!");
/// ```
pub trait Decorator<M>: Send + Sync + 'static {
    /// The service type being decorated.
    type Target: Send + Sync + 'static;

    /// Extra dependencies the decorator declares.
    fn dependencies() -> Vec<Dependency>;

    /// Wraps the inner service.
    fn apply(
        &self,
        inner: Arc<Self::Target>,
        cx: &ResolverContext<'_>,
    ) -> DiResult<Arc<Self::Target>>;
}

macro_rules! impl_decorator {
    ($($arg:ident),*) => {
        impl<Func, Target, $($arg,)*> Decorator<(marker::Wrap, Target, ($($arg,)*))> for Func
        where
            Func: Fn(Arc<Target>, $($arg),*) -> Target + Send + Sync + 'static,
            Target: Send + Sync + 'static,
            $($arg: Resolvable,)*
        {
            type Target = Target;

            fn dependencies() -> Vec<Dependency> {
                vec![$($arg::dependency()),*]
            }

            #[allow(unused_variables)]
            fn apply(
                &self,
                inner: Arc<Target>,
                cx: &ResolverContext<'_>,
            ) -> DiResult<Arc<Target>> {
                Ok(Arc::new((self)(inner, $($arg::resolve(cx)?),*)))
            }
        }
    };
}

impl_decorator!();
impl_decorator!(D1);
impl_decorator!(D1, D2);
impl_decorator!(D1, D2, D3);
impl_decorator!(D1, D2, D3, D4);
