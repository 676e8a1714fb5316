//! # armature-di
//!
//! Runtime dependency injection for Rust: declare how services are
//! constructed, build a validated dependency graph, then resolve fully
//! wired instances with lifetime, keying, grouping, and disposal
//! guarantees.
//!
//! ## Features
//!
//! - **Lifetimes**: Singleton, Scoped, and Transient services, with
//!   lifetime rules enforced when the container is built
//! - **Typed constructors**: dependencies declared by parameter types,
//!   no registration boilerplate
//! - **Build-time validation**: cycle detection, resolvability checks,
//!   and eager singleton instantiation in dependency order
//! - **Keyed and grouped services**: several providers per type,
//!   addressed by key or collected in registration order
//! - **Scoped isolation and disposal**: nested scopes with reverse-order
//!   disposal and aggregated error reporting
//! - **Thread-safe**: concurrent resolution with per-entry single-flight
//!
//! ## Quick Start
//!
//! ```rust
//! use armature_di::{Context, Lifetime, Resolver, ServiceCollection};
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! struct Database {
//!     logger: Arc<Logger>,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//!     logger: Arc<Logger>,
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.add(Lifetime::Singleton, || Logger);
//! services.add(Lifetime::Singleton, |logger: Arc<Logger>| Database { logger });
//! services.add(Lifetime::Scoped, |db: Arc<Database>, logger: Arc<Logger>| {
//!     UserService { db, logger }
//! });
//!
//! let container = services.build().unwrap();
//! let scope = container.create_scope(Context::new()).unwrap();
//!
//! let users = scope.get::<UserService>().unwrap();
//! // The singleton is shared: the service and its database see the same
//! // logger instance.
//! assert!(Arc::ptr_eq(&users.logger, &users.db.logger));
//!
//! scope.close().unwrap();
//! container.close().unwrap();
//! ```
//!
//! ## Keyed and grouped registrations
//!
//! ```rust
//! use armature_di::{Lifetime, Resolver, ServiceCollection};
//!
//! struct Cache {
//!     name: &'static str,
//! }
//!
//! let mut services = ServiceCollection::new();
//! services
//!     .add(Lifetime::Singleton, || Cache { name: "redis" })
//!     .keyed("redis");
//! services
//!     .add(Lifetime::Singleton, || Cache { name: "memory" })
//!     .keyed("memory");
//!
//! let container = services.build().unwrap();
//! assert_eq!(container.get_keyed::<Cache>("redis").unwrap().name, "redis");
//! assert_eq!(container.get_keyed::<Cache>("memory").unwrap().name, "memory");
//! ```
//!
//! ## Lifetime rules
//!
//! A dependency must live at least as long as its consumer: singletons
//! depend only on singletons, scoped services on singletons and scoped
//! services. Transients may depend on anything, and a fresh transient is
//! produced per resolution. Violations fail
//! [`ServiceCollection::build`] with [`DiError::LifetimeConflict`].

pub mod analyzer;
pub mod collection;
pub mod container;
pub mod decoration;
pub mod descriptors;
pub mod error;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod traits;

mod graph;
mod internal;
mod registry;
mod validation;

pub use analyzer::{
    Analyzer, AnyArc, ConstructorId, ConstructorInfo, Ctor, Dependency, OutCtor, ParamObject,
    Product, Products, Resolvable, ResultObject, ReturnSpec, TryCtor, TryOutCtor,
};
pub use collection::{BuildOptions, ProviderOptions, ServiceCollection};
pub use container::scope::{Context, Scope};
pub use container::{context::ResolverContext, Container};
pub use decoration::Decorator;
pub use descriptors::ServiceDescriptor;
pub use error::{BoxError, DiError, DiResult, DisposalFailure};
pub use key::Key;
pub use lifetime::Lifetime;
pub use observer::{ContainerObserver, TracingObserver};
pub use traits::{Dispose, Resolver, ResolverCore};

// Plumbing the derive macros expand to.
#[doc(hidden)]
pub use traits::dispose::{disposer_for, DisposerFn};

pub use armature_di_derive::{ParamObject, ResultObject};
