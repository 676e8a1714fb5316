use armature_di::{Context, DiError, Lifetime, Resolver, ResolverContext, ServiceCollection};
use std::sync::{Arc, Mutex};

#[test]
fn singleton_resolves_to_the_same_instance() {
    struct Config {
        port: u16,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Config { port: 8080 });

    let container = sc.build().unwrap();
    let a = container.get::<Config>().unwrap();
    let b = container.get::<Config>().unwrap();

    assert_eq!(a.port, 8080);
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn constructor_parameters_are_wired() {
    struct Logger;
    struct Db {
        logger: Arc<Logger>,
    }
    struct UserService {
        db: Arc<Db>,
        logger: Arc<Logger>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Logger);
    sc.add(Lifetime::Singleton, |logger: Arc<Logger>| Db { logger });
    sc.add(Lifetime::Scoped, |db: Arc<Db>, logger: Arc<Logger>| {
        UserService { db, logger }
    });

    let container = sc.build().unwrap();
    let scope = container.create_scope(Context::new()).unwrap();
    let users = scope.get::<UserService>().unwrap();

    // One logger instance shared between the service and its database.
    assert!(Arc::ptr_eq(&users.logger, &users.db.logger));
}

#[test]
fn transient_creates_new_instances() {
    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Transient, move || {
        let mut c = counter_clone.lock().unwrap();
        *c += 1;
        format!("instance-{}", *c)
    });

    let container = sc.build().unwrap();
    let a = container.get::<String>().unwrap();
    let b = container.get::<String>().unwrap();

    assert_eq!(a.as_str(), "instance-1");
    assert_eq!(b.as_str(), "instance-2");
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn instance_registration_is_singleton() {
    struct Settings {
        name: &'static str,
    }

    let mut sc = ServiceCollection::new();
    sc.add_instance(Settings { name: "app" });

    let container = sc.build().unwrap();
    let a = container.get::<Settings>().unwrap();
    let b = container.get::<Settings>().unwrap();

    assert_eq!(a.name, "app");
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn missing_service_is_not_found() {
    struct Unregistered;

    let container = ServiceCollection::new().build().unwrap();
    match container.get::<Unregistered>() {
        Err(DiError::NotFound { type_name, key }) => {
            assert!(type_name.contains("Unregistered"));
            assert!(key.is_none());
        }
        other => panic!("expected NotFound, got {other:?}", other = other.err()),
    }
}

#[test]
fn optional_dependency_missing_is_zero_value() {
    struct Metrics;
    struct Handler {
        metrics: Option<Arc<Metrics>>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, |metrics: Option<Arc<Metrics>>| Handler {
        metrics,
    });

    let container = sc.build().unwrap();
    let handler = container.get::<Handler>().unwrap();
    assert!(handler.metrics.is_none());
}

#[test]
fn optional_dependency_present_is_resolved() {
    struct Metrics;
    struct Handler {
        metrics: Option<Arc<Metrics>>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Metrics);
    sc.add(Lifetime::Singleton, |metrics: Option<Arc<Metrics>>| Handler {
        metrics,
    });

    let container = sc.build().unwrap();
    let handler = container.get::<Handler>().unwrap();
    assert!(handler.metrics.is_some());
}

#[test]
fn fallible_constructor_error_is_wrapped() {
    use std::io;

    struct Db;

    let mut sc = ServiceCollection::new();
    sc.add_try(Lifetime::Transient, || -> Result<Db, io::Error> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no database"))
    });

    let container = sc.build().unwrap();
    match container.get::<Db>() {
        Err(DiError::Resolution { type_name, source, .. }) => {
            assert!(type_name.contains("Db"));
            assert!(source.to_string().contains("no database"));
        }
        other => panic!("expected Resolution, got {other:?}", other = other.err()),
    }
}

#[test]
fn fallible_constructor_success_is_transparent() {
    struct Db {
        url: String,
    }

    let mut sc = ServiceCollection::new();
    sc.add_try(Lifetime::Singleton, || -> Result<Db, std::io::Error> {
        Ok(Db {
            url: "postgres://localhost".to_string(),
        })
    });

    let container = sc.build().unwrap();
    assert_eq!(container.get::<Db>().unwrap().url, "postgres://localhost");
}

#[test]
fn manual_factory_resolves_through_context() {
    struct Config {
        port: u16,
    }
    struct Server {
        port: u16,
    }

    let mut sc = ServiceCollection::new();
    sc.add_instance(Config { port: 9000 });
    sc.add_factory(Lifetime::Singleton, |cx: &ResolverContext<'_>| Server {
        port: cx.get_required::<Config>().port,
    });

    let container = sc.build().unwrap();
    assert_eq!(container.get::<Server>().unwrap().port, 9000);
}

#[test]
fn invoke_resolves_arguments() {
    struct Config {
        port: u16,
    }

    let mut sc = ServiceCollection::new();
    sc.add_instance(Config { port: 4000 });

    let container = sc.build().unwrap();
    let port = container.invoke(|config: Arc<Config>| config.port).unwrap();
    assert_eq!(port, 4000);
}

#[test]
fn invoke_try_propagates_function_error() {
    use std::io;

    let container = ServiceCollection::new().build().unwrap();
    let result = container.invoke_try(|| -> Result<(), io::Error> {
        Err(io::Error::other("boom"))
    });
    assert!(matches!(result, Err(DiError::Resolution { .. })));
}

#[test]
fn empty_container_builds_and_closes() {
    let container = ServiceCollection::new().build().unwrap();
    container.close().unwrap();
    assert!(container.is_disposed());
}

#[test]
fn descriptors_reflect_registrations() {
    struct Config;
    struct Cache;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Config);
    sc.add(Lifetime::Scoped, || Cache).keyed("memory");

    let descriptors = sc.descriptors();
    assert_eq!(descriptors.len(), 2);

    let cache = descriptors.iter().find(|d| d.is_keyed()).unwrap();
    assert_eq!(cache.service_key(), Some("memory"));
    assert_eq!(cache.lifetime, Lifetime::Scoped);

    let container = sc.build().unwrap();
    assert_eq!(container.descriptors().len(), 2);
}

#[test]
fn eager_build_constructs_singletons() {
    let constructed = Arc::new(Mutex::new(0));
    let constructed_clone = constructed.clone();

    struct Heavy;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, move || {
        *constructed_clone.lock().unwrap() += 1;
        Heavy
    });

    let container = sc.build().unwrap();
    assert_eq!(*constructed.lock().unwrap(), 1);

    // The eager instance is reused, not rebuilt.
    container.get::<Heavy>().unwrap();
    assert_eq!(*constructed.lock().unwrap(), 1);
}

#[test]
fn lazy_build_defers_singletons() {
    use armature_di::BuildOptions;

    let constructed = Arc::new(Mutex::new(0));
    let constructed_clone = constructed.clone();

    struct Heavy;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, move || {
        *constructed_clone.lock().unwrap() += 1;
        Heavy
    });

    let container = sc
        .build_with(BuildOptions::new().eager_singletons(false))
        .unwrap();
    assert_eq!(*constructed.lock().unwrap(), 0);

    container.get::<Heavy>().unwrap();
    assert_eq!(*constructed.lock().unwrap(), 1);
}

#[test]
fn graph_navigation_reflects_the_wiring() {
    use armature_di::Key;

    struct Logger;
    struct Db {
        _logger: Arc<Logger>,
    }
    struct App {
        _db: Arc<Db>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Logger);
    sc.add(Lifetime::Singleton, |logger: Arc<Logger>| Db { _logger: logger });
    sc.add(Lifetime::Singleton, |db: Arc<Db>| App { _db: db });

    let container = sc.build().unwrap();

    assert_eq!(
        container.dependencies_of(&Key::of::<App>()),
        vec![Key::of::<Db>()]
    );
    assert_eq!(
        container.dependents_of(&Key::of::<Logger>()),
        vec![Key::of::<Db>()]
    );
    let transitive = container.transitive_dependencies_of(&Key::of::<App>());
    assert!(transitive.contains(&Key::of::<Db>()));
    assert!(transitive.contains(&Key::of::<Logger>()));

    assert_eq!(container.graph_roots(), vec![Key::of::<App>()]);
    assert_eq!(container.graph_leaves(), vec![Key::of::<Logger>()]);

    let depths = container.service_depths();
    let depth_of = |key: Key| depths.iter().find(|(k, _)| *k == key).unwrap().1;
    assert_eq!(depth_of(Key::of::<App>()), 0);
    assert_eq!(depth_of(Key::of::<Db>()), 1);
    assert_eq!(depth_of(Key::of::<Logger>()), 2);

    // Three constructors analyzed, one entry each.
    assert_eq!(container.analyzer_cache_size(), 3);
}

#[test]
fn resolution_error_does_not_poison_the_container() {
    use std::io;

    struct Broken;
    struct Fine;

    let mut sc = ServiceCollection::new();
    sc.add_try(Lifetime::Transient, || -> Result<Broken, io::Error> {
        Err(io::Error::other("always fails"))
    });
    sc.add(Lifetime::Singleton, || Fine);

    let container = sc.build().unwrap();
    assert!(container.get::<Broken>().is_err());
    assert!(container.get::<Fine>().is_ok());
    // And the broken service still fails the same way.
    assert!(container.get::<Broken>().is_err());
}
