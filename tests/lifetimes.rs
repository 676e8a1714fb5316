use armature_di::{BuildOptions, DiError, Lifetime, Resolver, ServiceCollection};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn singleton_cannot_depend_on_scoped() {
    struct ScopedCtx;
    struct Cache {
        _ctx: Arc<ScopedCtx>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Scoped, || ScopedCtx);
    sc.add(Lifetime::Singleton, |ctx: Arc<ScopedCtx>| Cache { _ctx: ctx });

    match sc.build() {
        Err(DiError::LifetimeConflict {
            service,
            lifetime,
            dependency,
            dependency_lifetime,
        }) => {
            assert!(service.ends_with("::Cache"));
            assert_eq!(lifetime, Lifetime::Singleton);
            assert!(dependency.ends_with("::ScopedCtx"));
            assert_eq!(dependency_lifetime, Lifetime::Scoped);
        }
        other => panic!("expected LifetimeConflict, got {other:?}", other = other.err()),
    }
}

#[test]
fn singleton_cannot_depend_on_transient() {
    struct Temp;
    struct Holder {
        _temp: Arc<Temp>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Transient, || Temp);
    sc.add(Lifetime::Singleton, |temp: Arc<Temp>| Holder { _temp: temp });

    assert!(matches!(
        sc.build(),
        Err(DiError::LifetimeConflict { .. })
    ));
}

#[test]
fn scoped_cannot_depend_on_transient() {
    struct Temp;
    struct Session {
        _temp: Arc<Temp>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Transient, || Temp);
    sc.add(Lifetime::Scoped, |temp: Arc<Temp>| Session { _temp: temp });

    assert!(matches!(
        sc.build(),
        Err(DiError::LifetimeConflict { .. })
    ));
}

#[test]
fn transient_may_depend_on_anything() {
    struct Config;
    struct Session;
    struct Worker {
        _config: Arc<Config>,
        _session: Arc<Session>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Config);
    sc.add(Lifetime::Scoped, || Session);
    sc.add(
        Lifetime::Transient,
        |config: Arc<Config>, session: Arc<Session>| Worker {
            _config: config,
            _session: session,
        },
    );

    assert!(sc.build().is_ok());
}

#[test]
fn scoped_may_depend_on_singleton() {
    struct Config;
    struct Session {
        _config: Arc<Config>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Config);
    sc.add(Lifetime::Scoped, |config: Arc<Config>| Session {
        _config: config,
    });

    assert!(sc.build().is_ok());
}

#[test]
fn missing_required_dependency_fails_validation() {
    struct Missing;
    struct Needy {
        _missing: Arc<Missing>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, |missing: Arc<Missing>| Needy {
        _missing: missing,
    });

    match sc.build() {
        Err(DiError::Validation { service, reason }) => {
            assert!(service.ends_with("::Needy"));
            assert!(reason.contains("Missing"));
        }
        other => panic!("expected Validation, got {other:?}", other = other.err()),
    }
}

#[test]
fn duplicate_registration_fails_the_build() {
    struct Config;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Config);
    sc.add(Lifetime::Singleton, || Config);

    assert!(matches!(
        sc.build(),
        Err(DiError::DuplicateRegistration { .. })
    ));
}

#[test]
fn duplicate_keys_collide_but_distinct_keys_coexist() {
    struct Cache;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Cache).keyed("a");
    sc.add(Lifetime::Singleton, || Cache).keyed("b");
    assert!(sc.build().is_ok());

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Cache).keyed("a");
    sc.add(Lifetime::Singleton, || Cache).keyed("a");
    assert!(matches!(
        sc.build(),
        Err(DiError::DuplicateRegistration { key: Some("a"), .. })
    ));
}

#[test]
fn eager_constructor_failure_aborts_the_build() {
    use std::io;

    struct Flaky;

    let mut sc = ServiceCollection::new();
    sc.add_try(Lifetime::Singleton, || -> Result<Flaky, io::Error> {
        Err(io::Error::other("refused to start"))
    });

    assert!(matches!(sc.build(), Err(DiError::Resolution { .. })));
}

#[test]
fn zero_timeout_aborts_the_build() {
    struct Config;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Config);

    match sc.build_with(BuildOptions::new().timeout(Duration::ZERO)) {
        Err(DiError::BuildTimeout(timeout)) => assert_eq!(timeout, Duration::ZERO),
        other => panic!("expected BuildTimeout, got {:?}", other.err()),
    }
}

#[test]
fn generous_timeout_does_not_fire() {
    struct Config;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Config);

    let container = sc
        .build_with(BuildOptions::new().timeout(Duration::from_secs(30)))
        .unwrap();
    assert!(container.get::<Config>().is_ok());
}
