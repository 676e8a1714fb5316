use armature_di::{
    BoxError, Context, Dispose, Lifetime, ParamObject, Resolver, ResultObject, ServiceCollection,
};
use std::sync::{Arc, Mutex};

struct Db {
    url: &'static str,
}
struct Cache {
    backend: &'static str,
}
struct Metrics;
struct Check {
    name: &'static str,
}

#[test]
fn derived_param_object_declares_and_resolves_fields() {
    #[derive(ParamObject)]
    struct HandlerDeps {
        db: Arc<Db>,
        #[di(key = "redis")]
        cache: Arc<Cache>,
        #[di(group = "checks")]
        checks: Vec<Arc<Check>>,
        metrics: Option<Arc<Metrics>>,
        #[di(skip)]
        tag: String,
    }

    struct Handler {
        backend: &'static str,
        check_count: usize,
        has_metrics: bool,
        tag: String,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Db { url: "pg://db" });
    sc.add(Lifetime::Singleton, || Cache { backend: "redis" })
        .keyed("redis");
    sc.add(Lifetime::Singleton, || Check { name: "ping" })
        .in_group("checks");
    sc.add(Lifetime::Singleton, || Check { name: "disk" })
        .in_group("checks");
    sc.add(Lifetime::Singleton, |deps: HandlerDeps| Handler {
        backend: deps.cache.backend,
        check_count: deps.checks.len(),
        has_metrics: deps.metrics.is_some(),
        tag: deps.tag,
    });

    // The declared dependencies mirror the fields, in order.
    let deps = HandlerDeps::dependencies();
    assert_eq!(deps.len(), 4); // skip field declares nothing
    assert_eq!(deps[1].key, Some("redis"));
    assert_eq!(deps[2].group, Some("checks"));
    assert!(deps[3].optional);

    let container = sc.build().unwrap();
    let handler = container.get::<Handler>().unwrap();
    assert_eq!(handler.backend, "redis");
    assert_eq!(handler.check_count, 2);
    assert!(!handler.has_metrics);
    assert_eq!(handler.tag, "");
    let _ = container.get::<Db>().unwrap().url;
}

#[test]
fn param_object_group_members_arrive_in_registration_order() {
    #[derive(ParamObject)]
    struct CheckSet {
        #[di(group = "checks")]
        checks: Vec<Arc<Check>>,
    }

    struct Runner {
        names: Vec<&'static str>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Check { name: "first" })
        .in_group("checks");
    sc.add(Lifetime::Singleton, || Check { name: "second" })
        .in_group("checks");
    sc.add(Lifetime::Singleton, |set: CheckSet| Runner {
        names: set.checks.iter().map(|c| c.name).collect(),
    });

    let container = sc.build().unwrap();
    let runner = container.get::<Runner>().unwrap();
    assert_eq!(runner.names, ["first", "second"]);
}

#[test]
fn missing_param_object_dependency_fails_validation() {
    #[derive(ParamObject)]
    struct Deps {
        db: Arc<Db>,
    }

    struct Service {
        _url: &'static str,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, |deps: Deps| Service {
        _url: deps.db.url,
    });

    // Db was never registered; the build reports it, not the first
    // resolution.
    assert!(sc.build().is_err());
}

#[test]
fn hand_written_param_object_is_first_class() {
    use armature_di::{Dependency, DiResult, ResolverContext};

    struct ManualDeps {
        db: Arc<Db>,
        metrics: Option<Arc<Metrics>>,
    }

    impl ParamObject for ManualDeps {
        fn dependencies() -> Vec<Dependency> {
            vec![
                Dependency::required::<Db>(),
                Dependency::optional::<Metrics>(),
            ]
        }

        fn build(cx: &ResolverContext<'_>) -> DiResult<Self> {
            Ok(Self {
                db: cx.get::<Db>()?,
                metrics: cx.get_optional::<Metrics>()?,
            })
        }
    }

    struct Service {
        url: &'static str,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Db { url: "pg://manual" });
    sc.add(Lifetime::Singleton, |deps: ManualDeps| Service {
        url: deps.db.url,
    });

    let container = sc.build().unwrap();
    assert_eq!(container.get::<Service>().unwrap().url, "pg://manual");
}

#[test]
fn derived_result_object_registers_each_field() {
    #[derive(ResultObject)]
    struct StorageBundle {
        #[di(key = "primary")]
        primary: Db,
        #[di(key = "replica")]
        replica: Db,
        #[di(group = "checks")]
        health: Check,
    }

    let mut sc = ServiceCollection::new();
    sc.add_out(Lifetime::Singleton, || StorageBundle {
        primary: Db { url: "pg://primary" },
        replica: Db { url: "pg://replica" },
        health: Check { name: "storage" },
    });

    let container = sc.build().unwrap();
    assert_eq!(
        container.get_keyed::<Db>("primary").unwrap().url,
        "pg://primary"
    );
    assert_eq!(
        container.get_keyed::<Db>("replica").unwrap().url,
        "pg://replica"
    );
    let checks = container.get_group::<Check>("checks").unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].name, "storage");
}

#[test]
fn result_object_constructor_runs_once_for_all_fields() {
    let runs = Arc::new(Mutex::new(0));
    let runs_clone = runs.clone();

    #[derive(ResultObject)]
    struct Pair {
        #[di(key = "a")]
        a: Db,
        #[di(key = "b")]
        b: Db,
    }

    let mut sc = ServiceCollection::new();
    sc.add_out(Lifetime::Singleton, move || {
        *runs_clone.lock().unwrap() += 1;
        Pair {
            a: Db { url: "a" },
            b: Db { url: "b" },
        }
    });

    let container = sc.build().unwrap();
    container.get_keyed::<Db>("a").unwrap();
    container.get_keyed::<Db>("b").unwrap();
    assert_eq!(*runs.lock().unwrap(), 1);
}

#[test]
fn disposable_result_field_is_tracked() {
    let disposed = Arc::new(Mutex::new(false));

    struct Conn {
        disposed: Arc<Mutex<bool>>,
    }

    impl Dispose for Conn {
        fn dispose(&self) -> Result<(), BoxError> {
            *self.disposed.lock().unwrap() = true;
            Ok(())
        }
    }

    #[derive(ResultObject)]
    struct ConnBundle {
        #[di(disposable)]
        conn: Conn,
    }

    let disposed_clone = disposed.clone();
    let mut sc = ServiceCollection::new();
    sc.add_out(Lifetime::Scoped, move || ConnBundle {
        conn: Conn {
            disposed: disposed_clone.clone(),
        },
    });

    let container = sc.build().unwrap();
    let scope = container.create_scope(Context::new()).unwrap();
    scope.get::<Conn>().unwrap();
    scope.close().unwrap();
    assert!(*disposed.lock().unwrap());
}

#[test]
fn fallible_result_object_propagates_errors() {
    use std::io;

    #[derive(ResultObject)]
    struct Bundle {
        db: Db,
    }

    let mut sc = ServiceCollection::new();
    sc.add_out_try(Lifetime::Transient, || -> Result<Bundle, io::Error> {
        Err(io::Error::other("bundle failed"))
    });

    let container = sc.build().unwrap();
    assert!(container.get::<Db>().is_err());
}
