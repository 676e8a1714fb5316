use armature_di::{BuildOptions, Context, Lifetime, Resolver, ServiceCollection};
use crossbeam_utils::thread;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn concurrent_singleton_resolution_yields_one_instance() {
    static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);

    struct Expensive;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || {
        CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
        // Widen the race window for competing first resolutions.
        std::thread::sleep(Duration::from_millis(10));
        Expensive
    });

    // Lazy build so the threads race on the first resolution.
    let container = sc
        .build_with(BuildOptions::new().eager_singletons(false))
        .unwrap();

    let resolved: Mutex<Vec<Arc<Expensive>>> = Mutex::new(Vec::new());
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                let instance = container.get::<Expensive>().unwrap();
                resolved.lock().unwrap().push(instance);
            });
        }
    })
    .unwrap();

    let resolved = resolved.into_inner().unwrap();
    assert_eq!(resolved.len(), 8);
    assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 1);
    for instance in &resolved[1..] {
        assert!(Arc::ptr_eq(&resolved[0], instance));
    }
}

#[test]
fn concurrent_scoped_resolution_is_single_flight_per_scope() {
    struct Session;

    let constructions = Arc::new(AtomicUsize::new(0));
    let constructions_clone = constructions.clone();

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Scoped, move || {
        constructions_clone.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        Session
    });

    let container = sc.build().unwrap();
    let scope = container.create_scope(Context::new()).unwrap();

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                scope.get::<Session>().unwrap();
            });
        }
    })
    .unwrap();

    assert_eq!(constructions.load(Ordering::SeqCst), 1);

    // A second scope constructs its own instance.
    let other = container.create_scope(Context::new()).unwrap();
    other.get::<Session>().unwrap();
    assert_eq!(constructions.load(Ordering::SeqCst), 2);
}

#[test]
fn distinct_services_resolve_in_parallel_without_interference() {
    struct Alpha;
    struct Beta;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Transient, || Alpha);
    sc.add(Lifetime::Transient, || Beta);

    let container = sc.build().unwrap();
    let container = &container;

    thread::scope(|s| {
        for i in 0..16 {
            s.spawn(move |_| {
                if i % 2 == 0 {
                    container.get::<Alpha>().unwrap();
                } else {
                    container.get::<Beta>().unwrap();
                }
            });
        }
    })
    .unwrap();
}

#[test]
fn resolutions_racing_a_close_either_complete_or_fail_cleanly() {
    struct Session;

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Scoped, || Session);

    let container = sc.build().unwrap();
    let scope = container.create_scope(Context::new()).unwrap();

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                // Either a fresh instance or ScopeDisposed; never a hang
                // or another error kind.
                match scope.get::<Session>() {
                    Ok(_) => {}
                    Err(armature_di::DiError::ScopeDisposed) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            });
        }
        s.spawn(|_| {
            scope.close().unwrap();
        });
    })
    .unwrap();

    assert!(scope.is_disposed());
}

#[test]
fn group_resolution_is_thread_safe() {
    struct Plugin;

    let mut sc = ServiceCollection::new();
    for _ in 0..3 {
        sc.add(Lifetime::Singleton, || Plugin).in_group("plugins");
    }

    let container = sc.build().unwrap();
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                let plugins = container.get_group::<Plugin>("plugins").unwrap();
                assert_eq!(plugins.len(), 3);
            });
        }
    })
    .unwrap();
}
