use armature_di::{DiError, Key, Lifetime, Resolver, ResolverContext, ServiceCollection};
use std::sync::Arc;

struct A {
    _b: Arc<B>,
}
struct B {
    _a: Arc<A>,
}

#[test]
fn two_service_cycle_fails_the_build() {
    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Transient, |b: Arc<B>| A { _b: b });
    sc.add(Lifetime::Transient, |a: Arc<A>| B { _a: a });

    match sc.build() {
        Err(DiError::Circular { path }) => {
            // The path closes on itself: [A, B, A] or a rotation of it.
            assert_eq!(path.len(), 3);
            assert_eq!(path.first(), path.last());
            let names: Vec<&str> = path.iter().map(Key::display_name).collect();
            assert!(names.iter().any(|n| n.ends_with("::A")));
            assert!(names.iter().any(|n| n.ends_with("::B")));
        }
        other => panic!("expected Circular, got {other:?}", other = other.err()),
    }
}

#[test]
fn self_dependency_fails_the_build() {
    struct Selfish {
        _inner: Arc<Selfish>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Transient, |inner: Arc<Selfish>| Selfish {
        _inner: inner,
    });

    match sc.build() {
        Err(DiError::Circular { path }) => assert_eq!(path.len(), 2),
        other => panic!("expected Circular, got {other:?}", other = other.err()),
    }
}

#[test]
fn three_service_cycle_reports_the_full_path() {
    struct X {
        _y: Arc<Y>,
    }
    struct Y {
        _z: Arc<Z>,
    }
    struct Z {
        _x: Arc<X>,
    }

    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Transient, |y: Arc<Y>| X { _y: y });
    sc.add(Lifetime::Transient, |z: Arc<Z>| Y { _z: z });
    sc.add(Lifetime::Transient, |x: Arc<X>| Z { _x: x });

    match sc.build() {
        Err(DiError::Circular { path }) => {
            assert_eq!(path.len(), 4);
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected Circular, got {other:?}", other = other.err()),
    }
}

#[test]
fn factory_cycle_is_caught_at_resolution() {
    // Manual factories declare no dependencies, so the graph cannot see
    // this cycle; the per-thread resolution stack reports it instead.
    struct Chicken;
    struct Egg;

    let mut sc = ServiceCollection::new();
    sc.add_factory_try(Lifetime::Transient, |cx: &ResolverContext<'_>| {
        let _ = cx.get::<Egg>()?;
        Ok(Chicken)
    });
    sc.add_factory_try(Lifetime::Transient, |cx: &ResolverContext<'_>| {
        let _ = cx.get::<Chicken>()?;
        Ok(Egg)
    });

    let container = sc.build().unwrap();
    match container.get::<Chicken>() {
        Err(DiError::Circular { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.len() >= 3);
        }
        other => panic!("expected Circular, got {other:?}", other = other.err()),
    }

    // The failed chain does not poison later resolutions of other
    // services.
    struct Standalone;
    let mut sc = ServiceCollection::new();
    sc.add(Lifetime::Singleton, || Standalone);
    let container = sc.build().unwrap();
    assert!(container.get::<Standalone>().is_ok());
}

#[test]
fn self_resolving_factory_is_caught() {
    struct Recursive;

    let mut sc = ServiceCollection::new();
    sc.add_factory(Lifetime::Transient, |cx: &ResolverContext<'_>| {
        let _ = cx.get::<Recursive>();
        Recursive
    });

    let container = sc.build().unwrap();
    // The inner resolution fails with a cycle, but this factory swallows
    // the error and still produces a value.
    assert!(container.get::<Recursive>().is_ok());
}
