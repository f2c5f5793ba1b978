/// Concurrent binding integration tests
///
/// These tests verify the exactly-once guarantees under contention: one
/// descriptor per identity no matter how many threads request it first, and
/// one target initialization when fallback binds race the export
/// notification.

use refgate::{
    value, AnyValue, FnDispatcher, LifecycleEvent, LocalServiceTable, ReferenceBinder,
    ReferenceKeyBuilder, ReferenceRequest, TargetDispatcher,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};

// ===== Test Services =====

fn greeter_request(builds: Arc<AtomicU32>) -> ReferenceRequest {
    ReferenceRequest::new("demo.Greeter", move || {
        builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FnDispatcher::new(|method: &str, mut args: Vec<AnyValue>| {
            match method {
                "greet" => {
                    let name = args
                        .remove(0)
                        .downcast::<String>()
                        .map_err(|_| "greet expects a string name")?;
                    Ok(value(format!("Hello, {}", name)))
                }
                other => Err(format!("unknown method `{}`", other).into()),
            }
        })) as Arc<dyn TargetDispatcher>)
    })
}

// ===== Integration Tests =====

#[test]
fn test_concurrent_requests_share_one_descriptor() {
    const THREADS: usize = 16;

    let binder = Arc::new(ReferenceBinder::new(Arc::new(LocalServiceTable::new())));
    let builds = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let binder = binder.clone();
            let builds = builds.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                binder.bind(greeter_request(builds)).unwrap()
            })
        })
        .collect();

    let proxies: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // One descriptor, one gate, one target build across all threads.
    for proxy in &proxies[1..] {
        assert!(Arc::ptr_eq(proxies[0].gate(), proxy.gate()));
        assert!(Arc::ptr_eq(
            proxies[0].gate().descriptor(),
            proxy.gate().descriptor()
        ));
    }
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(binder.reference_descriptors().len(), 1);
}

#[test]
fn test_invoke_racing_export_notification_binds_once() {
    const CALLERS: usize = 50;

    let locals = Arc::new(LocalServiceTable::new());
    let identity = ReferenceKeyBuilder::new("demo.Greeter").build().unwrap();
    locals.register(identity.clone());
    let binder = ReferenceBinder::new(locals);

    let builds = Arc::new(AtomicU32::new(0));
    let proxy = binder.bind(greeter_request(builds.clone())).unwrap();
    let barrier = Barrier::new(CALLERS + 1);

    crossbeam_utils::thread::scope(|s| {
        for i in 0..CALLERS {
            let proxy = proxy.clone();
            let barrier = &barrier;
            s.spawn(move |_| {
                barrier.wait();
                let greeting: String = proxy
                    .call_as("greet", vec![value(format!("caller-{}", i))])
                    .unwrap();
                assert_eq!(greeting, format!("Hello, caller-{}", i));
            });
        }

        let coordinator = binder.coordinator();
        let identity = identity.clone();
        let barrier = &barrier;
        s.spawn(move |_| {
            barrier.wait();
            coordinator.notify(LifecycleEvent::LocalExported { identity });
        });
    })
    .unwrap();

    // Exactly one bind won the race; nobody saw a second target.
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_distinct_identities_bind_independently() {
    const THREADS: usize = 8;

    let binder = Arc::new(ReferenceBinder::new(Arc::new(LocalServiceTable::new())));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let binder = binder.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let proxy = binder
                    .bind(
                        ReferenceRequest::new(format!("demo.Service{}", i), move || {
                            Ok(Arc::new(FnDispatcher::new(move |_m: &str, _a| {
                                Ok(value(i as u64))
                            })) as Arc<dyn TargetDispatcher>)
                        }),
                    )
                    .unwrap();
                let got: u64 = proxy.call_as("index", Vec::new()).unwrap();
                assert_eq!(got, i as u64);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(binder.reference_descriptors().len(), THREADS);
}
