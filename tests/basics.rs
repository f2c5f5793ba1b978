/// Basic binding and dispatch integration tests
///
/// These tests cover the consumer-visible happy paths: requesting a
/// reference, calling through a typed facade, and the error surfaces at
/// request time and call time.

use refgate::{
    value, AnyValue, FnDispatcher, GateState, InjectionSite, LocalServiceTable, RefError,
    RefResult, ReferenceBinder, ReferenceProxy, ReferenceRequest, TargetDispatcher,
};
use std::sync::Arc;

// ===== Test Services =====

trait Greeter {
    fn greet(&self, name: &str) -> RefResult<String>;
}

struct GreeterFacade(ReferenceProxy);

impl Greeter for GreeterFacade {
    fn greet(&self, name: &str) -> RefResult<String> {
        self.0.call_as("greet", vec![value(name.to_string())])
    }
}

fn greeter_request() -> ReferenceRequest {
    ReferenceRequest::new("demo.Greeter", || {
        Ok(Arc::new(FnDispatcher::new(|method: &str, mut args: Vec<AnyValue>| {
            match method {
                "greet" => {
                    let name = args
                        .remove(0)
                        .downcast::<String>()
                        .map_err(|_| "greet expects a string name")?;
                    if name.is_empty() {
                        return Err("boom".into());
                    }
                    Ok(value(format!("Hello, {}", name)))
                }
                other => Err(format!("unknown method `{}`", other).into()),
            }
        })) as Arc<dyn TargetDispatcher>)
    })
}

// ===== Integration Tests =====

#[test]
fn test_greeter_round_trip() {
    let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
    let greeter = GreeterFacade(binder.bind(greeter_request()).unwrap());
    assert_eq!(greeter.greet("Ann").unwrap(), "Hello, Ann");
}

#[test]
fn test_target_error_message_is_verbatim() {
    let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
    let greeter = GreeterFacade(binder.bind(greeter_request()).unwrap());

    let err = greeter.greet("").unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(matches!(err, RefError::Invocation(_)));
}

#[test]
fn test_unknown_method_error_comes_from_the_target() {
    let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
    let proxy = binder.bind(greeter_request()).unwrap();

    let err = proxy.call("missing", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "unknown method `missing`");
}

#[test]
fn test_remote_binding_failure_surfaces_at_request_time() {
    let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
    let err = binder
        .bind(ReferenceRequest::new("demo.Unreachable", || {
            Err("no provider available".into())
        }))
        .unwrap_err();

    match err {
        RefError::Binding(msg) => {
            assert!(msg.contains("demo.Unreachable"));
            assert!(msg.contains("no provider available"));
        }
        other => panic!("expected binding error, got {}", other),
    }
}

#[test]
fn test_missing_interface_fails_before_any_caching() {
    let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
    let err = binder
        .bind(ReferenceRequest::new("", || Err("factory must not run".into())))
        .unwrap_err();
    assert!(matches!(err, RefError::Configuration(_)));
    assert!(binder.reference_descriptors().is_empty());
}

#[test]
fn test_remote_reference_is_bound_with_zero_calls() {
    let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
    let proxy = binder.bind(greeter_request()).unwrap();
    assert_eq!(proxy.state(), GateState::Bound);
}

#[test]
fn test_introspection_lists_descriptors_and_sites() {
    let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
    binder
        .bind(greeter_request().site(InjectionSite::field("app::Checkout", "greeter")))
        .unwrap();
    binder
        .bind(
            ReferenceRequest::new("demo.Auditor", || {
                Ok(Arc::new(FnDispatcher::new(|_m: &str, _a| Ok(value(()))))
                    as Arc<dyn TargetDispatcher>)
            })
            .site(InjectionSite::method("app::Checkout", "set_auditor")),
        )
        .unwrap();

    let interfaces: Vec<_> = binder
        .reference_descriptors()
        .iter()
        .map(|d| d.interface().to_string())
        .collect();
    assert_eq!(interfaces, ["demo.Greeter", "demo.Auditor"]);
    assert_eq!(binder.field_site_descriptors().len(), 1);
    assert_eq!(binder.method_site_descriptors().len(), 1);
}
