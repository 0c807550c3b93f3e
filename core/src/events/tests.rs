use std::sync::Arc;
use std::time::Duration;

use crate::actions::ActionRegistry;
use crate::events::{
    EventBus, HandlerFailure, LifecyclePhase, RuntimeEvent, StateTransitionEngine, TransitionTable,
};
use crate::executor::types::Value;
use crate::executor::{ExecState, FailureKind};
use crate::parser::parse;
use crate::services::Services;

const ORDERS: &str = r#"
(Place Order: Orders) {
    <Create> the <order> with { id: 7, status: "draft" }.
    <Accept> the <transition: draft_to_placed> on <order: status>.
    <Return> an <OK: status> with <order>.
}

(Pay Order: Orders) {
    <Create> the <order> with { id: 7, status: "placed" }.
    <Accept> the <transition: placed_to_paid> on <order: status>.
}

(Skip Ahead: Orders) {
    <Create> the <order> with { id: 8, status: "draft" }.
    <Accept> the <transition: draft_to_paid> on <order: status>.
}

(Announce Placement: status StateObserver<draft_to_placed>) {
    <Extract> the <state> from the <transition: toState>.
    <Store> the <state> into the <placed-repository>.
}

(Audit: status StateObserver) {
    <Extract> the <state> from the <transition: toState>.
    <Store> the <state> into the <audit-repository>.
}
"#;

fn services() -> Arc<Services> {
    let table = TransitionTable::parse(&["draft -> placed", "placed -> paid"]).unwrap();
    let engine = StateTransitionEngine::new().with_table("status", table);
    Arc::new(Services::new(ActionRegistry::with_builtins().unwrap()).with_transitions(engine))
}

async fn subscribed(bus: EventBus, source: &str) -> EventBus {
    let program = parse(source).expect("source should parse");
    bus.subscribe_program(&program).await;
    bus
}

async fn bus_for(source: &str) -> EventBus {
    subscribed(EventBus::new(services()), source).await
}

/* ===================== State observers ===================== */

#[tokio::test]
async fn test_filtered_observer_only_sees_its_transition() {
    let bus = bus_for(ORDERS).await;

    let reports = bus.emit(RuntimeEvent::route("Place Order")).await.wait().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_success());
    let response = reports[0].outcome().unwrap().response.clone().unwrap();
    assert_eq!(response.value.get("status"), Some(&Value::from("placed")));
    bus.wait_idle().await;

    let repositories = &bus.services().repositories;
    assert_eq!(
        repositories.retrieve("placed-repository"),
        Some(vec![Value::from("placed")])
    );
    assert_eq!(repositories.len("audit-repository"), 1);

    bus.emit(RuntimeEvent::route("Pay Order")).await.wait().await;
    bus.wait_idle().await;

    assert_eq!(repositories.len("placed-repository"), 1);
    assert_eq!(
        repositories.retrieve("audit-repository"),
        Some(vec![Value::from("placed"), Value::from("paid")])
    );
}

#[tokio::test]
async fn test_rejected_transition_changes_nothing() {
    let bus = bus_for(ORDERS).await;

    let reports = bus.emit(RuntimeEvent::route("Skip Ahead")).await.wait().await;
    bus.wait_idle().await;

    let outcome = reports[0].outcome().unwrap();
    assert_eq!(outcome.state, ExecState::Thrown);
    let error = outcome.error.as_ref().unwrap();
    assert_eq!(error.kind, FailureKind::TransitionRejected);
    assert_eq!(
        error.message,
        "Cannot accept the transition draft_to_paid on the order."
    );
    assert_eq!(
        outcome.binding("order").and_then(|o| o.get("status")),
        Some(&Value::from("draft"))
    );
    assert!(outcome.events.is_empty());
    assert_eq!(bus.services().repositories.len("audit-repository"), 0);
}

/* ===================== Fan-out ===================== */

#[tokio::test]
async fn test_failing_handler_does_not_stop_others() {
    let bus = bus_for(
        r#"
        (Fail Loudly: Ping Handler) {
            <Throw> a <Broken: error> with "boom".
        }
        (Record Ping: Ping Handler) {
            <Extract> the <count> from the <event: count>.
            <Store> the <count> into the <ping-repository>.
        }
    "#,
    )
    .await;

    let event = RuntimeEvent::domain("Ping").with("count", Value::from(1i64));
    let reports = bus.emit(event).await.wait().await;
    assert_eq!(reports.len(), 2);

    let failed = reports.iter().find(|r| r.feature_set == "Fail Loudly").unwrap();
    assert!(!failed.is_success());
    assert_eq!(
        failed.outcome().and_then(|o| o.error.as_ref()).and_then(|e| e.category()),
        Some("Broken")
    );

    let recorded = reports.iter().find(|r| r.feature_set == "Record Ping").unwrap();
    assert!(recorded.is_success());
    assert_eq!(bus.services().repositories.len("ping-repository"), 1);
}

#[tokio::test]
async fn test_raised_events_cascade_until_idle() {
    let bus = bus_for(
        r#"
        (Sign Up: Users) {
            <Create> the <user> with { email: "ada@example.com" }.
            <Emit> a <UserCreated: event> with <user>.
            <Return> a <Created: status> with <user>.
        }
        (Send Welcome: UserCreated Handler) {
            <Extract> the <email> from the <event: email>.
            <Store> the <email> into the <outbox-repository>.
        }
    "#,
    )
    .await;

    let reports = bus.emit(RuntimeEvent::route("Sign Up")).await.wait().await;
    assert!(reports[0].is_success());
    bus.wait_idle().await;

    assert_eq!(bus.in_flight(), 0);
    assert_eq!(
        bus.services().repositories.retrieve("outbox-repository"),
        Some(vec![Value::from("ada@example.com")])
    );
}

#[tokio::test]
async fn test_event_without_handlers() {
    let bus = bus_for(ORDERS).await;
    let dispatch = bus.emit(RuntimeEvent::domain("Nobody Listens")).await;
    assert!(dispatch.is_empty());
    assert!(dispatch.wait().await.is_empty());
    bus.wait_idle().await;
}

#[tokio::test]
async fn test_wait_idle_returns_once_handlers_finish() {
    let bus = bus_for(GREET).await;
    tokio::time::timeout(Duration::from_secs(1), bus.wait_idle())
        .await
        .expect("idle bus should not block");

    let event = RuntimeEvent::route("Greet").with("body", Value::object([("name", Value::from("Cy"))]));
    let dispatch = bus.emit(event).await;
    assert_eq!(dispatch.handler_count(), 1);
    tokio::time::timeout(Duration::from_secs(5), bus.wait_idle())
        .await
        .expect("handler should finish");
    assert_eq!(bus.in_flight(), 0);
    assert!(dispatch.wait().await[0].is_success());
}

#[tokio::test]
async fn test_handler_timeout() {
    let bus = EventBus::with_handler_timeout(services(), Some(Duration::from_millis(20)));
    let bus = subscribed(
        bus,
        "(Application-Start: Demo) { <Keepalive> the <application> for the <events>. }",
    )
    .await;

    let reports = bus
        .emit(RuntimeEvent::lifecycle(LifecyclePhase::Start))
        .await
        .wait()
        .await;
    assert_eq!(
        reports[0].outcome.as_ref().unwrap_err(),
        &HandlerFailure::TimedOut(Duration::from_millis(20))
    );
}

/* ===================== Routes ===================== */

const GREET: &str = r#"
(Greet: Api) {
    <Extract> the <name> from the <body: name>.
    <Return> an <OK: status> with <name>.
}
"#;

#[tokio::test]
async fn test_route_binds_request_parts() {
    let bus = bus_for(GREET).await;
    let event = RuntimeEvent::route("Greet").with("body", Value::object([("name", Value::from("Ada"))]));

    let reports = bus.emit(event).await.wait().await;
    let response = reports[0].outcome().unwrap().response.clone().unwrap();
    assert_eq!(response.status, "OK");
    assert_eq!(response.value, Value::from("Ada"));
}

#[tokio::test]
async fn test_invoke_by_name() {
    let bus = bus_for(GREET).await;
    let event = RuntimeEvent::route("unused").with("body", Value::object([("name", Value::from("Bo"))]));

    let report = bus.invoke("Greet", event.clone()).await.unwrap();
    assert!(report.is_success());
    assert!(bus.invoke("Missing", event).await.is_none());
}
