//! Tests for the event-to-WebSocket fan-out loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use somnia_api::fanout::EventFanout;
use somnia_api::ws::WsManager;
use somnia_core::events::{EVENT_ESCALATION_ALERT, EVENT_VITALS_AGGREGATED};
use somnia_events::{EventBus, TelemetryEvent};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn cancel_stops_fanout_while_bus_handles_remain() {
    let bus = Arc::new(EventBus::default());
    let manager = Arc::new(WsManager::new());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        EventFanout::new(Arc::clone(&manager)).run(bus.subscribe(), cancel.clone()),
    );

    // The bus stays alive the whole time; cancellation alone must stop
    // the loop, without waiting out any join timeout.
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("fan-out should stop on cancel while the bus is open")
        .unwrap();

    bus.publish(TelemetryEvent::new(EVENT_VITALS_AGGREGATED).for_patient(1));
}

#[tokio::test]
async fn fanout_stops_when_bus_is_dropped() {
    let bus = EventBus::default();
    let manager = Arc::new(WsManager::new());
    let receiver = bus.subscribe();

    let handle = tokio::spawn(
        EventFanout::new(Arc::clone(&manager)).run(receiver, CancellationToken::new()),
    );

    drop(bus);
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("fan-out should stop once the bus is dropped")
        .unwrap();
}

#[tokio::test]
async fn aggregated_events_reach_patient_subscribers() {
    let bus = EventBus::default();
    let manager = Arc::new(WsManager::new());
    let cancel = CancellationToken::new();

    let mut rx = manager.add("conn-1".to_string()).await;
    manager.subscribe("conn-1", 7).await;

    let handle = tokio::spawn(
        EventFanout::new(Arc::clone(&manager)).run(bus.subscribe(), cancel.clone()),
    );

    bus.publish(
        TelemetryEvent::new(EVENT_VITALS_AGGREGATED)
            .for_patient(7)
            .with_payload(serde_json::json!({"vitals": {"oxygen_level": 95.0}})),
    );
    bus.publish(
        TelemetryEvent::new(EVENT_ESCALATION_ALERT)
            .for_patient(7)
            .with_payload(serde_json::json!({"severity": "severe"})),
    );

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("subscriber should receive the vitals frame")
        .unwrap();
    let Message::Text(text) = first else {
        panic!("expected a text frame");
    };
    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["type"], "newVitals");
    assert_eq!(frame["patientId"], 7);
    assert_eq!(frame["vitals"]["oxygen_level"], 95.0);

    let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("subscriber should receive the alert frame")
        .unwrap();
    let Message::Text(text) = second else {
        panic!("expected a text frame");
    };
    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["type"], "alert");
    assert_eq!(frame["alert"]["severity"], "severe");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
}
