//! Integration tests for the in-memory backend.

mod helpers;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use widgetmesh_core::traits::EventBus;
use widgetmesh_core::types::{ConnectionInfo, EventMessage, Metadata, WidgetData};
use widgetmesh_state::WorkerId;
use widgetmesh_state::hub::LocalHub;
use widgetmesh_state::memory::MemoryEventBus;

#[tokio::test]
async fn test_widget_lifecycle() {
    let ctx = helpers::memory_context("worker-1").await;
    let widgets = ctx.widget_store();

    let mut metadata = Metadata::new();
    metadata.insert("kind".to_string(), json!("plotly"));
    let widget = WidgetData::new("chart-1", "<div id=\"chart\"></div>")
        .with_token("secret")
        .with_owner(ctx.worker_id().as_str())
        .with_metadata(metadata);
    widgets.register(widget.clone()).await.unwrap();

    assert_eq!(widgets.get("chart-1").await.unwrap(), Some(widget));
    assert_eq!(widgets.get_token("chart-1").await.unwrap().as_deref(), Some("secret"));
    assert!(widgets.update_html("chart-1", "<div>v2</div>").await.unwrap());
    assert_eq!(
        widgets.get_html("chart-1").await.unwrap().as_deref(),
        Some("<div>v2</div>")
    );
    assert_eq!(widgets.list_active().await.unwrap(), vec!["chart-1".to_string()]);
    assert_eq!(widgets.count_active().await.unwrap(), 1);

    assert!(widgets.delete("chart-1").await.unwrap());
    assert!(!widgets.exists("chart-1").await.unwrap());
    assert!(!widgets.update_html("chart-1", "<div>v3</div>").await.unwrap());
}

#[tokio::test]
async fn test_connection_routing() {
    let ctx = helpers::memory_context("worker-1").await;
    let router = ctx.connection_router();

    router
        .register(ConnectionInfo::new("chart-1", "worker-1"))
        .await
        .unwrap();
    assert!(router.heartbeat("chart-1").await.unwrap());
    assert_eq!(
        router.get("chart-1").await.unwrap().map(|c| c.worker_id),
        Some("worker-1".to_string())
    );

    router
        .register(ConnectionInfo::new("chart-1", "worker-2"))
        .await
        .unwrap();
    assert!(router.get_worker_connections("worker-1").await.unwrap().is_empty());
    assert_eq!(router.get_worker_connections("worker-2").await.unwrap().len(), 1);

    assert!(router.remove("chart-1").await.unwrap());
    assert!(!router.heartbeat("chart-1").await.unwrap());
}

#[tokio::test]
async fn test_session_roles() {
    let ctx = helpers::memory_context("worker-1").await;
    let sessions = ctx.session_store();

    let session = sessions.create("alice", None, None).await.unwrap();
    assert!(sessions.has_role(&session.session_id, "viewer").await.unwrap());

    let admin: BTreeSet<String> = ["admin".to_string()].into();
    assert!(sessions.update_roles(&session.session_id, admin).await.unwrap());
    assert!(sessions.has_role(&session.session_id, "admin").await.unwrap());
    assert!(!sessions.has_role(&session.session_id, "viewer").await.unwrap());
    assert!(sessions.touch(&session.session_id).await.unwrap());

    assert_eq!(sessions.get_by_user("alice").await.unwrap().len(), 1);
    assert!(sessions.delete(&session.session_id).await.unwrap());
    assert!(sessions.get_by_user("alice").await.unwrap().is_empty());
    assert!(!sessions.has_role(&session.session_id, "admin").await.unwrap());
}

#[tokio::test]
async fn test_grid_selection_reaches_subscriber() {
    let ctx = helpers::memory_context("worker-1").await;
    let bus = ctx.event_bus();

    let mut sub = bus.subscribe("grid-1").await.unwrap();
    bus.publish(EventMessage::new(
        "grid-1",
        "grid:row-selected",
        json!({"rows": [{"id": 7, "name": "Widget"}]}),
    ))
    .await
    .unwrap();

    let event = sub.next().await.unwrap();
    assert_eq!(event.namespace(), Some("grid"));
    assert_eq!(event.data["rows"][0]["id"], 7);
    assert_eq!(event.source_worker_id.as_deref(), Some("worker-1"));
}

#[tokio::test]
async fn test_worker_targeted_events_stay_on_worker() {
    let hub = Arc::new(LocalHub::new());
    let worker_a = MemoryEventBus::with_hub(hub.clone(), WorkerId::generate("a"));
    let worker_b = MemoryEventBus::with_hub(hub, WorkerId::generate("b"));

    let mut on_a = worker_a.subscribe("chart-1").await.unwrap();
    let mut on_b = worker_b.subscribe("chart-1").await.unwrap();

    worker_b
        .publish_to_worker(
            worker_a.worker_id(),
            EventMessage::new("chart-1", "plotly:relayout", json!({"xaxis.range": [0, 5]})),
        )
        .await
        .unwrap();
    worker_a
        .publish(EventMessage::new("chart-1", "plotly:click", json!({"x": 1})))
        .await
        .unwrap();

    assert_eq!(on_a.recv().await.unwrap().event_type, "plotly:relayout");
    assert_eq!(on_a.recv().await.unwrap().event_type, "plotly:click");
    assert_eq!(on_b.recv().await.unwrap().event_type, "plotly:click");
    assert!(on_b.try_recv().is_none());
}

#[tokio::test]
async fn test_dropped_subscription_stops_delivery() {
    let ctx = helpers::memory_context("worker-1").await;
    let bus = ctx.event_bus();

    let sub = bus.subscribe("chart-1").await.unwrap();
    let mut kept = bus.subscribe("chart-1").await.unwrap();
    drop(sub);

    bus.publish(EventMessage::new("chart-1", "plotly:hover", json!(null)))
        .await
        .unwrap();
    assert_eq!(kept.recv().await.unwrap().event_type, "plotly:hover");
}

#[tokio::test(start_paused = true)]
async fn test_records_expire() {
    let mut config = helpers::memory_config("worker-1");
    config.ttl.widget_seconds = 5;
    config.ttl.connection_seconds = 5;
    config.memory.sweep_interval_seconds = 1;
    let ctx = widgetmesh_state::StateContext::new(config).await.unwrap();

    ctx.widget_store()
        .register(WidgetData::new("chart-1", "<p/>"))
        .await
        .unwrap();
    ctx.connection_router()
        .register(ConnectionInfo::new("chart-1", "worker-1"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(!ctx.widget_store().exists("chart-1").await.unwrap());
    assert!(ctx.connection_router().get("chart-1").await.unwrap().is_none());
    assert_eq!(ctx.shutdown().await.unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_releases_connections() {
    let ctx = helpers::memory_context("worker-1").await;
    let router = ctx.connection_router();
    router
        .register(ConnectionInfo::new("chart-1", "worker-1"))
        .await
        .unwrap();
    router
        .register(ConnectionInfo::new("chart-2", "worker-2"))
        .await
        .unwrap();

    assert_eq!(ctx.shutdown().await.unwrap(), 1);
    assert!(router.get("chart-1").await.unwrap().is_none());
    assert!(router.get("chart-2").await.unwrap().is_some());
}
