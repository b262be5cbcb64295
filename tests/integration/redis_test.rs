//! Integration tests for the Redis backend.
//!
//! Skipped unless `WIDGETMESH_TEST_REDIS_URL` points at a disposable server.
//! Every test works under its own key prefix.

mod helpers;

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use widgetmesh_core::types::{ConnectionInfo, EventMessage, WidgetData};
use widgetmesh_state::keys::KeySpace;

#[tokio::test]
async fn test_widget_store_roundtrip() {
    let prefix = helpers::unique_prefix();
    let Some(ctx) = helpers::redis_context("worker-1", &prefix).await else {
        return;
    };
    assert!(ctx.is_deploy_mode());
    assert!(ctx.health_check().await.unwrap());

    let widgets = ctx.widget_store();
    let widget = WidgetData::new("chart-1", "<div>v1</div>")
        .with_token("secret")
        .with_owner("worker-1");
    widgets.register(widget.clone()).await.unwrap();

    assert_eq!(widgets.get("chart-1").await.unwrap(), Some(widget));
    assert_eq!(widgets.get_token("chart-1").await.unwrap().as_deref(), Some("secret"));
    assert!(widgets.update_html("chart-1", "<div>v2</div>").await.unwrap());
    assert!(!widgets.update_html("missing", "<div/>").await.unwrap());

    let stored = widgets.get("chart-1").await.unwrap().unwrap();
    assert_eq!(stored.html, "<div>v2</div>");
    assert_eq!(stored.owner_worker_id.as_deref(), Some("worker-1"));

    widgets.register(WidgetData::new("chart-2", "<p/>")).await.unwrap();
    let mut active = widgets.list_active().await.unwrap();
    active.sort();
    assert_eq!(active, vec!["chart-1".to_string(), "chart-2".to_string()]);
    // Re-registration drops fields the new record does not carry.
    widgets.register(WidgetData::new("chart-1", "<p/>")).await.unwrap();
    assert_eq!(widgets.get_token("chart-1").await.unwrap(), None);

    assert!(widgets.delete("chart-1").await.unwrap());
    assert!(!widgets.delete("chart-1").await.unwrap());
    assert!(widgets.delete("chart-2").await.unwrap());
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connections_shared_between_workers() {
    let prefix = helpers::unique_prefix();
    let Some(first) = helpers::redis_context("worker-1", &prefix).await else {
        return;
    };
    let Some(second) = helpers::redis_context("worker-2", &prefix).await else {
        return;
    };

    first
        .connection_router()
        .register(ConnectionInfo::new("chart-1", "worker-1"))
        .await
        .unwrap();
    first
        .connection_router()
        .register(ConnectionInfo::new("chart-2", "worker-1"))
        .await
        .unwrap();

    let seen = second.connection_router().get("chart-1").await.unwrap().unwrap();
    assert_eq!(seen.worker_id, "worker-1");
    assert!(second.connection_router().heartbeat("chart-1").await.unwrap());
    assert!(!second.connection_router().heartbeat("missing").await.unwrap());

    let owned = second
        .connection_router()
        .get_worker_connections("worker-1")
        .await
        .unwrap();
    assert_eq!(owned.len(), 2);

    assert_eq!(first.shutdown().await.unwrap(), 2);
    assert!(second.connection_router().get("chart-1").await.unwrap().is_none());
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sessions_indexed_by_user() {
    let prefix = helpers::unique_prefix();
    let Some(ctx) = helpers::redis_context("worker-1", &prefix).await else {
        return;
    };
    let sessions = ctx.session_store();

    let first = sessions.create("alice", None, None).await.unwrap();
    let second = sessions
        .create("alice", Some(BTreeSet::from(["admin".to_string()])), None)
        .await
        .unwrap();
    assert_eq!(first.roles, BTreeSet::from(["viewer".to_string()]));

    let listed = sessions.get_by_user("alice").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].session_id, first.session_id);

    assert!(
        sessions
            .update_roles(&first.session_id, BTreeSet::from(["editor".to_string()]))
            .await
            .unwrap()
    );
    assert!(sessions.has_role(&first.session_id, "editor").await.unwrap());
    assert!(sessions.touch(&second.session_id).await.unwrap());

    assert!(sessions.delete(&first.session_id).await.unwrap());
    assert!(!sessions.delete(&first.session_id).await.unwrap());
    assert!(!sessions.touch(&first.session_id).await.unwrap());

    let remaining = sessions.get_by_user("alice").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].session_id, second.session_id);
    assert!(remaining[0].last_touched >= second.last_touched);
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_cross_workers() {
    let prefix = helpers::unique_prefix();
    let Some(first) = helpers::redis_context("worker-1", &prefix).await else {
        return;
    };
    let Some(second) = helpers::redis_context("worker-2", &prefix).await else {
        return;
    };

    let mut on_first = first.event_bus().subscribe("grid-1").await.unwrap();
    let mut on_second = second.event_bus().subscribe("grid-1").await.unwrap();

    second
        .event_bus()
        .publish(EventMessage::new("grid-1", "grid:row-selected", json!({"rows": [1, 2]})))
        .await
        .unwrap();

    for sub in [&mut on_first, &mut on_second] {
        let event = timeout(helpers::EVENT_WAIT, sub.recv())
            .await
            .expect("event not delivered")
            .unwrap();
        assert_eq!(event.event_type, "grid:row-selected");
        assert_eq!(event.source_worker_id.as_deref(), Some("worker-2"));
    }

    second
        .event_bus()
        .publish_to_worker("worker-1", EventMessage::new("grid-1", "grid:refresh", json!(null)))
        .await
        .unwrap();

    let targeted = timeout(helpers::EVENT_WAIT, on_first.recv())
        .await
        .expect("targeted event not delivered")
        .unwrap();
    assert_eq!(targeted.target_worker_id.as_deref(), Some("worker-1"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(on_second.try_recv().is_none());

    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
    assert!(on_first.recv().await.is_none());
}

#[tokio::test]
async fn test_update_html_keeps_expiry() {
    let prefix = helpers::unique_prefix();
    let Some(ctx) = helpers::redis_context("worker-1", &prefix).await else {
        return;
    };
    let Some(mut raw) = helpers::raw_redis().await else {
        return;
    };
    let key = KeySpace::new(prefix.as_str()).widget("chart-1");
    let widgets = ctx.widget_store();

    widgets.register(WidgetData::new("chart-1", "<p/>")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(widgets.update_html("chart-1", "<div/>").await.unwrap());

    let remaining = helpers::pttl(&mut raw, &key).await;
    assert!(remaining > 0, "widget lost its expiry");
    assert!(remaining <= 119_000, "update_html restarted the TTL: {remaining}ms");

    assert!(widgets.refresh_ttl("chart-1").await.unwrap());
    assert!(helpers::pttl(&mut raw, &key).await > 119_000);
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_html_refresh_policy_restarts_expiry() {
    let prefix = helpers::unique_prefix();
    let Some(ctx) = helpers::redis_context_with("worker-1", &prefix, |config| {
        config.ttl.refresh_widget_on_update = true;
    })
    .await
    else {
        return;
    };
    let Some(mut raw) = helpers::raw_redis().await else {
        return;
    };
    let key = KeySpace::new(prefix.as_str()).widget("chart-1");
    let widgets = ctx.widget_store();

    widgets.register(WidgetData::new("chart-1", "<p/>")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(helpers::pttl(&mut raw, &key).await <= 119_000);
    assert!(widgets.update_html("chart-1", "<div/>").await.unwrap());
    assert!(helpers::pttl(&mut raw, &key).await > 119_000);
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_records_expire_after_ttl() {
    let prefix = helpers::unique_prefix();
    let Some(ctx) = helpers::redis_context_with("worker-1", &prefix, |config| {
        config.ttl.widget_seconds = 1;
        config.ttl.connection_seconds = 1;
        config.ttl.session_seconds = 1;
    })
    .await
    else {
        return;
    };

    ctx.widget_store()
        .register(WidgetData::new("chart-1", "<p/>").with_token("secret"))
        .await
        .unwrap();
    ctx.connection_router()
        .register(ConnectionInfo::new("chart-1", "worker-1"))
        .await
        .unwrap();
    let session = ctx.session_store().create("alice", None, None).await.unwrap();
    assert!(ctx.widget_store().exists("chart-1").await.unwrap());

    tokio::time::sleep(Duration::from_millis(2_200)).await;

    let widgets = ctx.widget_store();
    assert_eq!(widgets.get("chart-1").await.unwrap(), None);
    assert_eq!(widgets.get_token("chart-1").await.unwrap(), None);
    assert!(!widgets.exists("chart-1").await.unwrap());
    assert!(!widgets.update_html("chart-1", "<div/>").await.unwrap());
    assert!(ctx.connection_router().get("chart-1").await.unwrap().is_none());
    assert!(!ctx.connection_router().heartbeat("chart-1").await.unwrap());
    assert!(ctx.session_store().get(&session.session_id).await.unwrap().is_none());
    assert!(ctx.session_store().get_by_user("alice").await.unwrap().is_empty());
    assert!(!ctx.session_store().touch(&session.session_id).await.unwrap());
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_extends_connection_expiry() {
    let prefix = helpers::unique_prefix();
    let Some(ctx) = helpers::redis_context("worker-1", &prefix).await else {
        return;
    };
    let Some(mut raw) = helpers::raw_redis().await else {
        return;
    };
    let key = KeySpace::new(prefix.as_str()).connection("chart-1");
    let router = ctx.connection_router();

    router.register(ConnectionInfo::new("chart-1", "worker-1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let before = helpers::pttl(&mut raw, &key).await;
    assert!(before > 0 && before <= 59_000);

    assert!(router.heartbeat("chart-1").await.unwrap());
    let after = helpers::pttl(&mut raw, &key).await;
    assert!(after > before, "heartbeat left expiry at {after}ms");
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_records_read_as_absent() {
    let prefix = helpers::unique_prefix();
    let Some(ctx) = helpers::redis_context("worker-1", &prefix).await else {
        return;
    };
    let Some(mut raw) = helpers::raw_redis().await else {
        return;
    };
    let keys = KeySpace::new(prefix.as_str());

    let _: () = redis::cmd("HSET")
        .arg(keys.widget("chart-1"))
        .arg("widget_id")
        .arg("chart-1")
        .arg("token")
        .arg("secret")
        .query_async(&mut raw)
        .await
        .unwrap();
    let _: () = redis::cmd("HSET")
        .arg(keys.connection("chart-1"))
        .arg("widget_id")
        .arg("chart-1")
        .arg("worker_id")
        .arg("worker-1")
        .arg("last_heartbeat")
        .arg("yesterday")
        .query_async(&mut raw)
        .await
        .unwrap();
    let _: () = redis::cmd("HSET")
        .arg(keys.session("s-1"))
        .arg("session_id")
        .arg("s-1")
        .arg("roles")
        .arg("not json")
        .query_async(&mut raw)
        .await
        .unwrap();

    let widgets = ctx.widget_store();
    assert_eq!(widgets.get("chart-1").await.unwrap(), None);
    assert_eq!(widgets.get_html("chart-1").await.unwrap(), None);
    assert_eq!(widgets.get_token("chart-1").await.unwrap(), None);
    assert!(!widgets.exists("chart-1").await.unwrap());
    assert!(ctx.connection_router().get("chart-1").await.unwrap().is_none());
    assert!(ctx.session_store().get("s-1").await.unwrap().is_none());
    assert!(!ctx.session_store().has_role("s-1", "viewer").await.unwrap());

    for key in [keys.widget("chart-1"), keys.connection("chart-1"), keys.session("s-1")] {
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut raw).await.unwrap();
    }
    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_listener_survives_connection_loss() {
    let prefix = helpers::unique_prefix();
    let Some(mut admin) = helpers::raw_redis().await else {
        return;
    };
    // A dedicated ACL user lets CLIENT KILL reach only this context's connections.
    let user = format!("{prefix}-user");
    let _: () = redis::cmd("ACL")
        .arg("SETUSER")
        .arg(&user)
        .arg("on")
        .arg(">listener-pass")
        .arg("~*")
        .arg("&*")
        .arg("+@all")
        .query_async(&mut admin)
        .await
        .unwrap();

    let Some(ctx) = helpers::redis_context_with("worker-1", &prefix, |config| {
        config.redis.url = helpers::url_with_user(&config.redis.url, &user, "listener-pass");
    })
    .await
    else {
        return;
    };
    let Some(peer) = helpers::redis_context("worker-2", &prefix).await else {
        return;
    };
    assert!(ctx.health_check().await.unwrap());

    let killed: i64 = redis::cmd("CLIENT")
        .arg("KILL")
        .arg("USER")
        .arg(&user)
        .query_async(&mut admin)
        .await
        .unwrap();
    assert!(killed >= 1);

    let bus = ctx.event_bus();
    let delivered = timeout(Duration::from_secs(15), async {
        loop {
            if let Ok(mut sub) = bus.subscribe("chart-1").await {
                let _ = peer
                    .event_bus()
                    .publish_to_worker("worker-1", EventMessage::new("chart-1", "x:after-loss", json!(null)))
                    .await;
                if let Ok(Some(event)) = timeout(Duration::from_millis(500), sub.recv()).await {
                    return event;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .expect("worker channel never resubscribed");
    assert_eq!(delivered.event_type, "x:after-loss");

    timeout(Duration::from_secs(10), async {
        while !matches!(ctx.health_check().await, Ok(true)) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("event bus stayed unhealthy after resubscribing");

    ctx.shutdown().await.unwrap();
    peer.shutdown().await.unwrap();
    let _: () = redis::cmd("ACL")
        .arg("DELUSER")
        .arg(&user)
        .query_async(&mut admin)
        .await
        .unwrap();
}
