//! Redis widget store.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::debug;

use widgetmesh_core::config::TtlConfig;
use widgetmesh_core::error::ensure_id;
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::WidgetStore;
use widgetmesh_core::types::WidgetData;

use super::client::{RedisClient, expire_secs, map_err};
use super::codec::{self, RawHash};

/// Replace the html of an existing widget.
///
/// KEYS[1] = widget hash
/// ARGV[1] = html
/// ARGV[2] = ttl seconds to restart, or "0" to keep the current expiry
///
/// Returns 1 when updated, 0 when the widget does not exist.
const UPDATE_HTML_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('HSET', KEYS[1], 'html', ARGV[1])
    if ARGV[2] ~= '0' then
        redis.call('EXPIRE', KEYS[1], ARGV[2])
    end
    return 1
"#;

/// Widget store keyed `{prefix}:widget:{id}`.
#[derive(Debug, Clone)]
pub struct RedisWidgetStore {
    client: RedisClient,
    ttl: Duration,
    refresh_on_update: bool,
    update_html: Script,
}

impl RedisWidgetStore {
    /// Create a store over a connected client.
    pub fn new(client: RedisClient, config: &TtlConfig) -> Self {
        Self {
            client,
            ttl: config.widget(),
            refresh_on_update: config.refresh_widget_on_update,
            update_html: Script::new(UPDATE_HTML_SCRIPT),
        }
    }

    fn ttl_secs(&self) -> AppResult<i64> {
        expire_secs(self.ttl)
    }

    /// `html` and `token` of a widget that [`get`](WidgetStore::get) would return.
    async fn read_head(&self, widget_id: &str) -> AppResult<Option<(String, Option<String>)>> {
        let key = self.client.keys().widget(widget_id);
        let mut conn = self.client.conn_mut();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&key)
            .arg(&codec::WIDGET_HEAD[..])
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(codec::decode_widget_head(&key, values))
    }
}

#[async_trait]
impl WidgetStore for RedisWidgetStore {
    async fn register(&self, widget: WidgetData) -> AppResult<()> {
        let ttl = self.ttl_secs()?;
        ensure_id("widget_id", &widget.widget_id)?;
        let key = self.client.keys().widget(&widget.widget_id);
        let fields = codec::encode_widget(&widget)?;
        let mut conn = self.client.conn_mut();

        // Replace wholesale so fields of a previous registration never linger.
        let _: () = redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        debug!(widget_id = %widget.widget_id, owner = ?widget.owner_worker_id, "Widget registered");
        Ok(())
    }

    async fn get(&self, widget_id: &str) -> AppResult<Option<WidgetData>> {
        let key = self.client.keys().widget(widget_id);
        let mut conn = self.client.conn_mut();
        let raw: RawHash = conn.hgetall(&key).await.map_err(map_err)?;
        Ok(codec::decode_widget(&key, raw))
    }

    async fn get_html(&self, widget_id: &str) -> AppResult<Option<String>> {
        Ok(self.read_head(widget_id).await?.map(|(html, _)| html))
    }

    async fn get_token(&self, widget_id: &str) -> AppResult<Option<String>> {
        Ok(self.read_head(widget_id).await?.and_then(|(_, token)| token))
    }

    async fn exists(&self, widget_id: &str) -> AppResult<bool> {
        Ok(self.read_head(widget_id).await?.is_some())
    }

    async fn update_html(&self, widget_id: &str, html: &str) -> AppResult<bool> {
        let ttl = self.ttl_secs()?;
        let key = self.client.keys().widget(widget_id);
        let refresh = if self.refresh_on_update { ttl } else { 0 };
        let mut conn = self.client.conn_mut();
        let updated: i64 = self
            .update_html
            .key(&key)
            .arg(html)
            .arg(refresh)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(updated == 1)
    }

    async fn refresh_ttl(&self, widget_id: &str) -> AppResult<bool> {
        let ttl = self.ttl_secs()?;
        let key = self.client.keys().widget(widget_id);
        let mut conn = self.client.conn_mut();
        let refreshed: bool = conn.expire(&key, ttl).await.map_err(map_err)?;
        Ok(refreshed)
    }

    async fn delete(&self, widget_id: &str) -> AppResult<bool> {
        let key = self.client.keys().widget(widget_id);
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn.del(&key).await.map_err(map_err)?;
        if removed > 0 {
            debug!(widget_id, "Widget deleted");
        }
        Ok(removed > 0)
    }

    async fn list_active(&self) -> AppResult<Vec<String>> {
        let keys = self.client.scan_keys(&self.client.keys().widget_pattern()).await?;
        Ok(keys
            .iter()
            .filter_map(|key| self.client.keys().widget_id_from_key(key))
            .map(str::to_string)
            .collect())
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.client.ping().await
    }
}
