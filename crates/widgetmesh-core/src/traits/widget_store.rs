//! Widget metadata store contract.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::WidgetData;

/// Stores widget records with a TTL.
///
/// A missing or expired widget is reported as `None`/`false`, never as an
/// error; the two cases are indistinguishable to callers.
#[async_trait]
pub trait WidgetStore: Send + Sync + std::fmt::Debug + 'static {
    /// Create or overwrite a widget and (re)start its TTL clock.
    async fn register(&self, widget: WidgetData) -> AppResult<()>;

    /// Fetch the full record.
    async fn get(&self, widget_id: &str) -> AppResult<Option<WidgetData>>;

    /// Fetch only the html snapshot.
    async fn get_html(&self, widget_id: &str) -> AppResult<Option<String>>;

    /// Fetch only the access token. `None` if the widget or token is absent.
    async fn get_token(&self, widget_id: &str) -> AppResult<Option<String>>;

    /// Cheap existence check.
    async fn exists(&self, widget_id: &str) -> AppResult<bool>;

    /// Replace the html snapshot, leaving every other field untouched.
    ///
    /// Does not restart the TTL unless the refresh policy is enabled, and
    /// never resurrects an expired widget. Returns whether the widget existed.
    async fn update_html(&self, widget_id: &str, html: &str) -> AppResult<bool>;

    /// Restart the TTL clock. Returns whether the widget existed.
    async fn refresh_ttl(&self, widget_id: &str) -> AppResult<bool>;

    /// Remove a widget. Returns whether anything was removed.
    async fn delete(&self, widget_id: &str) -> AppResult<bool>;

    /// Ids of live widgets. Best effort: ids may expire right after.
    async fn list_active(&self) -> AppResult<Vec<String>>;

    /// Number of live widgets.
    async fn count_active(&self) -> AppResult<usize> {
        Ok(self.list_active().await?.len())
    }

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
