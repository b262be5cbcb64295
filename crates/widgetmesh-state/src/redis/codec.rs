//! Hash field layout of stored records.
//!
//! Records are stored as Redis hashes so single fields can be read or
//! updated atomically. Timestamps are RFC 3339, metadata and role sets are
//! JSON strings. A hash that cannot be decoded is reported as absent.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::warn;

use widgetmesh_core::result::AppResult;
use widgetmesh_core::types::{ConnectionInfo, Metadata, UserSession, WidgetData};

/// Field/value pairs ready for `HSET`.
pub(crate) type Fields = Vec<(&'static str, String)>;

/// Raw `HGETALL` reply.
pub(crate) type RawHash = HashMap<String, String>;

pub(crate) const HTML: &str = "html";
pub(crate) const TOKEN: &str = "token";
pub(crate) const WORKER_ID: &str = "worker_id";
pub(crate) const LAST_HEARTBEAT: &str = "last_heartbeat";
pub(crate) const USER_ID: &str = "user_id";
pub(crate) const ROLES: &str = "roles";
pub(crate) const LAST_TOUCHED: &str = "last_touched";

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub(crate) fn encode_widget(widget: &WidgetData) -> AppResult<Fields> {
    let mut fields = vec![
        ("widget_id", widget.widget_id.clone()),
        (HTML, widget.html.clone()),
        ("metadata", serde_json::to_string(&widget.metadata)?),
        ("created_at", timestamp(widget.created_at)),
    ];
    if let Some(token) = &widget.token {
        fields.push((TOKEN, token.clone()));
    }
    if let Some(owner) = &widget.owner_worker_id {
        fields.push(("owner_worker_id", owner.clone()));
    }
    Ok(fields)
}

pub(crate) fn decode_widget(key: &str, mut raw: RawHash) -> Option<WidgetData> {
    if raw.is_empty() {
        return None;
    }
    let decoded = (|| {
        Some(WidgetData {
            widget_id: raw.remove("widget_id")?,
            html: raw.remove(HTML)?,
            token: raw.remove(TOKEN),
            owner_worker_id: raw.remove("owner_worker_id"),
            metadata: metadata(raw.get("metadata"))?,
            created_at: parse_time(raw.get("created_at"))?,
        })
    })();
    if decoded.is_none() {
        warn!(key, "Malformed widget record ignored");
    }
    decoded
}

/// Fields `HMGET` fetches for a narrow widget read, in the order
/// [`decode_widget_head`] expects them.
pub(crate) const WIDGET_HEAD: [&str; 5] = ["widget_id", HTML, "metadata", "created_at", TOKEN];

/// `html` and `token` of a widget, provided the record would decode as a
/// whole through [`decode_widget`].
pub(crate) fn decode_widget_head(
    key: &str,
    values: Vec<Option<String>>,
) -> Option<(String, Option<String>)> {
    if values.iter().all(Option::is_none) {
        return None;
    }
    let [widget_id, html, meta, created_at, token]: [Option<String>; 5] =
        values.try_into().ok()?;
    let valid = widget_id.is_some()
        && metadata(meta.as_ref()).is_some()
        && parse_time(created_at.as_ref()).is_some();
    match html {
        Some(html) if valid => Some((html, token)),
        _ => {
            warn!(key, "Malformed widget record ignored");
            None
        }
    }
}

pub(crate) fn encode_connection(conn: &ConnectionInfo) -> Fields {
    vec![
        ("widget_id", conn.widget_id.clone()),
        (WORKER_ID, conn.worker_id.clone()),
        ("connected_at", timestamp(conn.connected_at)),
        (LAST_HEARTBEAT, timestamp(conn.last_heartbeat)),
    ]
}

pub(crate) fn decode_connection(key: &str, mut raw: RawHash) -> Option<ConnectionInfo> {
    if raw.is_empty() {
        return None;
    }
    let decoded = (|| {
        Some(ConnectionInfo {
            widget_id: raw.remove("widget_id")?,
            worker_id: raw.remove(WORKER_ID)?,
            connected_at: parse_time(raw.get("connected_at"))?,
            last_heartbeat: parse_time(raw.get(LAST_HEARTBEAT))?,
        })
    })();
    if decoded.is_none() {
        warn!(key, "Malformed connection record ignored");
    }
    decoded
}

pub(crate) fn encode_roles(roles: &BTreeSet<String>) -> AppResult<String> {
    Ok(serde_json::to_string(roles)?)
}

pub(crate) fn encode_session(session: &UserSession) -> AppResult<Fields> {
    Ok(vec![
        ("session_id", session.session_id.clone()),
        (USER_ID, session.user_id.clone()),
        (ROLES, encode_roles(&session.roles)?),
        ("metadata", serde_json::to_string(&session.metadata)?),
        ("created_at", timestamp(session.created_at)),
        (LAST_TOUCHED, timestamp(session.last_touched)),
    ])
}

pub(crate) fn decode_session(key: &str, mut raw: RawHash) -> Option<UserSession> {
    if raw.is_empty() {
        return None;
    }
    let decoded = (|| {
        Some(UserSession {
            session_id: raw.remove("session_id")?,
            user_id: raw.remove(USER_ID)?,
            roles: serde_json::from_str(raw.get(ROLES)?).ok()?,
            metadata: metadata(raw.get("metadata"))?,
            created_at: parse_time(raw.get("created_at"))?,
            last_touched: parse_time(raw.get(LAST_TOUCHED))?,
        })
    })();
    if decoded.is_none() {
        warn!(key, "Malformed session record ignored");
    }
    decoded
}

fn parse_time(value: Option<&String>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Missing metadata decodes as empty; present but invalid JSON does not.
fn metadata(value: Option<&String>) -> Option<Metadata> {
    match value {
        None => Some(Metadata::new()),
        Some(raw) => serde_json::from_str(raw).ok(),
    }
}
