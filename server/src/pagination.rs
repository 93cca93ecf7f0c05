//! Keyset cursor pagination for conversation listings.
//!
//! Cursors are opaque to clients: base64(JSON) of the sort key of the last
//! row on the page. Listings fetch `per_page + 1` rows so `has_more` is
//! exact.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AllocationError;

pub const DEFAULT_PER_PAGE: i64 = 50;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// `last_message_at DESC, id DESC`
    #[default]
    Newest,
    /// `last_message_at ASC, id ASC`
    Oldest,
    /// `priority_score DESC, last_message_at ASC, id ASC` — the allocation order.
    Priority,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Result<Self, AllocationError> {
        match raw {
            None | Some("newest") => Ok(SortOrder::Newest),
            Some("oldest") => Ok(SortOrder::Oldest),
            Some("priority") => Ok(SortOrder::Priority),
            Some(other) => Err(AllocationError::InvalidRequest {
                reason: format!("unknown sort order '{}'", other),
            }),
        }
    }
}

/// Sort-key snapshot of the last row on a page. `score` is present only for
/// priority ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub ts: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        // Serialization of this struct cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, AllocationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| AllocationError::InvalidRequest {
                reason: "cursor is not valid base64".into(),
            })?;
        serde_json::from_slice(&bytes).map_err(|_| AllocationError::InvalidRequest {
            reason: "cursor is malformed".into(),
        })
    }
}

/// Clamp a requested page size to `[1, MAX_PER_PAGE]`, defaulting when absent.
pub fn clamp_per_page(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
}

/// Trim an over-fetched result set (`per_page + 1` rows) down to the page
/// and report whether more rows exist.
pub fn trim_page<T>(mut rows: Vec<T>, per_page: i64) -> (Vec<T>, bool) {
    let has_more = rows.len() as i64 > per_page;
    if has_more {
        rows.truncate(per_page as usize);
    }
    (rows, has_more)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip() {
        let cursor = Cursor {
            score: None,
            ts: Utc::now(),
            id: Uuid::now_v7(),
        };
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn cursor_round_trip_with_score() {
        let cursor = Cursor {
            score: Some(0.7321),
            ts: Utc::now(),
            id: Uuid::now_v7(),
        };
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded.score, Some(0.7321));
    }

    #[test]
    fn cursor_rejects_garbage() {
        assert!(Cursor::decode("not-base64!!!").is_err());
        let bogus = URL_SAFE_NO_PAD.encode(b"{\"nope\":1}");
        assert!(Cursor::decode(&bogus).is_err());
    }

    #[test]
    fn sort_order_parsing() {
        assert_eq!(SortOrder::parse(None).unwrap(), SortOrder::Newest);
        assert_eq!(SortOrder::parse(Some("oldest")).unwrap(), SortOrder::Oldest);
        assert_eq!(
            SortOrder::parse(Some("priority")).unwrap(),
            SortOrder::Priority
        );
        assert!(SortOrder::parse(Some("sideways")).is_err());
    }

    #[test]
    fn per_page_clamping() {
        assert_eq!(clamp_per_page(None), 50);
        assert_eq!(clamp_per_page(Some(10)), 10);
        assert_eq!(clamp_per_page(Some(500)), 100);
        assert_eq!(clamp_per_page(Some(0)), 1);
    }

    #[test]
    fn trim_page_reports_exactly() {
        let (rows, has_more) = trim_page(vec![1, 2, 3], 2);
        assert_eq!(rows, vec![1, 2]);
        assert!(has_more);

        // Exactly per_page rows means there is no next page.
        let (rows, has_more) = trim_page(vec![1, 2], 2);
        assert_eq!(rows, vec![1, 2]);
        assert!(!has_more);
    }
}
