//! Core data models used throughout Inbox Lens.
//!
//! These types represent the emails, threads, and cluster snapshots that flow
//! through threading, clustering, and retrieval.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved cluster id for points outside any surviving density cluster.
pub const NOISE: &str = "noise";

/// Display name of the [`NOISE`] bucket.
pub const NOISE_NAME: &str = "Uncategorized";

/// Display color of the [`NOISE`] bucket.
pub const NOISE_COLOR: &str = "#999";

/// Embedding vectors keyed by email id.
pub type EmbeddingMap = BTreeMap<String, Vec<f32>>;

/// `emailId -> clusterId` (a generated id or [`NOISE`]).
pub type ClusterAssignments = BTreeMap<String, String>;

/// `representativeId -> member ids` for every thread.
pub type ThreadMembership = BTreeMap<String, Vec<String>>;

/// A single message in the archive.
///
/// Optional header fields are empty strings when the source message did not
/// carry them; `body` and `date` are `None` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub body_is_html: bool,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub message_id: String,
    /// Space-joined message ids.
    #[serde(default)]
    pub in_reply_to: String,
    /// Space-joined message ids.
    #[serde(default)]
    pub references: String,
    #[serde(default)]
    pub mailbox: String,
}

impl Email {
    /// Minimal email with only an id and subject; used heavily in tests.
    pub fn new(id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            body: None,
            body_is_html: false,
            date: None,
            from_address: String::new(),
            message_id: String::new(),
            in_reply_to: String::new(),
            references: String::new(),
            mailbox: String::new(),
        }
    }

    /// Every message id this email cites (`References` then `In-Reply-To`).
    pub fn cited_ids(&self) -> impl Iterator<Item = &str> {
        self.references
            .split_whitespace()
            .chain(self.in_reply_to.split_whitespace())
    }

    /// Sort key in milliseconds since the epoch; missing or malformed dates are `0`.
    pub fn timestamp_millis(&self) -> i64 {
        self.date
            .as_deref()
            .and_then(parse_date_millis)
            .unwrap_or(0)
    }
}

/// Parse an email date into milliseconds since the epoch.
///
/// Accepts RFC 3339, RFC 2822 (`Date:` headers), `YYYY-MM-DD HH:MM:SS`,
/// and `YYYY-MM-DD`. Returns `None` for anything else.
pub fn parse_date_millis(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }
    // RFC 2822 dates often carry a trailing zone comment: "... +0000 (UTC)"
    if let Some(idx) = s.rfind(" (") {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&s[..idx]) {
            return Some(dt.timestamp_millis());
        }
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc().timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|ndt| ndt.and_utc().timestamp_millis());
    }
    None
}

/// One conversation: members ascending by date, the last one representing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub emails: Vec<Email>,
}

impl Thread {
    /// Id of the chronologically last member.
    pub fn representative_id(&self) -> &str {
        self.emails.last().map(|e| e.id.as_str()).unwrap_or("")
    }

    pub fn representative(&self) -> Option<&Email> {
        self.emails.last()
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.emails.iter().map(|e| e.id.as_str())
    }
}

/// Display metadata for a cluster id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMeta {
    pub name: String,
    pub color: String,
    pub order: u32,
}

/// Snapshot persisted by a `CategoryStore`: assignments plus display metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Categories {
    pub assignments: ClusterAssignments,
    pub meta: BTreeMap<String, ClusterMeta>,
}

impl Categories {
    /// Cluster id for an email; ids without an assignment count as [`NOISE`].
    pub fn cluster_of(&self, email_id: &str) -> &str {
        self.assignments
            .get(email_id)
            .map(String::as_str)
            .unwrap_or(NOISE)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// An email id paired with a similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub id: String,
    pub sim: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        assert_eq!(parse_date_millis("1970-01-01T00:00:01Z"), Some(1000));
    }

    #[test]
    fn parses_rfc2822_with_comment() {
        let a = parse_date_millis("Tue, 1 Jul 2003 10:52:37 +0200").unwrap();
        let b = parse_date_millis("Tue, 1 Jul 2003 10:52:37 +0200 (CEST)").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parses_plain_date() {
        assert_eq!(parse_date_millis("1970-01-02"), Some(86_400_000));
    }

    #[test]
    fn malformed_date_sorts_as_epoch() {
        let mut e = Email::new("a", "x");
        e.date = Some("not a date".to_string());
        assert_eq!(e.timestamp_millis(), 0);
        e.date = None;
        assert_eq!(e.timestamp_millis(), 0);
    }

    #[test]
    fn cited_ids_merges_both_headers() {
        let mut e = Email::new("a", "x");
        e.references = "<m1> <m2>".to_string();
        e.in_reply_to = " <m2> ".to_string();
        let ids: Vec<&str> = e.cited_ids().collect();
        assert_eq!(ids, vec!["<m1>", "<m2>", "<m2>"]);
    }

    #[test]
    fn unassigned_email_is_noise() {
        let cats = Categories::default();
        assert_eq!(cats.cluster_of("missing"), NOISE);
    }
}
