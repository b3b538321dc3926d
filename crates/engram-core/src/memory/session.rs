//! Access sessions
//!
//! Sessions group node accesses in time. They feed temporal edge creation
//! (nodes accessed close together) and co-activation learning (engagement
//! signalled against a session). A session ends after 30 minutes without
//! activity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minutes of inactivity after which a session is considered ended
pub const SESSION_IDLE_TIMEOUT_MINUTES: i64 = 30;

/// One node access inside a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAccess {
    /// Accessed node
    pub node_id: String,
    /// Primary cluster of the node at access time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// When the access happened
    pub accessed_at: DateTime<Utc>,
}

/// An ordered record of node accesses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque identifier with a stable `sess-` prefix
    pub id: String,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// When the session ended, once closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Ordered accesses
    #[serde(default)]
    pub accesses: Vec<SessionAccess>,
}

/// Mint a session identifier
pub fn new_session_id() -> String {
    format!("sess-{}", Uuid::new_v4())
}

impl Session {
    /// Start a new session at the given instant
    pub fn start(at: DateTime<Utc>) -> Self {
        Self {
            id: new_session_id(),
            started_at: at,
            ended_at: None,
            accesses: Vec::new(),
        }
    }

    /// Record an access
    pub fn record_access(
        &mut self,
        node_id: impl Into<String>,
        cluster_id: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.accesses.push(SessionAccess {
            node_id: node_id.into(),
            cluster_id,
            accessed_at: at,
        });
    }

    /// The instant of the most recent activity
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.accesses
            .last()
            .map(|a| a.accessed_at)
            .unwrap_or(self.started_at)
    }

    /// Whether the idle timeout has elapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity() > Duration::minutes(SESSION_IDLE_TIMEOUT_MINUTES)
    }

    /// Close the session at its last activity instant
    pub fn close(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(self.last_activity());
        }
    }

    /// Distinct cluster ids touched by this session
    pub fn clusters_touched(&self) -> Vec<String> {
        let mut clusters: Vec<String> = self
            .accesses
            .iter()
            .filter_map(|a| a.cluster_id.clone())
            .collect();
        clusters.sort();
        clusters.dedup();
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_expiry() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let mut session = Session::start(start);
        session.record_access("node-a", None, start + Duration::minutes(5));

        assert!(!session.is_expired(start + Duration::minutes(20)));
        assert!(session.is_expired(start + Duration::minutes(36)));
    }

    #[test]
    fn test_close_uses_last_activity() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let mut session = Session::start(start);
        let last = start + Duration::minutes(12);
        session.record_access("node-a", None, last);

        session.close();
        assert_eq!(session.ended_at, Some(last));
    }

    #[test]
    fn test_clusters_touched_dedups() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let mut session = Session::start(start);
        session.record_access("node-a", Some("cluster-1".into()), start);
        session.record_access("node-b", Some("cluster-1".into()), start);
        session.record_access("node-c", Some("cluster-2".into()), start);
        session.record_access("node-d", None, start);

        assert_eq!(session.clusters_touched(), vec!["cluster-1", "cluster-2"]);
    }
}
