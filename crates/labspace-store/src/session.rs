//! Workspace session records and their state machine.
//!
//! A session is one usage window of an allocation's workspace. Its status is
//! derived from timestamps and never stored:
//!
//! ```text
//! Initiated ──start──▶ Started ──expiry elapses / expire()──▶ Expired
//!     │                   │                                      │
//!     └──────────────terminate()─────────────────────────────────┴──▶ Ended
//! ```
//!
//! Transitions take `now` explicitly so the rules can be checked without a clock.

use chrono::{DateTime, Duration, Utc};
use labspace_core::{AllocationId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// One usage window of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSession {
    /// Unique identifier.
    pub session_id: SessionId,
    /// Owning allocation.
    pub allocation_id: AllocationId,
    /// Instructor reviewing the workspace, for review sessions.
    pub instructor_id: Option<UserId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set once the workspace pod is observed ready.
    pub started_at: Option<DateTime<Utc>>,
    /// Rolling expiry.
    pub expires_at: DateTime<Utc>,
    /// Set when the session is terminated.
    pub ended_at: Option<DateTime<Utc>>,
    /// One-way termination flag.
    pub terminated: bool,
}

/// Derived status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, workspace not ready yet.
    Initiated,
    /// Workspace confirmed ready.
    Started,
    /// Expiry elapsed without termination.
    Expired,
    /// Terminated after the workspace was scaled down.
    Ended,
}

impl WorkspaceSession {
    /// Create a session that expires one extension period from `now`.
    #[must_use]
    pub fn new(
        allocation_id: AllocationId,
        instructor_id: Option<UserId>,
        now: DateTime<Utc>,
        extension: Duration,
    ) -> Self {
        Self {
            session_id: SessionId::generate(),
            allocation_id,
            instructor_id,
            created_at: now,
            started_at: None,
            expires_at: now + extension,
            ended_at: None,
            terminated: false,
        }
    }

    /// Derived status at `now`. Ended takes precedence over Expired, then Started.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.ended_at.is_some_and(|ended| ended <= now) {
            SessionStatus::Ended
        } else if self.expires_at <= now {
            SessionStatus::Expired
        } else if self.started_at.is_some_and(|started| started <= now) {
            SessionStatus::Started
        } else {
            SessionStatus::Initiated
        }
    }

    /// Not terminated and not yet expired.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.terminated && self.expires_at > now
    }

    /// Not terminated but already past expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.terminated && self.expires_at <= now
    }

    /// Not terminated, started, and started at least `max_duration` ago.
    #[must_use]
    pub fn reached_max_duration(&self, now: DateTime<Utc>, max_duration: Duration) -> bool {
        !self.terminated
            && self
                .started_at
                .is_some_and(|started| started <= now - max_duration)
    }

    /// Mark the workspace as ready. Keeps the first start time on repeat calls.
    ///
    /// Returns `true` if the record changed.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.terminated || self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        true
    }

    /// Push the expiry to `now + period`. Never moves it backward.
    ///
    /// Returns `true` if the record changed.
    pub fn extend(&mut self, now: DateTime<Utc>, period: Duration) -> bool {
        let candidate = now + period;
        if self.terminated || candidate <= self.expires_at {
            return false;
        }
        self.expires_at = candidate;
        true
    }

    /// Expire the session immediately without terminating it.
    ///
    /// Returns `true` if the record changed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.terminated || self.expires_at <= now {
            return false;
        }
        self.expires_at = now;
        true
    }

    /// End the session. Once terminated, no transition re-activates it.
    ///
    /// Returns `true` if the record changed.
    pub fn terminate(&mut self, now: DateTime<Utc>) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        self.ended_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> WorkspaceSession {
        WorkspaceSession::new(
            AllocationId::from_bytes([3; 16]),
            None,
            now,
            Duration::hours(1),
        )
    }

    #[test]
    fn new_session_is_initiated_and_active() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(s.status(now), SessionStatus::Initiated);
        assert!(s.is_active(now));
        assert!(!s.is_expired(now));
        assert_eq!(s.expires_at, now + Duration::hours(1));
    }

    #[test]
    fn start_is_idempotent() {
        let now = Utc::now();
        let mut s = session(now);
        assert!(s.start(now));
        assert!(!s.start(now + Duration::minutes(5)));
        assert_eq!(s.started_at, Some(now));
        assert_eq!(s.status(now), SessionStatus::Started);
    }

    #[test]
    fn extend_moves_expiry_forward_only() {
        let now = Utc::now();
        let mut s = session(now);

        let later = now + Duration::minutes(30);
        assert!(s.extend(later, Duration::hours(1)));
        assert_eq!(s.expires_at, later + Duration::hours(1));
        assert!(s.expires_at > later);

        // A stale call with an earlier clock must not pull expiry back.
        assert!(!s.extend(now, Duration::hours(1)));
        assert_eq!(s.expires_at, later + Duration::hours(1));

        // Repeating at the same instant changes nothing.
        assert!(!s.extend(later, Duration::hours(1)));
    }

    #[test]
    fn expire_makes_session_inactive() {
        let now = Utc::now();
        let mut s = session(now);
        s.start(now);

        assert!(s.expire(now));
        assert!(!s.is_active(now));
        assert!(s.is_expired(now));
        assert_eq!(s.status(now), SessionStatus::Expired);
        assert!(!s.expire(now + Duration::minutes(1)));
    }

    #[test]
    fn terminate_is_one_way() {
        let now = Utc::now();
        let mut s = session(now);
        assert!(s.terminate(now));
        assert_eq!(s.status(now), SessionStatus::Ended);

        let later = now + Duration::minutes(1);
        assert!(!s.terminate(later));
        assert!(!s.extend(later, Duration::hours(1)));
        assert!(!s.start(later));
        assert!(!s.expire(later));
        assert!(!s.is_active(later));
        assert!(!s.is_expired(later));
        assert_eq!(s.ended_at, Some(now));
    }

    #[test]
    fn ended_takes_precedence_over_expired() {
        let now = Utc::now();
        let mut s = session(now);
        s.expire(now);
        s.terminate(now);
        assert_eq!(s.status(now), SessionStatus::Ended);
    }

    #[test]
    fn max_duration_requires_start() {
        let now = Utc::now();
        let mut s = session(now);
        let max = Duration::hours(6);
        let much_later = now + Duration::hours(7);

        assert!(!s.reached_max_duration(much_later, max));
        s.start(now);
        assert!(!s.reached_max_duration(now + Duration::hours(5), max));
        assert!(s.reached_max_duration(much_later, max));

        s.terminate(much_later);
        assert!(!s.reached_max_duration(much_later, max));
    }

    #[test]
    fn max_duration_includes_the_boundary() {
        let now = Utc::now();
        let mut s = session(now);
        let max = Duration::hours(6);
        s.start(now);

        assert!(!s.reached_max_duration(now + max - Duration::seconds(1), max));
        assert!(s.reached_max_duration(now + max, max));
    }
}
