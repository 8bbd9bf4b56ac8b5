//! crates/eduquest_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use crate::ports::{PortError, PortResult};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one client installation (a browser profile, a device).
///
/// Sessions are issued per client, and every connection opened by the same
/// client observes the same session changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Proof of authentication for one identity, issued by the auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_id: Uuid,
    pub client_id: ClientId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session valid for `ttl` from `now`, with a random access token.
    pub fn issue(
        client: ClientId,
        user_id: Uuid,
        now: DateTime<Utc>,
        ttl: TimeDelta,
    ) -> PortResult<Self> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            PortError::Unexpected(format!("Session lifetime {ttl} is out of range"))
        })?;
        Ok(Self {
            access_token: Uuid::new_v4().to_string(),
            user_id,
            client_id: client,
            issued_at: now,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The role a profile was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The application-level learner/teacher record, keyed by the auth `user_id`.
///
/// `id` is the storage primary key and is what quiz results point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub coins: i64,
    pub badges: i64,
    pub class_level: Option<String>,
    pub school: Option<String>,
    pub unique_id: Option<String>,
}

// Role-specific registration details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileDetails {
    Student {
        class_level: String,
        date_of_birth: NaiveDate,
    },
    Teacher {
        subjects: String,
        experience: String,
    },
}

impl ProfileDetails {
    pub fn role(&self) -> Role {
        match self {
            ProfileDetails::Student { .. } => Role::Student,
            ProfileDetails::Teacher { .. } => Role::Teacher,
        }
    }
}

/// A profile row as inserted at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub school: Option<String>,
    pub unique_id: String,
    pub details: ProfileDetails,
}

/// An append-only record of one finished quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizResult {
    pub id: Uuid,
    pub student_profile_id: Uuid,
    pub quiz_ref: String,
    pub score: i32,
    pub total_points: i32,
    pub coins_earned: u32,
    pub badge: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuizResult {
    pub student_profile_id: Uuid,
    pub quiz_ref: String,
    pub score: i32,
    pub total_points: i32,
    pub coins_earned: u32,
    pub badge: String,
}

impl NewQuizResult {
    /// Badges credited for this completion: one for any named badge.
    pub fn badges_earned(&self) -> i64 {
        if self.badge.trim().is_empty() {
            0
        } else {
            1
        }
    }
}
