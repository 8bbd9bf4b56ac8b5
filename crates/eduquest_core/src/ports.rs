//! crates/eduquest_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the remote data service.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete auth provider and row store.

use crate::domain::{ClientId, NewProfile, NewQuizResult, Profile, QuizResult, Role, Session};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Session Subscription Handle
//=========================================================================================

pub type SessionStream = Pin<Box<dyn Stream<Item = Option<Session>> + Send>>;

/// A live subscription to the session changes of one client.
///
/// Dropping the handle (or calling [`SessionSubscription::unsubscribe`]) stops
/// all future deliveries.
pub struct SessionSubscription {
    stream: SessionStream,
}

impl SessionSubscription {
    pub fn new(stream: SessionStream) -> Self {
        Self { stream }
    }

    /// Waits for the next auth transition. `None` means the source closed.
    pub async fn next(&mut self) -> Option<Option<Session>> {
        self.stream.next().await
    }

    pub fn unsubscribe(self) {
        drop(self.stream);
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Starts delivering every auth transition (sign-in, sign-out, refresh, expiry)
    /// of `client`. Transitions that happened before the call are not replayed.
    fn subscribe(&self, client: ClientId) -> SessionSubscription;

    /// One-shot lookup for the session currently cached for `client`.
    async fn current_session(&self, client: ClientId) -> PortResult<Option<Session>>;

    async fn sign_in(&self, client: ClientId, email: &str, password: &str) -> PortResult<Session>;

    /// Creates the auth account and issues a session for it.
    async fn sign_up(&self, client: ClientId, email: &str, password: &str) -> PortResult<Session>;

    async fn sign_out(&self, client: ClientId) -> PortResult<()>;

    /// Looks up the live session behind an access token.
    async fn validate_token(&self, access_token: &str) -> PortResult<Session>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    // --- Profiles ---
    async fn find_profile(&self, user_id: Uuid, role: Option<Role>) -> PortResult<Option<Profile>>;

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile>;

    /// Every profile registered with `role`, ordered by name.
    async fn list_profiles(&self, role: Role) -> PortResult<Vec<Profile>>;

    /// Adds `coins` and `badges` to the stored counters in one atomic step,
    /// computed against the current stored values, and returns the updated row.
    async fn credit_rewards(&self, profile_id: Uuid, coins: i64, badges: i64) -> PortResult<Profile>;

    // --- Quiz Results ---
    async fn insert_quiz_result(&self, result: NewQuizResult) -> PortResult<QuizResult>;

    /// Lists a student's results, newest first.
    async fn list_quiz_results(&self, profile_id: Uuid) -> PortResult<Vec<QuizResult>>;
}
