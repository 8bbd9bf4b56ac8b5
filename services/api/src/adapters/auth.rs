//! services/api/src/adapters/auth.rs
//!
//! The PostgreSQL-backed implementation of the `AuthService` port.
//!
//! Accounts and issued sessions are stored in the database; passwords are
//! hashed with Argon2. Every successful transition is published to the
//! in-process `SessionHub`, which fans it out to all connections of the client.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use eduquest_core::credentials::{verify_password, CredentialHasher};
use eduquest_core::domain::{ClientId, Session};
use eduquest_core::hub::SessionHub;
use eduquest_core::ports::{AuthService, PortError, PortResult, SessionSubscription};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct DbAuthAdapter {
    pool: PgPool,
    hub: Arc<SessionHub>,
    session_ttl: Duration,
    hasher: CredentialHasher,
}

impl DbAuthAdapter {
    pub fn new(pool: PgPool, session_ttl: Duration) -> Self {
        Self {
            pool,
            hub: Arc::new(SessionHub::new()),
            session_ttl,
            hasher: CredentialHasher::default(),
        }
    }

    /// Replaces any session held by `client` with a fresh one for `user_id`.
    async fn issue_session(&self, client: ClientId, user_id: Uuid) -> PortResult<Session> {
        let session = Session::issue(client, user_id, Utc::now(), self.session_ttl)?;

        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("DELETE FROM auth_sessions WHERE client_id = $1")
            .bind(client.0)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query(
            "INSERT INTO auth_sessions (access_token, user_id, client_id, issued_at, expires_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&session.access_token)
        .bind(session.user_id)
        .bind(client.0)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;

        self.hub.publish(client, Some(session.clone()));
        self.hub.schedule_expiry(session.clone());
        Ok(session)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    hashed_password: String,
}

#[derive(FromRow)]
struct SessionRecord {
    access_token: String,
    user_id: Uuid,
    client_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            access_token: self.access_token,
            user_id: self.user_id,
            client_id: ClientId(self.client_id),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for DbAuthAdapter {
    fn subscribe(&self, client: ClientId) -> SessionSubscription {
        self.hub.subscribe(client)
    }

    async fn current_session(&self, client: ClientId) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT access_token, user_id, client_id, issued_at, expires_at FROM auth_sessions \
             WHERE client_id = $1 AND expires_at > now() ORDER BY issued_at DESC LIMIT 1",
        )
        .bind(client.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(SessionRecord::to_domain))
    }

    async fn sign_in(&self, client: ClientId, email: &str, password: &str) -> PortResult<Session> {
        let creds = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, hashed_password FROM auth_users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        if !verify_password(password, &creds.hashed_password)? {
            return Err(PortError::Unauthorized);
        }

        let session = self.issue_session(client, creds.id).await?;
        info!(%client, user_id = %creds.id, "Session issued");
        Ok(session)
    }

    async fn sign_up(&self, client: ClientId, email: &str, password: &str) -> PortResult<Session> {
        let hashed_password = self.hasher.hash(password)?;
        let user_id = Uuid::new_v4();

        sqlx::query("INSERT INTO auth_users (id, email, hashed_password) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(email)
            .bind(&hashed_password)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    PortError::Conflict(format!("{} is already registered", email))
                }
                other => unexpected(other),
            })?;

        let session = self.issue_session(client, user_id).await?;
        info!(%client, %user_id, "Account created");
        Ok(session)
    }

    async fn sign_out(&self, client: ClientId) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE client_id = $1")
            .bind(client.0)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        self.hub.publish(client, None);
        info!(%client, "Signed out");
        Ok(())
    }

    async fn validate_token(&self, access_token: &str) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT access_token, user_id, client_id, issued_at, expires_at FROM auth_sessions \
             WHERE access_token = $1 AND expires_at > now()",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record
            .map(SessionRecord::to_domain)
            .ok_or(PortError::Unauthorized)
    }
}
