//! crates/eduquest_core/src/memory.rs
//!
//! An in-process implementation of both ports. Used by the service when
//! `DATA_BACKEND=memory` and by tests, which can also hold reads open and
//! inject write failures to drive races deterministically.
//!
//! Passwords are kept as Argon2 hashes, but at the minimum cost Argon2 allows.
//! Nothing survives a restart, so this backend is for development only.

use crate::domain::{
    ClientId, NewProfile, NewQuizResult, Profile, ProfileDetails, QuizResult, Role, Session,
};
use crate::credentials::{verify_password, CredentialHasher};
use crate::hub::SessionHub;
use crate::ports::{AuthService, PortError, PortResult, ProfileStore, SessionSubscription};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use uuid::Uuid;

struct Account {
    user_id: Uuid,
    hashed_password: String,
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    sessions: HashMap<ClientId, Session>,
    profiles: Vec<Profile>,
    quiz_results: Vec<QuizResult>,
}

#[derive(Default)]
struct Faults {
    fail_next_credit: bool,
    fail_next_result_insert: bool,
    fail_next_sign_out: bool,
    profile_reads: Option<Arc<Semaphore>>,
    session_lookups: Option<Arc<Semaphore>>,
}

pub struct MemoryBackend {
    hub: Arc<SessionHub>,
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    lookups_served: AtomicUsize,
    session_ttl: Duration,
    hasher: CredentialHasher,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_session_ttl(Duration::days(30))
    }

    pub fn with_session_ttl(session_ttl: Duration) -> Self {
        Self {
            hub: Arc::new(SessionHub::new()),
            tables: Mutex::new(Tables::default()),
            faults: Mutex::new(Faults::default()),
            lookups_served: AtomicUsize::new(0),
            session_ttl,
            hasher: CredentialHasher::lightweight(),
        }
    }

    //-------------------------------------------------------------------------------------
    // Fault injection and gating
    //-------------------------------------------------------------------------------------

    pub fn fail_next_credit(&self) {
        self.faults().fail_next_credit = true;
    }

    pub fn fail_next_result_insert(&self) {
        self.faults().fail_next_result_insert = true;
    }

    pub fn fail_next_sign_out(&self) {
        self.faults().fail_next_sign_out = true;
    }

    /// Blocks profile reads until permits are added to the returned semaphore.
    pub fn hold_profile_reads(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.faults().profile_reads = Some(Arc::clone(&gate));
        gate
    }

    /// Delays session lookup answers until permits are added to the returned semaphore.
    pub fn hold_session_lookups(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.faults().session_lookups = Some(Arc::clone(&gate));
        gate
    }

    /// Number of session lookups that have read their answer.
    pub fn session_lookups_served(&self) -> usize {
        self.lookups_served.load(Ordering::SeqCst)
    }

    //-------------------------------------------------------------------------------------
    // Seeding helpers
    //-------------------------------------------------------------------------------------

    /// Creates an auth account without issuing a session.
    pub fn seed_account(&self, email: &str, password: &str) -> PortResult<Uuid> {
        let hashed_password = self.hasher.hash(password)?;
        let mut tables = self.tables();
        if tables.accounts.contains_key(email) {
            return Err(PortError::Conflict(format!("{email} is already registered")));
        }
        let user_id = Uuid::new_v4();
        tables.accounts.insert(
            email.to_string(),
            Account {
                user_id,
                hashed_password,
            },
        );
        Ok(user_id)
    }

    /// Creates a profile with default details for a fresh identity.
    pub async fn seed_profile(&self, role: Role) -> Profile {
        let user_id = Uuid::new_v4();
        self.seed_profile_for(user_id, role).await
    }

    pub async fn seed_profile_for(&self, user_id: Uuid, role: Role) -> Profile {
        let details = match role {
            Role::Student => ProfileDetails::Student {
                class_level: "6".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(2013, 4, 9).unwrap_or(NaiveDate::MIN),
            },
            Role::Teacher => ProfileDetails::Teacher {
                subjects: "General".to_string(),
                experience: "0 years".to_string(),
            },
        };
        let profile = NewProfile {
            user_id,
            name: format!("Seeded {role}"),
            email: format!("{user_id}@example.com"),
            school: Some("Seed School".to_string()),
            unique_id: format!("SEED_{}", user_id.simple()),
            details,
        };
        self.insert_profile_row(profile)
    }

    fn insert_profile_row(&self, profile: NewProfile) -> Profile {
        let class_level = match &profile.details {
            ProfileDetails::Student { class_level, .. } => Some(class_level.clone()),
            ProfileDetails::Teacher { .. } => None,
        };
        let row = Profile {
            id: Uuid::new_v4(),
            user_id: profile.user_id,
            role: profile.details.role(),
            name: profile.name,
            email: profile.email,
            coins: 0,
            badges: 0,
            class_level,
            school: profile.school,
            unique_id: Some(profile.unique_id),
        };
        self.tables().profiles.push(row.clone());
        row
    }

    fn issue_session(&self, client: ClientId, user_id: Uuid) -> PortResult<Session> {
        let session = Session::issue(client, user_id, Utc::now(), self.session_ttl)?;
        self.tables().sessions.insert(client, session.clone());
        self.hub.publish(client, Some(session.clone()));
        self.hub.schedule_expiry(session.clone());
        Ok(session)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn pass_gate(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        // A closed semaphore simply opens the gate.
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl AuthService for MemoryBackend {
    fn subscribe(&self, client: ClientId) -> SessionSubscription {
        self.hub.subscribe(client)
    }

    async fn current_session(&self, client: ClientId) -> PortResult<Option<Session>> {
        let now = Utc::now();
        let session = self
            .tables()
            .sessions
            .get(&client)
            .filter(|s| !s.is_expired_at(now))
            .cloned();
        self.lookups_served.fetch_add(1, Ordering::SeqCst);

        // The answer is already fixed; a held gate only delays its delivery.
        let gate = self.faults().session_lookups.clone();
        pass_gate(gate).await;
        Ok(session)
    }

    async fn sign_in(&self, client: ClientId, email: &str, password: &str) -> PortResult<Session> {
        let (user_id, hashed_password) = match self.tables().accounts.get(email) {
            Some(account) => (account.user_id, account.hashed_password.clone()),
            None => return Err(PortError::Unauthorized),
        };
        if !verify_password(password, &hashed_password)? {
            return Err(PortError::Unauthorized);
        }
        self.issue_session(client, user_id)
    }

    async fn sign_up(&self, client: ClientId, email: &str, password: &str) -> PortResult<Session> {
        let user_id = self.seed_account(email, password)?;
        self.issue_session(client, user_id)
    }

    async fn sign_out(&self, client: ClientId) -> PortResult<()> {
        if std::mem::take(&mut self.faults().fail_next_sign_out) {
            return Err(PortError::Unexpected("sign-out rejected".to_string()));
        }
        self.tables().sessions.remove(&client);
        self.hub.publish(client, None);
        Ok(())
    }

    async fn validate_token(&self, access_token: &str) -> PortResult<Session> {
        let now = Utc::now();
        self.tables()
            .sessions
            .values()
            .find(|s| s.access_token == access_token && !s.is_expired_at(now))
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn find_profile(&self, user_id: Uuid, role: Option<Role>) -> PortResult<Option<Profile>> {
        let gate = self.faults().profile_reads.clone();
        pass_gate(gate).await;
        Ok(self
            .tables()
            .profiles
            .iter()
            .find(|p| p.user_id == user_id && role.map_or(true, |r| p.role == r))
            .cloned())
    }

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile> {
        let exists = self
            .tables()
            .profiles
            .iter()
            .any(|p| p.user_id == profile.user_id);
        if exists {
            return Err(PortError::Conflict(format!(
                "profile for user {} already exists",
                profile.user_id
            )));
        }
        Ok(self.insert_profile_row(profile))
    }

    async fn list_profiles(&self, role: Role) -> PortResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self
            .tables()
            .profiles
            .iter()
            .filter(|p| p.role == role)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    async fn credit_rewards(&self, profile_id: Uuid, coins: i64, badges: i64) -> PortResult<Profile> {
        if std::mem::take(&mut self.faults().fail_next_credit) {
            return Err(PortError::Unexpected("credit rejected".to_string()));
        }
        let mut tables = self.tables();
        let profile = tables
            .profiles
            .iter_mut()
            .find(|p| p.id == profile_id)
            .ok_or_else(|| PortError::NotFound(format!("Profile {profile_id} not found")))?;
        profile.coins += coins;
        profile.badges += badges;
        Ok(profile.clone())
    }

    async fn insert_quiz_result(&self, result: NewQuizResult) -> PortResult<QuizResult> {
        if std::mem::take(&mut self.faults().fail_next_result_insert) {
            return Err(PortError::Unexpected("insert rejected".to_string()));
        }
        let mut tables = self.tables();
        if !tables.profiles.iter().any(|p| p.id == result.student_profile_id) {
            return Err(PortError::NotFound(format!(
                "Profile {} not found",
                result.student_profile_id
            )));
        }
        let row = QuizResult {
            id: Uuid::new_v4(),
            student_profile_id: result.student_profile_id,
            quiz_ref: result.quiz_ref,
            score: result.score,
            total_points: result.total_points,
            coins_earned: result.coins_earned,
            badge: result.badge,
            completed_at: Utc::now(),
        };
        tables.quiz_results.push(row.clone());
        Ok(row)
    }

    async fn list_quiz_results(&self, profile_id: Uuid) -> PortResult<Vec<QuizResult>> {
        let mut results: Vec<QuizResult> = self
            .tables()
            .quiz_results
            .iter()
            .filter(|r| r.student_profile_id == profile_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_checks_the_password() {
        let backend = MemoryBackend::new();
        backend.seed_account("kiran@example.com", "secret1").unwrap();
        let client = ClientId::new();

        assert_eq!(
            backend.sign_in(client, "kiran@example.com", "wrong").await,
            Err(PortError::Unauthorized)
        );
        let session = backend
            .sign_in(client, "kiran@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(backend.current_session(client).await.unwrap(), Some(session));
    }

    #[test]
    fn passwords_are_stored_hashed() {
        let backend = MemoryBackend::new();
        backend.seed_account("kiran@example.com", "secret1").unwrap();
        let tables = backend.tables();
        let stored = &tables.accounts["kiran@example.com"].hashed_password;
        assert_ne!(stored, "secret1");
        assert!(!stored.contains("secret1"));
        assert!(verify_password("secret1", stored).unwrap());
    }

    #[tokio::test]
    async fn unrepresentable_session_lifetime_is_an_error() {
        let backend = MemoryBackend::with_session_ttl(Duration::hours(2_500_000_000));
        backend.seed_account("kiran@example.com", "secret1").unwrap();
        let client = ClientId::new();

        assert!(matches!(
            backend.sign_in(client, "kiran@example.com", "secret1").await,
            Err(PortError::Unexpected(_))
        ));
        assert_eq!(backend.current_session(client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_publishes_to_subscribers() {
        let backend = MemoryBackend::new();
        let client = ClientId::new();
        let mut sub = backend.subscribe(client);

        let session = backend.sign_up(client, "mei@example.com", "secret1").await.unwrap();
        backend.sign_out(client).await.unwrap();

        assert_eq!(sub.next().await, Some(Some(session)));
        assert_eq!(sub.next().await, Some(None));
        assert_eq!(backend.current_session(client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let backend = MemoryBackend::new();
        let client = ClientId::new();
        backend.sign_up(client, "ana@example.com", "secret1").await.unwrap();
        assert!(matches!(
            backend.sign_up(client, "ana@example.com", "other").await,
            Err(PortError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn role_filter_narrows_profile_reads() {
        let backend = MemoryBackend::new();
        let profile = backend.seed_profile(Role::Teacher).await;
        assert_eq!(
            backend.find_profile(profile.user_id, Some(Role::Student)).await.unwrap(),
            None
        );
        assert_eq!(
            backend.find_profile(profile.user_id, Some(Role::Teacher)).await.unwrap(),
            Some(profile)
        );
    }
}
