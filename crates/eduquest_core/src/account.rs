//! crates/eduquest_core/src/account.rs
//!
//! Auth transitions initiated from the login and registration screens.
//! None of these touch the view directly: the session subscription drives it.

use crate::domain::{ClientId, NewProfile, Profile, ProfileDetails, Role};
use crate::ports::{AuthService, PortError, ProfileStore};
use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("No {0} profile found for this account")]
    RoleMismatch(Role),
    #[error("Sign-in failed: {0}")]
    SignIn(#[source] PortError),
    #[error("Registration failed: {0}")]
    SignUp(#[source] PortError),
    #[error("Failed to create profile: {0}")]
    ProfileCreation(#[source] PortError),
    #[error("Sign-out failed: {0}")]
    SignOut(#[source] PortError),
}

/// Everything the registration screen collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub school: Option<String>,
    pub details: ProfileDetails,
}

/// Builds the public id shown to a newly registered user.
///
/// Students get `{first name}@{DDMM}@{XXX}`; teachers get `TEACHER_{unix millis}`.
pub fn generate_unique_id(name: &str, details: &ProfileDetails, now: DateTime<Utc>) -> String {
    match details {
        ProfileDetails::Student { date_of_birth, .. } => {
            let first_name = name.split_whitespace().next().unwrap_or_default();
            let suffix: String = Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(3)
                .collect::<String>()
                .to_uppercase();
            format!(
                "{first_name}@{:02}{:02}@{suffix}",
                date_of_birth.day(),
                date_of_birth.month()
            )
        }
        ProfileDetails::Teacher { .. } => format!("TEACHER_{}", now.timestamp_millis()),
    }
}

/// Signs `client` in and checks that the account has a profile of `role`.
///
/// On a role mismatch the freshly issued session is revoked again.
pub async fn sign_in(
    auth: &dyn AuthService,
    store: &dyn ProfileStore,
    client: ClientId,
    email: &str,
    password: &str,
    role: Role,
) -> Result<Profile, AuthError> {
    let session = auth
        .sign_in(client, email, password)
        .await
        .map_err(|e| {
            warn!(%client, error = %e, "Sign-in failed");
            match e {
                PortError::Unauthorized | PortError::NotFound(_) => AuthError::InvalidCredentials,
                other => AuthError::SignIn(other),
            }
        })?;

    match store.find_profile(session.user_id, Some(role)).await {
        Ok(Some(profile)) => {
            info!(%client, user_id = %session.user_id, %role, "Signed in");
            Ok(profile)
        }
        Ok(None) => {
            warn!(%client, user_id = %session.user_id, %role, "No profile for requested role");
            if let Err(e) = auth.sign_out(client).await {
                warn!(%client, error = %e, "Could not revoke session after role mismatch");
            }
            Err(AuthError::RoleMismatch(role))
        }
        Err(e) => Err(AuthError::SignIn(e)),
    }
}

/// Creates the auth account and its profile, then signs out again so the
/// user has to log in explicitly.
pub async fn register(
    auth: &dyn AuthService,
    store: &dyn ProfileStore,
    client: ClientId,
    registration: Registration,
) -> Result<Profile, AuthError> {
    let session = auth
        .sign_up(client, &registration.email, &registration.password)
        .await
        .map_err(AuthError::SignUp)?;

    let details = match registration.details {
        ProfileDetails::Teacher {
            subjects,
            experience,
        } => ProfileDetails::Teacher {
            subjects: non_empty_or(subjects, "General"),
            experience: non_empty_or(experience, "0 years"),
        },
        student => student,
    };
    let unique_id = generate_unique_id(&registration.name, &details, Utc::now());
    let profile = store
        .insert_profile(NewProfile {
            user_id: session.user_id,
            name: registration.name,
            email: registration.email,
            school: registration.school,
            unique_id,
            details,
        })
        .await
        .map_err(AuthError::ProfileCreation)?;
    info!(%client, profile_id = %profile.id, role = %profile.role, "Registered");

    auth.sign_out(client).await.map_err(AuthError::SignOut)?;
    Ok(profile)
}

pub async fn sign_out(auth: &dyn AuthService, client: ClientId) -> Result<(), AuthError> {
    auth.sign_out(client).await.map_err(|e| {
        warn!(%client, error = %e, "Sign-out failed");
        AuthError::SignOut(e)
    })
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use chrono::{NaiveDate, TimeZone};

    fn student_registration(email: &str) -> Registration {
        Registration {
            name: "Priya Nair".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            school: Some("Hillside".to_string()),
            details: ProfileDetails::Student {
                class_level: "7".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(2012, 3, 14).unwrap(),
            },
        }
    }

    #[test]
    fn student_id_uses_first_name_and_birthday() {
        let details = ProfileDetails::Student {
            class_level: "7".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2012, 3, 4).unwrap(),
        };
        let id = generate_unique_id("Priya Nair", &details, Utc::now());
        let parts: Vec<&str> = id.split('@').collect();
        assert_eq!(parts[0], "Priya");
        assert_eq!(parts[1], "0403");
        assert_eq!(parts[2].len(), 3);
        assert_eq!(parts[2], parts[2].to_uppercase());
    }

    #[test]
    fn teacher_id_uses_the_clock() {
        let details = ProfileDetails::Teacher {
            subjects: "Science".to_string(),
            experience: "4 years".to_string(),
        };
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            generate_unique_id("Ravi", &details, now),
            "TEACHER_1700000000123"
        );
    }

    #[tokio::test]
    async fn register_creates_profile_and_signs_out() {
        let backend = MemoryBackend::new();
        let client = ClientId::new();

        let profile = register(&backend, &backend, client, student_registration("priya@example.com"))
            .await
            .unwrap();
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.class_level.as_deref(), Some("7"));
        assert!(profile.unique_id.as_deref().unwrap().starts_with("Priya@1403@"));
        assert_eq!(backend.current_session(client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn teacher_registration_fills_defaults() {
        let backend = MemoryBackend::new();
        let registration = Registration {
            name: "Ravi Kumar".to_string(),
            email: "ravi@example.com".to_string(),
            password: "secret1".to_string(),
            school: None,
            details: ProfileDetails::Teacher {
                subjects: String::new(),
                experience: " ".to_string(),
            },
        };
        let profile = register(&backend, &backend, ClientId::new(), registration)
            .await
            .unwrap();
        assert_eq!(profile.role, Role::Teacher);
        assert!(profile.unique_id.as_deref().unwrap().starts_with("TEACHER_"));
    }

    #[tokio::test]
    async fn sign_in_with_the_wrong_role_is_revoked() {
        let backend = MemoryBackend::new();
        let client = ClientId::new();
        register(&backend, &backend, client, student_registration("priya@example.com"))
            .await
            .unwrap();

        let err = sign_in(&backend, &backend, client, "priya@example.com", "secret1", Role::Teacher)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RoleMismatch(Role::Teacher)));
        assert_eq!(err.to_string(), "No teacher profile found for this account");
        assert_eq!(backend.current_session(client).await.unwrap(), None);

        let profile = sign_in(&backend, &backend, client, "priya@example.com", "secret1", Role::Student)
            .await
            .unwrap();
        assert_eq!(profile.email, "priya@example.com");
        assert!(backend.current_session(client).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bad_password_is_reported_as_invalid_credentials() {
        let backend = MemoryBackend::new();
        backend.seed_account("sam@example.com", "secret1").unwrap();
        let err = sign_in(&backend, &backend, ClientId::new(), "sam@example.com", "nope", Role::Student)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
