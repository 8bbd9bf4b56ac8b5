//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ProfileStore` port from the `core` crate. It handles all profile and
//! quiz-result rows in PostgreSQL using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use eduquest_core::domain::{NewProfile, NewQuizResult, Profile, ProfileDetails, QuizResult, Role};
use eduquest_core::ports::{PortError, PortResult, ProfileStore};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ProfileStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const PROFILE_COLUMNS: &str =
    "id, user_id, user_type, name, email, coins, badges, class, school, unique_id";

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    user_id: Uuid,
    user_type: String,
    name: String,
    email: String,
    coins: i64,
    badges: i64,
    class: Option<String>,
    school: Option<String>,
    unique_id: Option<String>,
}
impl ProfileRecord {
    fn to_domain(self) -> PortResult<Profile> {
        let role = self
            .user_type
            .parse::<Role>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Profile {
            id: self.id,
            user_id: self.user_id,
            role,
            name: self.name,
            email: self.email,
            coins: self.coins,
            badges: self.badges,
            class_level: self.class,
            school: self.school,
            unique_id: self.unique_id,
        })
    }
}

const QUIZ_RESULT_COLUMNS: &str =
    "id, student_id, quiz_id, score, total_points, coins_earned, badge, completed_at";

#[derive(FromRow)]
struct QuizResultRecord {
    id: Uuid,
    student_id: Uuid,
    quiz_id: String,
    score: i32,
    total_points: i32,
    coins_earned: i64,
    badge: String,
    completed_at: DateTime<Utc>,
}
impl QuizResultRecord {
    fn to_domain(self) -> PortResult<QuizResult> {
        let coins_earned = u32::try_from(self.coins_earned).map_err(|_| {
            PortError::Unexpected(format!(
                "Quiz result {} has out-of-range coins_earned {}",
                self.id, self.coins_earned
            ))
        })?;
        Ok(QuizResult {
            id: self.id,
            student_profile_id: self.student_id,
            quiz_ref: self.quiz_id,
            score: self.score,
            total_points: self.total_points,
            coins_earned,
            badge: self.badge,
            completed_at: self.completed_at,
        })
    }
}

fn map_write_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Conflict(db.to_string()),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => PortError::NotFound(db.to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// `ProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileStore for DbAdapter {
    async fn find_profile(&self, user_id: Uuid, role: Option<Role>) -> PortResult<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1 AND ($2::TEXT IS NULL OR user_type = $2)"
        ))
        .bind(user_id)
        .bind(role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        record.map(ProfileRecord::to_domain).transpose()
    }

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile> {
        let (class, dob, subjects, experience): (
            Option<String>,
            Option<NaiveDate>,
            Option<String>,
            Option<String>,
        ) = match &profile.details {
            ProfileDetails::Student {
                class_level,
                date_of_birth,
            } => (Some(class_level.clone()), Some(*date_of_birth), None, None),
            ProfileDetails::Teacher {
                subjects,
                experience,
            } => (None, None, Some(subjects.clone()), Some(experience.clone())),
        };

        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "INSERT INTO profiles (id, user_id, user_type, name, email, school, class, dob, subjects, experience, unique_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(profile.user_id)
        .bind(profile.details.role().as_str())
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(&profile.school)
        .bind(class)
        .bind(dob)
        .bind(subjects)
        .bind(experience)
        .bind(&profile.unique_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        record.to_domain()
    }

    async fn list_profiles(&self, role: Role) -> PortResult<Vec<Profile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_type = $1 ORDER BY name"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(ProfileRecord::to_domain).collect()
    }

    async fn credit_rewards(&self, profile_id: Uuid, coins: i64, badges: i64) -> PortResult<Profile> {
        // A single UPDATE increments against the stored value, so concurrent credits never lose updates.
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "UPDATE profiles SET coins = coins + $2, badges = badges + $3, updated_at = now() \
             WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(profile_id)
        .bind(coins)
        .bind(badges)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Profile {} not found", profile_id)),
            other => PortError::Unexpected(other.to_string()),
        })?;

        record.to_domain()
    }

    async fn insert_quiz_result(&self, result: NewQuizResult) -> PortResult<QuizResult> {
        let record = sqlx::query_as::<_, QuizResultRecord>(&format!(
            "INSERT INTO quiz_results (id, student_id, quiz_id, score, total_points, coins_earned, badge) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {QUIZ_RESULT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(result.student_profile_id)
        .bind(&result.quiz_ref)
        .bind(result.score)
        .bind(result.total_points)
        .bind(i64::from(result.coins_earned))
        .bind(&result.badge)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        record.to_domain()
    }

    async fn list_quiz_results(&self, profile_id: Uuid) -> PortResult<Vec<QuizResult>> {
        let records = sqlx::query_as::<_, QuizResultRecord>(&format!(
            "SELECT {QUIZ_RESULT_COLUMNS} FROM quiz_results WHERE student_id = $1 ORDER BY completed_at DESC"
        ))
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(QuizResultRecord::to_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(coins_earned: i64) -> QuizResultRecord {
        QuizResultRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            quiz_id: "math-6".to_string(),
            score: 80,
            total_points: 100,
            coins_earned,
            badge: "gold".to_string(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn in_range_coins_convert() {
        assert_eq!(record(15).to_domain().unwrap().coins_earned, 15);
    }

    #[test]
    fn out_of_range_coins_are_an_error() {
        for coins in [-1, i64::from(u32::MAX) + 1] {
            assert!(matches!(
                record(coins).to_domain(),
                Err(PortError::Unexpected(_))
            ));
        }
    }
}
