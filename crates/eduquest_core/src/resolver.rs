//! crates/eduquest_core/src/resolver.rs
//!
//! Looks up the profile behind a session identity.

use crate::domain::Profile;
use crate::ports::ProfileStore;
use tracing::{info, warn};
use uuid::Uuid;

/// Issues exactly one profile read for `user_id`.
///
/// A missing row and a failed read both yield `None`: the caller routes the
/// user back to the unauthenticated view and nothing is retried.
pub async fn resolve_profile(store: &dyn ProfileStore, user_id: Uuid) -> Option<Profile> {
    match store.find_profile(user_id, None).await {
        Ok(Some(profile)) => Some(profile),
        Ok(None) => {
            info!(%user_id, "No profile exists for this identity");
            None
        }
        Err(e) => {
            warn!(%user_id, error = %e, "Profile resolution failed");
            None
        }
    }
}
