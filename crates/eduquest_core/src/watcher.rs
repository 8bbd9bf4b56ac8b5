//! crates/eduquest_core/src/watcher.rs
//!
//! Merges the long-lived session subscription and the one-shot session lookup
//! into a single ordered, de-duplicated stream of `SessionChanged` events.

use crate::domain::{ClientId, Session};
use crate::ports::AuthService;
use crate::view::Event;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Precedence rules between the two session sources.
///
/// The subscription is authoritative. The lookup only supplies the initial
/// value, and only if no subscription event has been seen before it lands.
#[derive(Debug, Default)]
pub struct SessionMerge {
    subscription_seen: bool,
    last: Option<Option<Session>>,
}

impl SessionMerge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value to emit for a subscription delivery, if any.
    pub fn from_subscription(&mut self, session: Option<Session>) -> Option<Option<Session>> {
        self.subscription_seen = true;
        self.emit(session)
    }

    /// Returns the value to emit for the lookup result, if any.
    pub fn from_lookup(&mut self, session: Option<Session>) -> Option<Option<Session>> {
        if self.subscription_seen {
            return None;
        }
        self.emit(session)
    }

    /// True until the first value has been emitted.
    pub fn is_loading(&self) -> bool {
        self.last.is_none()
    }

    fn emit(&mut self, session: Option<Session>) -> Option<Option<Session>> {
        if self.last.as_ref() == Some(&session) {
            return None;
        }
        self.last = Some(session.clone());
        Some(session)
    }
}

/// Runs the session watcher for `client` until `cancel` fires or the consumer goes away.
///
/// The subscription is taken before the lookup is issued so no transition can
/// fall between the two. On exit the subscription is released; a lookup still
/// in flight is left to finish and its result is dropped.
pub async fn watch_sessions(
    auth: Arc<dyn AuthService>,
    client: ClientId,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    let mut subscription = auth.subscribe(client);

    let (lookup_tx, mut lookup_rx) = oneshot::channel();
    let lookup_auth = Arc::clone(&auth);
    tokio::spawn(async move {
        let result = lookup_auth.current_session(client).await;
        let _ = lookup_tx.send(result);
    });

    let mut merge = SessionMerge::new();
    let mut subscription_open = true;
    let mut lookup_pending = true;

    while subscription_open || lookup_pending {
        let emitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            delivery = subscription.next(), if subscription_open => match delivery {
                Some(session) => merge.from_subscription(session),
                None => {
                    debug!(%client, "Session subscription closed");
                    subscription_open = false;
                    None
                }
            },
            lookup = &mut lookup_rx, if lookup_pending => {
                lookup_pending = false;
                match lookup {
                    Ok(Ok(session)) => merge.from_lookup(session),
                    Ok(Err(e)) => {
                        // Without a usable lookup the client is treated as signed out.
                        warn!(%client, error = %e, "Session lookup failed");
                        merge.from_lookup(None)
                    }
                    Err(_) => None,
                }
            }
        };

        if let Some(session) = emitted {
            if events.send(Event::SessionChanged(session)).is_err() {
                break;
            }
        }
    }

    subscription.unsubscribe();
    info!(%client, "Session watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session() -> Session {
        let now = Utc::now();
        Session {
            access_token: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4(),
            client_id: ClientId::new(),
            issued_at: now,
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn lookup_applies_when_it_lands_first() {
        let mut merge = SessionMerge::new();
        let s = session();
        assert!(merge.is_loading());
        assert_eq!(merge.from_lookup(Some(s.clone())), Some(Some(s.clone())));
        assert!(!merge.is_loading());
        // The subscription confirming the same session is not re-dispatched.
        assert_eq!(merge.from_subscription(Some(s)), None);
        assert_eq!(merge.from_subscription(None), Some(None));
    }

    #[test]
    fn late_lookup_is_discarded() {
        let mut merge = SessionMerge::new();
        let newer = session();
        assert_eq!(merge.from_subscription(None), Some(None));
        assert_eq!(merge.from_lookup(Some(newer.clone())), None);
        assert_eq!(merge.from_subscription(Some(newer.clone())), Some(Some(newer)));
    }

    #[test]
    fn subscription_events_keep_their_order() {
        let mut merge = SessionMerge::new();
        let a = session();
        let b = session();
        let emitted: Vec<_> = [Some(a.clone()), None, Some(b.clone()), Some(b.clone())]
            .into_iter()
            .filter_map(|s| merge.from_subscription(s))
            .collect();
        assert_eq!(emitted, vec![Some(a), None, Some(b)]);
    }
}
