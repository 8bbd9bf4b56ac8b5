//! crates/eduquest_core/src/hub.rs
//!
//! In-process fan-out of session changes to the subscribers of each client.
//! Auth adapters publish here after every successful transition.

use crate::domain::{ClientId, Session};
use crate::ports::SessionSubscription;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::debug;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Option<Session>>,
}

#[derive(Default)]
struct Channels {
    next_id: u64,
    subscribers: HashMap<ClientId, Vec<Subscriber>>,
    current: HashMap<ClientId, Session>,
}

impl Channels {
    fn remove(&mut self, client: ClientId, id: u64) {
        if let Some(senders) = self.subscribers.get_mut(&client) {
            senders.retain(|s| s.id != id);
            if senders.is_empty() {
                self.subscribers.remove(&client);
            }
        }
    }
}

/// Deregisters one subscriber when its stream is dropped.
struct Registration {
    hub: Weak<SessionHub>,
    client: ClientId,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.lock().remove(self.client, self.id);
        }
    }
}

#[derive(Default)]
pub struct SessionHub {
    channels: Mutex<Channels>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(self: &Arc<Self>, client: ClientId) -> SessionSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut channels = self.lock();
            channels.next_id += 1;
            let id = channels.next_id;
            channels
                .subscribers
                .entry(client)
                .or_default()
                .push(Subscriber { id, tx });
            id
        };
        let registration = Registration {
            hub: Arc::downgrade(self),
            client,
            id,
        };

        let stream = futures::stream::unfold((rx, registration), |(mut rx, registration)| async move {
            rx.recv().await.map(|session| (session, (rx, registration)))
        });
        SessionSubscription::new(Box::pin(stream))
    }

    /// Delivers `session` to every live subscriber of `client`, in publish order.
    pub fn publish(&self, client: ClientId, session: Option<Session>) {
        let mut channels = self.lock();
        match &session {
            Some(s) => {
                channels.current.insert(client, s.clone());
            }
            None => {
                channels.current.remove(&client);
            }
        }
        if let Some(senders) = channels.subscribers.get_mut(&client) {
            senders.retain(|s| s.tx.send(session.clone()).is_ok());
            debug!(%client, live = senders.len(), "Published session change");
            if senders.is_empty() {
                channels.subscribers.remove(&client);
            }
        }
    }

    /// Publishes `None` for the client once `session` expires, unless it was
    /// replaced or signed out in the meantime.
    pub fn schedule_expiry(self: &Arc<Self>, session: Session) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let remaining = (session.expires_at - Utc::now())
                .to_std()
                .unwrap_or_default();
            tokio::time::sleep(remaining).await;

            let still_current = hub
                .lock()
                .current
                .get(&session.client_id)
                .is_some_and(|s| s.access_token == session.access_token);
            if still_current {
                debug!(client = %session.client_id, "Session expired");
                hub.publish(session.client_id, None);
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Channels> {
        // A poisoned lock only means a publisher panicked mid-send; the maps stay usable.
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn session(client: ClientId, ttl: Duration) -> Session {
        let now = Utc::now();
        Session {
            access_token: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4(),
            client_id: client,
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    #[tokio::test]
    async fn delivers_in_order_to_every_subscriber_of_the_client() {
        let hub = Arc::new(SessionHub::new());
        let client = ClientId::new();
        let other = ClientId::new();
        let mut first = hub.subscribe(client);
        let mut second = hub.subscribe(client);
        let mut unrelated = hub.subscribe(other);

        let s = session(client, Duration::hours(1));
        hub.publish(client, Some(s.clone()));
        hub.publish(client, None);

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.next().await, Some(Some(s.clone())));
            assert_eq!(sub.next().await, Some(None));
        }
        hub.publish(other, None);
        assert_eq!(unrelated.next().await, Some(None));
    }

    #[tokio::test]
    async fn unsubscribed_receivers_stop_receiving() {
        let hub = Arc::new(SessionHub::new());
        let client = ClientId::new();
        let sub = hub.subscribe(client);
        let mut kept = hub.subscribe(client);
        sub.unsubscribe();
        assert_eq!(hub.lock().subscribers[&client].len(), 1);

        hub.publish(client, None);
        assert_eq!(kept.next().await, Some(None));
    }

    #[test]
    fn dropped_subscriptions_leave_no_entries_behind() {
        let hub = Arc::new(SessionHub::new());
        for _ in 0..1000 {
            hub.subscribe(ClientId::new()).unsubscribe();
        }
        let client = ClientId::new();
        drop(hub.subscribe(client));
        drop(hub.subscribe(client));
        assert!(hub.lock().subscribers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_publishes_sign_out_for_the_current_session() {
        let hub = Arc::new(SessionHub::new());
        let client = ClientId::new();
        let mut sub = hub.subscribe(client);

        let s = session(client, Duration::seconds(5));
        hub.publish(client, Some(s.clone()));
        hub.schedule_expiry(s.clone());

        assert_eq!(sub.next().await, Some(Some(s)));
        assert_eq!(sub.next().await, Some(None));
    }
}
