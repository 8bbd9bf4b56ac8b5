//! crates/eduquest_core/src/coordinator.rs
//!
//! The runtime around the view reducer. One coordinator serves one client
//! connection: it owns the `AppState`, feeds every event through `reduce`,
//! and runs the resulting effects as spawned tasks that report back as events.

use crate::account;
use crate::domain::{ClientId, Profile, Session};
use crate::ledger::{self, LedgerError};
use crate::ports::{AuthService, ProfileStore};
use crate::resolver::resolve_profile;
use crate::view::{reduce, AppState, Effect, Event, Notification, ViewState};
use crate::watcher::watch_sessions;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The remote data service, as seen by the coordinator.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn ProfileStore>,
}

/// What the active screen needs to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub view: ViewState,
    pub profile: Option<Profile>,
    pub selected_subject: Option<String>,
}

impl ViewSnapshot {
    fn of(state: &AppState) -> Self {
        Self {
            view: state.view,
            profile: state.profile.clone(),
            selected_subject: state.selected_subject.clone(),
        }
    }
}

/// Output pushed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The session the client now holds, sent whenever its token changes.
    /// Lets the UI authenticate its REST calls.
    Session(Option<Session>),
    View(ViewSnapshot),
    Notify(Notification),
}

/// Sends UI intents into a running coordinator and tears it down.
#[derive(Clone)]
pub struct CoordinatorHandle {
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
}

impl CoordinatorHandle {
    /// Returns `false` once the coordinator has been torn down.
    pub fn dispatch(&self, event: Event) -> bool {
        !self.cancel.is_cancelled() && self.events.send(event).is_ok()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub struct Coordinator {
    services: Services,
    client: ClientId,
    state: AppState,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    updates: mpsc::UnboundedSender<Update>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        services: Services,
        client: ClientId,
    ) -> (Self, CoordinatorHandle, mpsc::UnboundedReceiver<Update>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = CoordinatorHandle {
            events: events_tx.clone(),
            cancel: cancel.clone(),
        };
        let coordinator = Self {
            services,
            client,
            state: AppState::default(),
            events_tx,
            events_rx,
            updates,
            cancel,
        };
        (coordinator, handle, updates_rx)
    }

    /// Runs until the handle shuts the coordinator down, then returns the final state.
    ///
    /// Tasks still in flight at that point finish on their own but can no
    /// longer change anything.
    pub async fn run(mut self) -> AppState {
        info!(client = %self.client, "Coordinator started");
        tokio::spawn(watch_sessions(
            Arc::clone(&self.services.auth),
            self.client,
            self.events_tx.clone(),
            self.cancel.clone(),
        ));
        let _ = self.updates.send(Update::View(ViewSnapshot::of(&self.state)));

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.events_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }

        info!(client = %self.client, view = self.state.view.as_str(), "Coordinator stopped");
        self.state
    }

    fn dispatch(&mut self, event: Event) {
        if let Event::ProfileResolved { ticket, .. } = &event {
            if self.state.pending_resolve != Some(*ticket) {
                debug!(client = %self.client, user_id = %ticket.user_id, "Discarding stale profile resolution");
            }
        }

        let before = ViewSnapshot::of(&self.state);
        let token_before = self.state.session.as_ref().map(|s| s.access_token.clone());
        let (next, effects) = reduce(&self.state, event);
        self.state = next;
        let after = ViewSnapshot::of(&self.state);

        if self.state.session.as_ref().map(|s| &s.access_token) != token_before.as_ref() {
            let _ = self.updates.send(Update::Session(self.state.session.clone()));
        }

        if before != after {
            if before.view != after.view {
                debug!(
                    client = %self.client,
                    from = before.view.as_str(),
                    to = after.view.as_str(),
                    "View transition"
                );
            }
            let _ = self.updates.send(Update::View(after));
        }

        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&self, effect: Effect) {
        let Services { auth, store } = self.services.clone();
        let client = self.client;

        match effect {
            Effect::Notify(notification) => {
                let _ = self.updates.send(Update::Notify(notification));
            }
            Effect::ResolveProfile(ticket) => self.spawn_reporting(async move {
                let profile = resolve_profile(store.as_ref(), ticket.user_id).await;
                Event::ProfileResolved { ticket, profile }
            }),
            Effect::SignIn {
                email,
                password,
                role,
            } => self.spawn_reporting(async move {
                match account::sign_in(auth.as_ref(), store.as_ref(), client, &email, &password, role)
                    .await
                {
                    Ok(_) => Event::SignedIn,
                    Err(e) => Event::AuthFailed(e.to_string()),
                }
            }),
            Effect::Register(registration) => self.spawn_reporting(async move {
                match account::register(auth.as_ref(), store.as_ref(), client, registration).await {
                    Ok(profile) => Event::Registered {
                        unique_id: profile.unique_id.unwrap_or_default(),
                    },
                    Err(e) => Event::AuthFailed(e.to_string()),
                }
            }),
            Effect::SignOut => self.spawn_reporting(async move {
                match account::sign_out(auth.as_ref(), client).await {
                    Ok(()) => Event::SignedOut,
                    Err(e) => Event::AuthFailed(e.to_string()),
                }
            }),
            Effect::ApplyQuizCompletion {
                generation,
                completion,
            } => self.spawn_reporting(async move {
                match ledger::apply_quiz_completion(store.as_ref(), completion).await {
                    Ok(receipt) => Event::RewardCredited {
                        generation,
                        profile_id: receipt.profile.id,
                        coins: receipt.coins_credited,
                        badges: receipt.badges_credited,
                    },
                    Err(LedgerError::CoinCredit { result, source }) => Event::CreditFailed {
                        result_id: result.id,
                        message: source.to_string(),
                    },
                    Err(LedgerError::CompletionRecord(e)) => Event::CompletionFailed(e.to_string()),
                }
            }),
        }
    }

    /// Runs `task` off the event loop and feeds its outcome back in, unless
    /// the coordinator was torn down meanwhile.
    fn spawn_reporting<F>(&self, task: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let events = self.events_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let event = task.await;
            if cancel.is_cancelled() {
                debug!("Dropping task outcome after teardown");
                return;
            }
            let _ = events.send(event);
        });
    }
}
