//! crates/eduquest_core/src/view.rs
//!
//! The view state machine. `AppState` is only ever replaced by the result of
//! [`reduce`]; every network call lives outside and reports back as an [`Event`].

use crate::account::Registration;
use crate::domain::{NewQuizResult, Profile, Role, Session};
use uuid::Uuid;

/// The single screen the application renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Loading,
    Welcome,
    Login,
    Register,
    Dashboard,
    TeacherDashboard,
    Quiz,
    Games,
    Reading,
}

impl ViewState {
    /// Views that may only be shown while a resolved profile is held.
    pub fn requires_profile(&self) -> bool {
        matches!(
            self,
            ViewState::Dashboard
                | ViewState::TeacherDashboard
                | ViewState::Quiz
                | ViewState::Games
                | ViewState::Reading
        )
    }

    pub fn home_for(role: Role) -> Self {
        match role {
            Role::Student => ViewState::Dashboard,
            Role::Teacher => ViewState::TeacherDashboard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewState::Loading => "loading",
            ViewState::Welcome => "welcome",
            ViewState::Login => "login",
            ViewState::Register => "register",
            ViewState::Dashboard => "dashboard",
            ViewState::TeacherDashboard => "teacher_dashboard",
            ViewState::Quiz => "quiz",
            ViewState::Games => "games",
            ViewState::Reading => "reading",
        }
    }
}

/// Tags one in-flight profile resolution with the session identity it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveTicket {
    pub generation: u64,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Warning(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub session: Option<Session>,
    /// In-memory mirror of the stored profile for the current session.
    pub profile: Option<Profile>,
    pub view: ViewState,
    pub selected_subject: Option<String>,
    pub pending_resolve: Option<ResolveTicket>,
    generation: u64,
}

impl AppState {
    pub fn is_loading(&self) -> bool {
        self.view == ViewState::Loading
    }

    /// Bumped whenever the held identity is dropped or replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn home(&self) -> Option<ViewState> {
        self.profile.as_ref().map(|p| ViewState::home_for(p.role))
    }

    // Forgets every trace of the signed-in identity.
    fn clear_identity(&mut self) {
        self.session = None;
        self.profile = None;
        self.selected_subject = None;
        self.pending_resolve = None;
        self.generation += 1;
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    // --- Session and profile ---
    SessionChanged(Option<Session>),
    ProfileResolved {
        ticket: ResolveTicket,
        profile: Option<Profile>,
    },

    // --- Navigation ---
    GetStarted,
    ShowRegister,
    Back,
    SubjectSelected(String),
    ShowGames,
    ShowReading,

    // --- Auth transitions ---
    SignInRequested {
        email: String,
        password: String,
        role: Role,
    },
    SignedIn,
    RegisterRequested(Registration),
    Registered {
        unique_id: String,
    },
    LogoutRequested,
    SignedOut,
    AuthFailed(String),

    // --- Rewards ---
    QuizCompleted {
        score: i32,
        total_points: i32,
        coins_earned: u32,
        badge: String,
    },
    RewardCredited {
        generation: u64,
        profile_id: Uuid,
        coins: i64,
        badges: i64,
    },
    CompletionFailed(String),
    CreditFailed {
        result_id: Uuid,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ResolveProfile(ResolveTicket),
    SignIn {
        email: String,
        password: String,
        role: Role,
    },
    Register(Registration),
    SignOut,
    ApplyQuizCompletion {
        generation: u64,
        completion: NewQuizResult,
    },
    Notify(Notification),
}

/// Computes the next state and the effects to run for it.
///
/// Events that do not apply to the current view are ignored.
pub fn reduce(state: &AppState, event: Event) -> (AppState, Vec<Effect>) {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match event {
        Event::SessionChanged(None) => {
            let had_identity = next.session.is_some() || next.profile.is_some();
            next.clear_identity();
            if had_identity || next.view == ViewState::Loading || next.view.requires_profile() {
                next.view = ViewState::Welcome;
            }
        }
        Event::SessionChanged(Some(session)) => {
            let same_identity = next
                .session
                .as_ref()
                .is_some_and(|held| held.user_id == session.user_id)
                && (next.profile.is_some() || next.pending_resolve.is_some());
            if same_identity {
                // Token refresh: keep the mirror and the view.
                next.session = Some(session);
            } else {
                next.generation += 1;
                let ticket = ResolveTicket {
                    generation: next.generation,
                    user_id: session.user_id,
                };
                next.session = Some(session);
                next.profile = None;
                next.selected_subject = None;
                next.pending_resolve = Some(ticket);
                if next.view.requires_profile() {
                    next.view = ViewState::Loading;
                }
                effects.push(Effect::ResolveProfile(ticket));
            }
        }
        Event::ProfileResolved { ticket, profile } => {
            if next.pending_resolve == Some(ticket) {
                next.pending_resolve = None;
                next.selected_subject = None;
                match profile {
                    Some(profile) => {
                        next.view = ViewState::home_for(profile.role);
                        next.profile = Some(profile);
                    }
                    None => {
                        next.profile = None;
                        next.view = ViewState::Welcome;
                    }
                }
            }
        }

        Event::GetStarted => {
            if next.view == ViewState::Welcome {
                next.view = ViewState::Login;
            }
        }
        Event::ShowRegister => {
            if next.view == ViewState::Welcome {
                next.view = ViewState::Register;
            }
        }
        Event::Back => match next.view {
            ViewState::Login | ViewState::Register => next.view = ViewState::Welcome,
            ViewState::Quiz | ViewState::Games | ViewState::Reading => {
                if let Some(home) = next.home() {
                    next.view = home;
                    next.selected_subject = None;
                }
            }
            _ => {}
        },
        Event::SubjectSelected(subject) => {
            if next.view == ViewState::Dashboard {
                next.selected_subject = Some(subject);
                next.view = ViewState::Quiz;
            }
        }
        Event::ShowGames => {
            if next.view == ViewState::Dashboard {
                next.view = ViewState::Games;
            }
        }
        Event::ShowReading => {
            if next.view == ViewState::Dashboard {
                next.view = ViewState::Reading;
            }
        }

        Event::SignInRequested {
            email,
            password,
            role,
        } => {
            if next.view == ViewState::Login {
                effects.push(Effect::SignIn {
                    email,
                    password,
                    role,
                });
            }
        }
        Event::SignedIn => {
            effects.push(Effect::Notify(Notification::Success(
                "Login successful!".to_string(),
            )));
        }
        Event::RegisterRequested(registration) => {
            if next.view == ViewState::Register {
                effects.push(Effect::Register(registration));
            }
        }
        Event::Registered { unique_id } => {
            effects.push(Effect::Notify(Notification::Success(format!(
                "Registration successful! Your ID: {unique_id}. Please save this ID for reference."
            ))));
        }
        Event::LogoutRequested => {
            // The view follows the subscription once the sign-out is confirmed.
            if next.session.is_some() {
                effects.push(Effect::SignOut);
            }
        }
        Event::SignedOut => {
            next.clear_identity();
            next.view = ViewState::Welcome;
        }
        Event::AuthFailed(message) => {
            effects.push(Effect::Notify(Notification::Error(message)));
        }

        Event::QuizCompleted {
            score,
            total_points,
            coins_earned,
            badge,
        } => {
            if next.view == ViewState::Quiz {
                if let (Some(profile), Some(subject)) = (&next.profile, &next.selected_subject) {
                    effects.push(Effect::ApplyQuizCompletion {
                        generation: next.generation,
                        completion: NewQuizResult {
                            student_profile_id: profile.id,
                            quiz_ref: subject.clone(),
                            score,
                            total_points,
                            coins_earned,
                            badge,
                        },
                    });
                }
            }
        }
        Event::RewardCredited {
            generation,
            profile_id,
            coins,
            badges,
        } => {
            // A credit from an earlier identity is already in whatever row the
            // current one resolved.
            if generation != next.generation {
                return (next, effects);
            }
            if let Some(profile) = next.profile.as_mut().filter(|p| p.id == profile_id) {
                profile.coins += coins;
                profile.badges += badges;
            }
        }
        Event::CompletionFailed(message) => {
            effects.push(Effect::Notify(Notification::Error(format!(
                "Could not save your quiz result: {message}"
            ))));
        }
        Event::CreditFailed { message, .. } => {
            effects.push(Effect::Notify(Notification::Warning(format!(
                "Your quiz result was saved, but your coins could not be credited yet: {message}"
            ))));
        }
    }

    (next, effects)
}
