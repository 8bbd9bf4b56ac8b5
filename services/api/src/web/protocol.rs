//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Client messages are UI intents; they are translated into coordinator events here so
//! the core crate never has to know about JSON.

use chrono::{DateTime, NaiveDate, Utc};
use eduquest_core::account::Registration;
use eduquest_core::coordinator::{Update, ViewSnapshot};
use eduquest_core::domain::{Profile, ProfileDetails, Role};
use eduquest_core::view::{Event, Notification};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleDto {
    Student,
    Teacher,
}

impl From<RoleDto> for Role {
    fn from(role: RoleDto) -> Self {
        match role {
            RoleDto::Student => Role::Student,
            RoleDto::Teacher => Role::Teacher,
        }
    }
}

impl From<Role> for RoleDto {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => RoleDto::Student,
            Role::Teacher => RoleDto::Teacher,
        }
    }
}

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Binds the connection to a browser client. This must be the first message sent.
    Init { client_id: Uuid },

    GetStarted,
    ShowRegister,
    Back,
    SelectSubject { subject: String },
    ShowGames,
    ShowReading,
    Logout,

    SignIn {
        email: String,
        password: String,
        role: RoleDto,
    },

    /// Student registrations carry `class_level` and `date_of_birth`; teacher
    /// registrations may carry `subjects` and `experience`.
    Register {
        name: String,
        email: String,
        password: String,
        #[serde(default)]
        school: Option<String>,
        role: RoleDto,
        #[serde(default)]
        class_level: Option<String>,
        #[serde(default)]
        date_of_birth: Option<NaiveDate>,
        #[serde(default)]
        subjects: Option<String>,
        #[serde(default)]
        experience: Option<String>,
    },

    QuizComplete {
        score: i32,
        #[serde(default)]
        total_points: Option<i32>,
        coins_earned: u32,
        #[serde(default)]
        badge: String,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("The connection is already initialized")]
    AlreadyInitialized,
    #[error("Student registration requires {0}")]
    MissingField(&'static str),
}

impl ClientMessage {
    /// Translates the message into a coordinator event.
    ///
    /// `default_total_points` fills in quiz completions that omit their total.
    pub fn into_event(self, default_total_points: i32) -> Result<Event, ProtocolError> {
        let event = match self {
            ClientMessage::Init { .. } => return Err(ProtocolError::AlreadyInitialized),
            ClientMessage::GetStarted => Event::GetStarted,
            ClientMessage::ShowRegister => Event::ShowRegister,
            ClientMessage::Back => Event::Back,
            ClientMessage::SelectSubject { subject } => Event::SubjectSelected(subject),
            ClientMessage::ShowGames => Event::ShowGames,
            ClientMessage::ShowReading => Event::ShowReading,
            ClientMessage::Logout => Event::LogoutRequested,
            ClientMessage::SignIn {
                email,
                password,
                role,
            } => Event::SignInRequested {
                email,
                password,
                role: role.into(),
            },
            ClientMessage::Register {
                name,
                email,
                password,
                school,
                role,
                class_level,
                date_of_birth,
                subjects,
                experience,
            } => {
                let details = match role {
                    RoleDto::Student => ProfileDetails::Student {
                        class_level: class_level.ok_or(ProtocolError::MissingField("class_level"))?,
                        date_of_birth: date_of_birth
                            .ok_or(ProtocolError::MissingField("date_of_birth"))?,
                    },
                    // Blank teacher fields are filled with defaults during registration.
                    RoleDto::Teacher => ProfileDetails::Teacher {
                        subjects: subjects.unwrap_or_default(),
                        experience: experience.unwrap_or_default(),
                    },
                };
                Event::RegisterRequested(Registration {
                    name,
                    email,
                    password,
                    school: school.filter(|s| !s.trim().is_empty()),
                    details,
                })
            }
            ClientMessage::QuizComplete {
                score,
                total_points,
                coins_earned,
                badge,
            } => Event::QuizCompleted {
                score,
                total_points: total_points.unwrap_or(default_total_points),
                coins_earned,
                badge,
            },
        };
        Ok(event)
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProfileDto {
    pub id: Uuid,
    pub role: RoleDto,
    pub name: String,
    pub email: String,
    pub coins: i64,
    pub badges: i64,
    pub class_level: Option<String>,
    pub school: Option<String>,
    pub unique_id: Option<String>,
}

impl From<Profile> for ProfileDto {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            role: profile.role.into(),
            name: profile.name,
            email: profile.email,
            coins: profile.coins,
            badges: profile.badges,
            class_level: profile.class_level,
            school: profile.school,
            unique_id: profile.unique_id,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The screen to render, with the profile mirror it should show.
    View {
        view: &'static str,
        profile: Option<ProfileDto>,
        subject: Option<String>,
    },

    /// A transient message for the user.
    Notification {
        level: NotificationLevel,
        message: String,
    },

    /// The bearer token for REST calls, or nulls once the client is signed out.
    Session {
        access_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },

    /// Reports a protocol error to the client. The connection stays open.
    Error { message: String },
}

impl From<ViewSnapshot> for ServerMessage {
    fn from(snapshot: ViewSnapshot) -> Self {
        ServerMessage::View {
            view: snapshot.view.as_str(),
            profile: snapshot.profile.map(ProfileDto::from),
            subject: snapshot.selected_subject,
        }
    }
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        let (level, message) = match notification {
            Notification::Success(m) => (NotificationLevel::Success, m),
            Notification::Warning(m) => (NotificationLevel::Warning, m),
            Notification::Error(m) => (NotificationLevel::Error, m),
        };
        ServerMessage::Notification { level, message }
    }
}

impl From<Update> for ServerMessage {
    fn from(update: Update) -> Self {
        match update {
            Update::Session(session) => ServerMessage::Session {
                expires_at: session.as_ref().map(|s| s.expires_at),
                access_token: session.map(|s| s.access_token),
            },
            Update::View(snapshot) => snapshot.into(),
            Update::Notify(notification) => notification.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduquest_core::view::ViewState;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> ClientMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn init_carries_the_client_id() {
        let id = Uuid::new_v4();
        match decode(json!({ "type": "init", "client_id": id })) {
            ClientMessage::Init { client_id } => assert_eq!(client_id, id),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn quiz_completion_defaults_its_total() {
        let event = decode(json!({ "type": "quiz_complete", "score": 70, "coins_earned": 10, "badge": "silver" }))
            .into_event(100)
            .unwrap();
        match event {
            Event::QuizCompleted {
                score,
                total_points,
                coins_earned,
                badge,
            } => {
                assert_eq!((score, total_points, coins_earned), (70, 100, 10));
                assert_eq!(badge, "silver");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn negative_coins_are_rejected_at_decode() {
        let result = serde_json::from_value::<ClientMessage>(
            json!({ "type": "quiz_complete", "score": 70, "coins_earned": -5 }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn student_registration_needs_class_and_birth_date() {
        let message = decode(json!({
            "type": "register",
            "name": "Asha Rao",
            "email": "asha@example.com",
            "password": "secret1",
            "role": "student",
            "class_level": "6"
        }));
        assert_eq!(
            message.into_event(100).unwrap_err(),
            ProtocolError::MissingField("date_of_birth")
        );
    }

    #[test]
    fn teacher_registration_maps_to_teacher_details() {
        let event = decode(json!({
            "type": "register",
            "name": "Mr Iyer",
            "email": "iyer@example.com",
            "password": "secret1",
            "school": "  ",
            "role": "teacher",
            "subjects": "Maths"
        }))
        .into_event(100)
        .unwrap();
        match event {
            Event::RegisterRequested(registration) => {
                assert_eq!(registration.school, None);
                assert_eq!(
                    registration.details,
                    ProfileDetails::Teacher {
                        subjects: "Maths".to_string(),
                        experience: String::new(),
                    }
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn init_after_init_is_an_error() {
        let message = decode(json!({ "type": "init", "client_id": Uuid::new_v4() }));
        assert_eq!(message.into_event(100).unwrap_err(), ProtocolError::AlreadyInitialized);
    }

    #[test]
    fn view_updates_serialize_with_their_tag() {
        let message = ServerMessage::from(Update::View(ViewSnapshot {
            view: ViewState::Quiz,
            profile: None,
            selected_subject: Some("math-6".to_string()),
        }));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "view");
        assert_eq!(value["view"], ViewState::Quiz.as_str());
        assert_eq!(value["subject"], "math-6");
        assert!(value["profile"].is_null());
    }

    #[test]
    fn session_updates_carry_the_bearer_token() {
        let now = Utc::now();
        let session = eduquest_core::domain::Session {
            access_token: "token-1".to_string(),
            user_id: Uuid::new_v4(),
            client_id: eduquest_core::domain::ClientId::new(),
            issued_at: now,
            expires_at: now + chrono::Duration::hours(1),
        };
        let value = serde_json::to_value(ServerMessage::from(Update::Session(Some(session)))).unwrap();
        assert_eq!(value["type"], "session");
        assert_eq!(value["access_token"], "token-1");

        let value = serde_json::to_value(ServerMessage::from(Update::Session(None))).unwrap();
        assert!(value["access_token"].is_null());
        assert!(value["expires_at"].is_null());
    }

    #[test]
    fn warnings_keep_their_level() {
        let message = ServerMessage::from(Notification::Warning("saved".to_string()));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({ "type": "notification", "level": "warning", "message": "saved" }));
    }
}
