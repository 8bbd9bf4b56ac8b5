pub mod account;
pub mod coordinator;
pub mod credentials;
pub mod domain;
pub mod hub;
pub mod ledger;
pub mod memory;
pub mod ports;
pub mod resolver;
pub mod view;
pub mod watcher;

pub use coordinator::{Coordinator, CoordinatorHandle, Services, Update, ViewSnapshot};
pub use domain::{
    ClientId, NewProfile, NewQuizResult, Profile, ProfileDetails, QuizResult, Role, Session,
};
pub use ports::{AuthService, PortError, PortResult, ProfileStore, SessionSubscription};
pub use view::{AppState, Event, Notification, ViewState};
