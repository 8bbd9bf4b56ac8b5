pub mod auth;
pub mod db;

pub use auth::DbAuthAdapter;
pub use db::DbAdapter;
