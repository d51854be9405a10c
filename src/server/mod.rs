pub mod auth;
pub mod backend;
pub mod config;
pub mod database;
pub mod messages;
pub mod threads;
pub mod users;

pub use backend::*;
pub use config::*;
pub use database::*;
