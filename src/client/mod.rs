pub mod backend;
pub mod config;
pub mod models;
pub mod services;
pub mod session;
pub mod utils;

pub use backend::{AuthProvider, Backend};
pub use config::ClientConfig;
pub use services::{InboxService, UsersService};
pub use session::{Session, SessionManager};
