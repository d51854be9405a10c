pub mod chat_service;
pub mod users_service;

pub use chat_service::InboxService;
pub use users_service::UsersService;
