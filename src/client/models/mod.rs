pub mod app_state;
pub mod messages;
pub mod thread_store;

pub use app_state::*;
pub use messages::*;
pub use thread_store::*;
