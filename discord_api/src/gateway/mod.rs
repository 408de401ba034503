pub mod event_handler;
pub mod gateway;

pub use event_handler::*;
pub use gateway::{ConnectionState, GatewayIntents};
