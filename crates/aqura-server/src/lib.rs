pub mod config;
pub mod observability;
pub mod pool;
pub mod server;
pub mod state;

pub use observability::init_tracing;
pub use server::{AquraServer, ServerBuilder};
pub use state::{AppState, ResponseCache};
