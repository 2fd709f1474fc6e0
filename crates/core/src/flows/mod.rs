pub mod engine;
pub mod menu;
pub mod ports;
pub mod reply;
pub mod session;

pub use engine::{FlowEngine, FlowLimits};
pub use session::StateManager;
