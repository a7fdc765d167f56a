pub mod affirmation;
pub mod backends;
pub mod clock;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod mood;
pub mod orchestrator;
pub mod playback;
pub mod retry;
pub mod speech;
pub mod usage_gate;

pub use error::{Error, Result, ServiceError};
