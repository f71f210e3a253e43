pub mod config;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::attempt_controller::{AttemptController, AttemptOutcome, UserCommand};
pub use services::AppState;
