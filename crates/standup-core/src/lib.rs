pub mod archive;
pub mod config;
pub mod error;
pub mod io;
pub mod membership;
pub mod paths;
pub mod report;
pub mod timers;
pub mod types;

pub use error::{Result, StandupError};
