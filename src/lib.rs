pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod providers;
pub mod session;
pub mod transcode;
pub mod transport;

pub use error::{Result, VoiceError};
