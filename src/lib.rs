pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod nat;
pub mod peer;
pub mod signaling;
pub mod utils;

pub use error::{Error, Result};
