pub mod config;
pub mod error;
pub mod instance;
pub mod orchestrator;
pub mod service;
pub mod tasks;
pub mod types;

pub(crate) mod shell;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{HeimdallError, Result};
