//! Common utilities shared by suite resolution and session state

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
