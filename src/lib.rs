//! behat-bridge - Behat suite resolution and cross-process test state
//!
//! Two pieces: [`suite`] decides which suite configuration gets registered
//! for a module or suite name, and [`session`] carries captured emails
//! between the application under test and the test runner through a
//! persisted session state blob.

pub mod cli;
pub mod commands;
pub mod common;
pub mod session;
pub mod suite;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use session::{EmailQuery, EmailRecord, TestMailer};
pub use suite::{SuiteConfiguration, SuiteLocator, SuiteRequest};
