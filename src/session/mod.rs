//! Cross-process test session state
//!
//! The test runner and the application under test share no memory; they
//! meet in a persisted state blob keyed by session. The mailer records
//! outgoing emails there and answers queries against them.

pub mod mailer;
pub mod store;

pub use mailer::{
    filter_emails, Attachment, Email, EmailPattern, EmailQuery, EmailRecord, MailTransport,
    NullTransport, TestMailer,
};
pub use store::{
    validate_session_key, FileStateStore, MemoryStateStore, StateStore, TestSessionEnvironment,
    TestSessionState,
};
