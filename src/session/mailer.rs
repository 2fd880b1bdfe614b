//! Email capture and query
//!
//! Every message the application sends is recorded into the session state,
//! so assertions running in the test-runner process can look for it.
//!
//! Query arguments are either exact values or, when they start with `/`,
//! delimited regular expressions such as `/^Welcome/i`.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

use super::store::{StateStore, TestSessionEnvironment};

/// A file attached to, or embedded in, an email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// An outgoing message as handed to the mailer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Email {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub from: Vec<String>,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
    pub inline_images: Vec<Attachment>,
    pub headers: BTreeMap<String, String>,
}

/// What gets stored for a sent email
///
/// Absent fields are omitted from the stored blob, never null-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmailRecord {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub email_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_files: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_images: Option<Vec<Attachment>>,
}

impl EmailRecord {
    /// Extract the record for a message, dropping empty values
    pub fn from_email(email: &Email) -> Self {
        let html = non_empty(email.html.as_deref());
        let text = non_empty(email.text.as_deref());
        let email_type = match (&html, &text) {
            (Some(_), _) => Some("html".to_string()),
            (None, Some(_)) => Some("plain".to_string()),
            (None, None) => None,
        };

        Self {
            email_type,
            to: join_addresses(&email.to),
            from: join_addresses(&email.from),
            subject: non_empty(email.subject.as_deref()),
            content: html.clone().or_else(|| text.clone()),
            plain_content: text,
            attached_files: non_empty_vec(&email.attachments),
            custom_headers: (!email.headers.is_empty()).then(|| email.headers.clone()),
            html_content: html,
            inline_images: non_empty_vec(&email.inline_images),
        }
    }

    /// The four queryable fields, in query argument order
    fn query_fields(&self) -> [Option<&str>; 4] {
        [
            self.to.as_deref(),
            self.from.as_deref(),
            self.subject.as_deref(),
            self.content.as_deref(),
        ]
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

fn non_empty_vec(items: &[Attachment]) -> Option<Vec<Attachment>> {
    (!items.is_empty()).then(|| items.to_vec())
}

fn join_addresses(addresses: &[String]) -> Option<String> {
    let joined = addresses
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

/// Filter arguments for `find_emails`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailQuery {
    pub to: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
}

impl EmailQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn compile(&self) -> Result<[Option<EmailPattern>; 4]> {
        Ok([
            EmailPattern::parse(self.to.as_deref())?,
            EmailPattern::parse(self.from.as_deref())?,
            EmailPattern::parse(self.subject.as_deref())?,
            EmailPattern::parse(self.content.as_deref())?,
        ])
    }
}

/// One compiled query argument
#[derive(Debug, Clone)]
pub enum EmailPattern {
    Exact(String),
    Regex(Regex),
}

impl EmailPattern {
    /// Compile an argument; empty or absent arguments filter nothing
    pub fn parse(arg: Option<&str>) -> Result<Option<Self>> {
        match arg {
            None | Some("") => Ok(None),
            Some(arg) if arg.starts_with('/') => parse_delimited(arg).map(Some),
            Some(arg) => Ok(Some(Self::Exact(arg.to_string()))),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Regex(re) => re.is_match(value),
        }
    }
}

/// Compile `/body/flags`
fn parse_delimited(arg: &str) -> Result<EmailPattern> {
    let rest = &arg[1..];
    let end = rest
        .rfind('/')
        .ok_or_else(|| Error::invalid_pattern(arg, "no ending delimiter '/' found"))?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);

    let anchored = flags.contains('A');
    let extended = flags.contains('x');
    let body = if anchored {
        // A trailing `#` comment under `x` would swallow the closing paren
        let sep = if extended { "\n" } else { "" };
        format!("\\A(?:{}{})", body, sep)
    } else {
        body.to_string()
    };

    let mut builder = RegexBuilder::new(&body);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'U' => builder.swap_greed(true),
            'u' => builder.unicode(true),
            // `$` already matches only at the very end of the text
            'A' | 'D' => &mut builder,
            other => {
                return Err(Error::invalid_pattern(
                    arg,
                    format!("unknown modifier '{}' (supported: i m s x U u A D)", other),
                ))
            }
        };
    }
    builder
        .build()
        .map(EmailPattern::Regex)
        .map_err(|e| Error::invalid_pattern(arg, e))
}

/// Records matching a query, in send order
///
/// A record lacking a field is never disqualified by that field's filter.
pub fn filter_emails(records: &[EmailRecord], query: &EmailQuery) -> Result<Vec<EmailRecord>> {
    let patterns = query.compile()?;
    Ok(records
        .iter()
        .filter(|record| {
            record
                .query_fields()
                .iter()
                .zip(patterns.iter())
                .all(|(field, pattern)| match (field, pattern) {
                    (Some(value), Some(pattern)) => pattern.matches(value),
                    _ => true,
                })
        })
        .cloned()
        .collect())
}

/// Delivery of outgoing messages
pub trait MailTransport {
    fn send(&self, email: &Email) -> Result<()>;
}

/// Transport that delivers nowhere
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl MailTransport for NullTransport {
    fn send(&self, _email: &Email) -> Result<()> {
        Ok(())
    }
}

/// Mailer that records every sent message into the session state
pub struct TestMailer<T, S> {
    transport: T,
    session: TestSessionEnvironment<S>,
}

impl<T: MailTransport, S: StateStore> TestMailer<T, S> {
    pub fn new(transport: T, session: TestSessionEnvironment<S>) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &TestSessionEnvironment<S> {
        &self.session
    }

    /// Deliver a message, then capture it
    ///
    /// Capture failures are logged and never fail or undo the delivery.
    pub fn send(&self, email: &Email) -> Result<()> {
        self.transport.send(email)?;
        if let Err(e) = self.record(email) {
            tracing::warn!(session = self.session.key(), error = %e, "Failed to capture sent email");
        }
        Ok(())
    }

    /// Append a message to the session's email log
    pub fn record(&self, email: &Email) -> Result<()> {
        self.record_entry(EmailRecord::from_email(email))
    }

    /// Append an already-extracted record
    pub fn record_entry(&self, record: EmailRecord) -> Result<()> {
        tracing::debug!(
            session = self.session.key(),
            to = record.to.as_deref().unwrap_or(""),
            subject = record.subject.as_deref().unwrap_or(""),
            "Captured email"
        );
        self.session
            .update(|state| state.emails.get_or_insert_with(Vec::new).push(record))
    }

    /// All captured emails matching a query, oldest first
    pub fn find_emails(&self, query: &EmailQuery) -> Result<Vec<EmailRecord>> {
        let state = self.session.get_state()?;
        filter_emails(state.emails.as_deref().unwrap_or_default(), query)
    }

    /// The most recently sent matching email
    pub fn find_email(&self, query: &EmailQuery) -> Result<Option<EmailRecord>> {
        Ok(self.find_emails(query)?.pop())
    }

    /// Forget every captured email
    pub fn clear_emails(&self) -> Result<()> {
        self.session.update(|state| state.emails = None)
    }
}
