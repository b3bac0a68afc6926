//! Configuration for opening documents.

use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What to do when no password unlocks an encrypted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordPolicy {
    /// Opening fails with [`Error::InvalidPassword`] (or
    /// [`Error::PasswordRequired`] when nothing could be tried).
    #[default]
    Strict,
    /// Opening succeeds but the document stays locked: objects that carry
    /// encrypted strings or streams fail with [`Error::PasswordRequired`].
    Locked,
}

/// Cooperative cancellation for long operations.
///
/// Checked at object boundaries of the repair scan, the xref chain walk and
/// object stream expansion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an untripped flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(flag: Option<&CancelFlag>) -> Result<()> {
        match flag {
            Some(flag) if flag.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Options for [`Document::open`](crate::document::Document::open).
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Password to try (user or owner).
    pub password: Option<Vec<u8>>,

    /// Try the empty password when none is supplied.
    pub try_empty_password: bool,

    /// Behavior when no password validates.
    pub password_policy: PasswordPolicy,

    /// Parser limits and strictness.
    pub parser: ParserOptions,

    /// Cancellation flag for long operations.
    pub cancel: Option<CancelFlag>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self {
            password: None,
            try_empty_password: true,
            password_policy: PasswordPolicy::Strict,
            parser: ParserOptions::default(),
            cancel: None,
        }
    }

    /// Supply a password.
    pub fn with_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = Some(password.as_ref().to_vec());
        self
    }

    /// Enable or disable the implicit empty-password attempt.
    pub fn with_empty_password_attempt(mut self, enable: bool) -> Self {
        self.try_empty_password = enable;
        self
    }

    /// Set the password policy.
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    /// Set parser options.
    pub fn with_parser_options(mut self, parser: ParserOptions) -> Self {
        self.parser = parser;
        self
    }

    /// Attach a cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
