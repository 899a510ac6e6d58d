//! Who is printing, from where
//!
//! Every job carries the originating host (`H`) and user (`P`). Both come
//! from an [`Identity`] so callers and tests can substitute their own.

use nix::unistd::{User, geteuid};
use tracing::debug;

pub trait Identity {
    fn local_hostname(&self) -> String;
    fn effective_username(&self) -> String;
}

/// The identity of the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentity;

impl Identity for SystemIdentity {
    fn local_hostname(&self) -> String {
        gethostname::gethostname()
            .into_string()
            .unwrap_or_else(|_| "localhost".to_string())
    }

    fn effective_username(&self) -> String {
        match User::from_uid(geteuid()) {
            Ok(Some(user)) => user.name,
            other => {
                debug!(result = ?other.map(|_| ()), "No passwd entry for effective uid");
                std::env::var("USER").unwrap_or_else(|_| "nobody".to_string())
            }
        }
    }
}

/// A fixed host and user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedIdentity {
    pub hostname: String,
    pub username: String,
}

impl FixedIdentity {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
        }
    }
}

impl Identity for FixedIdentity {
    fn local_hostname(&self) -> String {
        self.hostname.clone()
    }

    fn effective_username(&self) -> String {
        self.username.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_identity_is_never_empty() {
        let id = SystemIdentity;
        assert!(!id.local_hostname().is_empty());
        assert!(!id.effective_username().is_empty());
    }

    #[test]
    fn fixed_identity_reports_what_it_was_given() {
        let id = FixedIdentity::new("printhost", "alice");
        assert_eq!(id.local_hostname(), "printhost");
        assert_eq!(id.effective_username(), "alice");
    }
}
