//! Submitter identities.
//!
//! Uploads arrive either from a logged-in account ([`Identity`]) or from an
//! anonymous visitor. The identity string doubles as a path suffix for junk
//! entries and disambiguated module names, so it must be a single path
//! component.

use std::fmt;
use thiserror::Error;

/// Error returned when an account name cannot be used as an identity.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid identity {value:?}: {reason}")]
pub struct IdentityError {
    value: String,
    reason: &'static str,
}

/// Name of an authenticated account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from an account name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the name is blank or contains path
    /// separators.
    ///
    /// # Examples
    ///
    /// ```
    /// use modarchive_common::Identity;
    ///
    /// let identity = Identity::new("rusty")?;
    /// assert_eq!(identity.as_str(), "rusty");
    /// assert!(Identity::new("../etc").is_err());
    /// # Ok::<(), modarchive_common::IdentityError>(())
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let value = name.into();
        if value.trim().is_empty() {
            return Err(IdentityError {
                value,
                reason: "identity is blank",
            });
        }
        if value.contains(['/', '\\']) || value == ".." || value == "." {
            return Err(IdentityError {
                value,
                reason: "identity contains path components",
            });
        }
        Ok(Self(value))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submitter {
    /// No session; the upload goes to pending review.
    Anonymous,
    /// A logged-in account.
    Authenticated(Identity),
}

impl Submitter {
    /// Returns the identity for authenticated submitters.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(identity) => Some(identity),
        }
    }
}

impl From<Option<Identity>> for Submitter {
    fn from(identity: Option<Identity>) -> Self {
        identity.map_or(Self::Anonymous, Self::Authenticated)
    }
}

impl fmt::Display for Submitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated(identity) => identity.fmt(f),
        }
    }
}
