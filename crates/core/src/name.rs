//! Strongly-typed names used across the subsystem.
//!
//! Users and applications are identified by human-chosen names rather than
//! surrogate ids: the username is the token subject and the application name
//! is the token audience.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Maximum accepted length for any name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Login name of a user (the `sub` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

/// Name of a client application sharing the user directory (the `aud` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationName(String);

fn validate(kind: &str, raw: &str) -> Result<(), DomainError> {
    if raw.trim().is_empty() {
        return Err(DomainError::invalid_name(format!("{kind} must not be empty")));
    }
    if raw.len() > MAX_NAME_LEN {
        return Err(DomainError::invalid_name(format!(
            "{kind} exceeds {MAX_NAME_LEN} bytes"
        )));
    }
    if raw.trim() != raw {
        return Err(DomainError::invalid_name(format!(
            "{kind} must not have surrounding whitespace"
        )));
    }
    if raw.chars().any(char::is_control) {
        return Err(DomainError::invalid_name(format!(
            "{kind} must not contain control characters"
        )));
    }
    Ok(())
}

macro_rules! impl_name_newtype {
    ($t:ident, $kind:literal) => {
        impl $t {
            /// Validate and wrap a name.
            pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                validate($kind, &raw)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_name_newtype!(Username, "username");
impl_name_newtype!(ApplicationName, "application name");
