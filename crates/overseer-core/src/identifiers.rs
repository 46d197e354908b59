//! Identifier types used throughout the Overseer crates.
//!
//! Two families live here:
//!
//! - **Generated identifiers** ([`RegistrationId`], [`RunId`], [`DecisionId`])
//!   are minted by the runtime from a random UUID v4 and carry a short prefix
//!   so they are recognisable in logs (`reg_…`, `run_…`, `dec_…`).
//! - **Caller-supplied identifiers** ([`OwnerId`], [`AgentType`]) are validated
//!   when parsed.
//!
//! Every identifier serializes as a plain string and re-validates on
//! deserialization.
//!
//! # Examples
//!
//! ```rust
//! use overseer_core::identifiers::{AgentType, OwnerId, RegistrationId};
//!
//! let owner = OwnerId::parse("user-42").unwrap();
//! let agent_type = AgentType::parse("news.scout").unwrap();
//! let id = RegistrationId::generate();
//! assert!(id.as_str().starts_with("reg_"));
//!
//! assert!(AgentType::parse("bad type").is_err());
//! assert!(OwnerId::parse("").is_err());
//! # let _ = (owner, agent_type);
//! ```

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of any identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

fn invalid(kind: &'static str, value: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidIdentifier {
        kind,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn check_common(kind: &'static str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(invalid(kind, value, "must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(invalid(
            kind,
            value,
            format!("must be at most {MAX_IDENTIFIER_LENGTH} characters"),
        ));
    }
    if value.trim() != value {
        return Err(invalid(kind, value, "must not have surrounding whitespace"));
    }
    Ok(())
}

/// Strict validation: ASCII alphanumerics plus `-`, `_` and `.`, no `..`.
fn validate_strict(kind: &'static str, value: &str) -> Result<(), CoreError> {
    check_common(kind, value)?;
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(kind, value, format!("contains invalid character '{c}'")));
    }
    if value.contains("..") {
        return Err(invalid(kind, value, "must not contain '..'"));
    }
    Ok(())
}

/// Owner validation: any printable text without control characters.
fn validate_owner(value: &str) -> Result<(), CoreError> {
    check_common("owner id", value)?;
    if value.chars().any(char::is_control) {
        return Err(invalid("owner id", value, "must not contain control characters"));
    }
    Ok(())
}

macro_rules! string_id_impls {
    ($name:ident) => {
        impl $name {
            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

macro_rules! generated_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random identifier.
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "{}"), Uuid::new_v4().simple()))
            }

            /// Parse an identifier previously produced by [`Self::generate`]
            /// (or any value passing the strict identifier rules).
            pub fn parse(id: impl AsRef<str>) -> Result<Self, CoreError> {
                let id = id.as_ref();
                validate_strict($kind, id)?;
                Ok(Self(id.to_string()))
            }
        }

        string_id_impls!($name);
    };
}

generated_id!(
    /// Identifier of an [`AgentRegistration`](crate::registration::AgentRegistration).
    RegistrationId,
    "registration id",
    "reg_"
);

generated_id!(
    /// Identifier of a single invocation.
    RunId,
    "run id",
    "run_"
);

generated_id!(
    /// Identifier handed to the agent for correlating the decisions it makes
    /// during one invocation.
    DecisionId,
    "decision id",
    "dec_"
);

/// The user (or tenant) that owns a registration and is charged against the
/// per-owner quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Parse an owner identifier. Emails and other free-form handles are
    /// accepted as long as they carry no control characters.
    pub fn parse(id: impl AsRef<str>) -> Result<Self, CoreError> {
        let id = id.as_ref();
        validate_owner(id)?;
        Ok(Self(id.to_string()))
    }
}

string_id_impls!(OwnerId);

/// Key selecting an agent implementation from the catalog, e.g. `news.scout`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentType(String);

impl AgentType {
    /// Parse and validate an agent type key.
    pub fn parse(id: impl AsRef<str>) -> Result<Self, CoreError> {
        let id = id.as_ref();
        validate_strict("agent type", id)?;
        Ok(Self(id.to_string()))
    }
}

string_id_impls!(AgentType);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = RegistrationId::generate();
        let b = RegistrationId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("reg_"));
        assert!(RunId::generate().as_str().starts_with("run_"));
        assert!(DecisionId::generate().as_str().starts_with("dec_"));
    }

    #[test]
    fn generated_ids_parse_back() {
        let id = RunId::generate();
        let parsed = RunId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn agent_type_rejects_bad_input() {
        assert!(AgentType::parse("").is_err());
        assert!(AgentType::parse(" scout").is_err());
        assert!(AgentType::parse("scout/../x").is_err());
        assert!(AgentType::parse("a..b").is_err());
        assert!(AgentType::parse("x".repeat(129)).is_err());
        assert!(AgentType::parse("news.scout-v2_beta").is_ok());
    }

    #[test]
    fn owner_accepts_emails_but_not_control_chars() {
        assert!(OwnerId::parse("someone@example.com").is_ok());
        assert!(OwnerId::parse("team alpha").is_ok());
        assert!(OwnerId::parse("bad\nowner").is_err());
        assert!(OwnerId::parse("   ").is_err());
    }

    #[test]
    fn serde_revalidates() {
        let ok: AgentType = serde_json::from_str("\"scout\"").unwrap();
        assert_eq!(ok.as_str(), "scout");
        assert!(serde_json::from_str::<AgentType>("\"no spaces\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"scout\"");
    }

    #[test]
    fn error_names_the_kind() {
        let err = AgentType::parse("").unwrap_err();
        assert!(err.to_string().contains("agent type"));
    }
}
