//! Access levels and config-backed authentication
//!
//! Every request is resolved to a [`Principal`] before it reaches the
//! resolution engine. Requests without credentials become the anonymous
//! principal carrying the configured default access level; Basic credentials
//! are matched against the per-level user maps from configuration.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::config::schema::AuthConfig;
use crate::error::{DepotError, DepotResult};

/// Access level granted to a principal, ordered weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    None,
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::None => write!(f, "none"),
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone)]
pub struct Principal {
    pub name: String,
    pub access: Access,
}

impl Principal {
    pub fn new(name: impl Into<String>, access: Access) -> Self {
        Self {
            name: name.into(),
            access,
        }
    }

    /// The principal used for requests carrying no credentials
    pub fn anonymous(access: Access) -> Self {
        Self::new("anonymous", access)
    }
}

/// Resolves request credentials to a [`Principal`] using the configured users
#[derive(Debug, Clone)]
pub struct Authenticator {
    auth: AuthConfig,
}

impl Authenticator {
    pub fn new(auth: AuthConfig) -> Self {
        Self { auth }
    }

    /// Authenticate an optional `Authorization` header value.
    ///
    /// No header means the anonymous principal with the default access level.
    /// A Basic header must match a configured user; anything else is denied
    /// with the read level reported as the requirement.
    pub fn authenticate(&self, authorization: Option<&str>) -> DepotResult<Principal> {
        let Some(header) = authorization else {
            return Ok(Principal::anonymous(self.auth.default_access));
        };
        let (username, password) = decode_basic(header)
            .ok_or(DepotError::AccessDenied {
                required: Access::Read,
            })?;
        for (level, users) in &self.auth.users {
            if users.get(&username).is_some_and(|p| *p == password) {
                return Ok(Principal::new(username, *level));
            }
        }
        Err(DepotError::AccessDenied {
            required: Access::Read,
        })
    }

    /// Assert that the principal carries at least the required access level
    pub fn assert(principal: &Principal, required: Access) -> DepotResult<()> {
        if principal.access < required {
            return Err(DepotError::AccessDenied { required });
        }
        Ok(())
    }
}

/// Decode a `Basic <base64(user:pass)>` header value
fn decode_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ").or_else(|| header.strip_prefix("basic "))?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Encode credentials as a `Basic` header value, used for outbound mirrors
pub fn basic_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{}:{}", username, password))
    )
}
