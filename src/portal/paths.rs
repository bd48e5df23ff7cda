//! Portal object paths
//!
//! Request and session objects live under fixed prefixes, followed by the
//! caller's sender token and a handle token:
//!
//! ```text
//! /org/freedesktop/portal/desktop/request/SENDER/TOKEN
//! /org/freedesktop/portal/desktop/session/SENDER/TOKEN
//! ```
//!
//! SENDER is the caller's unique bus name without the leading ':' and with
//! '.' replaced by '_'. Both components are parsed and validated instead of
//! sliced at fixed offsets, so any sender length works.

use super::error::PortalError;
use std::fmt;

pub const REQUEST_PATH_PREFIX: &str = "/org/freedesktop/portal/desktop/request/";
pub const SESSION_PATH_PREFIX: &str = "/org/freedesktop/portal/desktop/session/";

/// Sender token for a unique bus name, e.g. `:1.42` -> `1_42`
pub fn sender_token(unique_name: &str) -> String {
    unique_name.trim_start_matches(':').replace('.', "_")
}

fn is_valid_element(element: &str) -> bool {
    !element.is_empty() && element.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_path<'a>(path: &'a str, prefix: &str) -> Result<(&'a str, &'a str), PortalError> {
    let malformed = |reason| PortalError::MalformedPath {
        path: path.to_string(),
        reason,
    };

    let suffix = path
        .strip_prefix(prefix)
        .ok_or_else(|| malformed("unexpected prefix"))?;
    let (sender, token) = suffix
        .split_once('/')
        .ok_or_else(|| malformed("missing token separator"))?;

    if !is_valid_element(sender) {
        return Err(malformed("invalid sender token"));
    }
    if !is_valid_element(token) {
        return Err(malformed("invalid handle token"));
    }
    Ok((sender, token))
}

fn check_elements(sender: &str, token: &str, prefix: &str) -> Result<(), PortalError> {
    if is_valid_element(sender) && is_valid_element(token) {
        Ok(())
    } else {
        Err(PortalError::MalformedPath {
            path: format!("{}{}/{}", prefix, sender, token),
            reason: "invalid path element",
        })
    }
}

/// Object path of a pending portal request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestPath {
    sender: String,
    token: String,
}

impl RequestPath {
    pub fn new(sender: &str, token: &str) -> Result<Self, PortalError> {
        check_elements(sender, token, REQUEST_PATH_PREFIX)?;
        Ok(Self {
            sender: sender.to_string(),
            token: token.to_string(),
        })
    }

    pub fn parse(path: &str) -> Result<Self, PortalError> {
        let (sender, token) = split_path(path, REQUEST_PATH_PREFIX)?;
        Self::new(sender, token)
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The session object created alongside this request
    pub fn session_path(&self, session_token: &str) -> Result<SessionPath, PortalError> {
        SessionPath::new(&self.sender, session_token)
    }
}

impl fmt::Display for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", REQUEST_PATH_PREFIX, self.sender, self.token)
    }
}

/// Object path of a screen-cast session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionPath {
    sender: String,
    token: String,
}

impl SessionPath {
    pub fn new(sender: &str, token: &str) -> Result<Self, PortalError> {
        check_elements(sender, token, SESSION_PATH_PREFIX)?;
        Ok(Self {
            sender: sender.to_string(),
            token: token.to_string(),
        })
    }

    pub fn parse(path: &str) -> Result<Self, PortalError> {
        let (sender, token) = split_path(path, SESSION_PATH_PREFIX)?;
        Self::new(sender, token)
    }
}

impl fmt::Display for SessionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SESSION_PATH_PREFIX, self.sender, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_tokens() {
        assert_eq!(sender_token(":1.42"), "1_42");
        assert_eq!(sender_token(":1.1234567"), "1_1234567");
    }

    #[test]
    fn session_path_reuses_the_sender() {
        let request =
            RequestPath::parse("/org/freedesktop/portal/desktop/request/1_42/bridge_create").unwrap();
        assert_eq!(request.sender(), "1_42");
        assert_eq!(request.token(), "bridge_create");

        let session = request.session_path("bridge_session").unwrap();
        assert_eq!(
            session.to_string(),
            "/org/freedesktop/portal/desktop/session/1_42/bridge_session"
        );
    }

    #[test]
    fn sender_length_is_not_assumed() {
        let long = "/org/freedesktop/portal/desktop/request/1_987654321/t";
        let request = RequestPath::parse(long).unwrap();
        assert_eq!(request.sender(), "1_987654321");
        assert_eq!(request.to_string(), long);
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for path in [
            "/org/freedesktop/portal/desktop/session/1_42/token",
            "/org/freedesktop/portal/desktop/request/1_42",
            "/org/freedesktop/portal/desktop/request//token",
            "/org/freedesktop/portal/desktop/request/1_42/",
            "/org/freedesktop/portal/desktop/request/1_42/a/b",
            "/org/freedesktop/portal/desktop/request/1.42/token",
        ] {
            assert!(
                matches!(RequestPath::parse(path), Err(PortalError::MalformedPath { .. })),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn session_paths_parse() {
        let path = "/org/freedesktop/portal/desktop/session/1_7/abc";
        assert_eq!(SessionPath::parse(path).unwrap().to_string(), path);
        assert!(SessionPath::new("1_7", "bad-token").is_err());
    }
}
