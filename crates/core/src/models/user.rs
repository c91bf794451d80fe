//! Directory-side and remote-side user records.

use serde::{Deserialize, Serialize};

/// One row of the users dataset. Immutable for the duration of a run;
/// `email` (trimmed, compared case-insensitively) is the join key against
/// remote identity records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub name: String,
    pub email: String,
    pub group: String,
}

impl DirectoryUser {
    /// Normalized email used for joins and duplicate detection.
    pub fn email_key(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

/// A role grant as the remote system holds it. The grant id is needed to
/// revoke it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGrant {
    pub id: i64,
    pub scope: String,
    pub role: String,
}

/// A user record observed from the remote identity service. Authoritative
/// for "current state"; never mutated by the diff computation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    pub id: i64,
    pub email: String,
    pub active: bool,
    pub grants: Vec<RemoteGrant>,
}

impl RemoteUser {
    pub fn email_key(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_key_normalizes_case_and_whitespace() {
        let user = DirectoryUser {
            name: "Jane Doe".to_string(),
            email: "  Jane.Doe@Example.COM ".to_string(),
            group: "engineering".to_string(),
        };
        assert_eq!(user.email_key(), "jane.doe@example.com");
    }

    #[test]
    fn remote_user_email_key() {
        let user = RemoteUser {
            id: 7,
            email: "Ops@Example.com".to_string(),
            active: true,
            grants: vec![],
        };
        assert_eq!(user.email_key(), "ops@example.com");
    }

    #[test]
    fn remote_grant_round_trip() {
        let grant = RemoteGrant {
            id: 42,
            scope: "organization=1850605908".to_string(),
            role: "developer".to_string(),
        };
        let json = serde_json::to_string(&grant).unwrap();
        let back: RemoteGrant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grant);
    }
}
