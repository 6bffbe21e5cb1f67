//! Signed unsubscribe links.
//!
//! A token has the shape `<user_id>.<scope>.<signature>` where `scope` is a
//! subject id or `all`, and `signature` is the hex SHA-256 of
//! `secret:user_id:scope`. Tokens never expire.

use sha2::{Digest, Sha256};

use crate::domain::{SubjectId, Subscriber, UserId};
use crate::errors::Error;

/// What an unsubscribe token deactivates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeScope {
    Subject(SubjectId),
    All,
}

impl UnsubscribeScope {
    fn encode(self) -> String {
        match self {
            UnsubscribeScope::Subject(id) => id.to_string(),
            UnsubscribeScope::All => "all".to_owned(),
        }
    }

    fn decode(raw: &str) -> Option<Self> {
        if raw == "all" {
            return Some(UnsubscribeScope::All);
        }
        raw.parse::<i32>()
            .ok()
            .map(|id| UnsubscribeScope::Subject(SubjectId::new(id)))
    }

    pub fn subject_id(self) -> Option<SubjectId> {
        match self {
            UnsubscribeScope::Subject(id) => Some(id),
            UnsubscribeScope::All => None,
        }
    }
}

#[derive(Clone)]
pub struct UnsubscribeLinks {
    base_url: String,
    secret: String,
}

impl UnsubscribeLinks {
    pub fn new(base_url: &str, secret: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            secret: secret.to_owned(),
        }
    }

    fn sign(&self, user_id: UserId, scope: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(user_id.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(scope.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }

    pub fn token(&self, user_id: UserId, scope: UnsubscribeScope) -> String {
        let scope = scope.encode();
        let signature = self.sign(user_id, &scope);
        format!("{user_id}.{scope}.{signature}")
    }

    /// One-click unsubscribe URL for a subscriber. Subscribers paged without
    /// a subject (campaign audiences) get an `all` scope.
    pub fn url_for(&self, subscriber: &Subscriber) -> String {
        let scope = subscriber
            .subject_id
            .map(UnsubscribeScope::Subject)
            .unwrap_or(UnsubscribeScope::All);
        format!(
            "{}/api/unsubscribe?token={}",
            self.base_url,
            self.token(subscriber.user_id, scope)
        )
    }

    pub fn verify(&self, token: &str) -> Result<(UserId, UnsubscribeScope), Error> {
        let invalid = || Error::BadRequest("invalid unsubscribe token".to_owned());

        let mut parts = token.splitn(3, '.');
        let (Some(user), Some(scope), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let user_id = user.parse::<i32>().map(UserId::new).map_err(|_| invalid())?;
        let decoded_scope = UnsubscribeScope::decode(scope).ok_or_else(invalid)?;

        let expected = self.sign(user_id, scope);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(invalid());
        }

        Ok((user_id, decoded_scope))
    }
}

/// Compares all bytes regardless of where the first mismatch occurs.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> UnsubscribeLinks {
        UnsubscribeLinks::new("https://news.example.com/", "secret")
    }

    #[test]
    fn token_round_trips_through_verify() {
        let links = links();
        let token = links.token(UserId::new(42), UnsubscribeScope::Subject(SubjectId::new(3)));
        assert_eq!(
            links.verify(&token).unwrap(),
            (UserId::new(42), UnsubscribeScope::Subject(SubjectId::new(3)))
        );
    }

    #[test]
    fn tampered_token_is_rejected() {
        let links = links();
        let token = links.token(UserId::new(42), UnsubscribeScope::All);
        let forged = token.replacen("42", "43", 1);
        assert!(matches!(links.verify(&forged), Err(Error::BadRequest(_))));
        assert!(links.verify("garbage").is_err());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = UnsubscribeLinks::new("https://news.example.com", "other");
        let token = other.token(UserId::new(1), UnsubscribeScope::All);
        assert!(links().verify(&token).is_err());
    }

    #[test]
    fn url_uses_subject_scope_when_known() {
        let subscriber = Subscriber {
            user_id: UserId::new(7),
            subject_id: Some(SubjectId::new(2)),
            email: "a@example.com".into(),
            name: None,
        };
        let url = links().url_for(&subscriber);
        assert!(url.starts_with("https://news.example.com/api/unsubscribe?token=7.2."));

        let campaign_subscriber = Subscriber {
            subject_id: None,
            ..subscriber
        };
        assert!(links().url_for(&campaign_subscriber).contains("token=7.all."));
    }
}
