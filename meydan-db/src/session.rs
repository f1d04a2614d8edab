use meydan_common::{
    model::{
        Id,
        auth::{AuthToken, AuthTokenHash, AuthTokenHashError},
        user::{User, UserMarker},
    },
    policy::Principal,
    util::PositiveDuration,
};
use std::collections::HashMap;
use time::UtcDateTime;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub user_id: Id<UserMarker>,
    /// Who the token speaks for, fixed at login.
    pub principal: Principal,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Session {
    /// A lifetime too long to represent never runs out.
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after
            .and_then(|expires_after| self.created_at.checked_add(expires_after.get()))
            .is_some_and(|deadline| deadline <= now)
    }
}

/// Live bearer tokens, keyed by the hash of the token.
///
/// Sessions are kept in memory only and do not survive a restart.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<AuthTokenHash, Session>>,
    ttl: Option<PositiveDuration>,
}

impl SessionStore {
    /// `ttl` of `None` issues tokens that never expire.
    #[must_use]
    pub fn new(ttl: Option<PositiveDuration>) -> Self {
        Self {
            sessions: Mutex::default(),
            ttl,
        }
    }

    /// Starts a session for `user` and returns the token to hand out.
    /// Sessions that have run out are swept at the same time.
    pub async fn issue(&self, user: &User) -> Result<AuthToken, AuthTokenHashError> {
        self.issue_at(user, UtcDateTime::now()).await
    }

    async fn issue_at(
        &self,
        user: &User,
        now: UtcDateTime,
    ) -> Result<AuthToken, AuthTokenHashError> {
        let token = AuthToken::generate_random(user.id);
        let session = Session {
            user_id: user.id,
            principal: Principal::from_role(user.contact.clone(), user.role),
            created_at: now,
            expires_after: self.ttl,
        };

        let hash = token.hash()?;
        let mut sessions = self.sessions.lock().await;

        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        let swept = before - sessions.len();
        if swept > 0 {
            debug!(swept, "Dropped expired sessions");
        }

        sessions.insert(hash, session);
        debug!(user_id = %user.id, "Issued session");

        Ok(token)
    }

    /// The live session for `token`, if any. Expired sessions are dropped.
    pub async fn verify(&self, token: &AuthToken) -> Result<Option<Session>, AuthTokenHashError> {
        self.verify_at(token, UtcDateTime::now()).await
    }

    async fn verify_at(
        &self,
        token: &AuthToken,
        now: UtcDateTime,
    ) -> Result<Option<Session>, AuthTokenHashError> {
        let hash = token.hash()?;
        let mut sessions = self.sessions.lock().await;

        let Some(session) = sessions.get(&hash) else {
            return Ok(None);
        };
        if session.user_id != token.user_id {
            return Ok(None);
        }
        if session.is_expired_at(now) {
            debug!(user_id = %session.user_id, "Dropping expired session");
            sessions.remove(&hash);
            return Ok(None);
        }

        Ok(Some(session.clone()))
    }

    /// Ends the session for `token`. Returns whether there was one.
    pub async fn revoke(&self, token: &AuthToken) -> Result<bool, AuthTokenHashError> {
        let hash = token.hash()?;
        Ok(self.sessions.lock().await.remove(&hash).is_some())
    }
}
