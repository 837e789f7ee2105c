//! Browser sessions for the admin area.
//!
//! Sessions live in a `tower-sessions` `MemoryStore`; the browser only holds
//! a signed session id. The authenticated [`SessionPrincipal`] is kept in the
//! session under [`PRINCIPAL_KEY`].

use sha2::{Digest, Sha512};
use time::Duration;
use tower_sessions::{Expiry, Session, cookie::Key, session};

use crate::domain::SessionPrincipal;

pub const SESSION_COOKIE_NAME: &str = "shadowmc.sid";
const PRINCIPAL_KEY: &str = "principal";

/// Cookie signing key.
///
/// A configured secret of any length is stretched to the 64 bytes the
/// cookie jar needs. An empty secret yields a random key, so cookies stop
/// verifying after a restart.
pub fn signing_key(secret: &str) -> Key {
    if secret.is_empty() {
        return Key::generate();
    }
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Sessions expire after `ttl_secs` without activity.
pub fn expiry(ttl_secs: u64) -> Expiry {
    Expiry::OnInactivity(Duration::seconds(
        i64::try_from(ttl_secs).unwrap_or(i64::MAX),
    ))
}

pub async fn current_principal(
    session: &Session,
) -> Result<Option<SessionPrincipal>, session::Error> {
    session.get(PRINCIPAL_KEY).await
}

/// Marks the session as authenticated. The id is rotated first so an id
/// handed out before login is never promoted.
pub async fn sign_in(
    session: &Session,
    principal: &SessionPrincipal,
) -> Result<(), session::Error> {
    session.cycle_id().await?;
    session.insert(PRINCIPAL_KEY, principal).await
}

/// Drops the session and its data. Returns who was signed in, if anyone.
pub async fn sign_out(session: &Session) -> Result<Option<SessionPrincipal>, session::Error> {
    let principal = current_principal(session).await?;
    session.flush().await?;
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_secret_gives_stable_key() {
        let a = signing_key("correct horse");
        let b = signing_key("correct horse");
        let c = signing_key("battery staple");
        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
        assert_eq!(a.master().len(), 64);
    }

    #[test]
    fn empty_secret_gives_random_key() {
        assert_ne!(signing_key("").master(), signing_key("").master());
    }

    #[test]
    fn expiry_tracks_inactivity() {
        assert!(matches!(
            expiry(90),
            Expiry::OnInactivity(d) if d == Duration::seconds(90)
        ));
    }
}
