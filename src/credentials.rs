use std::{fs, io, path::Path};

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::Deserialize;

use crate::domain::{Role, SessionPrincipal};

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_LANES: u32 = 1;

#[derive(Debug)]
pub enum HashError {
    EmptyPassword,
    NotArgon2id,
    Params(argon2::Error),
    Hash(argon2::password_hash::Error),
}

impl std::fmt::Display for HashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPassword => write!(f, "password is empty"),
            Self::NotArgon2id => write!(f, "not an argon2id PHC string"),
            Self::Params(e) => write!(f, "argon2 params: {e}"),
            Self::Hash(e) => write!(f, "argon2 hash: {e}"),
        }
    }
}

impl std::error::Error for HashError {}

/// Stored form of an account password: an argon2id PHC string that has
/// already been checked to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn parse(raw: &str) -> Result<Self, HashError> {
        let raw = raw.trim();
        let parsed = PasswordHash::new(raw).map_err(|_| HashError::NotArgon2id)?;
        if !is_argon2id(&parsed) {
            return Err(HashError::NotArgon2id);
        }
        Ok(Self(raw.to_string()))
    }

    /// Hashes `password` with a fresh salt (m=64 MiB, t=3, p=1).
    pub fn hash(password: &str) -> Result<Self, HashError> {
        if password.trim().is_empty() {
            return Err(HashError::EmptyPassword);
        }
        let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_LANES, None)
            .map_err(HashError::Params)?;
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(password.as_bytes(), &salt)
            .map_err(HashError::Hash)?;
        Ok(Self(phc.to_string()))
    }

    /// Cost parameters come from the PHC string, so digests made with other
    /// settings still verify.
    pub fn verify(&self, password: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        match PasswordHash::new(&self.0) {
            Ok(parsed) if is_argon2id(&parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_argon2id(parsed: &PasswordHash<'_>) -> bool {
    matches!(
        Algorithm::new(parsed.algorithm.as_str()),
        Ok(Algorithm::Argon2id)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSecret {
    Plaintext(String),
    Argon2id(PasswordDigest),
}

impl CredentialSecret {
    fn matches(&self, password: &str) -> bool {
        match self {
            Self::Plaintext(expected) => expected == password,
            Self::Argon2id(digest) => digest.verify(password),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub username: String,
    pub secret: CredentialSecret,
    pub role: Role,
}

/// Source of admin accounts consulted at login.
pub trait CredentialProvider: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> Option<SessionPrincipal>;
}

#[derive(Debug)]
pub enum CredentialError {
    Io(io::Error),
    SerdeJson(serde_json::Error),
    Empty,
    DuplicateUsername { username: String },
    InvalidEntry { username: String, reason: String },
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::SerdeJson(e) => write!(f, "json error: {e}"),
            Self::Empty => write!(f, "credentials file lists no accounts"),
            Self::DuplicateUsername { username } => {
                write!(f, "username listed more than once: {username}")
            }
            Self::InvalidEntry { username, reason } => {
                write!(f, "invalid credentials for {username}: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::SerdeJson(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CredentialError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(value: serde_json::Error) -> Self {
        Self::SerdeJson(value)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialFileEntry {
    username: String,
    role: Role,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    password_hash: Option<String>,
}

impl TryFrom<CredentialFileEntry> for CredentialEntry {
    type Error = CredentialError;

    fn try_from(value: CredentialFileEntry) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| CredentialError::InvalidEntry {
            username: value.username.clone(),
            reason: reason.to_string(),
        };
        if value.username.trim().is_empty() {
            return Err(invalid("username is empty"));
        }
        let secret = match (&value.password, &value.password_hash) {
            (Some(_), Some(_)) => return Err(invalid("set either password or password_hash")),
            (None, None) => return Err(invalid("missing password or password_hash")),
            (Some(p), None) if p.is_empty() => return Err(invalid("password is empty")),
            (Some(p), None) => CredentialSecret::Plaintext(p.clone()),
            (None, Some(h)) => CredentialSecret::Argon2id(
                PasswordDigest::parse(h).map_err(|_| invalid("password_hash is not argon2id"))?,
            ),
        };
        Ok(Self {
            username: value.username,
            secret,
            role: value.role,
        })
    }
}

/// Fixed list of accounts, replaced wholesale rather than edited.
#[derive(Debug, Clone)]
pub struct CredentialTable {
    entries: Vec<CredentialEntry>,
}

impl CredentialTable {
    pub fn new(entries: Vec<CredentialEntry>) -> Result<Self, CredentialError> {
        if entries.is_empty() {
            return Err(CredentialError::Empty);
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.username == entry.username) {
                return Err(CredentialError::DuplicateUsername {
                    username: entry.username.clone(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// The two built-in demo accounts.
    pub fn demo() -> Self {
        Self {
            entries: vec![
                CredentialEntry {
                    username: "owner".to_string(),
                    secret: CredentialSecret::Plaintext("owner123".to_string()),
                    role: Role::Owner,
                },
                CredentialEntry {
                    username: "staff".to_string(),
                    secret: CredentialSecret::Plaintext("staff123".to_string()),
                    role: Role::Staff,
                },
            ],
        }
    }

    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let bytes = fs::read(path)?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CredentialError> {
        let raw: Vec<CredentialFileEntry> = serde_json::from_slice(bytes)?;
        let entries = raw
            .into_iter()
            .map(CredentialEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[CredentialEntry] {
        &self.entries
    }

    pub fn has_plaintext_secrets(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.secret, CredentialSecret::Plaintext(_)))
    }
}

impl CredentialProvider for CredentialTable {
    fn authenticate(&self, username: &str, password: &str) -> Option<SessionPrincipal> {
        let entry = self.entries.iter().find(|e| e.username == username)?;
        if !entry.secret.matches(password) {
            return None;
        }
        Some(SessionPrincipal {
            username: entry.username.clone(),
            role: entry.role,
        })
    }
}
