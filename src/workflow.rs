//! Submission and review operations, independent of HTTP.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::{
    config::SubmissionPolicy,
    credentials::CredentialProvider,
    domain::{ApplicationForm, ApplicationRecord, SessionPrincipal},
    id::new_application_id,
    state::{RecordStore, StoreError},
};

#[derive(Debug)]
pub enum WorkflowError {
    MissingFields(Vec<&'static str>),
    Store(StoreError),
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFields(fields) => write!(f, "missing fields: {}", fields.join(", ")),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for WorkflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingFields(_) => None,
            Self::Store(e) => Some(e),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Login did not match any account. Deliberately carries no detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthFailure;

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid credentials")
    }
}

impl std::error::Error for AuthFailure {}

pub fn check_policy(
    form: &ApplicationForm,
    policy: SubmissionPolicy,
) -> Result<(), WorkflowError> {
    match policy {
        SubmissionPolicy::Lenient => Ok(()),
        SubmissionPolicy::Strict => {
            let missing: Vec<&'static str> = [("name", &form.name), ("discord", &form.discord)]
                .into_iter()
                .filter(|(_, value)| value.trim().is_empty())
                .map(|(field, _)| field)
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(WorkflowError::MissingFields(missing))
            }
        }
    }
}

pub fn submit(
    store: &mut dyn RecordStore,
    form: ApplicationForm,
    policy: SubmissionPolicy,
    now: DateTime<Utc>,
) -> Result<ApplicationRecord, WorkflowError> {
    check_policy(&form, policy)?;

    let record = form.into_record(
        new_application_id(),
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    store.append(record.clone())?;
    info!(application_id = %record.id, "application stored");
    Ok(record)
}

pub fn login(
    credentials: &dyn CredentialProvider,
    username: &str,
    password: &str,
) -> Result<SessionPrincipal, AuthFailure> {
    credentials
        .authenticate(username, password)
        .ok_or(AuthFailure)
}

/// Stored records, most recent submission first.
pub fn dashboard(store: &dyn RecordStore) -> Vec<ApplicationRecord> {
    let mut records = store.load_all();
    records.reverse();
    records
}

pub fn export(store: &dyn RecordStore) -> Result<Vec<u8>, StoreError> {
    store.export_document()
}
