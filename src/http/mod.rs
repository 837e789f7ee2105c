use std::sync::Arc;

use axum::{
    Extension, Form, Router,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tower_sessions::{
    MemoryStore, Session, SessionManagerLayer,
    cookie::{Key, SameSite},
};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    credentials::CredentialProvider,
    domain::{ApplicationForm, SessionPrincipal, lenient_string},
    session::{self, SESSION_COOKIE_NAME},
    state::{SharedRecordStore, StoreError},
    workflow::{self, WorkflowError},
};

mod pages;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const EXPORT_DISPOSITION: &str = "attachment; filename=\"applications.json\"";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedRecordStore,
    pub credentials: Arc<dyn CredentialProvider>,
}

#[derive(Debug)]
pub struct PageError {
    status: StatusCode,
    title: &'static str,
    message: String,
}

impl PageError {
    fn new(status: StatusCode, title: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            title,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error", message)
    }
}

impl From<StoreError> for PageError {
    fn from(value: StoreError) -> Self {
        PageError::internal(value.to_string())
    }
}

impl From<tower_sessions::session::Error> for PageError {
    fn from(value: tower_sessions::session::Error) -> Self {
        PageError::internal(format!("session error: {value}"))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        (
            self.status,
            Html(pages::render_error(self.title, &self.message)),
        )
            .into_response()
    }
}

/// Body extractor for the HTML form posts, also accepting JSON.
///
/// Fields are decoded one at a time, so a repeated form key or an odd JSON
/// value never fails the whole body; the first occurrence of a key wins.
/// Any other content type reads as an empty form. Only a JSON body that does
/// not parse at all is rejected.
pub struct FormOrJson<T>(pub T);

enum BodyKind {
    Json,
    UrlEncoded,
    Other,
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if content_type.starts_with("application/json") {
        BodyKind::Json
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        BodyKind::UrlEncoded
    } else {
        BodyKind::Other
    }
}

#[axum::async_trait]
impl<S, T> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = PageError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let fields = match body_kind(req.headers()) {
            BodyKind::Json => {
                let bytes = Bytes::from_request(req, state)
                    .await
                    .map_err(|e| PageError::bad_request(e.body_text()))?;
                match serde_json::from_slice::<Value>(&bytes) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => Map::new(),
                    Err(e) => {
                        return Err(PageError::bad_request(format!("invalid JSON body: {e}")));
                    }
                }
            }
            BodyKind::UrlEncoded => {
                let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                    .await
                    .map_err(|e| PageError::bad_request(e.body_text()))?;
                let mut map = Map::new();
                for (key, value) in pairs {
                    map.entry(key).or_insert(Value::String(value));
                }
                map
            }
            BodyKind::Other => Map::new(),
        };

        let value = serde_json::from_value(Value::Object(fields)).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable form body; treating it as empty");
            T::default()
        });
        Ok(Self(value))
    }
}

#[derive(Default, Deserialize)]
struct LoginForm {
    #[serde(default, deserialize_with = "lenient_string")]
    username: String,
    #[serde(default, deserialize_with = "lenient_string")]
    password: String,
}

/// Builds the site. Sessions are held in memory and referenced by a cookie
/// signed with `session_key`.
pub fn build_router(
    config: Config,
    store: SharedRecordStore,
    credentials: Arc<dyn CredentialProvider>,
    session_key: Key,
) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(config.secure_cookies)
        .with_expiry(session::expiry(config.session_ttl_secs))
        .with_signed(session_key);

    let app_state = AppState {
        config: Arc::new(config),
        store,
        credentials,
    };

    let protected = Router::new()
        .route("/dashboard", get(dashboard))
        .route("/admin/download", get(admin_download))
        .route_layer(middleware::from_fn(require_session));

    Router::new()
        .route("/", get(index))
        .route("/apply", post(apply))
        .route("/applied", get(applied))
        .route("/admin", get(admin_page))
        .route("/admin/login", post(admin_login))
        .route("/admin/logout", post(admin_logout))
        .merge(protected)
        .fallback(fallback_not_found)
        .layer(Extension(app_state))
        .layer(session_layer)
}

/// Lets the request through only with a live session; everyone else is sent
/// to the login page.
async fn require_session(session: Session, mut req: Request, next: Next) -> Response {
    let principal = match session::current_principal(&session).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!(error = %e, "failed to read session");
            None
        }
    };
    let Some(principal) = principal else {
        return Redirect::to("/admin").into_response();
    };
    req.extensions_mut().insert(principal);
    next.run(req).await
}

async fn index() -> Html<String> {
    Html(pages::render_index())
}

async fn applied() -> Html<String> {
    Html(pages::render_applied())
}

async fn apply(
    Extension(state): Extension<AppState>,
    FormOrJson(form): FormOrJson<ApplicationForm>,
) -> Result<Response, PageError> {
    let policy = state.config.submission_policy;
    let result = {
        let mut store = state.store.lock().await;
        workflow::submit(&mut **store, form, policy, Utc::now())
    };

    match result {
        Ok(_) => {}
        Err(WorkflowError::MissingFields(fields)) => {
            return Err(PageError::bad_request(format!(
                "Please fill in: {}",
                fields.join(", ")
            )));
        }
        Err(WorkflowError::Store(e)) => {
            error!(error = %e, "failed to store application");
        }
    }
    Ok(Redirect::to("/applied").into_response())
}

async fn admin_page(session: Session) -> Result<Response, PageError> {
    if session::current_principal(&session).await?.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    Ok(Html(pages::render_login(None)).into_response())
}

async fn admin_login(
    Extension(state): Extension<AppState>,
    session: Session,
    FormOrJson(form): FormOrJson<LoginForm>,
) -> Result<Response, PageError> {
    let credentials = state.credentials.clone();
    let LoginForm { username, password } = form;
    // argon2 verification blocks for tens of milliseconds.
    let (username, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = workflow::login(credentials.as_ref(), &username, &password);
        (username, outcome)
    })
    .await
    .map_err(|e| PageError::internal(e.to_string()))?;

    let principal = match outcome {
        Ok(principal) => principal,
        Err(_) => {
            warn!(username = %username, "admin login failed");
            return Ok(Html(pages::render_login(Some(INVALID_CREDENTIALS))).into_response());
        }
    };

    session::sign_in(&session, &principal).await?;
    info!(username = %principal.username, role = %principal.role, "admin logged in");
    Ok(Redirect::to("/dashboard").into_response())
}

async fn admin_logout(session: Session) -> Result<Response, PageError> {
    if let Some(principal) = session::sign_out(&session).await? {
        info!(username = %principal.username, "admin logged out");
    }
    Ok(Redirect::to("/admin").into_response())
}

async fn dashboard(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<SessionPrincipal>,
) -> Html<String> {
    let records = {
        let store = state.store.lock().await;
        workflow::dashboard(&**store)
    };
    Html(pages::render_dashboard(&principal, &records))
}

async fn admin_download(Extension(state): Extension<AppState>) -> Result<Response, PageError> {
    let document = {
        let store = state.store.lock().await;
        workflow::export(&**store)?
    };
    Ok((
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
            (header::CONTENT_DISPOSITION, EXPORT_DISPOSITION),
        ],
        document,
    )
        .into_response())
}

async fn fallback_not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests;
