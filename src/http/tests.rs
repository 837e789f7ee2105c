use std::{net::IpAddr, path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::task::JoinSet;
use tower::util::ServiceExt;

use crate::{
    config::{Config, SubmissionPolicy},
    credentials::CredentialTable,
    domain::ApplicationRecord,
    http::build_router,
    id::is_application_id,
    session::{SESSION_COOKIE_NAME, signing_key},
    state::{self, JsonFileStore, MemoryRecordStore, RecordStore, SharedRecordStore},
};

fn test_config(data_dir: PathBuf, submission_policy: SubmissionPolicy) -> Config {
    Config {
        host: IpAddr::from([127, 0, 0, 1]),
        port: 0,
        data_dir,
        credentials_file: None,
        session_secret: "test-secret".to_string(),
        session_ttl_secs: 3600,
        secure_cookies: false,
        submission_policy,
    }
}

fn app_from(config: Config) -> (axum::Router, SharedRecordStore) {
    let mut file_store = JsonFileStore::new(config.applications_path());
    file_store.ensure_initialized().unwrap();
    let store = state::shared(file_store);
    let key = signing_key(&config.session_secret);
    let router = build_router(config, store.clone(), Arc::new(CredentialTable::demo()), key);
    (router, store)
}

fn app_with(tmp: &TempDir, policy: SubmissionPolicy) -> (axum::Router, SharedRecordStore) {
    app_from(test_config(tmp.path().to_path_buf(), policy))
}

fn app(tmp: &TempDir) -> axum::Router {
    app_with(tmp, SubmissionPolicy::Lenient).0
}

fn req(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn req_with_cookie(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn req_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn req_typed(uri: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn req_json(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&value).unwrap()))
        .unwrap()
}

async fn body_bytes(res: axum::response::Response) -> Bytes {
    res.into_body().collect().await.unwrap().to_bytes()
}

async fn body_text(res: axum::response::Response) -> String {
    let bytes = body_bytes(res).await;
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(res: &axum::response::Response) -> &str {
    res.headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

fn header_str<'a>(res: &'a axum::response::Response, name: header::HeaderName) -> &'a str {
    res.headers().get(name).unwrap().to_str().unwrap()
}

/// Logs in and returns the `Cookie` header value for the new session.
async fn login(app: &axum::Router, username: &str, password: &str) -> String {
    let res = app
        .clone()
        .oneshot(req_form(
            "/admin/login",
            &format!("username={username}&password={password}"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/dashboard");
    let set_cookie = header_str(&res, header::SET_COOKIE);
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

async fn apply(app: &axum::Router, body: &str) {
    let res = app.clone().oneshot(req_form("/apply", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/applied");
}

#[tokio::test]
async fn public_pages_render_html() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    for uri in ["/", "/applied", "/admin"] {
        let res = app.clone().oneshot(req("GET", uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{uri}");
        assert!(header_str(&res, header::CONTENT_TYPE).starts_with("text/html"));
    }

    let res = app.clone().oneshot(req("GET", "/")).await.unwrap();
    assert!(body_text(res).await.contains("action=\"/apply\""));

    let res = app.clone().oneshot(req("GET", "/nope")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn apply_persists_form_and_redirects() {
    let tmp = TempDir::new().unwrap();
    let (app, store) = app_with(&tmp, SubmissionPolicy::Lenient);

    apply(
        &app,
        "name=Sam&discord=sam%230001&age=19&country=NL&activity=daily\
         &experience=mod&servers=Hypixel&why=community",
    )
    .await;

    let records = store.lock().await.load_all();
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert!(is_application_id(&r.id));
    assert!(r.created_at.ends_with('Z'));
    assert_eq!(r.name, "Sam");
    assert_eq!(r.discord_handle, "sam#0001");
    assert_eq!(r.age, "19");
    assert_eq!(r.servers_worked_in, "Hypixel");
    assert_eq!(r.why_us, "community");

    let on_disk: Value =
        serde_json::from_slice(&std::fs::read(tmp.path().join("applications.json")).unwrap())
            .unwrap();
    assert_eq!(on_disk[0]["discordHandle"], "sam#0001");
}

#[tokio::test]
async fn apply_accepts_json_and_missing_fields() {
    let tmp = TempDir::new().unwrap();
    let (app, store) = app_with(&tmp, SubmissionPolicy::Lenient);

    let res = app
        .clone()
        .oneshot(req_json("/apply", json!({ "name": "Json", "age": 22 })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    apply(&app, "").await;

    let records = store.lock().await.load_all();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "Json");
    assert_eq!(records[0].age, "22");
    assert_eq!(records[0].country, "");
    assert_eq!(records[1].name, "");
}

#[tokio::test]
async fn apply_rejects_unparseable_json() {
    let tmp = TempDir::new().unwrap();
    let (app, store) = app_with(&tmp, SubmissionPolicy::Lenient);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/apply")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"name\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(store.lock().await.load_all().is_empty());
}

#[tokio::test]
async fn apply_stores_odd_bodies_instead_of_rejecting() {
    let tmp = TempDir::new().unwrap();
    let (app, store) = app_with(&tmp, SubmissionPolicy::Lenient);

    let requests = [
        req_json(
            "/apply",
            json!({ "name": "Arr", "age": [19], "country": { "code": "NL" } }),
        ),
        req_form("/apply", "name=Dup&name=Dup2&discord=x"),
        req_typed("/apply", None, "name=NoType"),
        req_typed("/apply", Some("text/plain"), "name=Plain"),
        req_json("/apply", json!(["not", "an", "object"])),
    ];
    for request in requests {
        let res = app.clone().oneshot(request).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/applied");
    }

    let records = store.lock().await.load_all();
    assert_eq!(records.len(), 5);
    assert_eq!(records[0].name, "Arr");
    assert_eq!(records[0].age, "");
    assert_eq!(records[0].country, "");
    assert_eq!(records[1].name, "Dup");
    assert_eq!(records[1].discord_handle, "x");
    for r in &records[2..] {
        assert_eq!(r.name, "");
        assert!(is_application_id(&r.id));
    }
}

#[tokio::test]
async fn strict_policy_rejects_blank_required_fields() {
    let tmp = TempDir::new().unwrap();
    let (app, store) = app_with(&tmp, SubmissionPolicy::Strict);

    let res = app
        .clone()
        .oneshot(req_form("/apply", "name=Sam&discord=+"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(res).await.contains("Please fill in: discord"));
    assert!(store.lock().await.load_all().is_empty());

    apply(&app, "name=Sam&discord=sam").await;
    assert_eq!(store.lock().await.load_all().len(), 1);
}

#[tokio::test]
async fn protected_routes_redirect_without_session() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    apply(&app, "name=Secret").await;

    for uri in ["/dashboard", "/admin/download"] {
        let res = app.clone().oneshot(req("GET", uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&res), "/admin");
        assert!(!body_text(res).await.contains("Secret"));

        let forged = format!("{SESSION_COOKIE_NAME}=abc.def");
        let res = app
            .clone()
            .oneshot(req_with_cookie("GET", uri, &forged))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&res), "/admin");
    }
}

#[tokio::test]
async fn failed_login_shows_generic_error() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    for body in [
        "username=owner&password=wrong",
        "username=ghost&password=owner123",
        "",
    ] {
        let res = app.clone().oneshot(req_form("/admin/login", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{body}");
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        let html = body_text(res).await;
        assert!(html.contains("Invalid credentials"));
    }
}

#[tokio::test]
async fn odd_login_bodies_fail_like_wrong_credentials() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    let requests = [
        req_json(
            "/admin/login",
            json!({ "username": 1, "password": ["owner123"] }),
        ),
        req_json("/admin/login", json!({ "username": { "name": "owner" } })),
        req_typed("/admin/login", None, "username=owner&password=owner123"),
        req_form("/admin/login", "username=owner&username=staff&password=nope"),
    ];
    for request in requests {
        let res = app.clone().oneshot(request).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(res).await.contains("Invalid credentials"));
    }

    // First occurrence of a repeated key is the one checked.
    let res = app
        .clone()
        .oneshot(req_form(
            "/admin/login",
            "username=owner&password=owner123&password=wrong",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/dashboard");
}

#[tokio::test]
async fn login_dashboard_logout_flow() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    for name in ["A", "B", "C"] {
        apply(&app, &format!("name={name}")).await;
    }

    let cookie = login(&app, "staff", "staff123").await;

    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/admin", &cookie))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/dashboard");

    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/dashboard", &cookie))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_text(res).await;
    assert!(html.contains("staff • staff"));
    let c = html.find("<td>C</td>").unwrap();
    let b = html.find("<td>B</td>").unwrap();
    let a = html.find("<td>A</td>").unwrap();
    assert!(c < b && b < a);

    let res = app
        .clone()
        .oneshot(req_with_cookie("POST", "/admin/logout", &cookie))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/admin");

    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/dashboard", &cookie))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/admin");
}

#[tokio::test]
async fn expired_session_is_sent_back_to_login() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path().to_path_buf(), SubmissionPolicy::Lenient);
    config.session_ttl_secs = 1;
    let (app, _) = app_from(config);

    let cookie = login(&app, "owner", "owner123").await;
    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/dashboard", &cookie))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    for uri in ["/dashboard", "/admin/download"] {
        let res = app
            .clone()
            .oneshot(req_with_cookie("GET", uri, &cookie))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&res), "/admin");
    }
    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/admin", &cookie))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tampered_or_foreign_cookie_is_not_a_session() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    let cookie = login(&app, "owner", "owner123").await;

    let last = cookie.chars().last().unwrap();
    let swapped = if last == 'A' { 'B' } else { 'A' };
    let tampered = format!("{}{swapped}", &cookie[..cookie.len() - 1]);

    let other_tmp = TempDir::new().unwrap();
    let mut other_config = test_config(other_tmp.path().to_path_buf(), SubmissionPolicy::Lenient);
    other_config.session_secret = "another-secret".to_string();
    let (other_app, _) = app_from(other_config);

    for (app, cookie) in [(&app, tampered.as_str()), (&other_app, cookie.as_str())] {
        let res = app
            .clone()
            .oneshot(req_with_cookie("GET", "/dashboard", cookie))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/admin");
    }
}

#[tokio::test]
async fn logout_ends_only_its_own_session() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    let first = login(&app, "owner", "owner123").await;
    let second = login(&app, "owner", "owner123").await;
    assert_ne!(first, second);

    let res = app
        .clone()
        .oneshot(req_with_cookie("POST", "/admin/logout", &first))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/dashboard", &first))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/dashboard", &second))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn owner_and_staff_share_the_same_access() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    for (user, pass) in [("owner", "owner123"), ("staff", "staff123")] {
        let cookie = login(&app, user, pass).await;
        for uri in ["/dashboard", "/admin/download"] {
            let res = app
                .clone()
                .oneshot(req_with_cookie("GET", uri, &cookie))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK, "{user} {uri}");
        }
    }
}

#[tokio::test]
async fn download_exports_stored_records_as_attachment() {
    let tmp = TempDir::new().unwrap();
    let (app, store) = app_with(&tmp, SubmissionPolicy::Lenient);
    apply(&app, "name=A&why=%3Cb%3Ebold%3C%2Fb%3E").await;
    apply(&app, "name=B").await;

    let cookie = login(&app, "owner", "owner123").await;
    let res = app
        .clone()
        .oneshot(req_with_cookie("GET", "/admin/download", &cookie))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        header_str(&res, header::CONTENT_TYPE),
        "application/json; charset=utf-8"
    );
    assert_eq!(
        header_str(&res, header::CONTENT_DISPOSITION),
        "attachment; filename=\"applications.json\""
    );

    let exported: Vec<ApplicationRecord> = serde_json::from_slice(&body_bytes(res).await).unwrap();
    assert_eq!(exported, store.lock().await.load_all());
    assert_eq!(exported[0].why_us, "<b>bold</b>");
}

#[tokio::test]
async fn login_accepts_json_body() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);

    let res = app
        .clone()
        .oneshot(req_json(
            "/admin/login",
            json!({ "username": "owner", "password": "owner123" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert!(header_str(&res, header::SET_COOKIE).starts_with(SESSION_COOKIE_NAME));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_are_all_kept() {
    let tmp = TempDir::new().unwrap();
    let (app, store) = app_with(&tmp, SubmissionPolicy::Lenient);

    let mut tasks = JoinSet::new();
    for i in 0..32 {
        let app = app.clone();
        tasks.spawn(async move {
            let res = app
                .oneshot(req_form("/apply", &format!("name=applicant-{i}")))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let records = store.lock().await.load_all();
    assert_eq!(records.len(), 32);
    let mut names: Vec<String> = records.into_iter().map(|r| r.name).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 32);
}

#[tokio::test]
async fn router_works_with_in_memory_store() {
    let config = test_config(PathBuf::from("unused"), SubmissionPolicy::Lenient);
    let seeded: ApplicationRecord = serde_json::from_value(json!({
        "id": "app_1712345678901",
        "createdAt": "2024-04-05T19:01:18.901Z",
        "name": "Seeded"
    }))
    .unwrap();
    let store = state::shared(MemoryRecordStore::with_records(vec![seeded]));
    let app = build_router(
        config,
        store.clone(),
        Arc::new(CredentialTable::demo()),
        signing_key("k"),
    );

    apply(&app, "name=Mem").await;
    let names: Vec<String> = store
        .lock()
        .await
        .load_all()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["Seeded".to_string(), "Mem".to_string()]);
}
