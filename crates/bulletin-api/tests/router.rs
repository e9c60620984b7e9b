//! End-to-end tests driving the router over an in-memory database.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::Value;
use tower::ServiceExt;

use bulletin_api::session::{AuthSettings, Authenticator};
use bulletin_api::state::{AppStateInner, WebSettings};
use bulletin_db::Database;

const PASSWORD: &str = "Secret!1";

struct TestApp {
    router: Router,
    db: Arc<Database>,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().expect("in-memory database"));
        let auth = Authenticator::new(
            db.clone(),
            AuthSettings {
                skip_verify: true,
                ..Default::default()
            },
        );
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            auth,
            web: WebSettings::default(),
        });
        Self {
            router: bulletin_api::router(state),
            db,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.expect("infallible router")
    }

    async fn form(&self, method: &str, uri: &str, cookie: Option<&str>, body: &str) -> Response {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn signup(&self, email: &str) {
        let body = format!(
            "email={}&firstName=Jo&lastName=Doe&password={}&passwordConfirm={}",
            email,
            urlencode(PASSWORD),
            urlencode(PASSWORD)
        );
        let res = self.form("POST", "/signup", None, &body).await;
        assert_eq!(res.status(), StatusCode::OK, "signup of {} failed", email);
    }

    /// Logs in and returns the `name=value` session cookie.
    async fn login(&self, email: &str) -> String {
        let body = format!("email={}&password={}", email, urlencode(PASSWORD));
        let res = self.form("POST", "/login", None, &body).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// First signup on an empty store is the admin.
    async fn admin(&self) -> String {
        self.signup("admin@example.com").await;
        self.login("admin@example.com").await
    }
}

fn urlencode(s: &str) -> String {
    s.replace('!', "%21")
}

fn timestamp(offset: Duration) -> String {
    (Utc::now() + offset).to_rfc3339_opts(SecondsFormat::Secs, true)
}

async fn json(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(res: &Response) -> &str {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn anonymous_requests_are_sent_to_login() {
    let app = TestApp::new();

    for uri in ["/messages", "/websites", "/users", "/profile", "/"] {
        let res = app.get(uri, None).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&res), "/login");
    }

    let res = app.get("/login", None).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_failures_are_field_errors() {
    let app = TestApp::new();
    app.signup("admin@example.com").await;

    let res = app
        .form("POST", "/login", None, "email=nobody@example.com&password=x")
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json(res).await["errors"]["credentials"], "unknown user");

    let res = app
        .form("POST", "/login", None, "email=admin@example.com&password=wrong")
        .await;
    assert_eq!(json(res).await["errors"]["credentials"], "invalid credentials");
}

#[tokio::test]
async fn session_cookie_grants_access_until_logout() {
    let app = TestApp::new();
    let cookie = app.admin().await;

    let res = app.get("/", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/messages");

    let res = app.get("/messages", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.get("/login", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/messages");

    let res = app.form("POST", "/logout", Some(&cookie), "").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let res = app.get("/messages", Some(&cookie)).await;
    assert_eq!(location(&res), "/login");
}

#[tokio::test]
async fn invite_only_signup_flow() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let body = "email=jo@example.com&firstName=Jo&lastName=Doe&password=Secret%211&passwordConfirm=Secret%211";
    let res = app.form("POST", "/signup", None, body).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .form("POST", "/invitation", Some(&admin), "email=Jo@Example.com")
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["HX-Redirect"], "/users");

    let res = app
        .form("POST", "/invitation", Some(&admin), "email=jo@example.com")
        .await;
    assert_eq!(json(res).await["errors"]["form"], "User already invited");

    let res = app.form("POST", "/signup", None, body).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!app.db.invitation_exists("jo@example.com").unwrap());

    let users = json(app.get("/users", Some(&admin)).await).await;
    assert_eq!(users["users"].as_array().unwrap().len(), 2);
    assert_eq!(users["users"][1]["role"], "user");
    assert!(users["invitations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_only_actions_are_forbidden_for_users() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.form("POST", "/invitation", Some(&admin), "email=jo@example.com")
        .await;
    app.signup("jo@example.com").await;
    let user = app.login("jo@example.com").await;

    let res = app
        .form("POST", "/website", Some(&user), "name=Shop&domain=shop.example.com")
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(res).await["error"], "You are not allowed to create websites");

    let res = app
        .form("POST", "/invitation", Some(&user), "email=x@example.com")
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app.get("/websites", Some(&user)).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn admins_cannot_delete_themselves() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let admin_id = app.db.get_user_by_email("admin@example.com").unwrap().unwrap().id;

    let res = app
        .form("DELETE", &format!("/user/{}", admin_id), Some(&admin), "")
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(res).await["error"], "You cannot delete yourself");

    let res = app.form("DELETE", "/user/999", Some(&admin), "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_updates_only_the_callers_names() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let id = app.db.get_user_by_email("admin@example.com").unwrap().unwrap().id;

    let res = app
        .form("PUT", "/profile", Some(&admin), &format!("id={}&firstName=Ada&lastName=Lovelace", id))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res).await["success"], "Profile successfully updated!");

    let res = app
        .form("PUT", "/profile", Some(&admin), &format!("id={}&firstName=Ada&lastName=Lovelace", id + 1))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let profile = json(app.get("/profile", Some(&admin)).await).await;
    assert_eq!(profile["lastName"], "Lovelace");
}

#[tokio::test]
async fn website_urls_are_unique() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let res = app
        .form("POST", "/website", Some(&admin), "name=Shop&domain=shop.example.com")
        .await;
    assert_eq!(res.headers()["HX-Redirect"], "/websites");

    let res = app
        .form("POST", "/website", Some(&admin), "name=Copy&domain=shop.example.com")
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json(res).await["errors"]["domain"].is_string());

    let res = app
        .form("POST", "/website", Some(&admin), "name=Bad&domain=not a domain")
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn message_lifecycle_through_public_api() {
    let app = TestApp::new();
    let admin = app.admin().await;

    app.form("POST", "/website", Some(&admin), "name=Shop&domain=shop.example.com")
        .await;
    app.form(
        "POST",
        "/website",
        Some(&admin),
        "name=Staging&domain=staging.example.com&staging=on",
    )
    .await;
    let shop = app.db.get_website_by_url("shop.example.com").unwrap().unwrap().id;
    let staging = app.db.get_website_by_url("staging.example.com").unwrap().unwrap().id;

    let active = format!(
        "title=Maintenance&message=Down+tonight&type=warning&language=en&dateRangeFrom={}&dateRangeTo={}&websites={}&websites={}",
        timestamp(Duration::hours(-1)),
        timestamp(Duration::hours(1)),
        shop,
        staging
    );
    let res = app.form("POST", "/message", Some(&admin), &active).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["HX-Redirect"], "/messages");

    let scheduled = format!(
        "title=Sale&message=Next+week&type=info&language=en&dateRangeFrom={}&dateRangeTo={}&websites={}&websites={}",
        timestamp(Duration::days(1)),
        timestamp(Duration::days(2)),
        shop,
        staging
    );
    app.form("POST", "/message", Some(&admin), &scheduled).await;

    let list = json(app.get("/messages", Some(&admin)).await).await;
    let statuses: Vec<_> = list["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["scheduled", "active"]);

    let public = |origin: &'static str| {
        Request::builder()
            .uri("/api/messages?language=en")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    };

    let body = json(app.send(public("https://shop.example.com")).await).await;
    assert_eq!(body["yourDomain"], "shop.example.com");
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["messages"][0]["message"], "Down tonight");

    let body = json(app.send(public("https://staging.example.com:8443")).await).await;
    let bodies: Vec<_> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(bodies, vec!["Down tonight", "[Preview] Next week"]);

    let message_id = app.db.list_messages().unwrap()[1].id;
    let res = app
        .form("DELETE", &format!("/message/{}", message_id), Some(&admin), "")
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = json(app.send(public("https://shop.example.com")).await).await;
    assert!(body["messages"].as_array().unwrap().is_empty());

    let res = app
        .form("DELETE", &format!("/message/{}", message_id), Some(&admin), "")
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn message_validation_errors() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let inverted = format!(
        "title=T&message=M&type=info&language=en&dateRangeFrom={}&dateRangeTo={}",
        timestamp(Duration::hours(2)),
        timestamp(Duration::hours(1)),
    );
    let res = app.form("POST", "/message", Some(&admin), &inverted).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json(res).await["errors"]["dateRangeTo"].is_string());

    let unknown_site = format!(
        "title=T&message=M&type=info&language=en&dateRangeFrom={}&dateRangeTo={}&websites=42",
        timestamp(Duration::hours(1)),
        timestamp(Duration::hours(2)),
    );
    let res = app.form("POST", "/message", Some(&admin), &unknown_site).await;
    assert_eq!(json(res).await["errors"]["websites"], "Unknown website");

    let res = app
        .form("POST", "/message", Some(&admin), "title=&type=shout&language=de")
        .await;
    let errors = json(res).await["errors"].clone();
    assert_eq!(errors["title"], "This field is required");
    assert!(errors["type"].is_string());
    assert!(errors["language"].is_string());

    let res = app.form("PATCH", "/message/99", Some(&admin), &unknown_site.replace("&websites=42", "")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn public_api_rejects_bad_requests() {
    let app = TestApp::new();

    let res = app.get("/api/messages?language=en", None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(res).await["error"], "Invalid domain");

    let req = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(header::ORIGIN, "https://shop.example.com")
            .body(Body::empty())
            .unwrap()
    };

    let res = app.send(req("/api/messages?language=de")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(res).await["error"], "Invalid language");

    let res = app.send(req("/api/messages?language=en")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json(res).await;
    assert_eq!(body["error"], "Unknown domain");
    assert_eq!(body["yourDomain"], "shop.example.com");
}

#[tokio::test]
async fn language_cookie_sets_form_default() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let res = app.get("/set-language?lang=fr", None).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let lang = res.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert_eq!(lang, "lang=fr");

    let cookies = format!("{}; {}", admin, lang);
    let page = json(app.get("/messages", Some(&cookies)).await).await;
    assert_eq!(page["formValues"]["language"], "fr");
}
