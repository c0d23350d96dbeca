#![allow(dead_code)]

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use soshi::config::Config;
use soshi::db;
use soshi::state::AppState;
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestApp {
    _tmp: TempDir,
    pub state: AppState,
    pub router: Router,
    pub uploads: PathBuf,
}

/// A signed-in test account.
pub struct Account {
    pub id: String,
    pub cookie: String,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(|_| {})
}

/// Like `spawn_app`, with a hook to adjust the config before the router is built.
pub fn spawn_app_with(adjust: impl FnOnce(&mut Config)) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = Some(tmp.path().join("test.db"));
    config.storage.path = Some(tmp.path().join("uploads"));
    config.auth.bcrypt_cost = 4;
    config.auth.reap_interval_minutes = 0;
    adjust(&mut config);

    let pool = db::create_pool(config.db_path()).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    std::fs::create_dir_all(config.uploads_path()).unwrap();

    let uploads = config.uploads_path().to_path_buf();
    let state = AppState::new(pool, config).expect("Failed to build app state");
    let router = soshi::routes::app(state.clone());

    TestApp {
        _tmp: tmp,
        state,
        router,
        uploads,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.call(Method::GET, uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> Response {
        self.call(Method::POST, uri, cookie, Some(body)).await
    }

    pub async fn put(&self, uri: &str, cookie: Option<&str>, body: Value) -> Response {
        self.call(Method::PUT, uri, cookie, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.call(Method::DELETE, uri, cookie, None).await
    }

    /// Registers `email` (password "password123") and returns the signed-in account.
    pub async fn register(&self, email: &str, is_public: bool) -> Account {
        let res = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": email,
                    "password": "password123",
                    "first_name": "Test",
                    "last_name": "User",
                    "date_of_birth": "1990-05-17",
                    "is_public": is_public,
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED, "register {email}");
        let cookie = session_cookie(&res).expect("register sets a session cookie");
        let body = json_body(res).await;
        Account {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            cookie,
        }
    }

    pub async fn create_post(&self, author: &Account, body: Value) -> String {
        let res = self.post("/api/posts", Some(&author.cookie), body).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        json_body(res).await["id"].as_str().unwrap().to_string()
    }

    pub async fn follow(&self, follower: &Account, target: &Account) -> Value {
        let res = self
            .post(
                &format!("/api/users/{}/follow", target.id),
                Some(&follower.cookie),
                json!({}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        json_body(res).await
    }
}

pub async fn json_body(res: Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// `name=value` of the first Set-Cookie carrying a non-empty session token.
pub fn session_cookie(res: &Response) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with("session_token=") && pair.len() > "session_token=".len())
        .map(str::to_string)
}

/// True when the response expires the session cookie.
pub fn clears_cookie(res: &Response) -> bool {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with("session_token=;") && v.contains("Max-Age=0"))
}

pub fn location(res: &Response) -> Option<&str> {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}
