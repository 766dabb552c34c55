//! A browser-like harness around the site's router: it drives requests through
//! `tower::ServiceExt::oneshot` and carries cookies between them.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use api_lib::config::Config;
use api_lib::web::{self, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use killfeed_core::memory::{FixedOAuthProvider, InMemoryStore, OutboxMailer, StaticContentSource};
use killfeed_core::{CategoryRef, ContentPost, OAuthProfile};
use serde_json::Value;
use tower::ServiceExt;

pub const PASSWORD: &str = "hunter22";

pub fn config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::DEBUG,
        session_secret: "test-secret-test-secret-test-secret!".to_string(),
        cms_url: "http://cms.invalid".to_string(),
        cms_token: None,
        resend_api_key: None,
        mail_from: "Killfeed <hello@killfeed.gg>".to_string(),
        site_url: "http://localhost:3000".to_string(),
        github: None,
        secure_cookies: false,
    }
}

pub fn post(id: &str, slug: &str, category: &str, age_hours: i64) -> ContentPost {
    ContentPost {
        id: Some(id.to_string()),
        slug: slug.to_string(),
        title: slug.replace('-', " "),
        subtitle: None,
        body: serde_json::json!([]),
        author: None,
        category: Some(CategoryRef {
            title: category.to_uppercase(),
            slug: category.to_string(),
        }),
        banner: None,
        created_at: Utc::now() - Duration::hours(age_hours),
    }
}

pub fn github_profile(id: &str, email: &str) -> OAuthProfile {
    OAuthProfile {
        provider_name: "github".to_string(),
        provider_id: id.to_string(),
        email: email.to_string(),
        name: Some("Octo Fan".to_string()),
        username: Some("octofan".to_string()),
        image_url: None,
    }
}

/// One visitor of the site, with their own cookie jar.
pub struct Browser {
    router: Router,
    cookies: BTreeMap<String, String>,
}

impl Browser {
    pub async fn get(&mut self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri);
        self.send(request, Body::empty()).await
    }

    pub async fn post_form(&mut self, uri: &str, form: &[(&str, &str)]) -> (StatusCode, Value) {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(body)).await
    }

    async fn send(&mut self, mut request: axum::http::request::Builder, body: Body) -> (StatusCode, Value) {
        if !self.cookies.is_empty() {
            let header_value = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(header::COOKIE, header_value);
        }

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let raw = set_cookie.to_str().unwrap();
            let pair = raw.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            let removed = value.is_empty() || raw.contains("Max-Age=0");
            if removed {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn drop_cookie(&mut self, name: &str) {
        self.cookies.remove(name);
    }
}

/// The whole site wired to in-memory adapters.
pub struct TestSite {
    pub router: Router,
    pub store: InMemoryStore,
    pub content: StaticContentSource,
    pub mailer: OutboxMailer,
    pub github: FixedOAuthProvider,
}

impl TestSite {
    pub fn new(posts: Vec<ContentPost>) -> Self {
        let store = InMemoryStore::new();
        let content = StaticContentSource::with_posts(posts);
        let mailer = OutboxMailer::new();
        let github = FixedOAuthProvider::new("github");

        let state = AppState::new(
            Arc::new(config()),
            Arc::new(store.clone()),
            Arc::new(content.clone()),
            Arc::new(mailer.clone()),
            vec![Arc::new(github.clone())],
        );

        Self {
            router: web::router(Arc::new(state)),
            store,
            content,
            mailer,
            github,
        }
    }

    pub fn browser(&self) -> Browser {
        Browser {
            router: self.router.clone(),
            cookies: BTreeMap::new(),
        }
    }

    /// The code in the latest email sent to `to`.
    pub fn code_sent_to(&self, to: &str) -> String {
        let mail = self.mailer.last_to(to).expect("no email was sent");
        let start = mail.html_body.find("<strong>").unwrap() + "<strong>".len();
        let end = mail.html_body.find("</strong>").unwrap();
        mail.html_body[start..end].to_string()
    }

    /// Runs signup and verification; the browser ends up logged in.
    pub async fn sign_up(&self, browser: &mut Browser, email: &str, username: &str) {
        let (status, body) = browser
            .post_form(
                "/auth/signup",
                &[
                    ("email", email),
                    ("username", username),
                    ("name", ""),
                    ("password", PASSWORD),
                    ("remember", "on"),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");

        let code = self.code_sent_to(email);
        let (status, body) = browser.post_form("/auth/verify", &[("code", &code)]).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
}

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}
