mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{config, github_profile, post, TestSite, PASSWORD};
use killfeed_core::{CookieCodec, StagedFlow};

fn site() -> TestSite {
    TestSite::new(vec![post("p1", "major-final", "cs2", 1)])
}

fn state_from(authorize_url: &str) -> String {
    authorize_url
        .split_once("state=")
        .map(|(_, state)| state.to_string())
        .unwrap()
}

#[tokio::test]
async fn signup_verification_logs_in_and_celebrates_once() {
    let site = site();
    let mut browser = site.browser();

    let (status, body) = browser
        .post_form(
            "/auth/signup",
            &[
                ("email", " Fan@Example.com "),
                ("username", "Fan_01"),
                ("name", "Fan One"),
                ("password", PASSWORD),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    assert_eq!(body["target"], "fan@example.com");
    assert!(browser.has_cookie("kf_verification"));

    let code = site.code_sent_to("fan@example.com");
    let (status, body) = browser.post_form("/auth/verify", &[("code", &code)]).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["username"], "fan_01");
    assert!(browser.has_cookie("kf_session"));
    assert!(!browser.has_cookie("kf_verification"));

    let (_, page) = browser.get("/").await;
    assert_eq!(page["user"]["email"], "fan@example.com");
    assert_eq!(page["toast"]["type"], "success");
    assert_eq!(page["toast"]["title"], "Welcome");
    assert!(page["confetti"].is_string());

    let (_, page) = browser.get("/").await;
    assert!(page["toast"].is_null());
    assert!(page["confetti"].is_null());
    assert_eq!(page["user"]["username"], "fan_01");
}

#[tokio::test]
async fn wrong_code_is_rejected_and_can_be_retried() {
    let site = site();
    let mut browser = site.browser();
    browser
        .post_form(
            "/auth/signup",
            &[("email", "fan@example.com"), ("username", "fan"), ("password", PASSWORD)],
        )
        .await;
    let code = site.code_sent_to("fan@example.com");
    let wrong: String = code
        .chars()
        .map(|c| if c == '1' { '2' } else { '1' })
        .collect();

    let (status, body) = browser.post_form("/auth/verify", &[("code", &wrong)]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_code");

    let (status, _) = browser.post_form("/auth/verify", &[("code", &code)]).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn staged_signup_cookie_keeps_the_password_hash_private() {
    let site = site();
    let mut browser = site.browser();
    browser
        .post_form(
            "/auth/signup",
            &[("email", "fan@example.com"), ("username", "fan"), ("password", PASSWORD)],
        )
        .await;
    let raw = browser.cookie("kf_verification").unwrap().to_string();

    assert!(!raw.contains('.'));
    let codec = CookieCodec::new(config().session_secret.as_bytes());
    assert_eq!(codec.decode_expiring::<StagedFlow>(&raw, Utc::now()), None);
    match codec.open_expiring::<StagedFlow>(&raw, Utc::now()) {
        Some(StagedFlow::Signup { password_hash, .. }) => {
            assert!(password_hash.starts_with("$argon2"));
            assert!(!raw.contains(&password_hash));
        }
        other => panic!("unexpected staged flow: {:?}", other),
    }
}

#[tokio::test]
async fn verification_without_staging_asks_to_start_over() {
    let site = site();
    let mut browser = site.browser();
    browser
        .post_form(
            "/auth/signup",
            &[("email", "fan@example.com"), ("username", "fan"), ("password", PASSWORD)],
        )
        .await;
    let code = site.code_sent_to("fan@example.com");
    browser.drop_cookie("kf_verification");

    let (status, body) = browser.post_form("/auth/verify", &[("code", &code)]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "verification_expired");
    assert_eq!(
        body["message"],
        "Verification process expired, please restart the process"
    );
}

#[tokio::test]
async fn mail_failure_surfaces_and_stages_nothing() {
    let site = site();
    site.mailer.set_failing(true);
    let mut browser = site.browser();

    let (status, body) = browser
        .post_form(
            "/auth/signup",
            &[("email", "fan@example.com"), ("username", "fan"), ("password", PASSWORD)],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstream_unavailable");
    assert!(!browser.has_cookie("kf_verification"));
}

#[tokio::test]
async fn signup_details_are_validated() {
    let site = site();
    let mut taken = site.browser();
    site.sign_up(&mut taken, "first@example.com", "taken").await;
    let mut browser = site.browser();

    let cases = [
        (("not-an-email", "fresh", PASSWORD), "email"),
        (("fresh@example.com", "no", PASSWORD), "username"),
        (("fresh@example.com", "bad-name!", PASSWORD), "username"),
        (("fresh@example.com", "fresh", "short"), "password"),
        (("fresh@example.com", "taken", PASSWORD), "username"),
        (("first@example.com", "fresh", PASSWORD), "email"),
    ];
    for ((email, username, password), field) in cases {
        let (status, body) = browser
            .post_form(
                "/auth/signup",
                &[("email", email), ("username", username), ("password", password)],
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{email} {username}");
        assert_eq!(body["field"], field, "{email} {username}");
    }
}

#[tokio::test]
async fn login_and_logout_round_trip() {
    let site = site();
    let mut signup = site.browser();
    site.sign_up(&mut signup, "fan@example.com", "fan").await;

    let mut browser = site.browser();
    let (status, body) = browser
        .post_form("/auth/login", &[("login", "fan"), ("password", "wrong-password")])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Invalid username or password");

    let (status, body) = browser
        .post_form("/auth/login", &[("login", "FAN@example.com"), ("password", PASSWORD)])
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, me) = browser.get("/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["user"]["username"], "fan");

    let (status, _) = browser.post_form("/auth/logout", &[]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = browser.post_form("/auth/logout", &[]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = browser.get("/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, page) = browser.get("/").await;
    assert_eq!(page["toast"]["description"], "You have been logged out");
}

#[tokio::test]
async fn password_reset_requires_a_verified_code() {
    let site = site();
    let mut signup = site.browser();
    site.sign_up(&mut signup, "fan@example.com", "fan").await;
    let mut browser = site.browser();

    let (status, body) = browser
        .post_form("/auth/forgot-password", &[("login", "nobody")])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "login");

    let (status, _) = browser
        .post_form("/auth/forgot-password", &[("login", "fan")])
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let new_password = "a-brand-new-password";
    let form = [("password", new_password), ("confirm_password", new_password)];
    let (status, body) = browser.post_form("/auth/reset-password", &form).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "code");

    let code = site.code_sent_to("fan@example.com");
    let (status, body) = browser.post_form("/auth/verify", &[("code", &code)]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["next"], "/auth/reset-password");

    let (status, body) = browser
        .post_form(
            "/auth/reset-password",
            &[("password", new_password), ("confirm_password", "something-else")],
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "confirm_password");

    let (status, _) = browser.post_form("/auth/reset-password", &form).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!browser.has_cookie("kf_verification"));

    let (status, _) = browser
        .post_form("/auth/login", &[("login", "fan"), ("password", PASSWORD)])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = browser
        .post_form("/auth/login", &[("login", "fan"), ("password", new_password)])
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reset_code_stops_working_after_too_many_wrong_guesses() {
    let site = site();
    let mut signup = site.browser();
    site.sign_up(&mut signup, "fan@example.com", "fan").await;
    let mut attacker = site.browser();

    let (status, _) = attacker
        .post_form("/auth/forgot-password", &[("login", "fan")])
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let code = site.code_sent_to("fan@example.com");
    let wrong: String = code
        .chars()
        .map(|c| if c == '1' { '2' } else { '1' })
        .collect();

    for _ in 0..killfeed_core::verification::MAX_FAILED_ATTEMPTS {
        let (status, body) = attacker.post_form("/auth/verify", &[("code", &wrong)]).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_code");
    }

    let (status, body) = attacker.post_form("/auth/verify", &[("code", &code)]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_code");

    // A fresh code lifts the lockout.
    let (status, _) = attacker
        .post_form("/auth/forgot-password", &[("login", "fan")])
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let code = site.code_sent_to("fan@example.com");
    let (status, body) = attacker.post_form("/auth/verify", &[("code", &code)]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn oauth_newcomer_onboards_then_logs_straight_in() {
    let site = site();
    site.github.insert("code-1", github_profile("42", "octo@example.com"));
    site.github.insert("code-2", github_profile("42", "octo@example.com"));
    let mut browser = site.browser();

    let (status, body) = browser.get("/auth/github").await;
    assert_eq!(status, StatusCode::OK);
    let state = state_from(body["authorize_url"].as_str().unwrap());

    let (status, body) = browser
        .get(&format!("/auth/github/callback?code=code-1&state={state}"))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    assert_eq!(body["next"], "/auth/github/onboarding");
    assert_eq!(body["username"], "octofan");

    let (status, body) = browser
        .post_form("/auth/github/onboarding", &[("username", "octofan"), ("name", "Octo")])
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let (status, _) = browser.get("/me").await;
    assert_eq!(status, StatusCode::OK);

    let mut returning = site.browser();
    let (_, body) = returning.get("/auth/github").await;
    let state = state_from(body["authorize_url"].as_str().unwrap());
    let (status, body) = returning
        .get(&format!("/auth/github/callback?code=code-2&state={state}"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["username"], "octofan");
}

#[tokio::test]
async fn oauth_links_an_account_with_the_same_email() {
    let site = site();
    let mut signup = site.browser();
    site.sign_up(&mut signup, "fan@example.com", "fan").await;
    site.github.insert("code", github_profile("7", "fan@example.com"));

    let mut browser = site.browser();
    let (_, body) = browser.get("/auth/github").await;
    let state = state_from(body["authorize_url"].as_str().unwrap());
    let (status, body) = browser
        .get(&format!("/auth/github/callback?code=code&state={state}"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["username"], "fan");
}

#[tokio::test]
async fn oauth_callback_rejects_forged_state_and_unknown_providers() {
    let site = site();
    site.github.insert("code", github_profile("42", "octo@example.com"));
    let mut browser = site.browser();

    browser.get("/auth/github").await;
    let (status, body) = browser
        .get("/auth/github/callback?code=code&state=forged")
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "state");

    let (status, _) = browser.get("/auth/myspace").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = browser
        .post_form("/auth/github/onboarding", &[("username", "octofan")])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "verification_expired");
}
