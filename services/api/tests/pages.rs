mod common;

use axum::http::StatusCode;
use common::{post, TestSite};
use killfeed_core::{AuthorPage, Author, StaticPage};

fn site() -> TestSite {
    TestSite::new(vec![
        post("p1", "major-final", "cs2", 1),
        post("p2", "roster-shuffle", "cs2", 5),
        post("p3", "worlds-recap", "lol", 2),
    ])
}

#[tokio::test]
async fn health_answers_ok() {
    let site = site();
    let (status, body) = site.browser().get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn home_lists_newest_first_for_anonymous_visitors() {
    let site = site();
    let (status, body) = site.browser().get("/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].is_null());
    assert_eq!(body["theme"], "system");
    assert_eq!(body["past_lg"], false);
    let slugs: Vec<&str> = body["data"]["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["major-final", "worlds-recap", "roster-shuffle"]);
}

#[tokio::test]
async fn post_page_mirrors_the_post_once_and_shows_zero_counts() {
    let site = site();
    let mut browser = site.browser();

    let (status, body) = browser.get("/posts/cs2/major-final").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["post"]["slug"], "major-final");
    let counts = body["data"]["reactions"].as_object().unwrap();
    assert_eq!(counts.len(), 6);
    assert!(counts.values().all(|count| count == 0));
    assert!(body["data"]["viewer_reaction"].is_null());
    assert_eq!(body["data"]["read_more"]["slug"], "roster-shuffle");
    assert_eq!(site.store.local_post_count(), 1);

    browser.get("/posts/cs2/major-final").await;
    assert_eq!(site.store.local_post_count(), 1);
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let site = site();
    let (status, body) = site.browser().get("/posts/cs2/no-such-post").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(site.store.local_post_count(), 0);
}

#[tokio::test]
async fn content_outage_is_a_bad_gateway() {
    let site = site();
    site.content.set_unavailable(true);
    let (status, body) = site.browser().get("/posts/cs2/major-final").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstream_unavailable");
}

#[tokio::test]
async fn author_and_static_pages_are_served() {
    let site = site();
    site.content.add_author(AuthorPage {
        author: Author {
            name: "Jane Caster".into(),
            slug: "jane".into(),
            bio: None,
            image: None,
        },
        posts: vec![],
    });
    site.content.add_page(StaticPage {
        slug: "about".into(),
        title: "About us".into(),
        body: serde_json::json!([]),
    });
    let mut browser = site.browser();

    let (status, body) = browser.get("/authors/jane").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["author"]["name"], "Jane Caster");

    let (status, body) = browser.get("/pages/about").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "About us");

    let (status, _) = browser.get("/categories/dota2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_reaction_gets_a_login_prompt() {
    let site = site();
    let (status, body) = site
        .browser()
        .post_form("/posts/cs2/major-final/reactions", &[("reaction", "🔥")])
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["login"], "/auth/login");
    assert_eq!(site.store.local_post_count(), 0);
}

#[tokio::test]
async fn two_readers_react_to_the_same_post() {
    let site = site();
    let mut alice = site.browser();
    let mut bob = site.browser();
    site.sign_up(&mut alice, "alice@example.com", "alice").await;
    site.sign_up(&mut bob, "bob@example.com", "bob").await;
    let uri = "/posts/cs2/major-final/reactions";

    let (status, body) = alice.post_form(uri, &[("reaction", "🔥")]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["applied"], true);
    assert_eq!(body["outcome"], "added");
    assert_eq!(body["counts"]["🔥"], 1);

    let (_, body) = alice.post_form(uri, &[("reaction", "fire")]).await;
    assert_eq!(body["outcome"], "removed");
    assert_eq!(body["counts"]["🔥"], 0);

    let (_, body) = alice.post_form(uri, &[("reaction", "😍")]).await;
    assert_eq!(body["counts"]["😍"], 1);

    let (_, body) = bob.post_form(uri, &[("reaction", "🔥")]).await;
    assert_eq!(body["counts"]["🔥"], 1);
    assert_eq!(body["counts"]["😍"], 1);

    let (_, body) = alice.post_form(uri, &[("reaction", "😂")]).await;
    assert_eq!(body["outcome"], "switched");
    assert_eq!(body["from"], "😍");
    assert_eq!(body["to"], "😂");

    let (_, page) = alice.get("/posts/cs2/major-final").await;
    assert_eq!(page["data"]["viewer_reaction"], "😂");
    assert_eq!(site.store.reaction_rows("p1").len(), 2);
}

#[tokio::test]
async fn unknown_reaction_kind_is_rejected() {
    let site = site();
    let mut browser = site.browser();
    site.sign_up(&mut browser, "fan@example.com", "fan").await;

    let (status, body) = browser
        .post_form("/posts/cs2/major-final/reactions", &[("reaction", "👍")])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_reaction_kind");
    assert_eq!(body["field"], "reaction");
}

#[tokio::test]
async fn preferences_stick_to_later_pages() {
    let site = site();
    let mut browser = site.browser();

    let (status, body) = browser.post_form("/preferences/theme", &[("theme", "dark")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["theme"], "dark");
    browser
        .post_form("/preferences/breakpoint", &[("past_lg", "true")])
        .await;

    let (_, page) = browser.get("/").await;
    assert_eq!(page["theme"], "dark");
    assert_eq!(page["past_lg"], true);

    let (status, body) = browser.post_form("/preferences/theme", &[("theme", "neon")]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "theme");
}

#[tokio::test]
async fn me_requires_a_session() {
    let site = site();
    let (status, body) = site.browser().get("/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["login"], "/auth/login");
}
