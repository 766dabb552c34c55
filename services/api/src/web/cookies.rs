//! services/api/src/web/cookies.rs
//!
//! Names, lifetimes and jar plumbing for every cookie the site sets. The payloads
//! and their state machines live in `killfeed_core::cookies`; this module only
//! moves them in and out of an `axum_extra` `CookieJar`.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use killfeed_core::cookies::{
    ConfettiState, CookieCodec, SessionCookie, StagedFlow, StagingState, Theme, Toast,
    ToastState,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiResult;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "kf_session";
pub const TOAST_COOKIE: &str = "kf_toast";
pub const CONFETTI_COOKIE: &str = "kf_confetti";
pub const THEME_COOKIE: &str = "kf_theme";
pub const PAST_LG_COOKIE: &str = "kf_past_lg";
pub const VERIFICATION_COOKIE: &str = "kf_verification";
pub const OAUTH_STATE_COOKIE: &str = "kf_oauth_state";

/// Lifetime of a remembered session, both in the browser and in the store.
pub const SESSION_DAYS: i64 = 30;
const FLASH_SECONDS: i64 = 60;
const PREFERENCE_DAYS: i64 = 30;
pub const OAUTH_STATE_MINUTES: i64 = 10;

/// Reads and writes the site's signed cookies.
pub struct SiteCookies<'a> {
    codec: &'a CookieCodec,
    secure: bool,
}

impl<'a> SiteCookies<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            codec: &state.cookies,
            secure: state.config.secure_cookies,
        }
    }

    fn build(
        &self,
        name: &'static str,
        value: String,
        max_age: Option<time::Duration>,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure);
        if let Some(max_age) = max_age {
            builder = builder.max_age(max_age);
        }
        builder.build()
    }

    fn read<T: DeserializeOwned>(&self, jar: &CookieJar, name: &str) -> Option<T> {
        jar.get(name).and_then(|cookie| self.codec.decode(cookie.value()))
    }

    fn write<T: Serialize>(
        &self,
        jar: CookieJar,
        name: &'static str,
        value: &T,
        max_age: Option<time::Duration>,
    ) -> ApiResult<CookieJar> {
        let raw = self.codec.encode(value)?;
        Ok(jar.add(self.build(name, raw, max_age)))
    }

    pub fn remove(&self, jar: CookieJar, name: &'static str) -> CookieJar {
        jar.remove(Cookie::build(name).path("/"))
    }

    //--- Session ---------------------------------------------------------------------

    pub fn session(&self, jar: &CookieJar) -> Option<SessionCookie> {
        self.read(jar, SESSION_COOKIE)
    }

    /// Without `remember` the cookie lives for the browser session only.
    pub fn with_session(
        &self,
        jar: CookieJar,
        session_id: &str,
        remember: bool,
    ) -> ApiResult<CookieJar> {
        let cookie = SessionCookie {
            session_id: session_id.to_string(),
        };
        let max_age = remember.then(|| time::Duration::days(SESSION_DAYS));
        self.write(jar, SESSION_COOKIE, &cookie, max_age)
    }

    //--- Toast and confetti ----------------------------------------------------------

    pub fn toast(&self, jar: &CookieJar) -> ToastState {
        self.read::<Toast>(jar, TOAST_COOKIE).into()
    }

    pub fn with_toast(&self, jar: CookieJar, toast: &Toast) -> ApiResult<CookieJar> {
        self.write(
            jar,
            TOAST_COOKIE,
            toast,
            Some(time::Duration::seconds(FLASH_SECONDS)),
        )
    }

    pub fn confetti(&self, jar: &CookieJar) -> ConfettiState {
        self.read::<String>(jar, CONFETTI_COOKIE)
            .map_or(ConfettiState::Idle, ConfettiState::Armed)
    }

    pub fn with_confetti(&self, jar: CookieJar) -> ApiResult<CookieJar> {
        match ConfettiState::arm() {
            ConfettiState::Armed(id) => self.write(
                jar,
                CONFETTI_COOKIE,
                &id,
                Some(time::Duration::seconds(FLASH_SECONDS)),
            ),
            ConfettiState::Idle => Ok(jar),
        }
    }

    //--- Preferences -----------------------------------------------------------------

    pub fn theme(&self, jar: &CookieJar) -> Theme {
        self.read(jar, THEME_COOKIE).unwrap_or_default()
    }

    pub fn with_theme(&self, jar: CookieJar, theme: Theme) -> ApiResult<CookieJar> {
        self.write(
            jar,
            THEME_COOKIE,
            &theme,
            Some(time::Duration::days(PREFERENCE_DAYS)),
        )
    }

    pub fn past_lg(&self, jar: &CookieJar) -> bool {
        self.read(jar, PAST_LG_COOKIE).unwrap_or(false)
    }

    pub fn with_past_lg(&self, jar: CookieJar, past_lg: bool) -> ApiResult<CookieJar> {
        self.write(
            jar,
            PAST_LG_COOKIE,
            &past_lg,
            Some(time::Duration::days(PREFERENCE_DAYS)),
        )
    }

    //--- Verification staging --------------------------------------------------------

    /// Sealed, since a staged signup carries the password hash.
    /// A payload past its own expiry reads as `Absent`, whatever the browser kept.
    pub fn staging(&self, jar: &CookieJar, now: DateTime<Utc>) -> StagingState {
        jar.get(VERIFICATION_COOKIE)
            .and_then(|cookie| self.codec.open_expiring::<StagedFlow>(cookie.value(), now))
            .into()
    }

    pub fn with_staging(
        &self,
        jar: CookieJar,
        flow: &StagedFlow,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> ApiResult<CookieJar> {
        let raw = self.codec.seal_expiring(flow, now + ttl)?;
        let max_age = time::Duration::seconds(ttl.num_seconds());
        Ok(jar.add(self.build(VERIFICATION_COOKIE, raw, Some(max_age))))
    }

    //--- OAuth CSRF state ------------------------------------------------------------

    pub fn oauth_state(&self, jar: &CookieJar, now: DateTime<Utc>) -> Option<String> {
        jar.get(OAUTH_STATE_COOKIE)
            .and_then(|cookie| self.codec.decode_expiring(cookie.value(), now))
    }

    pub fn with_oauth_state(
        &self,
        jar: CookieJar,
        state: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<CookieJar> {
        let ttl = chrono::Duration::minutes(OAUTH_STATE_MINUTES);
        let raw = self.codec.encode_expiring(&state, now + ttl)?;
        let max_age = time::Duration::minutes(OAUTH_STATE_MINUTES);
        Ok(jar.add(self.build(OAUTH_STATE_COOKIE, raw, Some(max_age))))
    }
}
