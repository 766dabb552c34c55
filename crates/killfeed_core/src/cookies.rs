//! crates/killfeed_core/src/cookies.rs
//!
//! Signed cookie payloads and the small state machines they carry.
//!
//! Every cookie value is `base64url(json) "." base64url(hmac_sha256(key, payload))`,
//! except sealed ones, which are `base64url(nonce || aes256gcm(json))` under a key
//! derived from the same secret. Sealed cookies hide their payload from the browser.
//!
//! Decoding never fails loudly: a missing, tampered, malformed or expired value is
//! simply the empty state of its domain.

use std::str::FromStr;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::OAuthProfile;
use crate::error::{SiteError, SiteResult};

type HmacSha256 = Hmac<Sha256>;

const SEAL_KEY_CONTEXT: &[u8] = b"killfeed sealed cookie v1";
const NONCE_BYTES: usize = 12;

//=========================================================================================
// Codec
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("cookie payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cookie signing key rejected: {0}")]
    Key(String),
    #[error("cookie payload could not be sealed: {0}")]
    Seal(String),
}

#[derive(Clone)]
pub struct CookieCodec {
    key: Vec<u8>,
    seal_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Expiring<T> {
    value: T,
    exp: i64,
}

impl CookieCodec {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        let key = key.as_ref().to_vec();
        Self {
            seal_key: derive_seal_key(&key),
            key,
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CookieError> {
        let payload = B64.encode(serde_json::to_vec(value)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = B64.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    pub fn decode<T: DeserializeOwned>(&self, raw: &str) -> Option<T> {
        let (payload, signature) = raw.split_once('.')?;
        let signature = B64.decode(signature).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;
        let json = B64.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// Encodes a value that stops decoding at `expires_at`, whatever the browser keeps.
    pub fn encode_expiring<T: Serialize>(
        &self,
        value: &T,
        expires_at: DateTime<Utc>,
    ) -> Result<String, CookieError> {
        self.encode(&Expiring {
            value,
            exp: expires_at.timestamp(),
        })
    }

    pub fn decode_expiring<T: DeserializeOwned>(&self, raw: &str, now: DateTime<Utc>) -> Option<T> {
        let wrapped: Expiring<T> = self.decode(raw)?;
        (wrapped.exp > now.timestamp()).then_some(wrapped.value)
    }

    /// Like `encode_expiring`, but the browser cannot read the payload either.
    pub fn seal_expiring<T: Serialize>(
        &self,
        value: &T,
        expires_at: DateTime<Utc>,
    ) -> Result<String, CookieError> {
        let plaintext = serde_json::to_vec(&Expiring {
            value,
            exp: expires_at.timestamp(),
        })?;

        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| CookieError::Seal(e.to_string()))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(B64.encode(sealed))
    }

    pub fn open_expiring<T: DeserializeOwned>(&self, raw: &str, now: DateTime<Utc>) -> Option<T> {
        let sealed = B64.decode(raw).ok()?;
        if sealed.len() <= NONCE_BYTES {
            return None;
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
        let plaintext = self
            .cipher()
            .ok()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()?;
        let wrapped: Expiring<T> = serde_json::from_slice(&plaintext).ok()?;
        (wrapped.exp > now.timestamp()).then_some(wrapped.value)
    }

    fn mac(&self) -> Result<HmacSha256, CookieError> {
        <HmacSha256 as KeyInit>::new_from_slice(&self.key).map_err(|e| CookieError::Key(e.to_string()))
    }

    fn cipher(&self) -> Result<Aes256Gcm, CookieError> {
        <Aes256Gcm as aes_gcm::KeyInit>::new_from_slice(&self.seal_key)
            .map_err(|e| CookieError::Key(e.to_string()))
    }
}

/// A 32-byte AES key bound to this use of the signing secret.
fn derive_seal_key(key: &[u8]) -> Vec<u8> {
    use sha2::Digest;

    let mut hasher = Sha256::new();
    hasher.update(SEAL_KEY_CONTEXT);
    hasher.update(key);
    hasher.finalize().to_vec()
}

//=========================================================================================
// Session
//=========================================================================================

/// Who is making the request. Resolved from the session cookie through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated { user_id: Uuid },
}

impl SessionState {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticated { user_id } => Some(*user_id),
        }
    }

    pub fn require_user(&self) -> SiteResult<Uuid> {
        self.user_id().ok_or(SiteError::Unauthorized)
    }
}

/// What the session cookie itself holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub session_id: String,
}

//=========================================================================================
// Toast
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Message,
    Error,
}

/// A one-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToastKind,
    #[serde(default)]
    pub title: Option<String>,
    pub description: String,
}

impl Toast {
    pub fn new(kind: ToastKind, title: Option<&str>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.map(str::to_string),
            description: description.into(),
        }
    }

    pub fn success(title: &str, description: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, Some(title), description)
    }

    pub fn message(description: impl Into<String>) -> Self {
        Self::new(ToastKind::Message, None, description)
    }

    pub fn error(title: &str, description: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, Some(title), description)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToastState {
    #[default]
    Empty,
    Pending(Toast),
}

impl ToastState {
    /// Hands out the pending toast once and leaves the state empty.
    pub fn take(&mut self) -> Option<Toast> {
        match std::mem::take(self) {
            ToastState::Empty => None,
            ToastState::Pending(toast) => Some(toast),
        }
    }
}

impl From<Option<Toast>> for ToastState {
    fn from(toast: Option<Toast>) -> Self {
        toast.map_or(ToastState::Empty, ToastState::Pending)
    }
}

//=========================================================================================
// Confetti, Theme, Breakpoint Hint
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfettiState {
    #[default]
    Idle,
    Armed(String),
}

impl ConfettiState {
    pub fn arm() -> Self {
        ConfettiState::Armed(Uuid::new_v4().to_string())
    }

    pub fn take(&mut self) -> Option<String> {
        match std::mem::take(self) {
            ConfettiState::Idle => None,
            ConfettiState::Armed(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "system" => Ok(Theme::System),
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(SiteError::Validation {
                field: "theme",
                message: format!("'{other}' is not a theme"),
            }),
        }
    }
}

//=========================================================================================
// Verification Staging
//=========================================================================================

/// Data in transit between the steps of a multi-step flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "kebab-case")]
pub enum StagedFlow {
    /// Credentials waiting for the emailed code before the account is created.
    Signup {
        email: String,
        username: String,
        name: Option<String>,
        password_hash: String,
        remember: bool,
    },
    /// A password reset; `verified` flips once the emailed code was accepted.
    ResetPassword { email: String, verified: bool },
    /// A provider login with no local account yet.
    #[serde(rename = "oauth")]
    OAuth { profile: OAuthProfile },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StagingState {
    #[default]
    Absent,
    Staged(StagedFlow),
}

impl StagingState {
    /// The staged flow, or the dedicated "start over" error when nothing (or
    /// something already expired) is on file.
    pub fn require(self) -> SiteResult<StagedFlow> {
        match self {
            StagingState::Absent => Err(SiteError::VerificationExpired),
            StagingState::Staged(flow) => Ok(flow),
        }
    }
}

impl From<Option<StagedFlow>> for StagingState {
    fn from(flow: Option<StagedFlow>) -> Self {
        flow.map_or(StagingState::Absent, StagingState::Staged)
    }
}
