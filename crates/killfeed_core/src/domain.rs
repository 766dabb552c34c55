//! crates/killfeed_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

//=========================================================================================
// Editorial Content (owned by the content source)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub title: String,
    pub slug: String,
}

/// A post as delivered by the content source.
///
/// The id is optional because a malformed document can arrive without one; such a
/// document can be shown in listings but never gets a local identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPost {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Rich structured content, passed through untouched to the renderer.
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub banner: Option<ImageRef>,
    pub created_at: DateTime<Utc>,
}

impl ContentPost {
    /// The document id, if the content source supplied a usable one.
    pub fn resolvable_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// The listing projection of a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    #[serde(alias = "_id")]
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default)]
    pub banner: Option<ImageRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub bio: Option<serde_json::Value>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorPage {
    pub author: Author,
    #[serde(default)]
    pub posts: Vec<PostSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPage {
    pub category: Category,
    #[serde(default)]
    pub posts: Vec<PostSummary>,
}

/// Informational pages (about, privacy, contact...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticPage {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

//=========================================================================================
// Local Mirrors
//=========================================================================================

/// Local identity of an externally-authored post. `id` always equals the content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalPostRecord {
    pub id: String,
    pub slug: String,
}

/// A fetched post together with its guaranteed-existing local record.
#[derive(Debug, Clone)]
pub struct ResolvedPost {
    pub post: ContentPost,
    pub local: LocalPostRecord,
}

//=========================================================================================
// Users and Sessions
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    /// Absent for accounts that only ever signed in through an OAuth provider.
    pub hashed_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub name: Option<String>,
    pub hashed_password: Option<String>,
}

/// Profile data handed back by an OAuth provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProfile {
    pub provider_name: String,
    pub provider_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

//=========================================================================================
// Reactions
//=========================================================================================

/// The fixed set of reaction kinds. The name is the natural key in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReactionKind {
    Fire,
    Love,
    Laugh,
    Wow,
    Sad,
    Angry,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reaction kind '{0}'")]
pub struct UnknownReactionKind(pub String);

impl ReactionKind {
    pub const ALL: [ReactionKind; 6] = [
        ReactionKind::Fire,
        ReactionKind::Love,
        ReactionKind::Laugh,
        ReactionKind::Wow,
        ReactionKind::Sad,
        ReactionKind::Angry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReactionKind::Fire => "fire",
            ReactionKind::Love => "love",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Wow => "wow",
            ReactionKind::Sad => "sad",
            ReactionKind::Angry => "angry",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ReactionKind::Fire => "🔥",
            ReactionKind::Love => "😍",
            ReactionKind::Laugh => "😂",
            ReactionKind::Wow => "😮",
            ReactionKind::Sad => "😢",
            ReactionKind::Angry => "😡",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.emoji())
    }
}

/// Accepts either the stored name (`fire`) or the emoji token (`🔥`).
impl FromStr for ReactionKind {
    type Err = UnknownReactionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        ReactionKind::ALL
            .into_iter()
            .find(|kind| kind.emoji() == token || kind.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownReactionKind(s.to_string()))
    }
}

impl Serialize for ReactionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.emoji())
    }
}

impl<'de> Deserialize<'de> for ReactionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-kind reaction totals for one post. Always holds every kind of the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReactionCounts(BTreeMap<ReactionKind, u64>);

impl ReactionCounts {
    pub fn zeroed() -> Self {
        Self(ReactionKind::ALL.into_iter().map(|kind| (kind, 0)).collect())
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (ReactionKind, u64)>) -> Self {
        let mut counts = Self::zeroed();
        for (kind, count) in rows {
            *counts.0.entry(kind).or_insert(0) += count;
        }
        counts
    }

    pub fn get(&self, kind: ReactionKind) -> u64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReactionKind, u64)> + '_ {
        self.0.iter().map(|(kind, count)| (*kind, *count))
    }
}

//=========================================================================================
// Verification (TOTP)
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationType {
    Onboarding,
    ResetPassword,
}

impl VerificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationType::Onboarding => "onboarding",
            VerificationType::ResetPassword => "reset-password",
        }
    }
}

impl FromStr for VerificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onboarding" => Ok(VerificationType::Onboarding),
            "reset-password" => Ok(VerificationType::ResetPassword),
            other => Err(format!("unknown verification type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotpAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl TotpAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            TotpAlgorithm::Sha1 => "SHA-1",
            TotpAlgorithm::Sha256 => "SHA-256",
            TotpAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl FromStr for TotpAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(TotpAlgorithm::Sha1),
            "SHA256" => Ok(TotpAlgorithm::Sha256),
            "SHA512" => Ok(TotpAlgorithm::Sha512),
            _ => Err(format!("unsupported TOTP algorithm '{s}'")),
        }
    }
}

/// Parameters a one-time code is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpConfig {
    /// Hex-encoded shared secret.
    pub secret: String,
    pub algorithm: TotpAlgorithm,
    pub digits: u32,
    pub char_set: String,
    /// Step length in seconds.
    pub period: u64,
}

/// The persisted secret for one (type, target) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSecret {
    pub kind: VerificationType,
    pub target: String,
    pub config: TotpConfig,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Wrong codes submitted since the secret was issued.
    pub attempts: u32,
}
