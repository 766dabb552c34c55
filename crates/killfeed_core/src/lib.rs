pub mod content;
pub mod cookies;
pub mod domain;
pub mod error;
pub mod memory;
pub mod ports;
pub mod reactions;
pub mod totp;
pub mod verification;

pub use content::ContentResolver;
pub use cookies::{
    ConfettiState, CookieCodec, SessionCookie, SessionState, StagedFlow, StagingState, Theme,
    Toast, ToastKind, ToastState,
};
pub use domain::{
    Author, AuthorPage, AuthorRef, Category, CategoryPage, CategoryRef, ContentPost, ImageRef,
    LocalPostRecord, NewUser, OAuthProfile, PostSummary, ReactionCounts, ReactionKind,
    ResolvedPost, StaticPage, User, UserCredentials, VerificationType,
};
pub use error::{SiteError, SiteResult};
pub use ports::{
    ContentSource, DatabaseService, Mailer, OAuthProvider, PortError, PortResult,
};
pub use reactions::{ReactionAggregator, ToggleOutcome};
pub use verification::VerificationFlow;
