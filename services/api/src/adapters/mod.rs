pub mod cms;
pub mod db;
pub mod mail;
pub mod oauth;

pub use cms::CmsAdapter;
pub use db::DbAdapter;
pub use mail::{LogMailer, ResendMailer};
pub use oauth::GithubProvider;
