//! services/api/src/web/emails.rs
//!
//! Bodies of the transactional emails and the helper that sends them.

use killfeed_core::{SiteError, VerificationType};
use tracing::error;

use crate::error::ApiResult;
use crate::web::state::AppState;

/// Sends the one-time code for `kind` to `email`. A mailer failure is surfaced to
/// the user as an upstream error; the staged flow stays usable for a retry.
pub async fn send_code(
    state: &AppState,
    kind: VerificationType,
    email: &str,
    code: &str,
) -> ApiResult<()> {
    let (subject, intro) = match kind {
        VerificationType::Onboarding => (
            "Welcome to Killfeed!",
            "Here's your code to finish creating your account.",
        ),
        VerificationType::ResetPassword => (
            "Killfeed password reset",
            "Here's your code to reset your password.",
        ),
    };
    let link = format!("{}/auth/verify?type={}", state.config.site_url, kind.as_str());
    let html = format!(
        "<p>{intro}</p>\
         <p style=\"font-size:24px;letter-spacing:4px\"><strong>{code}</strong></p>\
         <p>Enter it at <a href=\"{link}\">{link}</a>. The code expires in {minutes} minutes.</p>",
        minutes = state.verification.ttl().num_minutes(),
    );

    state.mailer.send(email, subject, &html).await.map_err(|e| {
        error!("Failed to send {} email: {:?}", kind.as_str(), e);
        SiteError::Upstream(format!("could not send the {} email", kind.as_str()))
    })?;
    Ok(())
}
