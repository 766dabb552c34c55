//! services/api/src/adapters/oauth.rs
//!
//! GitHub implementation of the `OAuthProvider` port. Only the code exchange and
//! the profile lookup live here; linking and sessions are handled by the web layer.

use async_trait::async_trait;
use killfeed_core::domain::OAuthProfile;
use killfeed_core::ports::{OAuthProvider, PortError, PortResult};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "killfeed";

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Clone)]
pub struct GithubProvider {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GithubProvider {
    pub fn new(client: Client, client_id: String, client_secret: String, site_url: &str) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            redirect_uri: format!("{site_url}/auth/github/callback"),
        }
    }

    async fn api_get<T: for<'de> Deserialize<'de>>(&self, path: &str, token: &str) -> PortResult<T> {
        let response = self
            .client
            .get(format!("{API_URL}{path}"))
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Unavailable(format!(
                "GitHub answered {} for {path}",
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn name(&self) -> &str {
        "github"
    }

    fn authorize_url(&self, state: &str) -> String {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", "read:user user:email"),
                ("state", state),
            ],
        )
        .map(String::from)
        .unwrap_or_else(|_| AUTHORIZE_URL.to_string())
    }

    async fn exchange_code(&self, code: &str) -> PortResult<OAuthProfile> {
        let token: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&TokenRequest {
                client_id: &self.client_id,
                client_secret: &self.client_secret,
                code,
                redirect_uri: &self.redirect_uri,
            })
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let Some(access_token) = token.access_token else {
            tracing::warn!(
                "GitHub refused the authorization code: {}",
                token.error_description.unwrap_or_default()
            );
            return Err(PortError::Unauthorized);
        };

        let user: GithubUser = self.api_get("/user", &access_token).await?;
        let email = match user.email {
            Some(email) => email,
            None => {
                let emails: Vec<GithubEmail> = self.api_get("/user/emails", &access_token).await?;
                emails
                    .into_iter()
                    .filter(|e| e.verified)
                    .max_by_key(|e| e.primary)
                    .map(|e| e.email)
                    .ok_or_else(|| {
                        PortError::Unexpected("GitHub account has no verified email".to_string())
                    })?
            }
        };

        Ok(OAuthProfile {
            provider_name: "github".to_string(),
            provider_id: user.id.to_string(),
            email: email.to_lowercase(),
            name: user.name,
            username: Some(user.login),
            image_url: user.avatar_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_state_and_redirect() {
        let provider = GithubProvider::new(
            Client::new(),
            "client-123".into(),
            "secret".into(),
            "https://killfeed.gg",
        );
        let url = Url::parse(&provider.authorize_url("xyz")).unwrap();
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(params.contains(&("state".into(), "xyz".into())));
        assert!(params.contains(&("client_id".into(), "client-123".into())));
        assert!(params.contains(&(
            "redirect_uri".into(),
            "https://killfeed.gg/auth/github/callback".into()
        )));
    }
}
