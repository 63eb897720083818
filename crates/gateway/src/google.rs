//! Google OAuth2 authorization-code flow. Token signatures are not
//! re-verified; the userinfo endpoint is the source of identity.

use std::time::Duration;

use async_trait::async_trait;
use clipgate_domain::external::{IdentityError, IdentityProvider, VerifiedIdentity};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

pub struct GoogleIdentityProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorization_endpoint: Url,
    token_endpoint: String,
    userinfo_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleIdentityProvider {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| IdentityError::Exchange(err.to_string()))?;
        let authorization_endpoint = Url::parse(AUTHORIZATION_ENDPOINT)
            .map_err(|err| IdentityError::Exchange(err.to_string()))?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorization_endpoint,
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            userinfo_endpoint: USERINFO_ENDPOINT.to_string(),
        })
    }

    /// Points the token and userinfo calls somewhere else.
    pub fn with_endpoints(
        mut self,
        token_endpoint: impl Into<String>,
        userinfo_endpoint: impl Into<String>,
    ) -> Self {
        self.token_endpoint = token_endpoint.into();
        self.userinfo_endpoint = userinfo_endpoint.into();
        self
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String, IdentityError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            let reason = serde_json::from_slice::<TokenErrorResponse>(&bytes)
                .map(|err| err.error_description.unwrap_or(err.error))
                .unwrap_or_else(|_| format!("token endpoint returned {status}"));
            warn!(%status, reason = %reason, "oauth code exchange rejected");
            return Err(IdentityError::Exchange(reason));
        }
        let token: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|err| IdentityError::Exchange(format!("malformed token response: {err}")))?;
        Ok(token.access_token)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, IdentityError> {
        let response = self
            .http
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Exchange(format!(
                "userinfo endpoint returned {status}"
            )));
        }
        response
            .json::<UserInfo>()
            .await
            .map_err(|err| IdentityError::Exchange(format!("malformed userinfo response: {err}")))
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<VerifiedIdentity, IdentityError> {
        let access_token = self.fetch_access_token(code).await?;
        let info = self.fetch_user_info(&access_token).await?;
        into_identity(info)
    }
}

fn into_identity(info: UserInfo) -> Result<VerifiedIdentity, IdentityError> {
    let subject = info
        .sub
        .filter(|sub| !sub.is_empty())
        .ok_or(IdentityError::MissingClaim("sub"))?;
    let email = info
        .email
        .filter(|email| !email.is_empty())
        .ok_or(IdentityError::MissingClaim("email"))?;
    Ok(VerifiedIdentity {
        subject,
        email,
        name: info.name,
        picture: info.picture,
    })
}

fn transport_error(err: reqwest::Error) -> IdentityError {
    if err.is_timeout() {
        IdentityError::Timeout
    } else {
        IdentityError::Exchange(err.to_string())
    }
}
