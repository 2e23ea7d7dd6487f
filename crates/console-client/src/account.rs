//! Account API client
//!
//! Logical operations consumed:
//!
//! | call                                  | use                                   |
//! |---------------------------------------|---------------------------------------|
//! | `GET /orgs/name/{name}`               | resolve organization id               |
//! | `GET /org/{orgId}/token`              | fetch the current ingestion token     |
//! | `POST /org/{orgId}/token`             | issue a token when none exists        |
//! | `PATCH /org/{orgId}/token?token=`     | activate a token                      |
//! | `DELETE /org/{orgId}/tokens[?token=]` | revoke all tokens / all but one       |
//! | `DELETE /org/{orgId}/token?token=`    | revoke exactly one token              |

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use console_model::DeactivationMode;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `GET /orgs/name/{name}` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgResponse {
    /// Organization id
    pub org_id: String,
}

/// Token body nested in [`TokenResponse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    /// Token value
    pub access_token: String,
}

/// `GET|POST /org/{orgId}/token` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Server-side status label
    #[serde(default)]
    pub status: Option<String>,
    /// Token, absent when the organization has none
    #[serde(default)]
    pub token: Option<AccessToken>,
}

impl TokenResponse {
    /// Response carrying `value`
    #[must_use]
    pub fn with_token(status: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            token: Some(AccessToken {
                access_token: value.into(),
            }),
        }
    }

    /// Token value, if one was returned
    #[inline]
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.token
            .as_ref()
            .map(|t| t.access_token.as_str())
            .filter(|t| !t.is_empty())
    }
}

/// Operations the integration needs from the account service
#[async_trait]
pub trait AccountApi: Send + Sync + std::fmt::Debug {
    /// Resolve an organization name to its id
    async fn org_id_by_name(&self, name: &str) -> ClientResult<String>;

    /// Current token of the organization, `None` if it has none
    async fn fetch_token(&self, org_id: &str) -> ClientResult<Option<TokenResponse>>;

    /// Issue a new token for the organization
    async fn issue_token(&self, org_id: &str) -> ClientResult<TokenResponse>;

    /// Mark `token` active for ingestion; repeating the call is harmless
    async fn activate_token(&self, org_id: &str, token: &str) -> ClientResult<()>;

    /// Revoke tokens of the organization according to `mode`
    ///
    /// `token` is the reference token for [`DeactivationMode::Single`] and
    /// [`DeactivationMode::AllOthers`], and ignored for
    /// [`DeactivationMode::All`].
    async fn deactivate_tokens(
        &self,
        org_id: &str,
        mode: DeactivationMode,
        token: Option<&str>,
    ) -> ClientResult<()>;
}

/// reqwest-backed [`AccountApi`]
#[derive(Debug, Clone)]
pub struct HttpAccountApi {
    client: Client,
    base_url: Url,
    access_key: Option<String>,
}

impl HttpAccountApi {
    /// Create client for the account API at `base_url`
    ///
    /// A missing `access_key` is not an error here; every call then fails
    /// with [`ClientError::NotAuthenticated`] before touching the network.
    ///
    /// # Errors
    /// `ClientError::InvalidConfig` if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, access_key: Option<String>) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            ClientError::InvalidConfig(format!("account API url '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig(format!(
                "account API url '{base_url}' cannot carry a path"
            )));
        }

        Ok(Self {
            client,
            base_url,
            access_key: access_key.filter(|k| !k.is_empty()),
        })
    }

    /// Whether a credential is configured
    #[inline]
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.access_key.is_some()
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidConfig("account API url has no path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let key = self
            .access_key
            .as_deref()
            .ok_or(ClientError::NotAuthenticated)?;
        let response = request.bearer_auth(key).send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl AccountApi for HttpAccountApi {
    async fn org_id_by_name(&self, name: &str) -> ClientResult<String> {
        let url = self.endpoint(&["orgs", "name", name])?;
        let org: OrgResponse = self.send_json(self.client.get(url)).await?;
        tracing::debug!("Resolved organization {} to {}", name, org.org_id);
        Ok(org.org_id)
    }

    async fn fetch_token(&self, org_id: &str) -> ClientResult<Option<TokenResponse>> {
        let url = self.endpoint(&["org", org_id, "token"])?;
        match self.send_json::<TokenResponse>(self.client.get(url)).await {
            Ok(response) if response.access_token().is_some() => Ok(Some(response)),
            Ok(_) | Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn issue_token(&self, org_id: &str) -> ClientResult<TokenResponse> {
        let url = self.endpoint(&["org", org_id, "token"])?;
        let response: TokenResponse = self.send_json(self.client.post(url)).await?;
        if response.access_token().is_none() {
            return Err(ClientError::Malformed(
                "token issuance returned no access token".to_string(),
            ));
        }
        Ok(response)
    }

    async fn activate_token(&self, org_id: &str, token: &str) -> ClientResult<()> {
        let url = self.endpoint(&["org", org_id, "token"])?;
        self.send(self.client.patch(url).query(&[("token", token)]))
            .await?;
        Ok(())
    }

    async fn deactivate_tokens(
        &self,
        org_id: &str,
        mode: DeactivationMode,
        token: Option<&str>,
    ) -> ClientResult<()> {
        let request = match (mode, token) {
            (DeactivationMode::All, _) => {
                self.client.delete(self.endpoint(&["org", org_id, "tokens"])?)
            }
            (DeactivationMode::AllOthers, Some(keep)) => self
                .client
                .delete(self.endpoint(&["org", org_id, "tokens"])?)
                .query(&[("token", keep)]),
            (DeactivationMode::Single, Some(revoke)) => self
                .client
                .delete(self.endpoint(&["org", org_id, "token"])?)
                .query(&[("token", revoke)]),
            (mode, None) => {
                return Err(ClientError::InvalidRequest(format!(
                    "deactivation mode {mode:?} needs a reference token"
                )))
            }
        };
        self.send(request).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::NotAuthenticated),
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(response.url().path().to_string())),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
