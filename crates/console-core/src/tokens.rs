//! Ingestion token manager
//!
//! Acquires, activates and deactivates ingestion tokens through the account
//! API. Every call that changes token state goes through one async mutex, so
//! the order in which they are issued is the order the account API sees.

use crate::error::ConsoleError;
use console_client::AccountApi;
use console_model::{DeactivationMode, IngestionToken, Organization, TokenStatus};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Token lifecycle against the account API
#[derive(Debug)]
pub struct TokenManager {
    api: Arc<dyn AccountApi>,
    ordering: Mutex<()>,
}

impl TokenManager {
    /// Create manager over an account API client
    #[inline]
    #[must_use]
    pub fn new(api: Arc<dyn AccountApi>) -> Self {
        Self {
            api,
            ordering: Mutex::new(()),
        }
    }

    /// Resolve an organization name to its id
    ///
    /// # Errors
    /// - `ConsoleError::NotAuthenticated` without a valid credential
    /// - `ConsoleError::AccountApi` for other API failures
    pub async fn resolve_organization(&self, name: &str) -> Result<Organization, ConsoleError> {
        let id = self.api.org_id_by_name(name).await?;
        tracing::info!("Using organization {} ({})", name, id);
        Ok(Organization::new(name, id))
    }

    /// Existing token of the organization, or a newly issued one
    ///
    /// # Errors
    /// - `ConsoleError::NotAuthenticated` without a valid credential
    /// - `ConsoleError::AccountApi` for other API failures
    pub async fn acquire_token(&self, org_id: &str) -> Result<IngestionToken, ConsoleError> {
        let _guard = self.ordering.lock().await;

        if let Some(value) = self
            .api
            .fetch_token(org_id)
            .await?
            .as_ref()
            .and_then(|r| r.access_token())
        {
            let token = IngestionToken::existing(value);
            tracing::debug!("Reusing ingestion token {}", token.redacted());
            return Ok(token);
        }

        let issued = self.api.issue_token(org_id).await?;
        let value = issued.access_token().ok_or_else(|| {
            ConsoleError::AccountApi(console_client::ClientError::Malformed(
                "issued token response carried no access token".to_string(),
            ))
        })?;
        let token = IngestionToken::newly_issued(value);
        tracing::info!("Issued ingestion token {}", token.redacted());
        Ok(token)
    }

    /// Mark `token` active for ingestion
    ///
    /// Safe to repeat on an already active token. The lifecycle is checked
    /// before the API is called, so a deactivated token never reaches it.
    ///
    /// # Errors
    /// - `ConsoleError::TokenTransition` if the token was deactivated
    /// - account API failures
    pub async fn activate_token(
        &self,
        org_id: &str,
        token: &mut IngestionToken,
    ) -> Result<(), ConsoleError> {
        console_model::validate_transition(token.status, TokenStatus::Activated)?;

        let _guard = self.ordering.lock().await;
        self.api.activate_token(org_id, &token.value).await?;
        token.transition(TokenStatus::Activated)?;

        tracing::info!("Activated ingestion token {}", token.redacted());
        Ok(())
    }

    /// Revoke tokens of the organization
    ///
    /// - `Single`: exactly `token`, which becomes `Deactivated`
    /// - `AllOthers`: every token except `token`, which is untouched
    /// - `All`: every token; `token`, if given, becomes `Deactivated`
    ///
    /// # Errors
    /// - `ConsoleError::Config` if the mode needs a token and none is given
    /// - `ConsoleError::TokenTransition` for `Single` on a deactivated token
    /// - account API failures
    pub async fn deactivate_tokens(
        &self,
        org_id: &str,
        mode: DeactivationMode,
        mut token: Option<&mut IngestionToken>,
    ) -> Result<(), ConsoleError> {
        if mode.needs_token() && token.is_none() {
            return Err(ConsoleError::Config(format!(
                "token deactivation mode {mode:?} needs a reference token"
            )));
        }
        if mode == DeactivationMode::Single {
            if let Some(token) = token.as_deref() {
                console_model::validate_transition(token.status, TokenStatus::Deactivated)?;
            }
        }

        let _guard = self.ordering.lock().await;
        let reference = token.as_deref().map(|t| t.value.clone());
        self.api
            .deactivate_tokens(org_id, mode, reference.as_deref())
            .await?;

        if let (DeactivationMode::Single | DeactivationMode::All, Some(token)) =
            (mode, token.as_deref_mut())
        {
            if token.status.is_usable() {
                token.transition(TokenStatus::Deactivated)?;
            }
        }

        tracing::info!("Deactivated ingestion tokens ({:?}) for {}", mode, org_id);
        Ok(())
    }
}
