//! Console integration orchestrator
//!
//! Binds the token manager, layer resolver, injector and reconciler to the
//! lifecycle phases of a deployment run:
//!
//! | phase                 | work |
//! |-----------------------|------|
//! | `pre_package`         | org, token, reconcile leftover state, inject, write state |
//! | `pre_deploy`          | reconcile a prebuilt package and adopt its token |
//! | `pre_deploy_function` | token and injection for a single function |
//! | `post_deploy`         | activate token, deactivate the superseded one |
//! | `pre_rollback`        | reconcile the target artifact, activate its token |
//! | `pre_remove`          | deactivate every token of the organization |
//!
//! Enablement is decided once by [`ConsoleIntegration::initialize`]. When it
//! is off, no phase calls the account API.

use crate::config::{ConsoleConfig, Endpoints};
use crate::context::RunContext;
use crate::error::ConsoleError;
use crate::injector::{InjectionReport, Injector, InstrumentationSettings, LayerChoice};
use crate::reconciler::{reconcile, CurrentIntent, Mismatch, MismatchKind};
use crate::resolver::LayerResolver;
use crate::state_store::{FileStateStore, StateStore};
use crate::tokens::TokenManager;
use console_client::{AccountApi, HttpAccountApi, HttpLayerFeed, LayerFeed};
use console_model::{
    ComputeUnit, DeactivationMode, DeploymentConsoleState, Direction, IngestionToken,
    Organization, PersistedState, SUPPORTED_SCHEMA_VERSION,
};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;

/// Observability console integration for one deployment run
pub struct ConsoleIntegration {
    config: ConsoleConfig,
    context: RunContext,
    tokens: TokenManager,
    resolver: LayerResolver,
    injector: Injector,
    store: Arc<dyn StateStore>,
    enabled: OnceCell<bool>,
    org: Option<Organization>,
    token: Option<IngestionToken>,
}

impl std::fmt::Debug for ConsoleIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleIntegration")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("enabled", &self.enabled.get())
            .field("org", &self.org)
            .field("token", &self.token.as_ref().map(IngestionToken::redacted))
            .finish_non_exhaustive()
    }
}

impl ConsoleIntegration {
    /// Create integration over injected collaborators
    #[must_use]
    pub fn new(
        config: ConsoleConfig,
        context: RunContext,
        api: Arc<dyn AccountApi>,
        feed: Arc<dyn LayerFeed>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let injector = Injector::from_config(&config);
        Self {
            config,
            context,
            tokens: TokenManager::new(api),
            resolver: LayerResolver::new(feed),
            injector,
            store,
            enabled: OnceCell::new(),
            org: None,
            token: None,
        }
    }

    /// Integration over the HTTP clients and the file state store
    ///
    /// # Errors
    /// `ConsoleError::AccountApi` if an endpoint URL is invalid.
    pub fn from_endpoints(
        config: ConsoleConfig,
        context: RunContext,
        endpoints: &Endpoints,
    ) -> Result<Self, ConsoleError> {
        let api = HttpAccountApi::new(&endpoints.account_api_url, endpoints.access_key.clone())?;
        let feed = HttpLayerFeed::new(endpoints.layer_registry_url.clone())?;
        Ok(Self::new(
            config,
            context,
            Arc::new(api),
            Arc::new(feed),
            Arc::new(FileStateStore::new()),
        ))
    }

    /// Decide enablement for the run
    ///
    /// Enabled iff the command supports the integration, the configuration
    /// asks for it, and at least one unit has a supported runtime. Later
    /// calls return the first decision.
    pub fn initialize(&self, units: &[ComputeUnit]) -> bool {
        *self.enabled.get_or_init(|| {
            let command = &self.context.command;
            if !command.supports_console() {
                tracing::debug!("Console integration not used by command {}", command);
                return false;
            }
            if !self.config.enabled {
                tracing::debug!("Console integration not enabled in configuration");
                return false;
            }
            if !units.iter().any(ComputeUnit::is_instrumentation_supported) {
                tracing::info!("Console integration skipped: no function has a supported runtime");
                return false;
            }
            tracing::info!(
                "Console integration enabled for {} ({})",
                self.context.service,
                self.context.stage
            );
            true
        })
    }

    /// Whether the integration is enabled; `false` before [`Self::initialize`]
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.get().copied().unwrap_or(false)
    }

    /// Run context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Resolved organization, once a phase needed it
    #[inline]
    #[must_use]
    pub fn organization(&self) -> Option<&Organization> {
        self.org.as_ref()
    }

    /// Token of the run, once acquired or adopted
    #[inline]
    #[must_use]
    pub fn token(&self) -> Option<&IngestionToken> {
        self.token.as_ref()
    }

    /// Pre-package phase
    ///
    /// Returns the injection report, or `None` when disabled. A lifecycle
    /// command with the integration disabled writes a record without a
    /// console block so that it supersedes any record left over from an
    /// earlier package. Other commands leave the package directory alone.
    ///
    /// # Errors
    /// Any fatal condition; units and state are untouched on failure except
    /// that a failed state write leaves the already injected units.
    pub async fn pre_package(
        &mut self,
        units: &mut [ComputeUnit],
    ) -> Result<Option<InjectionReport>, ConsoleError> {
        let enabled = self.require_initialized("pre-package")?;
        let location = self.context.package_dir.clone();

        if !enabled {
            if !self.context.command.supports_console() {
                return Ok(None);
            }
            let state = self.base_state().stamped();
            self.store.write(&location, &state).await?;
            return Ok(None);
        }

        let org = self.ensure_org().await?;
        let token = self.ensure_token(&org.id).await?;

        let leftover = self.store.read(&location).await?;
        reconcile(leftover.as_ref(), &self.intent(Some(&org.id)), Direction::Deploy)?;

        let choice = self.layer_choice().await?;
        let report = self
            .injector
            .inject(units, &choice, &self.settings(&org, &token))?;

        let state = self
            .base_state()
            .with_console(self.console_state(&org, &token))
            .stamped();
        self.store.write(&location, &state).await?;
        tracing::info!("Recorded console state in {}", location.display());

        self.token = Some(token);
        Ok(Some(report))
    }

    /// Pre-deploy phase
    ///
    /// With `package`, the prebuilt package's record is reconciled and its
    /// token adopted. Without it, the token from [`Self::pre_package`] is
    /// used.
    ///
    /// # Errors
    /// - a [`Mismatch`] between the package and the run
    /// - `ConsoleError::PhaseOrder` if nothing prepared a token
    pub async fn pre_deploy(&mut self, package: Option<&Path>) -> Result<(), ConsoleError> {
        let enabled = self.require_initialized("pre-deploy")?;

        let Some(dir) = package else {
            if enabled && self.token.is_none() {
                return Err(ConsoleError::PhaseOrder {
                    phase: "pre-deploy",
                    requirement: "pre-package or a packaged deployment state",
                });
            }
            return Ok(());
        };

        let persisted = self.store.read(dir).await?;
        let org_id = if enabled {
            Some(self.ensure_org().await?.id)
        } else {
            None
        };
        reconcile(persisted.as_ref(), &self.intent(org_id.as_deref()), Direction::Deploy)?;

        if !enabled {
            return Ok(());
        }
        match packaged_console(persisted, Direction::Deploy)? {
            Some(console) => {
                tracing::debug!("Adopting token from package at {}", dir.display());
                self.token = Some(IngestionToken::existing(console.ingestion_token));
                Ok(())
            }
            None => Err(ConsoleError::PhaseOrder {
                phase: "pre-deploy",
                requirement: "a packaged deployment state",
            }),
        }
    }

    /// Pre-deploy phase of a single-function deploy
    ///
    /// Returns the injection report, or `None` when disabled.
    ///
    /// # Errors
    /// Any fatal condition of token acquisition or injection.
    pub async fn pre_deploy_function(
        &mut self,
        unit: &mut ComputeUnit,
    ) -> Result<Option<InjectionReport>, ConsoleError> {
        if !self.require_initialized("pre-deploy-function")? {
            return Ok(None);
        }

        let org = self.ensure_org().await?;
        let token = self.ensure_token(&org.id).await?;
        let choice = self.layer_choice().await?;
        let report = self.injector.inject(
            std::slice::from_mut(unit),
            &choice,
            &self.settings(&org, &token),
        )?;

        self.token = Some(token);
        Ok(Some(report))
    }

    /// Post-deploy phase, after the artifact upload
    ///
    /// Activates the run's token. If `previous` holds the record of the
    /// deployment being replaced and it carried a different token of the same
    /// organization, that token is deactivated afterwards.
    ///
    /// # Errors
    /// - `ConsoleError::PhaseOrder` if no token was prepared
    /// - account API failures
    pub async fn post_deploy(&mut self, previous: Option<&Path>) -> Result<(), ConsoleError> {
        if !self.require_initialized("post-deploy")? {
            return Ok(());
        }

        let mut token = self.token.clone().ok_or(ConsoleError::PhaseOrder {
            phase: "post-deploy",
            requirement: "pre-package, pre-deploy or pre-deploy-function",
        })?;
        let org = self.ensure_org().await?;

        let superseded = match previous {
            Some(dir) => self
                .store
                .read(dir)
                .await?
                .and_then(|state| state.console)
                .filter(|console| console.org_id == org.id && console.ingestion_token != token.value),
            None => None,
        };

        self.tokens.activate_token(&org.id, &mut token).await?;
        self.token = Some(token);

        if let Some(old) = superseded {
            let mut old = IngestionToken::existing(old.ingestion_token);
            tracing::info!("Deactivating superseded token {}", old.redacted());
            self.tokens
                .deactivate_tokens(&org.id, DeactivationMode::Single, Some(&mut old))
                .await?;
        }
        Ok(())
    }

    /// Pre-rollback phase
    ///
    /// `artifact` is the location of the rollback target's record, not the
    /// current working copy. On success the token recorded there is
    /// activated.
    ///
    /// # Errors
    /// - a [`Mismatch`] in the rollback direction; nothing is activated
    /// - account API failures
    pub async fn pre_rollback(&mut self, artifact: &Path) -> Result<(), ConsoleError> {
        let enabled = self.require_initialized("pre-rollback")?;

        let persisted = self.store.read(artifact).await?;
        let org_id = if enabled {
            Some(self.ensure_org().await?.id)
        } else {
            None
        };
        reconcile(persisted.as_ref(), &self.intent(org_id.as_deref()), Direction::Rollback)?;

        let Some(org_id) = org_id else {
            return Ok(());
        };
        let Some(console) = packaged_console(persisted, Direction::Rollback)? else {
            tracing::warn!(
                "No deployment state at {}, skipping token activation",
                artifact.display()
            );
            return Ok(());
        };

        let mut token = IngestionToken::existing(console.ingestion_token);
        self.tokens.activate_token(&org_id, &mut token).await?;
        tracing::info!("Rollback target token {} active", token.redacted());
        self.token = Some(token);
        Ok(())
    }

    /// Pre-remove phase: deactivate every token of the organization
    ///
    /// # Errors
    /// Account API failures.
    pub async fn pre_remove(&mut self) -> Result<(), ConsoleError> {
        if !self.require_initialized("pre-remove")? {
            return Ok(());
        }

        let org = self.ensure_org().await?;
        let mut token = self.token.take();
        let result = self
            .tokens
            .deactivate_tokens(&org.id, DeactivationMode::All, token.as_mut())
            .await;
        self.token = token;
        result
    }

    /// Deactivate every token of the organization except the run's token
    ///
    /// A token is acquired first if the run has none.
    ///
    /// # Errors
    /// Account API failures.
    pub async fn rotate_tokens(&mut self) -> Result<(), ConsoleError> {
        if !self.require_initialized("rotate-tokens")? {
            return Ok(());
        }

        let org = self.ensure_org().await?;
        let mut token = self.ensure_token(&org.id).await?;
        self.tokens
            .deactivate_tokens(&org.id, DeactivationMode::AllOthers, Some(&mut token))
            .await?;
        self.token = Some(token);
        Ok(())
    }

    fn require_initialized(&self, phase: &'static str) -> Result<bool, ConsoleError> {
        self.enabled.get().copied().ok_or(ConsoleError::PhaseOrder {
            phase,
            requirement: "initialize",
        })
    }

    async fn ensure_org(&mut self) -> Result<Organization, ConsoleError> {
        if let Some(org) = &self.org {
            return Ok(org.clone());
        }
        let name = self.context.org_name.as_deref().ok_or_else(|| {
            ConsoleError::Config("console integration requires an `org` in the service definition".to_string())
        })?;
        let org = self.tokens.resolve_organization(name).await?;
        self.org = Some(org.clone());
        Ok(org)
    }

    async fn ensure_token(&self, org_id: &str) -> Result<IngestionToken, ConsoleError> {
        match &self.token {
            Some(token) => Ok(token.clone()),
            None => self.tokens.acquire_token(org_id).await,
        }
    }

    async fn layer_choice(&self) -> Result<LayerChoice, ConsoleError> {
        let resolved = self
            .resolver
            .resolve_latest_layer(&self.context.region, self.config.layer_version.as_deref())
            .await;
        match resolved {
            Ok(layer) => Ok(LayerChoice::Latest(layer)),
            Err(ConsoleError::RegistryUnavailable { reason, transient }) => {
                tracing::warn!("Layer registry unavailable: {}", reason);
                Ok(LayerChoice::KeepAttached { reason, transient })
            }
            Err(e) => Err(e),
        }
    }

    fn intent<'a>(&'a self, org_id: Option<&'a str>) -> CurrentIntent<'a> {
        CurrentIntent {
            schema_version: SUPPORTED_SCHEMA_VERSION,
            org_id,
            region: &self.context.region,
            enabled: self.is_enabled(),
        }
    }

    fn settings(&self, org: &Organization, token: &IngestionToken) -> InstrumentationSettings {
        InstrumentationSettings {
            org_id: org.id.clone(),
            ingestion_token: token.value.clone(),
            service: self.context.service.clone(),
            stage: self.context.stage.clone(),
            monitoring: self.config.monitoring,
        }
    }

    fn base_state(&self) -> PersistedState {
        PersistedState::new(
            self.context.service.clone(),
            self.context.stage.clone(),
            self.context.region.clone(),
        )
    }

    fn console_state(&self, org: &Organization, token: &IngestionToken) -> DeploymentConsoleState {
        DeploymentConsoleState::current(
            token.value.clone(),
            self.context.service.clone(),
            self.context.stage.clone(),
            org.id.clone(),
        )
    }
}

/// Console block of a record read under an enabled run
///
/// A record without a console block means the artifact was built with the
/// integration off, which an enabled run cannot activate.
fn packaged_console(
    persisted: Option<PersistedState>,
    direction: Direction,
) -> Result<Option<DeploymentConsoleState>, ConsoleError> {
    match persisted {
        None => Ok(None),
        Some(state) if state.integration_active() => Ok(state.console),
        Some(_) => Err(
            Mismatch::new(MismatchKind::Activation, direction, "enabled", "disabled").into(),
        ),
    }
}
