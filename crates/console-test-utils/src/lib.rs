//! Testing utilities for the console integration workspace
//!
//! Recording fakes for every injected collaborator, fixtures, and a harness
//! that wires them into a [`ConsoleIntegration`].

#![allow(missing_docs)]

use async_trait::async_trait;
use console_client::{AccountApi, ClientError, ClientResult, LayerFeed, LayerIndex, TokenResponse};
use console_core::{ConsoleConfig, ConsoleIntegration, RunContext, StateError, StateStore};
use console_model::{
    Command, ComputeUnit, DeactivationMode, DeploymentConsoleState, PersistedState, Runtime,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TEST_ORG_NAME: &str = "acme";
pub const TEST_ORG_ID: &str = "org-acme";
pub const TEST_SERVICE: &str = "orders";
pub const TEST_STAGE: &str = "dev";
pub const TEST_REGION: &str = "us-east-1";
pub const PACKAGE_DIR: &str = "/work/orders/.serverless";
pub const LATEST_LAYER: &str = "arn:aws:lambda:us-east-1:1:layer:sls-otel-extension-node:12";
pub const STALE_LAYER: &str = "arn:aws:lambda:us-east-1:1:layer:sls-otel-extension-node:9";

/// One call received by [`FakeAccountApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCall {
    ResolveOrg {
        name: String,
    },
    FetchToken {
        org_id: String,
    },
    IssueToken {
        org_id: String,
    },
    Activate {
        org_id: String,
        token: String,
    },
    Deactivate {
        org_id: String,
        mode: DeactivationMode,
        token: Option<String>,
    },
}

/// In-memory account API that records every call in order
#[derive(Debug, Default)]
pub struct FakeAccountApi {
    orgs: BTreeMap<String, String>,
    tokens: Mutex<BTreeMap<String, String>>,
    unauthenticated: bool,
    issued: AtomicUsize,
    calls: Mutex<Vec<AccountCall>>,
}

impl FakeAccountApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake knowing the default test organization
    pub fn with_test_org() -> Self {
        Self::new().with_org(TEST_ORG_NAME, TEST_ORG_ID)
    }

    pub fn with_org(mut self, name: &str, id: &str) -> Self {
        self.orgs.insert(name.to_string(), id.to_string());
        self
    }

    pub fn with_existing_token(self, org_id: &str, token: &str) -> Self {
        self.tokens.lock().insert(org_id.to_string(), token.to_string());
        self
    }

    /// Every call fails as if no credential was configured; nothing is recorded
    pub fn unauthenticated(mut self) -> Self {
        self.unauthenticated = true;
        self
    }

    pub fn calls(&self) -> Vec<AccountCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&AccountCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn activations(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                AccountCall::Activate { token, .. } => Some(token.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deactivations(&self) -> Vec<(DeactivationMode, Option<String>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                AccountCall::Deactivate { mode, token, .. } => Some((*mode, token.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: AccountCall) -> ClientResult<()> {
        if self.unauthenticated {
            return Err(ClientError::NotAuthenticated);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl AccountApi for FakeAccountApi {
    async fn org_id_by_name(&self, name: &str) -> ClientResult<String> {
        self.record(AccountCall::ResolveOrg {
            name: name.to_string(),
        })?;
        self.orgs
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("orgs/name/{name}")))
    }

    async fn fetch_token(&self, org_id: &str) -> ClientResult<Option<TokenResponse>> {
        self.record(AccountCall::FetchToken {
            org_id: org_id.to_string(),
        })?;
        Ok(self
            .tokens
            .lock()
            .get(org_id)
            .map(|t| TokenResponse::with_token("active", t.clone())))
    }

    async fn issue_token(&self, org_id: &str) -> ClientResult<TokenResponse> {
        self.record(AccountCall::IssueToken {
            org_id: org_id.to_string(),
        })?;
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("issued-token-{n}");
        self.tokens.lock().insert(org_id.to_string(), token.clone());
        Ok(TokenResponse::with_token("created", token))
    }

    async fn activate_token(&self, org_id: &str, token: &str) -> ClientResult<()> {
        self.record(AccountCall::Activate {
            org_id: org_id.to_string(),
            token: token.to_string(),
        })
    }

    async fn deactivate_tokens(
        &self,
        org_id: &str,
        mode: DeactivationMode,
        token: Option<&str>,
    ) -> ClientResult<()> {
        self.record(AccountCall::Deactivate {
            org_id: org_id.to_string(),
            mode,
            token: token.map(str::to_string),
        })
    }
}

/// Layer registry feed serving a fixed index
#[derive(Debug)]
pub struct StaticLayerFeed {
    index: Option<LayerIndex>,
    failure: Option<u16>,
    fetches: AtomicUsize,
}

impl StaticLayerFeed {
    /// Feed with an empty index
    pub fn new() -> Self {
        Self {
            index: Some(LayerIndex::new()),
            failure: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Feed with the default test layer published for the default region
    pub fn with_latest() -> Self {
        Self::new().with_layer(TEST_REGION, "1.2.0", LATEST_LAYER)
    }

    /// Feed whose document does not exist
    pub fn missing() -> Self {
        Self {
            index: None,
            ..Self::new()
        }
    }

    /// Feed answering every fetch with `status`
    pub fn failing(status: u16) -> Self {
        Self {
            failure: Some(status),
            ..Self::new()
        }
    }

    pub fn with_layer(mut self, region: &str, version: &str, layer: &str) -> Self {
        self.index
            .get_or_insert_with(LayerIndex::new)
            .entry(region.to_string())
            .or_default()
            .insert(version.to_string(), layer.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for StaticLayerFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerFeed for StaticLayerFeed {
    async fn fetch_index(&self) -> ClientResult<Option<LayerIndex>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failure {
            return Err(ClientError::Api {
                status,
                message: "registry failure".to_string(),
            });
        }
        Ok(self.index.clone())
    }
}

/// State store keyed by location, kept in memory
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<PathBuf, PersistedState>>,
    writes: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a record without counting it as a write
    pub fn seed(&self, location: impl Into<PathBuf>, state: PersistedState) {
        self.records.lock().insert(location.into(), state);
    }

    pub fn get(&self, location: impl AsRef<Path>) -> Option<PersistedState> {
        self.records.lock().get(location.as_ref()).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read(&self, location: &Path) -> Result<Option<PersistedState>, StateError> {
        Ok(self.get(location))
    }

    async fn write(&self, location: &Path, state: &PersistedState) -> Result<(), StateError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .insert(location.to_path_buf(), state.clone());
        Ok(())
    }
}

pub fn node_unit(id: &str) -> ComputeUnit {
    ComputeUnit::new(id, Runtime::new("nodejs18.x"))
}

/// Unit with a statically compiled runtime
pub fn go_unit() -> ComputeUnit {
    ComputeUnit::new("fnGo", Runtime::new("go1.x"))
}

pub fn run_context(command: Command) -> RunContext {
    RunContext::new(command, TEST_SERVICE, TEST_STAGE, TEST_REGION)
        .with_org(TEST_ORG_NAME)
        .with_package_dir(PACKAGE_DIR)
}

/// Record an enabled package of the test service would have written
pub fn console_state(token: &str, org_id: &str, region: &str) -> PersistedState {
    PersistedState::new(TEST_SERVICE, TEST_STAGE, region).with_console(
        DeploymentConsoleState::current(token, TEST_SERVICE, TEST_STAGE, org_id),
    )
}

/// Integration wired to recording fakes
#[derive(Debug)]
pub struct Harness {
    pub api: Arc<FakeAccountApi>,
    pub feed: Arc<StaticLayerFeed>,
    pub store: Arc<MemoryStateStore>,
    pub console: ConsoleIntegration,
}

impl Harness {
    /// Enabled integration for `command` against the test organization
    pub fn new(command: Command) -> Self {
        Self::builder(command).build()
    }

    pub fn builder(command: Command) -> HarnessBuilder {
        HarnessBuilder {
            config: ConsoleConfig::enabled(),
            context: run_context(command),
            api: FakeAccountApi::with_test_org(),
            feed: StaticLayerFeed::with_latest(),
            store: Arc::new(MemoryStateStore::new()),
        }
    }
}

#[derive(Debug)]
pub struct HarnessBuilder {
    config: ConsoleConfig,
    context: RunContext,
    api: FakeAccountApi,
    feed: StaticLayerFeed,
    store: Arc<MemoryStateStore>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: ConsoleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    pub fn api(mut self, api: FakeAccountApi) -> Self {
        self.api = api;
        self
    }

    pub fn feed(mut self, feed: StaticLayerFeed) -> Self {
        self.feed = feed;
        self
    }

    /// Share a store with another harness, e.g. a package run and a later
    /// deploy run
    pub fn store(mut self, store: Arc<MemoryStateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> Harness {
        let api = Arc::new(self.api);
        let feed = Arc::new(self.feed);
        let console = ConsoleIntegration::new(
            self.config,
            self.context,
            api.clone(),
            feed.clone(),
            self.store.clone(),
        );
        Harness {
            api,
            feed,
            store: self.store,
            console,
        }
    }
}
