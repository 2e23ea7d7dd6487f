//! Lifecycle tests for the console integration
//!
//! Each test drives a `ConsoleIntegration` through its phases against the
//! recording fakes and checks what reached the account API and the store.

use console_core::{ConsoleConfig, EXEC_WRAPPER_ENV_VAR, SETTINGS_ENV_VAR};
use console_model::{Command, DeactivationMode, LayerReference, TokenStatus};
use console_test_utils::{
    console_state, go_unit, node_unit, run_context, AccountCall, FakeAccountApi, Harness,
    MemoryStateStore, StaticLayerFeed, LATEST_LAYER, PACKAGE_DIR, STALE_LAYER, TEST_ORG_ID,
    TEST_REGION,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

fn layer_names(unit: &console_model::ComputeUnit) -> Vec<&str> {
    unit.layers.iter().map(LayerReference::as_str).collect()
}

// ============================================================================
// Injection
// ============================================================================

#[tokio::test]
async fn unsupported_units_are_never_touched() {
    let mut h = Harness::new(Command::Deploy);
    let go = go_unit().with_layer("other").with_env("KEEP", "1");
    let mut units = vec![node_unit("api"), go.clone()];

    assert!(h.console.initialize(&units));
    h.console.pre_package(&mut units).await.unwrap();

    assert_eq!(units[1], go);
    assert!(units[0].environment.contains_key(SETTINGS_ENV_VAR));
    assert!(units[0].environment.contains_key(EXEC_WRAPPER_ENV_VAR));
}

#[tokio::test]
async fn python_functions_get_no_node_agent() {
    let mut h = Harness::new(Command::Deploy);
    let python =
        console_model::ComputeUnit::new("worker", console_model::Runtime::new("python3.11"));
    let mut units = vec![node_unit("api"), python.clone()];

    assert!(h.console.initialize(&units));
    let report = h.console.pre_package(&mut units).await.unwrap().unwrap();

    assert_eq!(report.skipped, vec!["worker"]);
    assert_eq!(units[1], python);
}

#[tokio::test]
async fn python_only_service_is_not_enabled() {
    let mut h = Harness::new(Command::Deploy);
    let mut units = vec![console_model::ComputeUnit::new(
        "worker",
        console_model::Runtime::new("python3.11"),
    )];

    assert!(!h.console.initialize(&units));
    h.console.pre_package(&mut units).await.unwrap();

    assert!(units[0].environment.is_empty());
    assert!(units[0].layers.is_empty());
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn repackaging_never_duplicates_the_layer() {
    let store = Arc::new(MemoryStateStore::new());
    let mut units = vec![node_unit("api").with_layer("shared").with_layer(STALE_LAYER)];

    for _ in 0..2 {
        let mut h = Harness::builder(Command::Package).store(store.clone()).build();
        assert!(h.console.initialize(&units));
        h.console.pre_package(&mut units).await.unwrap();
        assert_eq!(layer_names(&units[0]), vec!["shared", LATEST_LAYER]);
    }
    assert_eq!(store.write_count(), 2);
}

#[tokio::test]
async fn unrelated_layer_survives_in_any_order() {
    let feed = || StaticLayerFeed::new().with_layer(TEST_REGION, "1.0.0", "latest-layer-arn");
    let config = ConsoleConfig {
        layer_family: "sls-otel-extension".to_string(),
        ..ConsoleConfig::enabled()
    };

    for existing in [vec!["other-layer"], vec!["latest-layer-arn", "other-layer"]] {
        let mut unit = node_unit("api");
        for layer in existing {
            unit = unit.with_layer(layer);
        }
        let mut units = vec![unit];

        let mut h = Harness::builder(Command::Deploy)
            .config(config.clone())
            .feed(feed())
            .build();
        h.console.initialize(&units);
        h.console.pre_package(&mut units).await.unwrap();

        let mut names = layer_names(&units[0]);
        names.sort_unstable();
        assert_eq!(names, vec!["latest-layer-arn", "other-layer"]);
    }
}

#[tokio::test]
async fn over_capacity_fails_before_any_write() {
    let mut h = Harness::new(Command::Deploy);
    let mut unit = node_unit("api");
    for i in 0..=console_core::DEFAULT_LAYER_CAPACITY {
        unit = unit.with_layer(format!("layer-{i}"));
    }
    let before = unit.clone();
    let mut units = vec![unit];

    h.console.initialize(&units);
    let err = h.console.pre_package(&mut units).await.unwrap_err();

    assert_eq!(err.code(), "TOO_MANY_LAYERS_TO_SETUP_CONSOLE");
    assert_eq!(units[0], before);
    assert_eq!(h.store.write_count(), 0);
    assert!(h.api.activations().is_empty());
}

#[tokio::test]
async fn monitoring_overrides_reach_the_settings_variable() {
    let config: ConsoleConfig =
        serde_yaml::from_str("monitoring:\n  logs:\n    disabled: true\n").unwrap();
    let mut h = Harness::builder(Command::Deploy).config(config).build();
    let mut units = vec![node_unit("api")];

    h.console.initialize(&units);
    h.console.pre_package(&mut units).await.unwrap();

    let settings: serde_json::Value =
        serde_json::from_str(&units[0].environment[SETTINGS_ENV_VAR]).unwrap();
    assert_eq!(settings["orgId"], TEST_ORG_ID);
    assert_eq!(settings["ingestionToken"], "issued-token-1");
    assert_eq!(settings["service"], "orders");
    assert_eq!(settings["monitoring"]["logs"]["disabled"], true);
    assert_eq!(settings["monitoring"]["request"]["disabled"], false);
}

// ============================================================================
// Registry degradation
// ============================================================================

#[tokio::test]
async fn missing_registry_keeps_attached_layer() {
    let mut h = Harness::builder(Command::Deploy)
        .feed(StaticLayerFeed::missing())
        .build();
    let mut units = vec![node_unit("api").with_layer(STALE_LAYER)];

    h.console.initialize(&units);
    h.console.pre_package(&mut units).await.unwrap();

    assert_eq!(layer_names(&units[0]), vec![STALE_LAYER]);
    assert!(units[0].environment.contains_key(SETTINGS_ENV_VAR));
}

#[tokio::test]
async fn registry_failure_without_attached_layer_is_fatal() {
    let mut h = Harness::builder(Command::Deploy)
        .feed(StaticLayerFeed::failing(503))
        .build();
    let mut units = vec![node_unit("api")];

    h.console.initialize(&units);
    let err = h.console.pre_package(&mut units).await.unwrap_err();

    assert_eq!(err.code(), "CONSOLE_REGISTRY_UNAVAILABLE");
    assert!(err.is_transient());
    assert!(units[0].environment.is_empty());
    assert_eq!(h.store.write_count(), 0);
}

// ============================================================================
// Deploy
// ============================================================================

#[tokio::test]
async fn deploy_activates_then_retires_superseded_token() {
    let mut h = Harness::new(Command::Deploy);
    let previous = Path::new("/deployed/orders");
    h.store
        .seed(previous, console_state("old-token", TEST_ORG_ID, TEST_REGION));
    let mut units = vec![node_unit("api")];

    h.console.initialize(&units);
    h.console.pre_package(&mut units).await.unwrap();
    h.console.pre_deploy(None).await.unwrap();
    h.console.post_deploy(Some(previous)).await.unwrap();

    assert_eq!(
        h.api.calls(),
        vec![
            AccountCall::ResolveOrg {
                name: "acme".to_string()
            },
            AccountCall::FetchToken {
                org_id: TEST_ORG_ID.to_string()
            },
            AccountCall::IssueToken {
                org_id: TEST_ORG_ID.to_string()
            },
            AccountCall::Activate {
                org_id: TEST_ORG_ID.to_string(),
                token: "issued-token-1".to_string()
            },
            AccountCall::Deactivate {
                org_id: TEST_ORG_ID.to_string(),
                mode: DeactivationMode::Single,
                token: Some("old-token".to_string())
            },
        ]
    );
    assert_eq!(h.console.token().unwrap().status, TokenStatus::Activated);
}

#[tokio::test]
async fn redeploy_with_same_token_deactivates_nothing() {
    let api = FakeAccountApi::with_test_org().with_existing_token(TEST_ORG_ID, "same");
    let mut h = Harness::builder(Command::Deploy).api(api).build();
    h.store
        .seed(PACKAGE_DIR, console_state("same", TEST_ORG_ID, TEST_REGION));
    let mut units = vec![node_unit("api")];

    h.console.initialize(&units);
    h.console.pre_package(&mut units).await.unwrap();
    h.console.post_deploy(Some(Path::new(PACKAGE_DIR))).await.unwrap();

    assert_eq!(h.api.activations(), vec!["same"]);
    assert!(h.api.deactivations().is_empty());
}

#[tokio::test]
async fn prebuilt_package_token_is_activated() {
    let store = Arc::new(MemoryStateStore::new());
    let mut units = vec![node_unit("api")];

    let mut package = Harness::builder(Command::Package).store(store.clone()).build();
    package.console.initialize(&units);
    package.console.pre_package(&mut units).await.unwrap();

    let mut deploy = Harness::builder(Command::Deploy)
        .api(FakeAccountApi::with_test_org().with_existing_token(TEST_ORG_ID, "current"))
        .store(store)
        .build();
    deploy.console.initialize(&units);
    deploy.console.pre_deploy(Some(Path::new(PACKAGE_DIR))).await.unwrap();
    deploy.console.post_deploy(None).await.unwrap();

    // The token baked into the package wins over the org's current token.
    assert_eq!(deploy.api.activations(), vec!["issued-token-1"]);
}

#[tokio::test]
async fn package_for_another_org_is_rejected_before_activation() {
    let mut h = Harness::new(Command::Deploy);
    h.store
        .seed(PACKAGE_DIR, console_state("tok", "org-other", TEST_REGION));
    let units = vec![node_unit("api")];

    h.console.initialize(&units);
    let err = h
        .console
        .pre_deploy(Some(Path::new(PACKAGE_DIR)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONSOLE_ORG_MISMATCH");

    let err = h.console.post_deploy(None).await.unwrap_err();
    assert_eq!(err.code(), "CONSOLE_PHASE_ORDER");
    assert!(h.api.activations().is_empty());
}

#[tokio::test]
async fn package_for_another_region_is_rejected() {
    let mut h = Harness::new(Command::Deploy);
    h.store
        .seed(PACKAGE_DIR, console_state("tok", TEST_ORG_ID, "eu-west-1"));
    let units = vec![node_unit("api")];

    h.console.initialize(&units);
    let err = h
        .console
        .pre_deploy(Some(Path::new(PACKAGE_DIR)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONSOLE_REGION_MISMATCH");
}

#[tokio::test]
async fn disabled_deploy_of_instrumented_package_is_rejected() {
    let mut h = Harness::builder(Command::Deploy)
        .config(ConsoleConfig::disabled())
        .build();
    h.store
        .seed(PACKAGE_DIR, console_state("tok", TEST_ORG_ID, TEST_REGION));

    assert!(!h.console.initialize(&[node_unit("api")]));
    let err = h
        .console
        .pre_deploy(Some(Path::new(PACKAGE_DIR)))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CONSOLE_ACTIVATION_MISMATCH");
    h.console.post_deploy(None).await.unwrap();
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn enabled_deploy_of_plain_package_is_rejected() {
    let mut h = Harness::new(Command::Deploy);
    h.store.seed(
        PACKAGE_DIR,
        console_model::PersistedState::new("orders", "dev", TEST_REGION),
    );

    h.console.initialize(&[node_unit("api")]);
    let err = h
        .console
        .pre_deploy(Some(Path::new(PACKAGE_DIR)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONSOLE_ACTIVATION_MISMATCH");

    let err = h.console.post_deploy(None).await.unwrap_err();
    assert_eq!(err.code(), "CONSOLE_PHASE_ORDER");
    assert!(h.api.activations().is_empty());
}

#[tokio::test]
async fn post_deploy_without_prepared_token_is_rejected() {
    let mut h = Harness::new(Command::Deploy);
    h.console.initialize(&[node_unit("api")]);

    let err = h.console.post_deploy(None).await.unwrap_err();
    assert_eq!(err.code(), "CONSOLE_PHASE_ORDER");
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn single_function_deploy() {
    let mut h = Harness::new(Command::DeployFunction);
    let mut unit = node_unit("api").with_layer(STALE_LAYER);

    h.console.initialize(std::slice::from_ref(&unit));
    let report = h.console.pre_deploy_function(&mut unit).await.unwrap().unwrap();
    h.console.post_deploy(None).await.unwrap();

    assert_eq!(report.instrumented, vec!["api"]);
    assert_eq!(layer_names(&unit), vec![LATEST_LAYER]);
    assert_eq!(h.api.activations(), vec!["issued-token-1"]);
    assert_eq!(h.store.write_count(), 0);
}

// ============================================================================
// Rollback
// ============================================================================

#[tokio::test]
async fn rollback_activates_the_artifact_token() {
    let mut h = Harness::new(Command::Rollback);
    let artifact = Path::new("/artifacts/1700000000");
    // Region differences are not checked when rolling back.
    h.store
        .seed(artifact, console_state("rollback-token", TEST_ORG_ID, "eu-west-1"));

    h.console.initialize(&[node_unit("api")]);
    h.console.pre_rollback(artifact).await.unwrap();

    assert_eq!(h.api.activations(), vec!["rollback-token"]);
}

#[tokio::test]
async fn rollback_to_other_schema_issues_no_activation() {
    let mut h = Harness::new(Command::Rollback);
    let artifact = Path::new("/artifacts/1600000000");
    let mut state = console_state("old", TEST_ORG_ID, TEST_REGION);
    if let Some(console) = state.console.as_mut() {
        console.schema_version = "0".to_string();
    }
    h.store.seed(artifact, state);

    h.console.initialize(&[node_unit("api")]);
    let err = h.console.pre_rollback(artifact).await.unwrap_err();

    assert_eq!(err.code(), "CONSOLE_INTEGRATION_MISMATCH_ROLLBACK");
    assert_eq!(h.api.count(|c| matches!(c, AccountCall::Activate { .. })), 0);
}

#[tokio::test]
async fn rollback_to_other_org_is_rejected() {
    let mut h = Harness::new(Command::Rollback);
    let artifact = Path::new("/artifacts/other-org");
    h.store
        .seed(artifact, console_state("foreign", "org-other", TEST_REGION));

    h.console.initialize(&[node_unit("api")]);
    let err = h.console.pre_rollback(artifact).await.unwrap_err();

    assert_eq!(err.code(), "CONSOLE_ORG_MISMATCH_ROLLBACK");
    assert!(h.api.activations().is_empty());
    assert!(h.console.token().is_none());
}

#[tokio::test]
async fn rollback_to_plain_artifact_with_console_enabled_is_rejected() {
    let mut h = Harness::new(Command::Rollback);
    let artifact = Path::new("/artifacts/plain");
    h.store.seed(
        artifact,
        console_model::PersistedState::new("orders", "dev", TEST_REGION),
    );

    h.console.initialize(&[node_unit("api")]);
    let err = h.console.pre_rollback(artifact).await.unwrap_err();

    assert_eq!(err.code(), "CONSOLE_ACTIVATION_MISMATCH_ROLLBACK");
    assert!(h.api.activations().is_empty());
}

#[tokio::test]
async fn disabled_rollback_to_instrumented_artifact_is_rejected() {
    let mut h = Harness::builder(Command::Rollback)
        .config(ConsoleConfig::disabled())
        .build();
    let artifact = Path::new("/artifacts/instrumented");
    h.store
        .seed(artifact, console_state("tok", TEST_ORG_ID, TEST_REGION));

    assert!(!h.console.initialize(&[node_unit("api")]));
    let err = h.console.pre_rollback(artifact).await.unwrap_err();

    assert_eq!(err.code(), "CONSOLE_ACTIVATION_MISMATCH_ROLLBACK");
    assert!(h.api.calls().is_empty());
}

// ============================================================================
// Remove and rotation
// ============================================================================

#[tokio::test]
async fn remove_deactivates_all_tokens_once() {
    let mut h = Harness::new(Command::Remove);
    let units: Vec<_> = (0..5).map(|i| node_unit(&format!("fn{i}"))).collect();

    h.console.initialize(&units);
    h.console.pre_remove().await.unwrap();

    assert_eq!(h.api.deactivations(), vec![(DeactivationMode::All, None)]);
    assert_eq!(
        h.api.count(|c| matches!(c, AccountCall::Deactivate { .. })),
        1
    );
}

#[tokio::test]
async fn rotation_keeps_the_current_token() {
    let api = FakeAccountApi::with_test_org().with_existing_token(TEST_ORG_ID, "keep-me");
    let mut h = Harness::builder(Command::Deploy).api(api).build();

    h.console.initialize(&[node_unit("api")]);
    h.console.rotate_tokens().await.unwrap();

    assert_eq!(
        h.api.deactivations(),
        vec![(DeactivationMode::AllOthers, Some("keep-me".to_string()))]
    );
}

// ============================================================================
// Enablement and authentication
// ============================================================================

#[tokio::test]
async fn introspection_command_makes_no_calls() {
    let mut h = Harness::new(Command::Other("print".to_string()));
    let mut units = vec![node_unit("api")];

    assert!(!h.console.initialize(&units));
    assert!(!h.console.is_enabled());
    assert!(h.console.pre_package(&mut units).await.unwrap().is_none());
    h.console.pre_deploy(None).await.unwrap();
    h.console.post_deploy(None).await.unwrap();
    h.console.pre_remove().await.unwrap();

    assert!(h.api.calls().is_empty());
    assert_eq!(h.feed.fetch_count(), 0);
    assert_eq!(h.store.write_count(), 0);
    assert!(units[0].environment.is_empty());
}

#[tokio::test]
async fn missing_opt_in_makes_no_calls() {
    let mut h = Harness::builder(Command::Deploy)
        .config(ConsoleConfig::disabled())
        .build();
    let mut units = vec![node_unit("api")];

    assert!(!h.console.initialize(&units));
    h.console.pre_package(&mut units).await.unwrap();
    h.console.post_deploy(None).await.unwrap();

    assert!(h.api.calls().is_empty());
    let record = h.store.get(PACKAGE_DIR).unwrap();
    assert!(record.console.is_none());
}

#[tokio::test]
async fn enablement_is_decided_once() {
    let h = Harness::new(Command::Deploy);
    assert!(!h.console.initialize(&[go_unit()]));
    assert!(!h.console.initialize(&[node_unit("api")]));
    assert!(!h.console.is_enabled());
}

#[tokio::test]
async fn unauthenticated_run_aborts_before_mutation() {
    let mut h = Harness::builder(Command::Deploy)
        .api(FakeAccountApi::with_test_org().unauthenticated())
        .build();
    let mut units = vec![node_unit("api")];

    h.console.initialize(&units);
    let err = h.console.pre_package(&mut units).await.unwrap_err();

    assert_eq!(err.code(), "CONSOLE_NOT_AUTHENTICATED");
    assert!(units[0].environment.is_empty());
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn missing_org_name_is_a_configuration_error() {
    let mut context = run_context(Command::Deploy);
    context.org_name = None;
    let mut h = Harness::builder(Command::Deploy).context(context).build();
    let mut units = vec![node_unit("api")];

    h.console.initialize(&units);
    let err = h.console.pre_package(&mut units).await.unwrap_err();
    assert_eq!(err.code(), "CONSOLE_CONFIGURATION_ERROR");
    assert!(h.api.calls().is_empty());
}
