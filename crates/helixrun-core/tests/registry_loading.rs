//! Agent registry loading and per-request construction.

use std::fs;
use std::sync::Arc;

use helixrun_core::{
    Agent, AgentBuilder, AgentKind, AgentRegistry, BuildError, ConfigError, EventSink,
    Invocation, ScriptedModel, SessionKey, StaticResolver, ToolCatalog,
};
use tokio_util::sync::CancellationToken;

const CALC_BOT: &str = r#"{
    "id": "calc-bot",
    "type": "single",
    "instruction": "Use the calculator.",
    "model": {"provider": "openai", "model": "gpt-4o-mini"},
    "tools": [{"type": "calculator"}]
}"#;

const WRITER: &str = r#"{
    "type": "multi_chain",
    "model": {"provider": "openai", "model": "gpt-4o-mini"},
    "multi": {
        "mode": "chain",
        "agents": [
            {"id": "drafter", "instruction": "Draft."},
            {"id": "editor", "instruction": "Edit."}
        ]
    }
}"#;

fn scripted_builder() -> AgentBuilder {
    let model = Arc::new(ScriptedModel::replying("fake", "ok"));
    AgentBuilder::new(Arc::new(StaticResolver::new(model)), ToolCatalog::builtin())
}

#[test]
fn test_load_dir_sorted_and_id_defaults_to_stem() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("calc.json"), CALC_BOT).unwrap();
    fs::write(dir.path().join("writer.json"), WRITER).unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let registry = AgentRegistry::load_dir(dir.path()).unwrap();

    assert_eq!(registry.list_agent_ids(), vec!["calc-bot", "writer"]);
    assert_eq!(registry.spec("writer").unwrap().kind(), AgentKind::Chain);
}

#[test]
fn test_load_dir_empty_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AgentRegistry::load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Empty(_)));
}

#[test]
fn test_load_dir_missing_dir_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AgentRegistry::load_dir(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadDir { .. }));
}

#[test]
fn test_load_dir_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    let err = AgentRegistry::load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_load_dir_rejects_duplicate_ids() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.json"), CALC_BOT).unwrap();
    fs::write(dir.path().join("b.json"), CALC_BOT).unwrap();

    let err = AgentRegistry::load_dir(dir.path()).unwrap_err();
    assert_eq!(err.to_string(), "duplicate agent ID: calc-bot");
}

#[test]
fn test_build_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("calc.json"), CALC_BOT).unwrap();
    let registry = AgentRegistry::load_dir(dir.path())
        .unwrap()
        .with_builder(scripted_builder());

    let err = registry.build("ghost").unwrap_err();
    assert!(matches!(err, BuildError::NotFound(ref id) if id == "ghost"));
    assert_eq!(err.to_string(), "unknown agent ID: ghost");
}

#[tokio::test]
async fn test_build_returns_independent_instances() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("calc.json"), CALC_BOT).unwrap();
    let registry = AgentRegistry::load_dir(dir.path())
        .unwrap()
        .with_builder(scripted_builder());

    let first = registry.build("calc-bot").unwrap();
    let second = registry.build("calc-bot").unwrap();
    assert_eq!(first.kind(), AgentKind::Single);
    assert_eq!(first.name(), "calc-bot");

    let (sink, mut rx) = EventSink::channel(64, CancellationToken::new());
    let invocation = Invocation::new(
        first.name(),
        "req-1",
        SessionKey::new("helixrun", "tester", "s-1"),
        Vec::new(),
        "add 2 and 3",
    );
    let output = first.run(&invocation, &sink).await.unwrap();
    drop(sink);
    while rx.recv().await.is_some() {}

    assert_eq!(output.content, "ok");
    assert_eq!(first.runs(), 1);
    assert_eq!(second.runs(), 0);

    // each build instantiates its own tools
    let (Agent::Single(first), Agent::Single(second)) = (&first, &second) else {
        panic!("expected single agents");
    };
    let first_calc = first.tools().get("calculator").unwrap();
    let second_calc = second.tools().get("calculator").unwrap();
    assert!(!Arc::ptr_eq(first_calc, second_calc));
}

#[test]
fn test_validate_reports_unknown_tool() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("calc.json"), CALC_BOT).unwrap();
    fs::write(
        dir.path().join("searcher.json"),
        r#"{"type": "single", "model": {"provider": "openai", "model": "m"},
            "tools": [{"type": "web_search"}]}"#,
    )
    .unwrap();
    let registry = AgentRegistry::load_dir(dir.path())
        .unwrap()
        .with_builder(scripted_builder());

    let failures = registry.validate();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "searcher");
    assert!(matches!(failures[0].1, BuildError::UnknownTool(_)));
}

#[test]
fn test_graph_reference_errors_surface_at_build() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("flow.json"),
        r#"{"type": "graph", "model": {"provider": "openai", "model": "m"},
            "graph": {
                "nodes": [{"id": "start", "type": "entry"}],
                "edges": [{"from": "start", "to": "missing"}],
                "entry": "start",
                "finish": "start"
            }}"#,
    )
    .unwrap();
    let registry = AgentRegistry::load_dir(dir.path())
        .unwrap()
        .with_builder(scripted_builder());

    let err = registry.build("flow").unwrap_err();
    assert!(matches!(err, BuildError::Compile(_)));
}

#[test]
fn test_default_resolver_requires_credential() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("calc.json"),
        r#"{"type": "single",
            "model": {"provider": "openai", "model": "m", "api_key_env": "HELIXRUN_TEST_UNSET_KEY"}}"#,
    )
    .unwrap();
    let registry = AgentRegistry::load_dir(dir.path()).unwrap();

    let err = registry.build("calc").unwrap_err();
    assert!(matches!(err, BuildError::MissingCredential(_)));
}

#[test]
fn test_shipped_demo_configs_load() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/agents");
    let registry = AgentRegistry::load_dir(dir)
        .unwrap()
        .with_builder(scripted_builder());

    assert_eq!(
        registry.list_agent_ids(),
        vec!["calc-bot", "research-graph", "writer-chain"]
    );
    assert!(registry.validate().is_empty());
    assert_eq!(registry.build("research-graph").unwrap().kind(), AgentKind::Graph);
}
