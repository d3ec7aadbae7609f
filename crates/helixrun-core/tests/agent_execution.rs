//! Agent variants driven directly against an event sink.

use std::sync::Arc;

use helixrun_core::domain::{object, GraphSpec, Role, StepPhase};
use helixrun_core::{
    project, Agent, AgentBuilder, AgentConfig, AgentRegistry, EventSink, ExecutionError,
    ExecutionEvent, GenerationConfig, GraphExecutor, Invocation, ScriptedModel, ScriptedReply,
    StateGraph, StaticResolver, ToolCatalog,
};
use helixrun_state::SessionKey;
use tokio_util::sync::CancellationToken;

fn registry(model: Arc<ScriptedModel>, configs: &[&str]) -> AgentRegistry {
    let configs: Vec<AgentConfig> = configs
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect();
    AgentRegistry::from_configs(configs)
        .unwrap()
        .with_builder(AgentBuilder::new(
            Arc::new(StaticResolver::new(model)),
            ToolCatalog::builtin(),
        ))
}

fn invocation(agent: &Agent, message: &str) -> Invocation {
    Invocation::new(
        agent.name(),
        "req-1",
        SessionKey::new("helixrun", "tester", "s-1"),
        Vec::new(),
        message,
    )
}

/// Run to completion and collect every emitted event.
async fn run_collect(
    agent: &Agent,
    message: &str,
) -> (Result<helixrun_core::AgentOutput, ExecutionError>, Vec<ExecutionEvent>) {
    let (sink, mut rx) = EventSink::channel(512, CancellationToken::new());
    let result = agent.run(&invocation(agent, message), &sink).await;
    drop(sink);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (result, events)
}

const CHAIN: &str = r#"{
    "id": "writer",
    "type": "multi_chain",
    "model": {"provider": "openai", "model": "m"},
    "multi": {
        "mode": "chain",
        "agents": [
            {"id": "drafter", "instruction": "Draft."},
            {"id": "editor", "instruction": "Edit."}
        ]
    }
}"#;

#[tokio::test]
async fn test_chain_pipes_output_into_next_step() {
    let model = Arc::new(ScriptedModel::sequence(
        "fake",
        vec![
            ScriptedReply::Text("rough draft".into()),
            ScriptedReply::Text("polished".into()),
        ],
    ));
    let agent = registry(Arc::clone(&model), &[CHAIN]).build("writer").unwrap();

    let (result, events) = run_collect(&agent, "write a haiku").await;
    let output = result.unwrap();

    assert_eq!(output.content, "polished");
    assert_eq!(output.usage.total_tokens, 30);

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let second = &requests[1].messages;
    assert_eq!(second[0].role, Role::System);
    assert_eq!(second[0].content, "Edit.");
    assert_eq!(second.last().unwrap().content, "rough draft");

    let authors: Vec<&str> = events.iter().map(|e| e.author.as_str()).collect();
    assert_eq!(authors, vec!["drafter", "editor"]);
    assert!(events
        .iter()
        .all(|e| e.parent_invocation_id.is_some() && e.request_id == "req-1"));
    assert_eq!(events[1].filter_key, "writer/editor");
}

#[tokio::test]
async fn test_chain_step_failure_aborts() {
    let model = Arc::new(ScriptedModel::sequence(
        "fake",
        vec![ScriptedReply::Fail("upstream 500".into())],
    ));
    let agent = registry(Arc::clone(&model), &[CHAIN]).build("writer").unwrap();

    let (result, _) = run_collect(&agent, "hi").await;
    assert!(matches!(result, Err(ExecutionError::Model(_))));
    assert_eq!(model.call_count(), 1);
    assert_eq!(agent.runs(), 0);
}

const FLOW: &str = r#"{
    "id": "flow",
    "type": "graph",
    "model": {"provider": "openai", "model": "m"},
    "graph": {
        "nodes": [
            {"id": "start", "type": "entry"},
            {"id": "answer", "type": "llm", "instruction": "Answer briefly."}
        ],
        "edges": [{"from": "start", "to": "answer"}],
        "entry": "start",
        "finish": "answer"
    }
}"#;

#[tokio::test]
async fn test_graph_event_order() {
    let model = Arc::new(ScriptedModel::replying("fake", "forty two"));
    let agent = registry(model, &[FLOW]).build("flow").unwrap();

    let (result, events) = run_collect(&agent, "meaning of life?").await;
    let output = result.unwrap();
    assert_eq!(output.content, "forty two");
    assert_eq!(agent.runs(), 1);

    let objects: Vec<&str> = events.iter().map(|e| e.object.as_str()).collect();
    assert_eq!(
        objects,
        vec![
            object::GRAPH_PREGEL_STEP,
            object::GRAPH_NODE_START,
            object::GRAPH_NODE_COMPLETE,
            object::GRAPH_PREGEL_STEP,
            object::GRAPH_NODE_START,
            object::CHAT_COMPLETION,
            object::GRAPH_NODE_COMPLETE,
            object::GRAPH_CHANNEL_UPDATE,
            object::GRAPH_CHANNEL_UPDATE,
            object::GRAPH_CHANNEL_UPDATE,
            object::GRAPH_STATE_UPDATE,
            object::GRAPH_EXECUTION,
        ]
    );

    let completion = project(events.last().unwrap());
    assert!(completion.graph_completion);
    assert!(!completion.runner_completion);
    let pregel = completion.pregel_metadata.unwrap();
    assert_eq!(pregel.phase, StepPhase::Complete);
    assert_eq!(pregel.completed_nodes, 2);

    let model_event = project(&events[5]);
    let meta = model_event.model_metadata.unwrap();
    assert_eq!(meta.node_id, "answer");
    assert_eq!(meta.output.as_deref(), Some("forty two"));

    let state = project(&events[10]).state_metadata.unwrap();
    assert_eq!(
        state.updated_keys,
        vec!["last_response", "messages", "node_responses"]
    );
}

#[tokio::test]
async fn test_graph_entry_is_finish_completes_in_one_superstep() {
    let spec = GraphSpec {
        nodes: vec![serde_json::from_str(r#"{"id": "only", "type": "llm"}"#).unwrap()],
        edges: vec![],
        entry: "only".into(),
        finish: "only".into(),
    };
    let config = serde_json::json!({
        "id": "solo",
        "type": "graph",
        "model": {"provider": "openai", "model": "m"},
        "graph": spec,
    })
    .to_string();
    let model = Arc::new(ScriptedModel::replying("fake", "done"));
    let agent = registry(model, &[config.as_str()]).build("solo").unwrap();

    let (result, events) = run_collect(&agent, "go").await;
    assert_eq!(result.unwrap().content, "done");

    let steps = events
        .iter()
        .filter(|e| e.object == object::GRAPH_PREGEL_STEP)
        .count();
    assert_eq!(steps, 1);
    assert!(events.last().unwrap().is_graph_completion());
}

#[tokio::test]
async fn test_graph_cycle_hits_superstep_limit() {
    let config = r#"{
        "id": "loop",
        "type": "graph",
        "model": {"provider": "openai", "model": "m"},
        "graph": {
            "nodes": [
                {"id": "a", "type": "entry"},
                {"id": "b", "type": "entry"},
                {"id": "end", "type": "llm"}
            ],
            "edges": [{"from": "a", "to": "b"}, {"from": "b", "to": "a"}],
            "entry": "a",
            "finish": "end"
        }
    }"#;
    let model = Arc::new(ScriptedModel::replying("fake", "never"));
    let agent = registry(Arc::clone(&model), &[config]).build("loop").unwrap();

    let (result, _) = run_collect(&agent, "spin").await;
    assert!(matches!(result, Err(ExecutionError::SuperstepLimit(100))));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_graph_executor_respects_custom_superstep_bound() {
    let spec: GraphSpec = serde_json::from_value(serde_json::json!({
        "nodes": [
            {"id": "a", "type": "entry"},
            {"id": "b", "type": "entry"},
            {"id": "end", "type": "llm"}
        ],
        "edges": [{"from": "a", "to": "b"}, {"from": "b", "to": "a"}],
        "entry": "a",
        "finish": "end"
    }))
    .unwrap();
    let compiled = StateGraph::from_spec(&spec).unwrap().compile().unwrap();
    let model = Arc::new(ScriptedModel::replying("fake", "never"));
    let executor = GraphExecutor::new(compiled, model.clone(), GenerationConfig::default())
        .with_max_supersteps(3);

    let (sink, mut rx) = EventSink::channel(512, CancellationToken::new());
    let invocation = Invocation::new(
        "loop",
        "req-1",
        SessionKey::new("helixrun", "tester", "s-1"),
        Vec::new(),
        "spin",
    );
    let result = executor.run(&invocation, &sink).await;
    drop(sink);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(result, Err(ExecutionError::SuperstepLimit(3))));
    assert_eq!(model.call_count(), 0);
    assert!(events.iter().all(|e| !e.is_graph_completion()));
}

#[tokio::test]
async fn test_graph_unreached_finish_is_error() {
    let config = r#"{
        "id": "island",
        "type": "graph",
        "model": {"provider": "openai", "model": "m"},
        "graph": {
            "nodes": [
                {"id": "start", "type": "entry"},
                {"id": "end", "type": "llm"}
            ],
            "edges": [],
            "entry": "start",
            "finish": "end"
        }
    }"#;
    let model = Arc::new(ScriptedModel::replying("fake", "unused"));
    let agent = registry(model, &[config]).build("island").unwrap();

    let (result, events) = run_collect(&agent, "hi").await;
    assert!(matches!(result, Err(ExecutionError::FinishNotReached(ref id)) if id == "end"));
    assert!(events.iter().all(|e| !e.is_graph_completion()));
}

#[tokio::test]
async fn test_cancelled_sink_stops_run() {
    let model = Arc::new(ScriptedModel::endless(
        "fake",
        std::time::Duration::from_millis(5),
    ));
    let agent = registry(model, &[FLOW]).build("flow").unwrap();

    let token = CancellationToken::new();
    let (sink, mut rx) = EventSink::channel(4, token.clone());
    let inv = invocation(&agent, "hi");
    let run = async { agent.run(&inv, &sink).await };
    let consume = async {
        let mut seen = 0;
        while rx.recv().await.is_some() {
            seen += 1;
            if seen == 6 {
                token.cancel();
                break;
            }
        }
    };

    let (result, ()) = tokio::join!(run, consume);
    assert!(matches!(result, Err(ExecutionError::Cancelled)));
}
