use async_trait::async_trait;
use diag_orchestrator::{
    CapabilityRegistry, Event, MockEmbedder, MockLlmClient, MockVectorStore, OrchestratorBuilder,
    OrchestratorConfig, TurnState,
};
use std::collections::HashMap;
use std::sync::Arc;

const REGISTRY_TOML: &str = r#"
    [[capability]]
    name = "check_tcp_health"
    description = "Probe a TCP endpoint"
    category = "network"
    timeout_seconds = 5
    mutating = false

    [[capability.parameters]]
    name = "host"
    type = "string"
    required = true

    [[capability.parameters]]
    name = "port"
    type = "int"
    required = true
"#;

struct StubTcpHealth;

#[async_trait]
impl diag_orchestrator::Capability for StubTcpHealth {
    async fn execute(&self, _params: HashMap<String, serde_json::Value>) -> Result<String, String> {
        Ok(serde_json::json!({"reachable": true, "latency_ms": 12}).to_string())
    }
}

fn build_orchestrator(llm_replies: Vec<String>) -> diag_orchestrator::Orchestrator {
    let registry = CapabilityRegistry::from_toml_str(REGISTRY_TOML).unwrap();
    let llm = Arc::new(MockLlmClient::new(llm_replies));

    OrchestratorBuilder::new()
        .config(OrchestratorConfig {
            history_cap: 4,
            ..Default::default()
        })
        .registry(registry)
        .capability("check_tcp_health", Box::new(StubTcpHealth))
        .llm(llm)
        .embedder(Box::new(MockEmbedder))
        .vector_store(Box::new(MockVectorStore::new(Vec::new())))
        .build()
        .unwrap()
}

#[tokio::test]
async fn processes_a_turn_that_calls_one_capability() {
    let reply = serde_json::json!({
        "reasoning": "operator wants to know if the endpoint is up",
        "execution_strategy": "stop_on_error",
        "functions": [{"name": "check_tcp_health", "params": {"host": "10.0.0.1", "port": 443}}],
        "explanation": "The endpoint at 10.0.0.1:443 is reachable."
    })
    .to_string();

    let mut orchestrator = build_orchestrator(vec![reply]);
    let event = orchestrator
        .process("is the payments service reachable on 443")
        .await;

    assert_eq!(event.state, TurnState::Ok);
    assert_eq!(event.all_results.len(), 1);
    assert!(event.all_results[0].success);
    assert_eq!(event.chunks_found, 0);
    assert!(event.final_answer.contains("operator wants to know"));
    assert!(event.final_answer.contains("check_tcp_health"));
    assert!(event.final_answer.contains("The endpoint at 10.0.0.1:443 is reachable."));
}

#[tokio::test]
async fn rejects_query_that_is_too_short() {
    let mut orchestrator = build_orchestrator(vec!["{}".to_string()]);
    let event = orchestrator.process("hi").await;
    assert_eq!(event.state, TurnState::Error);
    assert!(event.error.unwrap().contains("too short"));
}

#[tokio::test]
async fn invalid_llm_reply_degrades_to_raw_reply_as_final_answer() {
    let mut orchestrator = build_orchestrator(vec!["not json at all".to_string()]);
    let event = orchestrator
        .process("why does the link keep flapping")
        .await;
    assert_eq!(event.state, TurnState::Error);
    assert_eq!(event.final_answer, "not json at all");
}

#[tokio::test]
async fn plan_referencing_unknown_capability_degrades_to_raw_reply() {
    let reply = serde_json::json!({
        "reasoning": "x",
        "execution_strategy": "stop_on_error",
        "functions": [{"name": "reboot_the_datacenter", "params": {}}],
        "explanation": "x"
    })
    .to_string();

    let mut orchestrator = build_orchestrator(vec![reply.clone()]);
    let event = orchestrator.process("please fix everything").await;
    assert_eq!(event.state, TurnState::Error);
    assert_eq!(event.final_answer, reply);
}

#[tokio::test]
async fn conversation_history_is_capped_across_turns() {
    let reply = |explanation: &str| {
        serde_json::json!({
            "reasoning": "x",
            "execution_strategy": "stop_on_error",
            "functions": [],
            "explanation": explanation
        })
        .to_string()
    };

    let mut orchestrator = build_orchestrator(vec![
        reply("first answer"),
        reply("second answer"),
        reply("third answer"),
    ]);

    for query in ["why is latency high right now", "and what about packet loss", "summarize the incident please"] {
        let event = orchestrator.process(query).await;
        assert_eq!(event.state, TurnState::Ok);
    }
}
