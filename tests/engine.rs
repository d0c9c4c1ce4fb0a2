//! End-to-end engine tests: spec text in, compiled graph, run against
//! scripted collaborators.

use std::{
    fs,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use specflow::{
    EngineBuilder, LlmClient, ResourceHandle, ResourceResolver, RunFailure, SpecModel, SpecflowError, StaticResources, State, ToolHandler, Vars,
};

/// Replies with `echo: <prompt>`.
struct EchoLlm;

#[async_trait]
impl LlmClient for EchoLlm {
    async fn invoke(
        &self,
        prompt: &str,
        _params: &Value,
    ) -> specflow::Result<String> {
        Ok(format!("echo: {prompt}"))
    }
}

/// Replies with a fixed string.
struct FixedLlm(String);

#[async_trait]
impl LlmClient for FixedLlm {
    async fn invoke(
        &self,
        _prompt: &str,
        _params: &Value,
    ) -> specflow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Counts invocations, replying with `draft <n>`.
#[derive(Default)]
struct CountingLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for CountingLlm {
    async fn invoke(
        &self,
        _prompt: &str,
        _params: &Value,
    ) -> specflow::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("draft {n}"))
    }
}

/// Sleeps before replying, to make completion order differ from dispatch
/// order.
struct SlowLlm {
    delay: Duration,
    reply: String,
}

#[async_trait]
impl LlmClient for SlowLlm {
    async fn invoke(
        &self,
        _prompt: &str,
        _params: &Value,
    ) -> specflow::Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

/// Always fails.
struct FlakyLlm;

#[async_trait]
impl LlmClient for FlakyLlm {
    async fn invoke(
        &self,
        _prompt: &str,
        _params: &Value,
    ) -> specflow::Result<String> {
        Err(SpecflowError::Convert("provider unavailable".to_string()))
    }
}

/// Counts invocations and reports how many distinct upstream claims it saw.
#[derive(Default)]
struct JoinTool {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolHandler for JoinTool {
    async fn call(
        &self,
        state: &State,
        _params: &Value,
    ) -> specflow::Result<Vars> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let claim = state.get_str("claim").unwrap_or_default().to_string();
        let mut delta = Vars::new();
        delta.set("output", format!("joined: {claim}"));
        Ok(delta)
    }
}

fn compile(yaml: &str) -> specflow::Graph {
    let spec = SpecModel::from_yaml(yaml).unwrap();
    specflow::compile_spec(&spec).unwrap()
}

async fn run(
    yaml: &str,
    resources: &dyn ResourceResolver,
    input: &str,
) -> Result<State, RunFailure> {
    let graph = compile(yaml);
    let engine = EngineBuilder::new().build().unwrap();
    engine.run(&graph, resources, input).await
}

#[tokio::test]
async fn sequential_chain_runs_in_order_without_declared_edges() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          llm: {type: llm}
        workflow:
          type: sequential
          nodes:
            - id: draft
              kind: agent
              ref: llm
              config: {output_key: draft_text}
            - id: polish
              kind: agent
              ref: llm
              config: {prompt: "polish ${state.draft_text}"}
    "#;
    let resources = StaticResources::new().with("llm", ResourceHandle::llm(EchoLlm));

    let state = run(yaml, &resources, "hi").await.unwrap();

    assert_eq!(state.get_str("draft_text"), Some("echo: hi"));
    assert_eq!(state.output(), Some(&Value::String("echo: polish echo: hi".to_string())));
    assert_eq!(state.iteration_count(), 0);
}

#[tokio::test]
async fn branch_routes_to_exactly_one_successor() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          llm: {type: llm}
        workflow:
          type: custom_graph
          nodes:
            - {id: classify, kind: agent, ref: llm, entry: true}
            - {id: route, kind: branch}
            - {id: poem, kind: agent, ref: llm, config: {output_key: picked_poem}, stop: true}
            - {id: other, kind: agent, ref: llm, config: {output_key: picked_other}, stop: true}
          edges:
            - {source: classify, target: route}
            - {source: route, target: poem, condition: "output contains 'poem'"}
            - {source: route, target: other, condition: "not (output contains 'poem')"}
    "#;
    let resources = StaticResources::new().with("llm", ResourceHandle::llm(EchoLlm));

    let state = run(yaml, &resources, "write a poem").await.unwrap();

    assert!(state.get("picked_poem").is_some());
    assert!(state.get("picked_other").is_none());
}

#[tokio::test]
async fn evaluator_optimizer_loops_to_the_cap_then_exits_forward() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          writer: {type: llm}
          critic: {type: llm}
          publisher: {type: llm}
        workflow:
          type: evaluator_optimizer
          max_iterations: 5
          nodes:
            - id: generate
              kind: agent
              ref: writer
              config: {prompt: "improve: ${state.input}"}
            - id: evaluate
              kind: judge
              ref: critic
            - id: finalize
              kind: agent
              ref: publisher
              config: {prompt: "publish: ${state.output}"}
              stop: true
          edges:
            - {source: generate, target: evaluate}
            - {source: evaluate, target: generate, condition: "score < 4"}
            - {source: evaluate, target: finalize, condition: "score >= 4"}
    "#;
    let writer = std::sync::Arc::new(CountingLlm::default());
    let resources = StaticResources::new()
        .with("writer", ResourceHandle::Llm(writer.clone()))
        // The critic never approves; only the cap ends the cycle.
        .with("critic", ResourceHandle::llm(FixedLlm(r#"{"score": 3.0}"#.to_string())))
        .with("publisher", ResourceHandle::llm(EchoLlm));

    let state = run(yaml, &resources, "a slogan").await.unwrap();

    // Initial visit plus exactly five loop iterations.
    assert_eq!(writer.calls.load(Ordering::SeqCst), 6);
    assert_eq!(state.iteration_count(), 5);
    assert_eq!(state.get("score"), Some(&Value::from(3.0)));
    let output = state.get_str("output").unwrap();
    assert!(output.starts_with("echo: publish:"), "finalize did not run: {output}");
}

#[tokio::test]
async fn fan_out_merges_in_declaration_order_and_fans_in_once() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          slow_llm: {type: llm}
          fast_llm: {type: llm}
          joiner: {type: tool}
        workflow:
          type: custom_graph
          nodes:
            - {id: start, kind: branch, entry: true}
            - {id: slow, kind: agent, ref: slow_llm, config: {output_key: claim}}
            - {id: fast, kind: agent, ref: fast_llm, config: {output_key: claim}}
            - {id: join, kind: tool, ref: joiner, stop: true}
          edges:
            - {source: start, target: slow}
            - {source: start, target: fast}
            - {source: slow, target: join}
            - {source: fast, target: join}
    "#;
    let joiner = std::sync::Arc::new(JoinTool::default());
    let resources = StaticResources::new()
        .with(
            "slow_llm",
            ResourceHandle::llm(SlowLlm {
                delay: Duration::from_millis(50),
                reply: "slow claim".to_string(),
            }),
        )
        .with("fast_llm", ResourceHandle::llm(FixedLlm("fast claim".to_string())))
        .with("joiner", ResourceHandle::Tool(joiner.clone()));

    let state = run(yaml, &resources, "go").await.unwrap();

    // `fast` is declared after `slow`, so its write wins even though it
    // finished first and `slow` finished last.
    assert_eq!(state.get_str("claim"), Some("fast claim"));
    // Two edges into `join` still mean one execution.
    assert_eq!(joiner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.get_str("output"), Some("joined: fast claim"));
}

#[tokio::test]
async fn node_failure_routes_through_error_context_edge() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          flaky: {type: llm}
          llm: {type: llm}
        workflow:
          type: custom_graph
          nodes:
            - {id: fetch, kind: agent, ref: flaky, entry: true}
            - {id: recover, kind: agent, ref: llm, config: {prompt: "fallback"}, stop: true}
          edges:
            - {source: fetch, target: recover, condition: "error_context != null"}
    "#;
    let resources = StaticResources::new()
        .with("flaky", ResourceHandle::llm(FlakyLlm))
        .with("llm", ResourceHandle::llm(EchoLlm));

    let state = run(yaml, &resources, "go").await.unwrap();

    assert!(state.get("error_context").is_some());
    assert_eq!(state.get_str("output"), Some("echo: fallback"));
}

#[tokio::test]
async fn node_failure_without_recovery_edge_fails_the_run() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          flaky: {type: llm}
          llm: {type: llm}
        workflow:
          type: custom_graph
          nodes:
            - {id: fetch, kind: agent, ref: flaky, entry: true}
            - {id: sink, kind: agent, ref: llm, stop: true}
          edges:
            - {source: fetch, target: sink}
    "#;
    let resources = StaticResources::new()
        .with("flaky", ResourceHandle::llm(FlakyLlm))
        .with("llm", ResourceHandle::llm(EchoLlm));

    let failure = run(yaml, &resources, "go").await.unwrap_err();

    assert!(matches!(failure.error, SpecflowError::NodeExecution { ref nid, .. } if nid == "fetch"));
    // The carried state records what failed, even though the run aborted.
    let context = failure.state.get("error_context").unwrap();
    assert_eq!(context["node"], Value::String("fetch".to_string()));
}

#[tokio::test]
async fn frontier_member_failure_drops_later_members_from_the_merge() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          first_llm: {type: llm}
          flaky: {type: llm}
          second_llm: {type: llm}
        workflow:
          type: custom_graph
          nodes:
            - {id: start, kind: branch, entry: true}
            - {id: first, kind: agent, ref: first_llm, config: {output_key: k1}}
            - {id: broken, kind: agent, ref: flaky}
            - {id: second, kind: agent, ref: second_llm, config: {output_key: k2}, stop: true}
          edges:
            - {source: start, target: first}
            - {source: start, target: broken}
            - {source: start, target: second}
    "#;
    let resources = StaticResources::new()
        .with("first_llm", ResourceHandle::llm(FixedLlm("done".to_string())))
        .with("flaky", ResourceHandle::llm(FlakyLlm))
        .with("second_llm", ResourceHandle::llm(FixedLlm("never merged".to_string())));

    let failure = run(yaml, &resources, "go").await.unwrap_err();

    assert!(matches!(failure.error, SpecflowError::NodeExecution { ref nid, .. } if nid == "broken"));
    // Members before the failure merge; the failed member and everything
    // after it are dropped from that step.
    assert_eq!(failure.state.get_str("k1"), Some("done"));
    assert!(failure.state.get("k2").is_none());
    let context = failure.state.get("error_context").unwrap();
    assert_eq!(context["node"], Value::String("broken".to_string()));
}

#[tokio::test]
async fn dead_end_is_a_routing_error() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          llm: {type: llm}
        workflow:
          type: custom_graph
          nodes:
            - {id: a, kind: agent, ref: llm, entry: true}
            - {id: b, kind: agent, ref: llm, stop: true}
          edges:
            - {source: a, target: b, condition: "output == 'never'"}
    "#;
    let resources = StaticResources::new().with("llm", ResourceHandle::llm(EchoLlm));

    let failure = run(yaml, &resources, "go").await.unwrap_err();

    assert!(matches!(failure.error, SpecflowError::Routing(_)));
}

#[tokio::test]
async fn cycle_with_no_forward_edge_hits_the_iteration_limit() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          llm: {type: llm}
        workflow:
          type: custom_graph
          max_iterations: 2
          nodes:
            - {id: a, kind: agent, ref: llm, entry: true}
            - {id: b, kind: agent, ref: llm}
            - {id: done, kind: agent, ref: llm, stop: true}
          edges:
            - {source: a, target: b}
            - {source: b, target: a}
    "#;
    let resources = StaticResources::new().with("llm", ResourceHandle::llm(EchoLlm));

    let failure = run(yaml, &resources, "go").await.unwrap_err();

    assert!(matches!(failure.error, SpecflowError::IterationLimit { max: 2, .. }));
}

#[tokio::test]
async fn json_field_templating_reads_structured_output() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          extractor: {type: llm}
          llm: {type: llm}
        workflow:
          type: sequential
          nodes:
            - {id: extract, kind: agent, ref: extractor}
            - {id: report, kind: agent, ref: llm, config: {prompt: "grade=${state.json.grade}"}}
    "#;
    let resources = StaticResources::new()
        .with("extractor", ResourceHandle::llm(FixedLlm(r#"{"grade": "pass", "score": 9}"#.to_string())))
        .with("llm", ResourceHandle::llm(EchoLlm));

    let state = run(yaml, &resources, "go").await.unwrap();

    assert_eq!(state.get_str("output"), Some("echo: grade=pass"));
}

#[tokio::test]
async fn referenced_specs_merge_and_run_from_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.yaml"),
        r#"
        version: "1.0"
        runtime: default
        resources:
          llm: {type: llm, model: small}
        workflow:
          type: sequential
          nodes:
            - {id: step, kind: agent, ref: llm, stop: true}
        "#,
    )
    .unwrap();
    fs::write(
        dir.path().join("child.yaml"),
        r#"
        reference: base.yaml
        description: child spec
        resources:
          llm: {model: large}
        "#,
    )
    .unwrap();

    let spec = specflow::load_and_merge_spec(dir.path().join("child.yaml")).unwrap();
    assert_eq!(spec.description, "child spec");
    assert_eq!(spec.resources["llm"].kind, "llm");
    assert_eq!(spec.resources["llm"].params["model"], Value::String("large".to_string()));

    let graph = specflow::compile_spec(&spec).unwrap();
    let engine = EngineBuilder::new().build().unwrap();
    let resources = StaticResources::new().with("llm", ResourceHandle::llm(EchoLlm));

    let state = engine.run(&graph, &resources, "hello").await.unwrap();
    assert_eq!(state.get_str("output"), Some("echo: hello"));
}

#[tokio::test]
async fn builder_fallback_cap_applies_when_the_spec_declares_none() {
    let yaml = r#"
        version: "1.0"
        runtime: default
        resources:
          llm: {type: llm}
        workflow:
          type: custom_graph
          nodes:
            - {id: a, kind: agent, ref: llm, entry: true}
            - {id: b, kind: agent, ref: llm}
            - {id: done, kind: agent, ref: llm, stop: true}
          edges:
            - {source: a, target: b}
            - {source: b, target: a}
    "#;
    let resources = StaticResources::new().with("llm", ResourceHandle::llm(EchoLlm));
    let graph = compile(yaml);
    let engine = EngineBuilder::new().default_max_iterations(1).build().unwrap();

    let failure = engine.run(&graph, &resources, "go").await.unwrap_err();

    assert!(matches!(failure.error, SpecflowError::IterationLimit { max: 1, .. }));
}
