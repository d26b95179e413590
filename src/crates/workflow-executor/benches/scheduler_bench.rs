use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use graph_model::{Edge, Node, Workflow};
use ports::testing::{InMemoryConfirmationPort, ReplayHttpPort, StubKnowledgePort, StubLlmPort};
use workflow_executor::{Executor, ExecutorConfig, ExecutorPorts};

fn ten_node_chain() -> Workflow {
    let mut wf = Workflow::new("bench-chain", None);
    wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
    let mut previous = "start".to_string();
    for i in 0..8 {
        let id = format!("transform-{i}");
        wf.nodes
            .push(Node::new(&id, "transform", serde_json::json!({ "expression": format!("{previous}.value") })).unwrap());
        wf.edges.push(Edge { source: previous.clone(), target: id.clone(), guard: None });
        previous = id;
    }
    wf.nodes.push(Node::new("end", "end", serde_json::json!({})).unwrap());
    wf.edges.push(Edge { source: previous, target: "end".into(), guard: None });
    wf
}

fn test_ports() -> ExecutorPorts {
    ExecutorPorts {
        llm: Arc::new(StubLlmPort::new(Vec::<String>::new())),
        http: Arc::new(ReplayHttpPort::new(Vec::new())),
        knowledge: Arc::new(StubKnowledgePort::new(Vec::new())),
        confirmation: Arc::new(InMemoryConfirmationPort::new()),
    }
}

fn scheduler_run_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let workflow = ten_node_chain();

    c.bench_function("ten-node chain run", |b| {
        b.to_async(&runtime).iter(|| async {
            let executor = Executor::new(test_ports(), ExecutorConfig::default());
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            let ctx = executor
                .run(uuid::Uuid::new_v4(), black_box(workflow.clone()), 100, tx)
                .await
                .unwrap();
            black_box(ctx);
        });
    });
}

criterion_group!(benches, scheduler_run_benchmark);
criterion_main!(benches);
