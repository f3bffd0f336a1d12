//! End-to-end ingest flow: user turn -> queue -> supervisor -> approval ->
//! commit -> changelog.

use gleaner::context::testing::test_context;
use gleaner::queue::durable::{EnqueueOptions, TaskStatus};
use gleaner::queue::worker::{process_one_task, TASK_TYPE_GRAPH_RUN};
use kg::store::GraphStore;
use serde_json::json;

const PHOTOSYNTHESIS_EXTRACTION: &str = r#"{
    "entities": [
        {"id": "C:temp_1", "label": "Concept",
         "properties": {"name": "photosynthesis", "domain": "biology",
                        "description": "Conversion of light to chemical energy"}}
    ],
    "relations": [],
    "claims": []
}"#;

#[tokio::test]
async fn test_happy_path_ingest_approved_committed() {
    let tc = test_context(vec![PHOTOSYNTHESIS_EXTRACTION]).await;

    // Turn 1: the user asks to ingest a topic.
    tc.ctx
        .queue
        .enqueue(
            TASK_TYPE_GRAPH_RUN,
            json!({"chat_id": "42", "user_input": "/ingest topic=photosynthesis"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    let tasks = tc.ctx.queue.dequeue(None, 1).await.unwrap();
    process_one_task(&tc.ctx, &tasks[0]).await.unwrap();

    // The user sees an approval prompt carrying the diff summary.
    let prompt = tc.transport.last().unwrap();
    let diff_id = prompt.approval_diff_id.clone().expect("approval prompt");
    assert!(prompt.text.contains("+1 nodes"));
    assert!(prompt.text.contains("Key decision"));

    // The checkpoint holds the pending diff across turns.
    let checkpoint = tc.ctx.checkpoints.load("42").await.unwrap().unwrap();
    assert!(checkpoint.approval_required);
    assert_eq!(checkpoint.diff_id.as_deref(), Some(diff_id.as_str()));
    assert_eq!(tc.ctx.changelog.current_version().await.unwrap(), 0);

    // Turn 2: the user approves.
    tc.ctx
        .queue
        .enqueue(
            TASK_TYPE_GRAPH_RUN,
            json!({"chat_id": "42", "user_input": "approve", "approval_decision": "approve"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    let tasks = tc
        .ctx
        .queue
        .dequeue(Some(TASK_TYPE_GRAPH_RUN), 1)
        .await
        .unwrap();
    process_one_task(&tc.ctx, &tasks[0]).await.unwrap();

    // Commit confirmation with counts.
    let confirmation = tc.transport.last().unwrap();
    assert!(confirmation.text.contains("✅ Committed"));
    assert!(confirmation.text.contains("Nodes: +1"));

    // Changelog recorded version 1 with the writer's provenance.
    assert_eq!(tc.ctx.changelog.current_version().await.unwrap(), 1);
    let entry = tc.ctx.changelog.get_version(1).await.unwrap().unwrap();
    assert_eq!(entry.summary, "+1 nodes");
    let provenance = &entry.diff.nodes.add[0].properties["_provenance"];
    assert_eq!(provenance["source_agent"], "writer_node");

    // The checkpoint no longer carries the diff.
    let checkpoint = tc.ctx.checkpoints.load("42").await.unwrap().unwrap();
    assert!(checkpoint.proposed_diff.is_none());
    assert!(!checkpoint.approval_required);
}

#[tokio::test]
async fn test_idempotent_commit_absorbs_duplicates() {
    let tc = test_context(vec![PHOTOSYNTHESIS_EXTRACTION]).await;

    // Commit once via the supervisor.
    let first = gleaner::graph::run_graph(
        &tc.ctx,
        gleaner::graph::state::AgentState::for_turn("42", "/ingest topic=photosynthesis"),
        "42",
    )
    .await
    .unwrap();
    let diff = first.proposed_diff.clone().unwrap();

    let mut decision = gleaner::graph::state::AgentState::for_turn("42", "approve");
    decision.approval_decision = Some(gleaner::graph::state::ApprovalDecision::Approve);
    gleaner::graph::run_graph(&tc.ctx, decision, "42").await.unwrap();

    // Re-applying the committed diff merges on id: no net-new nodes.
    let reapply = tc.ctx.store.apply_diff(&diff).await.unwrap();
    assert_eq!(reapply.nodes.added, 0);
    assert_eq!(reapply.nodes.updated, 1);
}

#[tokio::test]
async fn test_rejected_ingest_drops_diff() {
    let tc = test_context(vec![PHOTOSYNTHESIS_EXTRACTION]).await;

    tc.ctx
        .queue
        .enqueue(
            TASK_TYPE_GRAPH_RUN,
            json!({"chat_id": "7", "user_input": "/ingest topic=photosynthesis"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    let tasks = tc.ctx.queue.dequeue(None, 1).await.unwrap();
    process_one_task(&tc.ctx, &tasks[0]).await.unwrap();

    tc.ctx
        .queue
        .enqueue(
            TASK_TYPE_GRAPH_RUN,
            json!({"chat_id": "7", "user_input": "reject", "approval_decision": "reject"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    let tasks = tc
        .ctx
        .queue
        .dequeue(Some(TASK_TYPE_GRAPH_RUN), 1)
        .await
        .unwrap();
    process_one_task(&tc.ctx, &tasks[0]).await.unwrap();

    assert!(tc.transport.last().unwrap().text.contains("rejected"));
    assert_eq!(tc.ctx.changelog.current_version().await.unwrap(), 0);
    let checkpoint = tc.ctx.checkpoints.load("7").await.unwrap().unwrap();
    assert!(checkpoint.proposed_diff.is_none());
}

#[tokio::test]
async fn test_worker_tasks_reach_completed_status() {
    let tc = test_context(vec![PHOTOSYNTHESIS_EXTRACTION]).await;

    let task_id = tc
        .ctx
        .queue
        .enqueue(
            TASK_TYPE_GRAPH_RUN,
            json!({"chat_id": "42", "user_input": "/help"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    let tasks = tc.ctx.queue.dequeue(None, 1).await.unwrap();
    process_one_task(&tc.ctx, &tasks[0]).await.unwrap();

    let task = tc.ctx.queue.get(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.result.unwrap()["final_response"]
        .as_str()
        .unwrap()
        .contains("/ingest"));
}
