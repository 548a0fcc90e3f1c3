//! Scenario tests for the automation execution engine.
//!
//! These run the real orchestrator against the in-memory log store, the
//! recording scheduler and the node test doubles, so no Postgres connection
//! is required.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use db::models::ExecutionLogRow;
use db::{AutomationStore, DbError, ExecutionLogStore, MemoryStore};
use nodes::mock::MockServices;
use nodes::traits::{Contact, ContactQuery, HttpClient, HttpRequest, HttpResponse, Property};
use nodes::{Node, NodeError};
use queue::{DelayedScheduler, RecordingScheduler, TimerScheduler};

use crate::{worker, Automation, AutomationExecutor, EngineError, ExecutorConfig, RunStatus};

struct Harness {
    mocks: MockServices,
    store: Arc<MemoryStore>,
    scheduler: Arc<RecordingScheduler>,
    executor: AutomationExecutor,
}

fn harness() -> Harness {
    let mocks = MockServices::new();
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(RecordingScheduler::new());
    let executor = executor_with(&mocks, store.clone(), scheduler.clone());
    Harness { mocks, store, scheduler, executor }
}

fn executor_with(
    mocks: &MockServices,
    store: Arc<MemoryStore>,
    scheduler: Arc<dyn DelayedScheduler>,
) -> AutomationExecutor {
    AutomationExecutor::new(
        &ExecutorConfig::default(),
        mocks.services(),
        scheduler,
        store.clone(),
        store,
    )
}

fn automation(nodes: Value) -> Automation {
    let nodes: Vec<Node> = serde_json::from_value(nodes).expect("valid node list");
    Automation::new(Uuid::new_v4(), "test", nodes)
}

async fn record(h: &Harness, execution_id: Uuid) -> ExecutionLogRow {
    h.store.get_log(execution_id).await.expect("execution log exists")
}

/// Node ids in the order they started.
fn started(record: &ExecutionLogRow) -> Vec<String> {
    record.logs
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["level"] == "start")
        .map(|e| e["nodeId"].as_str().unwrap().to_string())
        .collect()
}

fn has_action(record: &ExecutionLogRow, action: &str) -> bool {
    record.logs.as_array().unwrap().iter().any(|e| e["action"] == action)
}

fn delayed_email() -> Automation {
    automation(json!([
        { "id": "t", "type": "trigger", "next": ["wait"] },
        { "id": "wait", "type": "delay", "delayMinutes": 5, "next": ["mail"] },
        { "id": "mail", "type": "send_email", "to": "a@example.com", "subject": "Later", "emailBody": "hi" }
    ]))
}

// ============================================================
// Run lifecycle
// ============================================================

#[tokio::test]
async fn zero_trigger_automation_fails_before_any_node_runs() {
    let h = harness();
    let a = automation(json!([
        { "id": "mail", "type": "send_email", "to": "a@example.com", "subject": "s", "emailBody": "b" }
    ]));
    let execution_id = Uuid::new_v4();

    let result = h.executor.execute_automation(&a, json!({}), Some(execution_id)).await;

    assert!(matches!(result, Err(EngineError::NoTriggerNodes)));
    assert_eq!(h.mocks.email.attempts(), 0);
    let rec = record(&h, execution_id).await;
    assert_eq!(rec.status, "failed");
    assert!(started(&rec).is_empty());
}

#[tokio::test]
async fn inactive_background_run_is_skipped() {
    let h = harness();
    let mut a = delayed_email();
    a.is_active = false;

    let outcome = h.executor.execute_automation(&a, json!({}), None).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Skipped);
    let rec = record(&h, outcome.execution_id).await;
    assert_eq!(rec.status, "skipped");
    assert!(started(&rec).is_empty());
    assert!(h.scheduler.scheduled().is_empty());
}

#[tokio::test]
async fn inactive_manual_run_still_executes() {
    let h = harness();
    let mut a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["mail"] },
        { "id": "mail", "type": "send_email", "to": "a@example.com", "subject": "s", "emailBody": "b" }
    ]));
    a.is_active = false;

    let outcome = h
        .executor
        .execute_automation(&a, json!({}), Some(Uuid::new_v4()))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(h.mocks.email.sent().len(), 1);
}

#[tokio::test]
async fn completed_run_records_input_output_and_logs() {
    let h = harness();
    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["set"] },
        { "id": "set", "type": "transform",
          "transformations": [{ "expression": "count + 1", "outputField": "count" }] }
    ]));

    let outcome = h.executor.execute_automation(&a, json!({ "count": 1 }), None).await.unwrap();

    let rec = record(&h, outcome.execution_id).await;
    assert_eq!(rec.status, "completed");
    assert_eq!(rec.input, json!({ "count": 1 }));
    assert_eq!(rec.output.as_ref().unwrap()["count"], 2);
    assert_eq!(rec.pending_continuations, 0);
    assert!(rec.completed_at.is_some());
    assert!(has_action(&rec, "execution_start"));
}

// ============================================================
// Traversal
// ============================================================

#[tokio::test]
async fn linear_chain_sees_earlier_mutations() {
    let h = harness();
    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["set"] },
        { "id": "set", "type": "transform", "next": ["mail"],
          "transformations": [{ "expression": "1", "outputField": "x" }] },
        { "id": "mail", "type": "send_email", "to": "a@example.com",
          "subject": "Got {{x}}", "emailBody": "x is {{x}}" }
    ]));

    let outcome = h.executor.execute_automation(&a, json!({}), None).await.unwrap();

    let sent = h.mocks.email.sent();
    assert_eq!(sent[0].subject, "Got 1");
    assert_eq!(sent[0].html, "x is 1");
    assert_eq!(started(&record(&h, outcome.execution_id).await), vec!["t", "set", "mail"]);
}

#[tokio::test]
async fn successors_run_in_list_order() {
    let h = harness();
    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["first", "second"] },
        { "id": "first", "type": "send_whatsapp", "to": "+1", "message": "one", "next": ["inner"] },
        { "id": "inner", "type": "send_whatsapp", "to": "+2", "message": "two" },
        { "id": "second", "type": "send_whatsapp", "to": "+3", "message": "three" }
    ]));

    h.executor.execute_automation(&a, json!({}), None).await.unwrap();

    // Depth-first: `inner` runs before `second`.
    let order: Vec<String> = h.mocks.whatsapp.sent().into_iter().map(|m| m.message).collect();
    assert_eq!(order, vec!["one", "two", "three"]);
}

fn branching() -> Automation {
    automation(json!([
        { "id": "t", "type": "trigger", "next": ["check"] },
        { "id": "check", "type": "condition",
          "conditions": [{ "field": "x", "operator": "gt", "value": 5 }],
          "trueNext": ["yes"], "falseNext": ["no"] },
        { "id": "yes", "type": "send_whatsapp", "to": "+1", "message": "big" },
        { "id": "no", "type": "send_whatsapp", "to": "+1", "message": "small" }
    ]))
}

#[tokio::test]
async fn condition_walks_exactly_one_branch() {
    for (x, expected) in [(10, "big"), (3, "small"), (5, "small")] {
        let h = harness();
        let outcome = h
            .executor
            .execute_automation(&branching(), json!({ "x": x }), None)
            .await
            .unwrap();

        let sent: Vec<String> = h.mocks.whatsapp.sent().into_iter().map(|m| m.message).collect();
        assert_eq!(sent, vec![expected], "x = {x}");

        let rec = record(&h, outcome.execution_id).await;
        let skipped = if expected == "big" { "no" } else { "yes" };
        assert!(!started(&rec).iter().any(|id| id == skipped), "x = {x}");
    }
}

#[tokio::test]
async fn http_error_status_is_a_business_outcome() {
    let h = harness();
    h.mocks.http.respond(500, json!({ "error": "down" }));
    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["call"] },
        { "id": "call", "type": "http_request", "url": "https://api.example.com/ping", "next": ["check"] },
        { "id": "check", "type": "condition",
          "conditions": [{ "field": "httpStatus", "operator": "equals", "value": 500 }],
          "trueNext": ["alert"], "falseNext": [] },
        { "id": "alert", "type": "send_whatsapp", "to": "+1", "message": "{{httpResponse.error}}" }
    ]));

    let outcome = h.executor.execute_automation(&a, json!({}), None).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(h.mocks.whatsapp.sent()[0].message, "down");
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn missing_successor_is_fatal() {
    let h = harness();
    let a = automation(json!([{ "id": "t", "type": "trigger", "next": ["ghost"] }]));
    let execution_id = Uuid::new_v4();

    let result = h.executor.execute_automation(&a, json!({}), Some(execution_id)).await;

    assert!(matches!(
        result,
        Err(EngineError::UnknownSuccessor { ref from, ref to }) if from == "t" && to == "ghost"
    ));
    let rec = record(&h, execution_id).await;
    assert_eq!(rec.status, "failed");
    assert!(rec.error.unwrap().contains("ghost"));
}

#[tokio::test]
async fn node_failure_aborts_the_run() {
    let h = harness();
    h.mocks.http.fail("connection refused");
    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["call", "mail"] },
        { "id": "call", "type": "http_request", "url": "https://api.example.com" },
        { "id": "mail", "type": "send_email", "to": "a@example.com", "subject": "s", "emailBody": "b" }
    ]));
    let execution_id = Uuid::new_v4();

    let result = h.executor.execute_automation(&a, json!({}), Some(execution_id)).await;

    assert!(matches!(result, Err(EngineError::NodeFailed { ref node_id, .. }) if node_id == "call"));
    assert_eq!(h.mocks.email.attempts(), 0);
    let rec = record(&h, execution_id).await;
    assert_eq!(rec.status, "failed");
    assert!(has_action(&rec, "node_error"));
    assert!(has_action(&rec, "execution_failed"));
}

#[tokio::test]
async fn contact_creation_failure_leaves_error_in_output() {
    let h = harness();
    h.mocks.contacts.fail_creates("duplicate email");
    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["add"] },
        { "id": "add", "type": "contacts", "action": "create", "properties": { "email": "{{email}}" } }
    ]));
    let execution_id = Uuid::new_v4();

    let result = h
        .executor
        .execute_automation(&a, json!({ "email": "x@example.com" }), Some(execution_id))
        .await;

    assert!(result.is_err());
    let rec = record(&h, execution_id).await;
    let output = rec.output.unwrap();
    assert_eq!(output["error"]["action"], "create");
    assert!(output["error"]["message"].as_str().unwrap().contains("duplicate email"));
}

// ============================================================
// Delay / resume
// ============================================================

#[tokio::test]
async fn delay_suspends_and_resume_continues_after_it() {
    let h = harness();
    let a = delayed_email();

    let outcome = h.executor.execute_automation(&a, json!({ "name": "Ana" }), None).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Suspended);
    assert_eq!(h.mocks.email.attempts(), 0);
    let rec = record(&h, outcome.execution_id).await;
    assert_eq!(rec.status, "running");
    assert_eq!(rec.pending_continuations, 1);

    let tokens = h.scheduler.drain();
    assert_eq!(tokens.len(), 1);
    let token = tokens.into_iter().next().unwrap();
    assert_eq!(token.context.current_node_id.as_deref(), Some("wait"));
    assert_eq!(token.next_node_ids, vec!["mail"]);
    assert_eq!(token.delay_minutes, 5);

    let resumed = h.executor.continue_execution(token).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.execution_id, outcome.execution_id);
    assert_eq!(h.mocks.email.sent().len(), 1);

    let rec = record(&h, outcome.execution_id).await;
    assert_eq!(rec.status, "completed");
    assert_eq!(rec.pending_continuations, 0);
    assert!(has_action(&rec, "resumed"));
    // The delay node never runs twice.
    assert_eq!(started(&rec), vec!["t", "wait", "mail"]);
    assert_eq!(rec.output.unwrap()["name"], "Ana");
}

#[tokio::test]
async fn duplicate_resume_is_ignored() {
    let h = harness();
    let outcome = h.executor.execute_automation(&delayed_email(), json!({}), None).await.unwrap();
    let token = h.scheduler.drain().remove(0);

    h.executor.continue_execution(token.clone()).await.unwrap();
    let again = h.executor.continue_execution(token).await.unwrap();

    assert_eq!(again.status, RunStatus::Duplicate);
    assert_eq!(h.mocks.email.sent().len(), 1);
    assert_eq!(record(&h, outcome.execution_id).await.status, "completed");
}

#[tokio::test]
async fn resume_reloads_nodes_when_token_carries_none() {
    let h = harness();
    let row = h
        .store
        .create_automation(delayed_email().to_new_row().unwrap())
        .await
        .unwrap();
    let a = Automation::try_from(row).unwrap();

    h.executor.execute_automation(&a, json!({}), None).await.unwrap();
    let mut token = h.scheduler.drain().remove(0);
    token.all_nodes.clear();

    let resumed = h.executor.continue_execution(token).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(h.mocks.email.sent().len(), 1);
}

#[tokio::test]
async fn run_completes_only_after_every_continuation() {
    let h = harness();
    let a = automation(json!([
        { "id": "t1", "type": "trigger", "next": ["w1"] },
        { "id": "w1", "type": "delay", "delayMinutes": 1, "next": ["m1"] },
        { "id": "m1", "type": "send_whatsapp", "to": "+1", "message": "one" },
        { "id": "t2", "type": "trigger", "next": ["w2"] },
        { "id": "w2", "type": "delay", "delayMinutes": 2, "next": ["m2"] },
        { "id": "m2", "type": "send_whatsapp", "to": "+2", "message": "two" }
    ]));

    let outcome = h.executor.execute_automation(&a, json!({}), None).await.unwrap();
    assert_eq!(record(&h, outcome.execution_id).await.pending_continuations, 2);

    let mut tokens = h.scheduler.drain().into_iter();
    let first = h.executor.continue_execution(tokens.next().unwrap()).await.unwrap();
    assert_eq!(first.status, RunStatus::Suspended);
    assert_eq!(record(&h, outcome.execution_id).await.status, "running");

    let second = h.executor.continue_execution(tokens.next().unwrap()).await.unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(h.mocks.whatsapp.sent().len(), 2);
}

/// Holds every request until `release` is notified.
#[derive(Default)]
struct GatedHttpClient {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl HttpClient for GatedHttpClient {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, NodeError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(HttpResponse {
            status: 200,
            headers: Default::default(),
            body: json!({ "ok": true }),
            body_len: 11,
        })
    }
}

#[tokio::test]
async fn early_resume_waits_for_the_walk_that_scheduled_it() {
    let mocks = MockServices::new();
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(RecordingScheduler::new());
    let gate = Arc::new(GatedHttpClient::default());
    let mut services = mocks.services();
    services.http = gate.clone();
    let executor = Arc::new(AutomationExecutor::new(
        &ExecutorConfig::default(),
        services,
        scheduler.clone(),
        store.clone(),
        store.clone(),
    ));

    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["wait", "slow"] },
        { "id": "wait", "type": "delay", "delayMinutes": 0, "next": ["mail"] },
        { "id": "mail", "type": "send_email", "to": "a@example.com", "subject": "s", "emailBody": "b" },
        { "id": "slow", "type": "http_request", "url": "https://api.example.com/slow" }
    ]));
    let execution_id = Uuid::new_v4();
    let origin = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute_automation(&a, json!({}), Some(execution_id)).await }
    });

    // `wait` has scheduled its continuation and `slow` is blocked.
    gate.entered.notified().await;
    let token = scheduler.drain().remove(0);
    assert_eq!(store.get_log(execution_id).await.unwrap().pending_continuations, 2);

    let resumed = executor.continue_execution(token).await.unwrap();
    assert_eq!(resumed.status, RunStatus::Suspended);
    assert_eq!(mocks.email.sent().len(), 1);
    let rec = store.get_log(execution_id).await.unwrap();
    assert_eq!(rec.status, "running");
    assert_eq!(rec.pending_continuations, 1);

    gate.release.notify_one();
    let outcome = origin.await.unwrap().unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);

    let rec = store.get_log(execution_id).await.unwrap();
    assert_eq!(rec.status, "completed");
    assert_eq!(rec.pending_continuations, 0);
    assert!(started(&rec).contains(&"slow".to_string()));
    assert!(started(&rec).contains(&"mail".to_string()));
}

#[tokio::test]
async fn resume_of_deleted_automation_fails_the_run() {
    let h = harness();
    let row = h
        .store
        .create_automation(delayed_email().to_new_row().unwrap())
        .await
        .unwrap();
    let a = Automation::try_from(row).unwrap();

    let outcome = h.executor.execute_automation(&a, json!({}), None).await.unwrap();
    let mut token = h.scheduler.drain().remove(0);
    token.all_nodes.clear();
    h.store.delete_automation(a.id).await.unwrap();

    let result = h.executor.continue_execution(token.clone()).await;

    assert!(matches!(result, Err(EngineError::Database(DbError::NotFound))));
    assert_eq!(h.mocks.email.attempts(), 0);
    let rec = record(&h, outcome.execution_id).await;
    assert_eq!(rec.status, "failed");
    assert_eq!(rec.pending_continuations, 0);
    assert!(has_action(&rec, "execution_failed"));

    // The token stays consumed.
    let again = h.executor.continue_execution(token).await.unwrap();
    assert_eq!(again.status, RunStatus::Duplicate);
}

#[tokio::test(start_paused = true)]
async fn worker_resumes_timer_continuations() {
    let mocks = MockServices::new();
    let store = Arc::new(MemoryStore::new());
    let (timer, rx) = TimerScheduler::channel();
    let executor = Arc::new(executor_with(&mocks, store.clone(), Arc::new(timer)));

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(worker::run(executor.clone(), rx, cancel.clone()));

    let a = automation(json!([
        { "id": "t", "type": "trigger", "next": ["wait"] },
        { "id": "wait", "type": "delay", "delayMinutes": 1, "next": ["mail"] },
        { "id": "mail", "type": "send_email", "to": "a@example.com", "subject": "s", "emailBody": "b" }
    ]));
    let outcome = executor.execute_automation(&a, json!({}), None).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Suspended);

    let mut status = String::new();
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        status = store.get_log(outcome.execution_id).await.unwrap().status;
        if status != "running" {
            break;
        }
    }
    assert_eq!(status, "completed");
    assert_eq!(mocks.email.sent().len(), 1);

    cancel.cancel();
    worker.await.unwrap();
}

// ============================================================
// Concurrency
// ============================================================

#[tokio::test]
async fn trigger_forks_merge_in_declaration_order() {
    let h = harness();
    let a = automation(json!([
        { "id": "t1", "type": "trigger", "next": ["s1"] },
        { "id": "s1", "type": "transform", "transformations": [
            { "expression": "'one'", "outputField": "a" },
            { "expression": "'first'", "outputField": "shared" }
        ] },
        { "id": "t2", "type": "trigger", "next": ["s2"] },
        { "id": "s2", "type": "transform", "transformations": [
            { "expression": "'two'", "outputField": "b" },
            { "expression": "'second'", "outputField": "shared" }
        ] }
    ]));

    let outcome = h.executor.execute_automation(&a, json!({ "seed": true }), None).await.unwrap();

    assert_eq!(outcome.output["a"], "one");
    assert_eq!(outcome.output["b"], "two");
    assert_eq!(outcome.output["shared"], "second");
    assert_eq!(outcome.output["seed"], true);

    let rec = record(&h, outcome.execution_id).await;
    assert_eq!(started(&rec), vec!["t1", "s1", "t2", "s2"]);
}

#[tokio::test]
async fn one_failing_trigger_fails_the_run_after_the_others_finish() {
    let h = harness();
    h.mocks.whatsapp.fail_recipient("+bad");
    let a = automation(json!([
        { "id": "t1", "type": "trigger", "next": ["bad"] },
        { "id": "bad", "type": "send_whatsapp", "to": "+bad", "message": "x" },
        { "id": "t2", "type": "trigger", "next": ["good"] },
        { "id": "good", "type": "send_whatsapp", "to": "+good", "message": "y" }
    ]));

    let result = h.executor.execute_automation(&a, json!({}), None).await;

    assert!(matches!(result, Err(EngineError::NodeFailed { ref node_id, .. }) if node_id == "bad"));
    assert_eq!(h.mocks.whatsapp.sent().len(), 1);
}

// ============================================================
// Mass email
// ============================================================

#[tokio::test]
async fn mass_email_tolerates_single_recipient_failure() {
    let h = harness();
    let a = automation(json!([]));
    let organization_id = a.organization_id;

    let contacts: Vec<Contact> = (1..=25)
        .map(|i| Contact {
            id: Uuid::new_v4(),
            organization_id,
            properties: vec![
                Property { key: "email".into(), value: json!(format!("c{i}@example.com")) },
                Property { key: "firstName".into(), value: json!(format!("C{i}")) },
            ],
            source: "import".into(),
        })
        .collect();
    let ids = contacts.iter().map(|c| c.id).collect();
    h.mocks.contacts.seed(contacts);
    h.mocks.email.fail_recipient("c13@example.com");
    let list_id = h.mocks.lists.add("everyone", ContactQuery::Ids(ids));

    let a = Automation {
        nodes: serde_json::from_value(json!([
            { "id": "t", "type": "trigger", "next": ["blast"] },
            { "id": "blast", "type": "send_mass_email", "listId": list_id,
              "subject": "{{campaign}} news", "emailBody": "Hi {{contact.firstName}}", "next": ["after"] },
            { "id": "after", "type": "send_whatsapp", "to": "+1", "message": "{{massEmailResult.successCount}} sent" }
        ]))
        .unwrap(),
        ..a
    };

    let outcome = h
        .executor
        .execute_automation(&a, json!({ "campaign": "Spring" }), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(h.mocks.email.attempts(), 25);
    let result = &outcome.output["massEmailResult"];
    assert_eq!(result["totalContacts"], 25);
    assert_eq!(result["successCount"], 24);
    assert_eq!(result["errorCount"], 1);

    let sent = h.mocks.email.sent();
    assert!(sent.iter().all(|m| m.subject == "Spring news"));
    assert!(sent.iter().any(|m| m.html == "Hi C7"));
    assert_eq!(h.mocks.whatsapp.sent()[0].message, "24 sent");
}
