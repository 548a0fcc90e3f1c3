use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::models::AutomationRow;
use engine::{validate_graph, Automation, RunStatus};
use nodes::Node;

use crate::{ApiError, AppState};

fn active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationDto {
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub execution_id: Uuid,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<AutomationRow>>, ApiError> {
    Ok(Json(state.automations.list_automations().await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<AutomationRow>, ApiError> {
    Ok(Json(state.automations.get_automation(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateAutomationDto>,
) -> Result<(StatusCode, Json<AutomationRow>), ApiError> {
    let automation = Automation {
        is_active: payload.is_active,
        created_by: payload.created_by,
        ..Automation::new(payload.organization_id, payload.name, payload.nodes)
    };
    validate_graph(&automation)?;

    let row = state.automations.create_automation(automation.to_new_row()?).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.automations.delete_automation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual run: always supplies an execution id, so inactive automations run
/// too. The body, if any, is the initial data bag.
pub async fn run(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<Json<RunResponse>, ApiError> {
    let automation = Automation::try_from(state.automations.get_automation(id).await?)?;
    let input = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let execution_id = Uuid::new_v4();

    let response = match state
        .executor
        .execute_automation(&automation, input, Some(execution_id))
        .await
    {
        Ok(outcome) => RunResponse {
            execution_id,
            status: match outcome.status {
                RunStatus::Completed => "completed",
                RunStatus::Suspended => "running",
                RunStatus::Skipped => "skipped",
                RunStatus::Duplicate => "duplicate",
            },
            output: Some(outcome.output),
            error: None,
        },
        Err(e) => RunResponse {
            execution_id,
            status: "failed",
            output: None,
            error: Some(e.to_string()),
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use db::{ExecutionLogStore, MemoryStore};
    use engine::{AutomationExecutor, ExecutorConfig};
    use nodes::mock::MockServices;
    use queue::RecordingScheduler;
    use serde_json::json;

    fn state() -> (AppState, MockServices) {
        let mocks = MockServices::new();
        let store = Arc::new(MemoryStore::new());
        let executor = AutomationExecutor::new(
            &ExecutorConfig::default(),
            mocks.services(),
            Arc::new(RecordingScheduler::new()),
            store.clone(),
            store.clone(),
        );
        let state = AppState {
            automations: store.clone(),
            logs: store,
            executor: Arc::new(executor),
        };
        (state, mocks)
    }

    fn dto(nodes: Value, is_active: bool) -> CreateAutomationDto {
        CreateAutomationDto {
            organization_id: Uuid::new_v4(),
            name: "welcome".into(),
            is_active,
            created_by: None,
            nodes: serde_json::from_value(nodes).unwrap(),
        }
    }

    #[tokio::test]
    async fn invalid_graph_is_rejected_on_create() {
        let (state, _) = state();
        let result = create(
            State(state),
            Json(dto(json!([{ "id": "t", "type": "trigger", "next": ["ghost"] }]), true)),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn manual_run_executes_inactive_automation() {
        let (state, mocks) = state();
        let (status, Json(row)) = create(
            State(state.clone()),
            Json(dto(
                json!([
                    { "id": "t", "type": "trigger", "next": ["ping"] },
                    { "id": "ping", "type": "send_whatsapp", "to": "{{phone}}", "message": "hi" }
                ]),
                false,
            )),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(response) = run(Path(row.id), State(state.clone()), Some(Json(json!({ "phone": "+44" }))))
            .await
            .unwrap();

        assert_eq!(response.status, "completed");
        assert_eq!(mocks.whatsapp.sent()[0].to, "+44");
        let log = state.logs.get_log(response.execution_id).await.unwrap();
        assert_eq!(log.status, "completed");
    }

    #[tokio::test]
    async fn failed_run_reports_the_error() {
        let (state, mocks) = state();
        mocks.whatsapp.fail_recipient("+0");
        let (_, Json(row)) = create(
            State(state.clone()),
            Json(dto(
                json!([
                    { "id": "t", "type": "trigger", "next": ["ping"] },
                    { "id": "ping", "type": "send_whatsapp", "to": "+0", "message": "hi" }
                ]),
                true,
            )),
        )
        .await
        .unwrap();

        let Json(response) = run(Path(row.id), State(state), None).await.unwrap();
        assert_eq!(response.status, "failed");
        assert!(response.error.unwrap().contains("ping"));
    }

    #[tokio::test]
    async fn unknown_automation_is_not_found() {
        let (state, _) = state();
        assert!(matches!(
            get(Path(Uuid::new_v4()), State(state)).await,
            Err(ApiError::NotFound)
        ));
    }
}
