use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use engine::Automation;

use crate::{ApiError, AppState};

/// Background trigger: the run happens after the response is sent. No
/// execution id is supplied, so inactive automations are recorded as skipped.
pub async fn handle_webhook(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let automation = Automation::try_from(state.automations.get_automation(id).await?)?;

    let executor = state.executor.clone();
    tokio::spawn(async move {
        match executor.execute_automation(&automation, payload, None).await {
            Ok(outcome) => info!(
                automation_id = %automation.id,
                execution_id = %outcome.execution_id,
                status = ?outcome.status,
                "Webhook run finished"
            ),
            Err(e) => error!(automation_id = %automation.id, error = %e, "Webhook run failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "webhook accepted", "automationId": id })),
    ))
}
