use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use db::models::ExecutionLogRow;

use crate::{ApiError, AppState};

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionLogRow>, ApiError> {
    Ok(Json(state.logs.get_log(id).await?))
}
