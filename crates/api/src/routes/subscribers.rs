use axum::extract::State;
use axum::Json;
use delivery_events::SubscriberInfo;
use serde::Serialize;

use crate::auth::RequireToken;
use crate::state::AppState;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// GET /subscribers -- connected subscribers, oldest first.
pub async fn list_subscribers(
    _auth: RequireToken,
    State(state): State<AppState>,
) -> Json<DataResponse<Vec<SubscriberInfo>>> {
    Json(DataResponse {
        data: state.broadcaster.subscribers(),
    })
}
