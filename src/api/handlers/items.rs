use crate::AppState;
use crate::api::error::AppError;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ItemResponse {
    pub message: String,
    #[schema(value_type = Object)]
    pub item: Map<String, Value>,
}

#[utoipa::path(
    post,
    path = "/items",
    request_body(content = Object, description = "Arbitrary JSON item"),
    responses(
        (status = 201, description = "Item upserted", body = ItemResponse),
        (status = 400, description = "Body is not a JSON object"),
        (status = 500, description = "Database call failed")
    ),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ItemResponse>), AppError> {
    let Value::Object(item) = body else {
        return Err(AppError::BadRequest(
            "Item must be a JSON object".to_string(),
        ));
    };

    let item = state.items.create_item(item).await?;

    Ok((
        StatusCode::CREATED,
        Json(ItemResponse {
            message: "Item created".to_string(),
            item,
        }),
    ))
}
