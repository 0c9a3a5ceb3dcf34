use crate::app_state::AppState;
use crate::model::{NewProduct, ProductId, ProductRecord, UpdateProduct};
use crate::ApiError;
use axum::{
    extract::{Path, Query, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common_http_errors::ApiResult;
use serde::{Deserialize, Serialize};

fn parse_path_id(raw: &str) -> ApiResult<ProductId> {
    ProductId::parse(raw).map_err(|err| ApiError::bad_request("invalid_product_id", err.to_string()))
}

pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<ProductRecord>>> {
    Ok(Json(state.service.list().await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<ProductRecord>> {
    let id = parse_path_id(&raw_id)?;
    Ok(Json(state.service.get(&id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(new_product): Json<NewProduct>,
) -> ApiResult<Response> {
    let record = state.service.create(new_product).await?;
    let mut resp = (StatusCode::CREATED, Json(&record)).into_response();
    if let Ok(location) = HeaderValue::from_str(&format!("/products/{}", record.id)) {
        resp.headers_mut().insert(LOCATION, location);
    }
    Ok(resp)
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(update): Json<UpdateProduct>,
) -> ApiResult<StatusCode> {
    let id = parse_path_id(&raw_id)?;
    state.service.update(&id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_path_id(&raw_id)?;
    state.service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub quantity: i32,
    #[serde(default)]
    pub increase: bool,
}

pub async fn patch_stock(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<StockQuery>,
) -> ApiResult<StatusCode> {
    let id = parse_path_id(&raw_id)?;
    state.service.adjust_stock(&id, query.quantity, query.increase).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct StockMessage {
    pub message: String,
    pub stock_available: i32,
}

pub async fn decrement_stock(
    State(state): State<AppState>,
    Path((raw_id, quantity)): Path<(String, i32)>,
) -> ApiResult<Json<StockMessage>> {
    let id = parse_path_id(&raw_id)?;
    let record = state.service.adjust_stock(&id, quantity, false).await?;
    Ok(Json(StockMessage {
        message: format!("Stock decreased by {quantity} for product ID {id}."),
        stock_available: record.stock_available,
    }))
}

pub async fn add_to_stock(
    State(state): State<AppState>,
    Path((raw_id, quantity)): Path<(String, i32)>,
) -> ApiResult<Json<StockMessage>> {
    let id = parse_path_id(&raw_id)?;
    let record = state.service.adjust_stock(&id, quantity, true).await?;
    Ok(Json(StockMessage {
        message: format!("Stock increased by {quantity} for product ID {id}."),
        stock_available: record.stock_available,
    }))
}
