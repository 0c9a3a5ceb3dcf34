use common_http_errors::{ApiError, ERROR_CODE_HEADER};
use axum::response::IntoResponse;
use axum::http::StatusCode;
use http_body_util::BodyExt;

#[test]
fn bad_request_variant() {
    let err = ApiError::BadRequest { code: "invalid_something", message: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get(ERROR_CODE_HEADER).unwrap(), "invalid_something");
}

#[test]
fn not_found_variant() {
    let err = ApiError::not_found("missing_resource");
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get(ERROR_CODE_HEADER).unwrap(), "missing_resource");
}

#[test]
fn conflict_variant() {
    let err = ApiError::Conflict { code: "insufficient_stock", message: Some("requested 10, available 5".into()) };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get(ERROR_CODE_HEADER).unwrap(), "insufficient_stock");
}

#[test]
fn service_unavailable_sets_retry_after() {
    let err = ApiError::ServiceUnavailable { code: "id_allocation_exhausted", message: None, retry_after_secs: Some(1) };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.headers().get("retry-after").unwrap(), "1");
}

#[tokio::test]
async fn internal_variant_body_shape() {
    let err = ApiError::internal("boom");
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get(ERROR_CODE_HEADER).unwrap(), "internal_error");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "internal_error");
    assert_eq!(body["message"], "boom");
}
