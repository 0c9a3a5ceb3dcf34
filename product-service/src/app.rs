use crate::app_state::AppState;
use crate::product_handlers::{
    add_to_stock, create_product, decrement_stock, delete_product, get_product, list_products, patch_stock,
    update_product,
};
use axum::{
    extract::{Request, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, put},
    Router,
};
use common_http_errors::ERROR_CODE_HEADER;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const SERVICE_NAME: &str = "product-service";

const ALLOWED_ORIGINS: [&str; 3] = ["http://localhost:3000", "http://localhost:3001", "http://localhost:5173"];

async fn track_http_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get(ERROR_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        state
            .metrics
            .http_errors_total
            .with_label_values(&[SERVICE_NAME, code, status.as_str()])
            .inc();
    }
    resp
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.render().map_err(|err| {
        tracing::error!(error = %err, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            ALLOWED_ORIGINS
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([ACCEPT, CONTENT_TYPE]);

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(render_metrics))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/products/:id/stock", patch(patch_stock))
        .route("/products/decrement-stock/:id/:quantity", put(decrement_stock))
        .route("/products/add-to-stock/:id/:quantity", put(add_to_stock))
        .layer(middleware::from_fn_with_state(state.clone(), track_http_errors))
        .with_state(state)
        .layer(cors)
}
