pub mod api_error;
pub mod app;
pub mod app_state;
pub mod config;
pub mod id_allocator;
pub mod model;
pub mod product_handlers;
pub mod retry;
pub mod service;
pub mod stock;
pub mod store;

pub use app::build_router;
pub use common_http_errors::ApiError;
