use crate::id_allocator::AllocationError;
use crate::model::ValidationError;
use crate::service::ServiceError;
use crate::stock::AdjustError;
use crate::store::StoreError;
use common_http_errors::ApiError;

/// Seconds clients are told to wait before retrying a contended write.
pub const RETRY_AFTER_SECS: u64 = 1;

fn validation_code(err: &ValidationError) -> &'static str {
    match err {
        ValidationError::EmptyName => "invalid_name",
        ValidationError::NegativeStock(_) => "invalid_stock",
        ValidationError::InvalidPrice(_) => "invalid_price",
        ValidationError::InvalidId(_) => "invalid_product_id",
    }
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Duplicate(id) => ApiError::Conflict { code: "duplicate_product_id", message: Some(format!("product {id} already exists")) },
        err if err.is_transient() => ApiError::ServiceUnavailable {
            code: "store_busy",
            message: Some(err.to_string()),
            retry_after_secs: Some(RETRY_AFTER_SECS),
        },
        err => {
            tracing::error!(error = %err, "Product store failure");
            ApiError::internal(err)
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(err) => ApiError::bad_request(validation_code(&err), err.to_string()),
            ServiceError::IdMismatch { .. } => ApiError::bad_request("product_id_mismatch", err.to_string()),
            ServiceError::NotFound(_) => ApiError::not_found("product_not_found"),
            ServiceError::Allocation(AllocationError::Exhausted { attempts }) => ApiError::ServiceUnavailable {
                code: "id_allocation_exhausted",
                message: Some(format!("could not allocate a product id after {attempts} attempts")),
                retry_after_secs: Some(RETRY_AFTER_SECS),
            },
            ServiceError::Allocation(err @ AllocationError::IdSpaceExhausted { .. }) => {
                tracing::error!(error = %err, "Product id space exhausted");
                ApiError::internal(err)
            }
            ServiceError::Allocation(AllocationError::Store(err)) => store_error(err),
            ServiceError::Adjust(err) => match err {
                AdjustError::InvalidQuantity(_) => ApiError::bad_request("invalid_quantity", err.to_string()),
                AdjustError::NotFound(_) => ApiError::not_found("product_not_found"),
                AdjustError::InsufficientStock { .. } => ApiError::Conflict { code: "insufficient_stock", message: Some(err.to_string()) },
                AdjustError::Contention { .. } => ApiError::ServiceUnavailable {
                    code: "stock_contention",
                    message: Some(err.to_string()),
                    retry_after_secs: Some(RETRY_AFTER_SECS),
                },
                AdjustError::Store(err) => store_error(err),
            },
            ServiceError::Store(err) => store_error(err),
        }
    }
}
