use serde::Serialize;
use utoipa::ToSchema;

/// Standard error body returned by API endpoints
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
