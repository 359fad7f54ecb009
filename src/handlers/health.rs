use actix_web::{HttpResponse, Result};

use crate::models::HealthResponse;

/// Health check handler
///
/// # Errors
///
/// Never fails; the `Result` matches the other handlers
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: crate::VERSION.to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_health_reports_ok() {
        let response = health().await.unwrap();
        assert!(response.status().is_success());

        let body = to_bytes(response.into_body()).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.service, "tollgate");
    }
}
