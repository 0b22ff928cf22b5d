use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// ヘルスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// ヘルスチェックハンドラー
///
/// GET /api/health
///
/// サービスの稼働状況を返す。
/// ロードバランサーやモニタリングツールから呼び出される。
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// レディネスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub db: &'static str,
}

/// レディネスチェックハンドラー
///
/// GET /api/ready
///
/// DB接続まで含めて確認する。
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, AppError> {
    sqlx::query("SELECT 1").execute(&state.db_pool).await?;

    Ok(Json(ReadyResponse {
        status: "ok",
        db: "ok",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let response = health_check().await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
    }
}
