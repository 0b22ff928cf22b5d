use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// トークンリフレッシュリクエスト
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// トークンリフレッシュレスポンス
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// トークンリフレッシュハンドラー
///
/// POST /api/token/refresh
///
/// リフレッシュトークンを検証し、新しいアクセストークンを発行する。
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    if request.refresh_token.trim().is_empty() {
        return Err(AppError::Validation(
            "リフレッシュトークンは必須です".to_string(),
        ));
    }

    let access_token = state.token_service.refresh_access(&request.refresh_token)?;

    Ok(Json(RefreshResponse { access_token }))
}
