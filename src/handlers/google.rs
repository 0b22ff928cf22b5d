//! Google認証ハンドラー
//!
//! フロントエンドで取得したGoogle IDトークンを受け取り、
//! 検証とアカウント解決（リンクまたは新規作成）を行う。
//!
//! # Security
//! - IDトークンはログに出力しない

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// Google認証リクエスト
#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    /// Google IDトークン（アサーション）
    pub token: String,
}

/// Google認証レスポンス
#[derive(Debug, Serialize)]
pub struct GoogleAuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// アカウントが今回の認証で新規作成されたか
    /// （フロントエンドのオンボーディング分岐に使用）
    pub is_new_user: bool,
}

/// Google認証ハンドラー
///
/// POST /api/auth/google
///
/// 処理フロー:
/// 1. IDトークンの検証（署名・audience・issuer・有効期限）
/// 2. ローカルユーザーへの解決（google_id → email → 新規作成）
/// 3. 最終ログイン時刻を更新
/// 4. トークンペアを発行
pub async fn google_auth(
    State(state): State<AppState>,
    Json(request): Json<GoogleAuthRequest>,
) -> Result<Json<GoogleAuthResponse>, AppError> {
    if request.token.trim().is_empty() {
        return Err(AppError::Validation("トークンは必須です".to_string()));
    }

    let google_service = state.google_auth_service.as_ref().ok_or_else(|| {
        tracing::warn!("Google認証が設定されていません");
        AppError::GoogleUnavailable
    })?;

    let (user, is_new_user) = google_service.authenticate(&request.token).await?;

    state.user_repo.touch_last_login(user.id).await?;

    let (access_token, refresh_token) = state.token_service.issue_pair(&user)?;

    tracing::info!(user_id = %user.id, is_new_user, "Google認証成功");

    Ok(Json(GoogleAuthResponse {
        user,
        access_token,
        refresh_token,
        is_new_user,
    }))
}
