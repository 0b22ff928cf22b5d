use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::services::PasswordResetService;
use crate::state::AppState;

// === リセットリクエスト ===

#[derive(Debug, Deserialize)]
pub struct ResetRequestRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetRequestResponse {
    pub message: String,
}

/// POST /api/password/reset-request
///
/// # Security
/// ユーザー不在時も送信成功時と同一のレスポンスを返す
/// （存在有無を漏洩しない）。例外はGoogle連携アカウントで、
/// プロバイダ名を含むエラーを返す。
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequestRequest>,
) -> Result<Json<ResetRequestResponse>, AppError> {
    // バリデーション
    validate_email(&request.email)?;

    // リセット処理（ユーザー不在でもエラーにしない）
    let password_reset_service = PasswordResetService::new(
        state.user_repo.clone(),
        state.email_service.clone(),
        state.reset_generator.clone(),
        state.config.clone(),
    );
    password_reset_service.request_reset(&request.email).await?;

    Ok(Json(ResetRequestResponse {
        message: "パスワードリセット手順をメールで送信しました".to_string(),
    }))
}

// === パスワードリセット実行 ===

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    /// チケット形式: `<base64url-user-ref>:<token>`
    pub token: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: String,
}

/// POST /api/password/reset
///
/// # Security
/// - token, password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    // バリデーション
    validate_reset_password_request(&request)?;

    // リセット処理
    let password_reset_service = PasswordResetService::new(
        state.user_repo.clone(),
        state.email_service.clone(),
        state.reset_generator.clone(),
        state.config.clone(),
    );
    password_reset_service
        .complete_reset(&request.email, &request.token, &request.password)
        .await?;

    tracing::info!("パスワードリセット完了");

    Ok(Json(ResetPasswordResponse {
        message: "パスワードが更新されました".to_string(),
    }))
}

/// メールアドレスのバリデーション
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    Ok(())
}

/// リセットパスワードリクエストのバリデーション
fn validate_reset_password_request(request: &ResetPasswordRequest) -> Result<(), AppError> {
    validate_email(&request.email)?;
    if request.token.trim().is_empty() {
        return Err(AppError::Validation("トークンは必須です".to_string()));
    }
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }
    if request.password != request.password_confirmation {
        return Err(AppError::Validation(
            "パスワードが一致しません".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_request(token: &str, password: &str, confirmation: &str) -> ResetPasswordRequest {
        ResetPasswordRequest {
            email: "test@example.com".to_string(),
            token: token.to_string(),
            password: password.to_string(),
            password_confirmation: confirmation.to_string(),
        }
    }

    #[test]
    fn test_validate_empty_email() {
        let result = validate_email("");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_invalid_email() {
        let result = validate_email("invalid-email");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_valid_email() {
        let result = validate_email("test@example.com");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_empty_token() {
        let result =
            validate_reset_password_request(&reset_request("", "password123", "password123"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_short_password() {
        let result =
            validate_reset_password_request(&reset_request("valid-token", "short", "short"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_mismatched_confirmation() {
        let result = validate_reset_password_request(&reset_request(
            "valid-token",
            "password123",
            "password456",
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_valid_reset_request() {
        let result = validate_reset_password_request(&reset_request(
            "dGVzdA:abc123-def456",
            "password123",
            "password123",
        ));
        assert!(result.is_ok());
    }
}
