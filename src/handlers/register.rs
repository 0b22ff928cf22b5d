use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::User;
use crate::services::auth::hash_password;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String, // SecretBox不要（Deserialize後すぐハッシュ化）
    pub password_confirmation: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// ユーザー登録ハンドラー
///
/// POST /api/register
///
/// 登録成功時はそのままログイン済みとしてトークンペアを返す。
///
/// # Security
/// - パスワードはログに出力しない
/// - パスワードは即座にハッシュ化
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    // バリデーション
    validate_register_request(&request)?;

    // 表示名の決定（name がなければ first/last から合成）
    let name = resolve_name(&request);

    // パスワードハッシュ化
    let password_hash = hash_password(&request.password)?;

    // ユーザー作成
    let user = state
        .user_repo
        .create_user(&request.email, Some(&password_hash), &name, "user")
        .await
        .map_err(|e| {
            // UNIQUE制約違反チェック
            if let sqlx::Error::Database(db_err) = &e
                && db_err.constraint() == Some("users_email_key")
            {
                return AppError::EmailAlreadyExists;
            }
            AppError::Database(e)
        })?;

    tracing::info!(email = %request.email, "ユーザー登録成功");

    // 登録直後からログイン済みにする
    let (access_token, refresh_token) = state.token_service.issue_pair(&user)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user,
            access_token,
            refresh_token,
        }),
    ))
}

/// 表示名の決定
fn resolve_name(request: &RegisterRequest) -> String {
    if let Some(name) = request.name.as_deref()
        && !name.trim().is_empty()
    {
        return name.trim().to_string();
    }

    let first = request.first_name.as_deref().unwrap_or("").trim();
    let last = request.last_name.as_deref().unwrap_or("").trim();
    format!("{first} {last}").trim().to_string()
}

/// 登録リクエストのバリデーション
fn validate_register_request(request: &RegisterRequest) -> Result<(), AppError> {
    // email: 必須、メール形式
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }
    if !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    // password: 8文字以上
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }
    // 確認用パスワードの一致
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

    fn request(email: &str, password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            password_confirmation: confirmation.to_string(),
            name: None,
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn test_validate_empty_email() {
        let result = validate_register_request(&request("", "password123", "password123"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_invalid_email() {
        let result =
            validate_register_request(&request("invalid-email", "password123", "password123"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_short_password() {
        let result = validate_register_request(&request("test@example.com", "short", "short"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_mismatched_confirmation() {
        let result =
            validate_register_request(&request("test@example.com", "password123", "password456"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_valid_request() {
        let result =
            validate_register_request(&request("test@example.com", "Secret123!", "Secret123!"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_resolve_name_prefers_name() {
        let mut req = request("a@x.com", "password123", "password123");
        req.name = Some("Taro Yamada".to_string());
        req.first_name = Some("Ignored".to_string());
        assert_eq!(resolve_name(&req), "Taro Yamada");
    }

    #[test]
    fn test_resolve_name_composes_first_and_last() {
        let mut req = request("a@x.com", "password123", "password123");
        req.first_name = Some("Taro".to_string());
        req.last_name = Some("Yamada".to_string());
        assert_eq!(resolve_name(&req), "Taro Yamada");
    }

    #[test]
    fn test_resolve_name_empty_when_nothing_given() {
        let req = request("a@x.com", "password123", "password123");
        assert_eq!(resolve_name(&req), "");
    }
}
