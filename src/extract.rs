//! 認証済み呼び出しコンテキストの抽出
//!
//! Authorization ヘッダのベアラートークンを検証し、DB上のユーザーを
//! 取り直して [`CallerContext`] を構築する。ハンドラーの引数に
//! `CallerContext` を書くだけで認可必須のエンドポイントになる。

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::visibility::CallerContext;
use crate::state::AppState;

impl FromRequestParts<AppState> for CallerContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::TokenInvalid)?;

        let token = bearer_token(header).ok_or(AppError::TokenInvalid)?;

        let claims = state.token_service.validate_access(token)?;

        // クレームだけでなくDB上のユーザーを取り直す
        // （無効化済みアカウントのトークンを弾くため）
        let user = state
            .user_repo
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::TokenInvalid)?;

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "無効化済みアカウントのトークン");
            return Err(AppError::TokenInvalid);
        }

        Ok(CallerContext::from_user(&user))
    }
}

/// `Bearer <token>` 形式からトークン部分を取り出す
fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extracts_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token(""), None);
    }
}
