use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証エラー: {0}")]
    Authentication(String),

    #[error("アクセストークンの有効期限が切れています")]
    TokenExpired,

    #[error("無効なトークンです")]
    TokenInvalid,

    #[error("この操作を行う権限がありません")]
    Forbidden,

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("リソースが見つかりません")]
    NotFound,

    #[error("リセットトークンの形式が不正です")]
    ResetTicketMalformed,

    #[error("無効または期限切れのリンクです")]
    ResetTicketInvalid,

    #[error("メールアドレスがリセットトークンと一致しません")]
    ResetEmailMismatch,

    #[error("このアカウントは{0}認証を使用しています")]
    WrongAuthProvider(String),

    #[error("Googleアカウントにメールアドレスがありません")]
    MissingEmail,

    #[error("Google IDトークンの検証に失敗しました: {0}")]
    AssertionInvalid(String),

    #[error("Google認証サービスとの通信に失敗しました")]
    GoogleUnavailable,

    #[error("メール送信に失敗しました")]
    EmailDelivery,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "メールアドレスまたはパスワードが正しくありません".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "アクセストークンの有効期限が切れています".to_string(),
            ),
            Self::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                "認証情報が無効です".to_string(),
            ),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "この操作を行う権限がありません".to_string(),
            ),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::EmailAlreadyExists => (
                StatusCode::CONFLICT,
                "このメールアドレスは既に使用されています".to_string(),
            ),
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                "リソースが見つかりません".to_string(),
            ),
            Self::ResetTicketMalformed => (
                StatusCode::BAD_REQUEST,
                "リセットトークンの形式が不正です".to_string(),
            ),
            Self::ResetTicketInvalid => (
                StatusCode::BAD_REQUEST,
                "無効または期限切れのリンクです".to_string(),
            ),
            Self::ResetEmailMismatch => (
                StatusCode::BAD_REQUEST,
                "メールアドレスがリセットトークンと一致しません".to_string(),
            ),
            // プロバイダ名の開示は意図的（リクエスト本人へのUX優先）
            Self::WrongAuthProvider(provider) => (
                StatusCode::BAD_REQUEST,
                format!(
                    "このアカウントは{provider}認証を使用しています。{provider}でサインインしてください"
                ),
            ),
            Self::MissingEmail => (
                StatusCode::BAD_REQUEST,
                "Googleアカウントにメールアドレスがありません".to_string(),
            ),
            Self::AssertionInvalid(e) => {
                tracing::warn!(error = %e, "Google IDトークン検証エラー");
                (
                    StatusCode::UNAUTHORIZED,
                    "Google認証に失敗しました".to_string(),
                )
            }
            Self::GoogleUnavailable => (
                StatusCode::BAD_GATEWAY,
                "外部認証サービスとの通信に失敗しました".to_string(),
            ),
            Self::EmailDelivery => (
                StatusCode::BAD_GATEWAY,
                "メール送信に失敗しました。しばらくしてから再試行してください".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
