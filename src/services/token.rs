use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;

/// トークン種別
///
/// アクセストークンとリフレッシュトークンは相互に使用不可
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWTクレーム
///
/// ステートレス認可のためユーザー情報（email / name / role）を
/// トークン自体に埋め込む。サーバー側の失効リストは持たない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザーID
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub token_type: TokenType,
    /// 発行時刻（Unixタイムスタンプ）
    pub iat: i64,
    /// 有効期限（Unixタイムスタンプ）
    pub exp: i64,
}

impl Claims {
    /// 指定有効期間のクレームを作成
    pub fn new(user: &User, token_type: TokenType, ttl: Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            token_type,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        }
    }
}

/// トークンサービス
///
/// 署名と有効期限のみで検証するステートレスなベアラートークンを発行する。
/// 入力と共有キーの純関数なのでスレッドセーフ。
#[derive(Clone)]
pub struct TokenService {
    /// 署名キー（機密情報 - ログ出力禁止）
    secret: Arc<String>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    /// 新しい TokenService を作成
    pub fn new(secret: &str, access_ttl_mins: i64, refresh_ttl_days: i64) -> Self {
        Self {
            secret: Arc::new(secret.to_string()),
            access_ttl: Duration::minutes(access_ttl_mins),
            refresh_ttl: Duration::days(refresh_ttl_days),
        }
    }

    /// アクセス/リフレッシュトークンのペアを発行
    pub fn issue_pair(&self, user: &User) -> Result<(String, String), AppError> {
        let access = self.encode_claims(&Claims::new(user, TokenType::Access, self.access_ttl))?;
        let refresh =
            self.encode_claims(&Claims::new(user, TokenType::Refresh, self.refresh_ttl))?;
        Ok((access, refresh))
    }

    /// アクセストークンを検証してクレームを取得
    pub fn validate_access(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.decode_claims(token)?;
        if claims.token_type != TokenType::Access {
            tracing::warn!("トークン種別不一致（refresh が提示された）");
            return Err(AppError::TokenInvalid);
        }
        Ok(claims)
    }

    /// リフレッシュトークンを検証してクレームを取得
    pub fn validate_refresh(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.decode_claims(token)?;
        if claims.token_type != TokenType::Refresh {
            tracing::warn!("トークン種別不一致（access が提示された）");
            return Err(AppError::TokenInvalid);
        }
        Ok(claims)
    }

    /// リフレッシュトークンから新しいアクセストークンを発行
    pub fn refresh_access(&self, refresh_token: &str) -> Result<String, AppError> {
        let claims = self.validate_refresh(refresh_token)?;

        let now = OffsetDateTime::now_utc();
        let access = Claims {
            token_type: TokenType::Access,
            iat: now.unix_timestamp(),
            exp: (now + self.access_ttl).unix_timestamp(),
            ..claims
        };
        self.encode_claims(&access)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, AppError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| {
            tracing::error!(error = ?e, "トークン署名エラー");
            AppError::Internal(anyhow::anyhow!("token encoding error"))
        })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::TokenInvalid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::AUTH_PROVIDER_EMAIL;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "taro@example.com".to_string(),
            name: "Taro".to_string(),
            role: "user".to_string(),
            google_id: None,
            profile_image_url: None,
            auth_provider: AUTH_PROVIDER_EMAIL.to_string(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            password_hash: None,
            last_login_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn service() -> TokenService {
        TokenService::new("test-secret-key-at-least-32-bytes!!", 60, 7)
    }

    #[test]
    fn test_issue_and_validate_roundtrip() {
        let service = service();
        let user = test_user();

        let (access, refresh) = service.issue_pair(&user).unwrap();

        let claims = service.validate_access(&access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "taro@example.com");
        assert_eq!(claims.name, "Taro");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.token_type, TokenType::Access);

        let claims = service.validate_refresh(&refresh).unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let service = service();
        let user = test_user();
        let (access, refresh) = service.issue_pair(&user).unwrap();

        assert!(matches!(
            service.validate_access(&refresh),
            Err(AppError::TokenInvalid)
        ));
        assert!(matches!(
            service.validate_refresh(&access),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let user = test_user();
        let (access, _) = service().issue_pair(&user).unwrap();

        let other = TokenService::new("another-secret-key-32-bytes-long!!", 60, 7);
        assert!(matches!(
            other.validate_access(&access),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = service();
        let user = test_user();

        // jsonwebtoken のデフォルト leeway (60秒) を超えて失効させる
        let expired = Claims::new(&user, TokenType::Access, Duration::seconds(-120));
        let token = service.encode_claims(&expired).unwrap();

        assert!(matches!(
            service.validate_access(&token),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn test_refresh_issues_new_access_token() {
        let service = service();
        let user = test_user();
        let (_, refresh) = service.issue_pair(&user).unwrap();

        let new_access = service.refresh_access(&refresh).unwrap();
        let claims = service.validate_access(&new_access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn test_refresh_rejects_access_token() {
        let service = service();
        let user = test_user();
        let (access, _) = service.issue_pair(&user).unwrap();

        assert!(service.refresh_access(&access).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = service();
        assert!(matches!(
            service.validate_access("not-a-jwt"),
            Err(AppError::TokenInvalid)
        ));
    }
}
