//! Google認証サービス
//!
//! フロントエンドから受け取ったGoogle IDトークン（アサーション）を検証し、
//! ローカルアカウントへ解決する（リンクまたは新規作成）。
//!
//! # Security
//! - 署名はGoogleのJWKS公開鍵でRS256検証
//! - audience / issuer の不一致は全て検証失敗として扱う
//! - 有効期限チェックには5分のクロックスキュー許容を設ける
//! - IDトークンはログに出力しない

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::User;
use crate::repositories::UserRepository;

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
/// 有効期限検証のクロックスキュー許容（秒）
const CLOCK_SKEW_SECS: u64 = 300;

/// JWKSレスポンス
#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// JWKS内の公開鍵
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    /// RSA modulus (base64url)
    n: String,
    /// RSA exponent (base64url)
    e: String,
}

/// 検証済みIDトークンのクレーム
#[derive(Debug, Deserialize)]
struct GoogleIdClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// 検証済みのGoogleユーザー情報
#[derive(Debug, Clone)]
pub struct GoogleUserInfo {
    pub google_id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Google認証サービス
#[derive(Clone)]
pub struct GoogleAuthService {
    client_id: String,
    user_repo: UserRepository,
    http_client: reqwest::Client,
}

impl GoogleAuthService {
    /// 新しい GoogleAuthService を作成
    pub fn new(client_id: String, user_repo: UserRepository) -> Self {
        Self {
            client_id,
            user_repo,
            http_client: reqwest::Client::new(),
        }
    }

    /// IDトークンを検証し、ローカルユーザーへ解決する
    ///
    /// 戻り値の bool は新規作成されたアカウントかどうか。
    /// 同一アサーションでの再認証は冪等（ユーザーは一度しか作られない）。
    pub async fn authenticate(&self, id_token: &str) -> Result<(User, bool), AppError> {
        let info = self.verify_id_token(id_token).await?;
        self.resolve_user(info).await
    }

    /// IDトークンの署名・audience・issuer・有効期限を検証
    async fn verify_id_token(&self, id_token: &str) -> Result<GoogleUserInfo, AppError> {
        let header = decode_header(id_token)
            .map_err(|e| AppError::AssertionInvalid(format!("invalid token header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::AssertionInvalid("token has no key id".to_string()))?;

        // Googleの公開鍵を取得（通信失敗は再試行可能なエラー）
        let jwks: JwkSet = self
            .http_client
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Google JWKS取得エラー");
                AppError::GoogleUnavailable
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Google JWKSレスポンスのパースエラー");
                AppError::GoogleUnavailable
            })?;

        let jwk = find_jwk(&jwks.keys, &kid)
            .ok_or_else(|| AppError::AssertionInvalid(format!("unknown key id: {kid}")))?;

        let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| AppError::AssertionInvalid(format!("invalid jwks key: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<GoogleIdClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| AppError::AssertionInvalid(e.to_string()))?
            .claims;

        let email = claims.email.ok_or(AppError::MissingEmail)?;

        Ok(GoogleUserInfo {
            google_id: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
        })
    }

    /// Googleユーザー情報をローカルユーザーへ解決
    ///
    /// # 解決順序
    /// 1. google_id で検索 → 既存ユーザー（名前・画像の差分を反映）
    /// 2. email で検索 → 既存アカウントに google_id をリンク
    /// 3. どちらも不在 → パスワードなしで新規作成
    ///
    /// 新規作成は users_google_id_key のUNIQUE制約で競合し得る
    /// （分散ロックなし）。違反時は再検索してリンク扱いにする。
    async fn resolve_user(&self, info: GoogleUserInfo) -> Result<(User, bool), AppError> {
        // 1. google_id で検索
        if let Some(user) = self.user_repo.find_by_google_id(&info.google_id).await? {
            let user = self.refresh_profile(user, &info).await?;
            return Ok((user, false));
        }

        // 2. email で検索してリンク
        if let Some(user) = self.user_repo.find_by_email(&info.email).await? {
            tracing::info!(user_id = %user.id, "既存アカウントにGoogle IDをリンク");
            let user = self
                .user_repo
                .link_google_identity(user.id, &info.google_id, info.picture.as_deref())
                .await?;
            return Ok((user, false));
        }

        // 3. 新規作成
        let name = derive_display_name(info.name.as_deref(), &info.email);
        match self
            .user_repo
            .create_google_user(&info.email, &name, &info.google_id, info.picture.as_deref())
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Google連携ユーザーを新規作成");
                Ok((user, true))
            }
            Err(e) if is_unique_violation(&e) => {
                // 初回ログイン同士の競合: 先行したトランザクションの
                // 結果を再検索してリンク扱いにする
                tracing::warn!("Google連携ユーザー作成の競合を検出、再検索");
                if let Some(user) = self.user_repo.find_by_google_id(&info.google_id).await? {
                    return Ok((user, false));
                }
                if let Some(user) = self.user_repo.find_by_email(&info.email).await? {
                    let user = self
                        .user_repo
                        .link_google_identity(user.id, &info.google_id, info.picture.as_deref())
                        .await?;
                    return Ok((user, false));
                }
                Err(AppError::Database(e))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// 名前・画像が変わっていれば反映
    async fn refresh_profile(
        &self,
        user: User,
        info: &GoogleUserInfo,
    ) -> Result<User, AppError> {
        let new_name = info
            .name
            .as_deref()
            .filter(|name| !name.is_empty() && *name != user.name);
        let new_picture = info
            .picture
            .as_deref()
            .filter(|pic| user.profile_image_url.as_deref() != Some(*pic));

        if new_name.is_none() && new_picture.is_none() {
            return Ok(user);
        }

        let user = self
            .user_repo
            .refresh_google_profile(user.id, new_name, new_picture)
            .await?;
        Ok(user)
    }
}

/// kid が一致する公開鍵を選択
fn find_jwk<'a>(keys: &'a [Jwk], kid: &str) -> Option<&'a Jwk> {
    keys.iter().find(|key| key.kid == kid)
}

/// 表示名の決定（アサーションの名前、なければメールのローカル部）
fn derive_display_name(name: Option<&str>, email: &str) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => email.split('@').next().unwrap_or(email).to_string(),
    }
}

/// UNIQUE制約違反か
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.constraint().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_display_name_prefers_assertion_name() {
        assert_eq!(
            derive_display_name(Some("Taro Yamada"), "taro@example.com"),
            "Taro Yamada"
        );
    }

    #[test]
    fn test_derive_display_name_falls_back_to_local_part() {
        assert_eq!(derive_display_name(None, "taro@example.com"), "taro");
        assert_eq!(derive_display_name(Some(""), "taro@example.com"), "taro");
    }

    #[test]
    fn test_find_jwk_by_kid() {
        let keys = vec![
            Jwk {
                kid: "key-1".to_string(),
                n: "n1".to_string(),
                e: "AQAB".to_string(),
            },
            Jwk {
                kid: "key-2".to_string(),
                n: "n2".to_string(),
                e: "AQAB".to_string(),
            },
        ];

        assert_eq!(find_jwk(&keys, "key-2").map(|k| k.n.as_str()), Some("n2"));
        assert!(find_jwk(&keys, "key-3").is_none());
    }
}
