use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{AUTH_PROVIDER_EMAIL, User};
use crate::repositories::UserRepository;
use crate::services::{EmailService, auth::hash_password};

type HmacSha256 = Hmac<Sha256>;

/// リセットトークン生成器
///
/// トークンはDBに保存しない。ユーザーの認証関連状態
/// （パスワードハッシュ・最終ログイン時刻）のHMACを発行時刻と共に
/// 埋め込み、状態が変わると過去のトークンが全て無効になる。
/// パスワード変更後は同じトークンを再利用できないため、事実上の
/// ワンタイムトークンになる。
#[derive(Clone)]
pub struct ResetTokenGenerator {
    /// 署名キー（機密情報 - ログ出力禁止）
    secret: Arc<String>,
    ttl_secs: i64,
}

impl ResetTokenGenerator {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: Arc::new(secret.to_string()),
            ttl_secs,
        }
    }

    /// リセットトークンを生成（形式: `<発行時刻b36>-<hmac hex>`）
    pub fn make_token(&self, user: &User) -> String {
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        format!("{}-{}", to_base36(ts), self.mac_hex(user, ts))
    }

    /// トークンを検証
    ///
    /// 検証内容: 形式、有効期限（発行から ttl_secs 以内）、
    /// ユーザー状態ハッシュの一致（定数時間比較）
    pub fn check_token(&self, user: &User, token: &str) -> bool {
        let Some((ts_part, mac_part)) = token.split_once('-') else {
            return false;
        };
        let Some(ts) = from_base36(ts_part) else {
            return false;
        };

        // 有効期限チェック
        let age = OffsetDateTime::now_utc().unix_timestamp() - ts;
        if age > self.ttl_secs {
            return false;
        }

        let expected = self.mac_hex(user, ts);
        constant_time_eq(expected.as_bytes(), mac_part.as_bytes())
    }

    /// リセットチケットを生成（形式: `<base64url(ユーザーID)>:<トークン>`）
    pub fn make_ticket(&self, user: &User) -> String {
        format!("{}:{}", encode_user_ref(user.id), self.make_token(user))
    }

    /// ユーザーの認証関連状態のHMACを計算
    ///
    /// パスワードハッシュと最終ログイン時刻を含むため、どちらかが
    /// 変わると発行済みトークンは全て無効になる
    fn mac_hex(&self, user: &User, ts: i64) -> String {
        let last_login = user
            .last_login_at
            .map(|t| t.unix_timestamp().to_string())
            .unwrap_or_default();
        let state = format!(
            "{}\x00{}\x00{}\x00{}\x00{}",
            user.id,
            user.password_hash.as_deref().unwrap_or(""),
            last_login,
            user.email,
            ts,
        );

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(state.as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }
}

/// ユーザーIDを不透明な参照値にエンコード
pub fn encode_user_ref(user_id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(user_id.to_string().as_bytes())
}

/// 不透明な参照値からユーザーIDを復元
pub fn decode_user_ref(encoded: &str) -> Option<Uuid> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    let s = String::from_utf8(bytes).ok()?;
    Uuid::parse_str(&s).ok()
}

/// 定数時間比較（長さ不一致は即座にfalse）
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn to_base36(mut n: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

fn from_base36(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    i64::from_str_radix(s, 36).ok()
}

/// パスワードリセットサービス
#[derive(Clone)]
pub struct PasswordResetService {
    user_repo: UserRepository,
    email_service: EmailService,
    generator: ResetTokenGenerator,
    config: Arc<Config>,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(
        user_repo: UserRepository,
        email_service: EmailService,
        generator: ResetTokenGenerator,
        config: Arc<Config>,
    ) -> Self {
        Self {
            user_repo,
            email_service,
            generator,
            config,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も常に成功を返す（情報漏洩防止）
    /// - チケット（平文）はログに出力しない
    /// - Google連携アカウントへのリクエストはプロバイダ名を含む
    ///   エラーを返す（意図的なトレードオフ）
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let user = self.user_repo.find_by_email(email).await?;

        // ユーザーが存在しない場合も成功を返す（情報漏洩防止）
        let user = match user {
            Some(u) => u,
            None => {
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
                return Ok(());
            }
        };

        // ローカルパスワードを持たないアカウントはこの経路では変更不可
        if user.auth_provider != AUTH_PROVIDER_EMAIL {
            tracing::warn!(email = %email, provider = %user.auth_provider, "パスワードリセット: 対象外プロバイダ");
            return Err(AppError::WrongAuthProvider(user.auth_provider.clone()));
        }

        let ticket = self.generator.make_ticket(&user);
        let reset_url = self.build_reset_url(&ticket, email);

        // メール送信（失敗は再試行可能な DeliveryFailed として区別）
        self.email_service
            .send_password_reset_email(email, &reset_url)
            .await?;

        tracing::info!(email = %email, "パスワードリセットメール送信完了");

        Ok(())
    }

    /// パスワードをリセット
    ///
    /// 検証順: チケット形式 → ユーザー参照 → トークン →
    /// メールアドレス一致 → プロバイダ。呼び出し側が区別できるのは
    /// この4種の失敗のみ。
    ///
    /// # Security
    /// - チケット・新パスワードはログに出力しない
    pub async fn complete_reset(
        &self,
        email: &str,
        ticket: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let Some((user_ref, token)) = ticket.split_once(':') else {
            return Err(AppError::ResetTicketMalformed);
        };

        let user_id = decode_user_ref(user_ref).ok_or(AppError::ResetTicketInvalid)?;

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::ResetTicketInvalid)?;

        if !self.generator.check_token(&user, token) {
            tracing::warn!(user_id = %user.id, "無効または期限切れのリセットトークン");
            return Err(AppError::ResetTicketInvalid);
        }

        // チケットとメールの組み合わせ差し替え対策
        if user.email != email {
            tracing::warn!(user_id = %user.id, "リセットトークンとメールアドレスの不一致");
            return Err(AppError::ResetEmailMismatch);
        }

        if user.auth_provider != AUTH_PROVIDER_EMAIL {
            return Err(AppError::WrongAuthProvider(user.auth_provider.clone()));
        }

        let password_hash = hash_password(new_password)?;

        // この更新で状態ハッシュが変わり、同じチケットは再利用できなくなる
        self.user_repo
            .update_password(user.id, &password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "パスワードリセット完了");

        Ok(())
    }

    /// リセットURLを構築
    ///
    /// ワイヤ形式: `<base64url-user-ref>:<token>` をクエリに埋め込む
    fn build_reset_url(&self, ticket: &str, email: &str) -> String {
        let base = self
            .config
            .password_reset_url_base
            .as_deref()
            .unwrap_or("http://localhost:3000/reset-password");
        format!(
            "{}?token={}&email={}",
            base,
            ticket,
            urlencoding::encode(email)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::AUTH_PROVIDER_GOOGLE;

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
            password_hash: Some("$argon2id$v=19$m=19456,t=2,p=1$abc$def".to_string()),
            last_login_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn generator() -> ResetTokenGenerator {
        ResetTokenGenerator::new("reset-secret-key", 3600)
    }

    #[test]
    fn test_token_roundtrip() {
        let generator = generator();
        let user = test_user();

        let token = generator.make_token(&user);
        assert!(generator.check_token(&user, &token));
    }

    #[test]
    fn test_password_change_invalidates_token() {
        let generator = generator();
        let mut user = test_user();

        let token = generator.make_token(&user);
        assert!(generator.check_token(&user, &token));

        // パスワード変更後は同じトークンが通らない（ワンタイム性）
        user.password_hash = Some("$argon2id$v=19$m=19456,t=2,p=1$xyz$uvw".to_string());
        assert!(!generator.check_token(&user, &token));
    }

    #[test]
    fn test_login_invalidates_token() {
        let generator = generator();
        let mut user = test_user();

        let token = generator.make_token(&user);
        user.last_login_at = Some(OffsetDateTime::now_utc());
        assert!(!generator.check_token(&user, &token));
    }

    #[test]
    fn test_expired_token_rejected() {
        let generator = generator();
        let user = test_user();

        // TTLを過ぎた発行時刻でトークンを組み立てる
        let old_ts = OffsetDateTime::now_utc().unix_timestamp() - 7200;
        let stale = format!("{}-{}", to_base36(old_ts), generator.mac_hex(&user, old_ts));
        assert!(!generator.check_token(&user, &stale));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let generator = generator();
        let user = test_user();

        let token = generator.make_token(&user);
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push('0');
        // 末尾1文字の改ざんで一致しなくなる場合のみ検証
        if tampered != token {
            assert!(!generator.check_token(&user, &tampered));
        }

        assert!(!generator.check_token(&user, "no-dash-separator-missing"));
        assert!(!generator.check_token(&user, ""));
        assert!(!generator.check_token(&user, "!!!-abcdef"));
    }

    #[test]
    fn test_token_bound_to_user() {
        let generator = generator();
        let user = test_user();
        let mut other = test_user();
        other.id = Uuid::new_v4();

        let token = generator.make_token(&user);
        assert!(!generator.check_token(&other, &token));
    }

    #[test]
    fn test_user_ref_roundtrip() {
        let id = Uuid::new_v4();
        let encoded = encode_user_ref(id);
        assert_eq!(decode_user_ref(&encoded), Some(id));
    }

    #[test]
    fn test_user_ref_rejects_garbage() {
        assert_eq!(decode_user_ref("not base64url!!"), None);
        assert_eq!(decode_user_ref(""), None);
        // 正しいbase64でもUUIDでなければ拒否
        let encoded = URL_SAFE_NO_PAD.encode(b"hello world");
        assert_eq!(decode_user_ref(&encoded), None);
    }

    #[test]
    fn test_ticket_format() {
        let generator = generator();
        let user = test_user();

        let ticket = generator.make_ticket(&user);
        let (user_ref, token) = ticket.split_once(':').expect("ticket contains ':'");
        assert_eq!(decode_user_ref(user_ref), Some(user.id));
        assert!(generator.check_token(&user, token));
    }

    #[test]
    fn test_base36_roundtrip() {
        for n in [0, 1, 35, 36, 1700000000] {
            assert_eq!(from_base36(&to_base36(n)), Some(n));
        }
        assert_eq!(from_base36(""), None);
        assert_eq!(from_base36("!!"), None);
    }

    #[test]
    fn test_google_user_state_differs() {
        let generator = generator();
        let mut user = test_user();
        user.auth_provider = AUTH_PROVIDER_GOOGLE.to_string();
        user.password_hash = None;

        // パスワード未設定でもトークン生成自体は成立する
        let token = generator.make_token(&user);
        assert!(generator.check_token(&user, &token));
    }
}
