use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ユーザー
///
/// password_hash が None のユーザーはパスワード認証不可
/// （Google連携で作成されたアカウント、またはリセット前のアカウント）
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// 表示用ロールタグ（"user" / "admin" など自由形式）
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    pub profile_image_url: Option<String>,
    /// "email" または "google"
    pub auth_provider: String,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(skip)]
    pub is_superuser: bool,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip)]
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub const AUTH_PROVIDER_EMAIL: &str = "email";
pub const AUTH_PROVIDER_GOOGLE: &str = "google";

impl User {
    /// 表示名（未設定ならメールのローカル部で代替）
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.email
                .split('@')
                .next()
                .unwrap_or(&self.email)
                .to_string()
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(name: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
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

    #[test]
    fn test_display_name_prefers_name() {
        let user = user_with("Taro", "taro@example.com");
        assert_eq!(user.display_name(), "Taro");
    }

    #[test]
    fn test_display_name_falls_back_to_local_part() {
        let user = user_with("", "taro@example.com");
        assert_eq!(user.display_name(), "taro");
    }
}
