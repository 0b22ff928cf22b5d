use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;
use crate::services::visibility::Scope;

const USER_COLUMNS: &str = "id, email, name, role, google_id, profile_image_url, auth_provider, \
     is_active, is_staff, is_superuser, password_hash, last_login_at, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// メールアドレスでユーザーを検索
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// ユーザーIDでユーザーを検索
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Google IDでユーザーを検索
    pub async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = $1"
        ))
        .bind(google_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 新しいユーザーを作成
    ///
    /// password_hash が None の場合はパスワード認証不可のアカウントになる
    ///
    /// # Errors
    /// - UNIQUE制約違反時: `sqlx::Error::Database` (constraint = "users_email_key")
    ///   呼び出し側で `AppError::EmailAlreadyExists` に変換すること
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: Option<&str>,
        name: &str,
        role: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role)
        .fetch_one(&self.pool)
        .await
    }

    /// Google連携ユーザーを作成（パスワードなし）
    ///
    /// # Errors
    /// - UNIQUE制約違反時: `sqlx::Error::Database`
    ///   (constraint = "users_google_id_key" または "users_email_key")
    ///   初回ログイン同士の競合は呼び出し側で再検索してリンク扱いにすること
    pub async fn create_google_user(
        &self,
        email: &str,
        name: &str,
        google_id: &str,
        profile_image_url: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, google_id, profile_image_url, auth_provider, password_hash)
            VALUES ($1, $2, $3, $4, 'google', NULL)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(name)
        .bind(google_id)
        .bind(profile_image_url)
        .fetch_one(&self.pool)
        .await
    }

    /// 既存アカウントにGoogle IDをリンク
    ///
    /// auth_provider は google_id が未設定だった場合のみ 'google' に昇格、
    /// profile_image_url は空の場合のみ補完する
    pub async fn link_google_identity(
        &self,
        user_id: Uuid,
        google_id: &str,
        profile_image_url: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET google_id = $2,
                auth_provider = CASE WHEN google_id IS NULL THEN 'google' ELSE auth_provider END,
                profile_image_url = COALESCE(profile_image_url, $3),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(google_id)
        .bind(profile_image_url)
        .fetch_one(&self.pool)
        .await
    }

    /// Googleプロフィール（名前・画像）の差分を反映
    pub async fn refresh_google_profile(
        &self,
        user_id: Uuid,
        name: Option<&str>,
        profile_image_url: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                profile_image_url = COALESCE($3, profile_image_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(name)
        .bind(profile_image_url)
        .fetch_one(&self.pool)
        .await
    }

    /// ユーザーのパスワードを更新
    ///
    /// # Note
    /// password_hash はログに出力しないこと。
    /// この更新により発行済みのリセットトークンは全て無効になる。
    pub async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 最終ログイン時刻を更新
    ///
    /// リセットトークンの状態ハッシュに含まれるため、ログインも
    /// 発行済みトークンを無効化する
    pub async fn touch_last_login(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// ユーザー一覧（チームメンバー可視性でスコープ）
    ///
    /// - `Scope::All`: 全アクティブユーザー
    /// - `Scope::RelatedTo`: 可視プロジェクトの所有者・メンバー・
    ///   可視タスクのアサイン先の和集合（アクティブのみ）
    ///
    /// limit が None の場合は全件（`LIMIT NULL` は無制限）
    pub async fn list_team_members(
        &self,
        scope: &Scope,
        limit: Option<i64>,
    ) -> Result<Vec<User>, sqlx::Error> {
        match scope {
            Scope::All => {
                sqlx::query_as::<_, User>(&format!(
                    r#"
                    SELECT {USER_COLUMNS} FROM users
                    WHERE is_active
                    ORDER BY created_at DESC
                    LIMIT $1
                    "#
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            Scope::RelatedTo(user_id) => {
                sqlx::query_as::<_, User>(&format!(
                    r#"
                    SELECT {USER_COLUMNS} FROM users u
                    WHERE u.is_active AND u.id IN (
                        SELECT p.owner_id FROM projects p
                        WHERE p.owner_id IS NOT NULL
                          AND (p.owner_id = $1
                               OR EXISTS (SELECT 1 FROM project_members pm
                                          WHERE pm.project_id = p.id AND pm.user_id = $1)
                               OR EXISTS (SELECT 1 FROM task_assignments ta
                                          JOIN tasks t ON t.id = ta.task_id
                                          WHERE t.project_id = p.id AND ta.user_id = $1))
                        UNION
                        SELECT pm2.user_id FROM project_members pm2
                        WHERE pm2.project_id IN (
                            SELECT p.id FROM projects p
                            WHERE p.owner_id = $1
                               OR EXISTS (SELECT 1 FROM project_members pm
                                          WHERE pm.project_id = p.id AND pm.user_id = $1)
                               OR EXISTS (SELECT 1 FROM task_assignments ta
                                          JOIN tasks t ON t.id = ta.task_id
                                          WHERE t.project_id = p.id AND ta.user_id = $1))
                        UNION
                        SELECT ta2.user_id FROM task_assignments ta2
                        WHERE ta2.task_id IN (
                            SELECT t.id FROM tasks t
                            WHERE EXISTS (SELECT 1 FROM task_assignments ta
                                          WHERE ta.task_id = t.id AND ta.user_id = $1)
                               OR t.created_by = $1
                               OR (t.project_id IS NOT NULL AND t.project_id IN (
                                    SELECT p.id FROM projects p
                                    WHERE p.owner_id = $1
                                       OR EXISTS (SELECT 1 FROM project_members pm
                                                  WHERE pm.project_id = p.id AND pm.user_id = $1)
                                       OR EXISTS (SELECT 1 FROM task_assignments ta
                                                  JOIN tasks t2 ON t2.id = ta.task_id
                                                  WHERE t2.project_id = p.id AND ta.user_id = $1))))
                    )
                    ORDER BY u.created_at DESC
                    LIMIT $2
                    "#
                ))
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// チームメンバー数（list_team_members と同じスコープ）
    pub async fn count_team_members(&self, scope: &Scope) -> Result<i64, sqlx::Error> {
        match scope {
            Scope::All => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active")
                    .fetch_one(&self.pool)
                    .await
            }
            Scope::RelatedTo(user_id) => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*) FROM users u
                    WHERE u.is_active AND u.id IN (
                        SELECT p.owner_id FROM projects p
                        WHERE p.owner_id IS NOT NULL
                          AND (p.owner_id = $1
                               OR EXISTS (SELECT 1 FROM project_members pm
                                          WHERE pm.project_id = p.id AND pm.user_id = $1)
                               OR EXISTS (SELECT 1 FROM task_assignments ta
                                          JOIN tasks t ON t.id = ta.task_id
                                          WHERE t.project_id = p.id AND ta.user_id = $1))
                        UNION
                        SELECT pm2.user_id FROM project_members pm2
                        WHERE pm2.project_id IN (
                            SELECT p.id FROM projects p
                            WHERE p.owner_id = $1
                               OR EXISTS (SELECT 1 FROM project_members pm
                                          WHERE pm.project_id = p.id AND pm.user_id = $1)
                               OR EXISTS (SELECT 1 FROM task_assignments ta
                                          JOIN tasks t ON t.id = ta.task_id
                                          WHERE t.project_id = p.id AND ta.user_id = $1))
                        UNION
                        SELECT ta2.user_id FROM task_assignments ta2
                        WHERE ta2.task_id IN (
                            SELECT t.id FROM tasks t
                            WHERE EXISTS (SELECT 1 FROM task_assignments ta
                                          WHERE ta.task_id = t.id AND ta.user_id = $1)
                               OR t.created_by = $1
                               OR (t.project_id IS NOT NULL AND t.project_id IN (
                                    SELECT p.id FROM projects p
                                    WHERE p.owner_id = $1
                                       OR EXISTS (SELECT 1 FROM project_members pm
                                                  WHERE pm.project_id = p.id AND pm.user_id = $1)
                                       OR EXISTS (SELECT 1 FROM task_assignments ta
                                                  JOIN tasks t2 ON t2.id = ta.task_id
                                                  WHERE t2.project_id = p.id AND ta.user_id = $1))))
                    )
                    "#,
                )
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
            }
        }
    }

    /// ユーザープロフィールを更新（管理者操作）
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        name: Option<&str>,
        role: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                role = COALESCE($3, role),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(name)
        .bind(role)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
    }

    /// ユーザーを削除（管理者操作）
    pub async fn delete(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
