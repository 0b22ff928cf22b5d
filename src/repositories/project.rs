use sqlx::PgPool;
use uuid::Uuid;

use crate::models::project::{MemberRole, Project, ProjectMember, ProjectWithTaskCount};
use crate::services::visibility::Scope;

/// ステータス別件数（集計エンジン用）
#[derive(Debug, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// プロジェクト作成・更新の書き込みフィールド
#[derive(Debug)]
pub struct ProjectInput<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub color: Option<&'a str>,
    pub status: &'a str,
    pub client_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ProjectRepository {
    pool: PgPool,
}

impl ProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// プロジェクト一覧
    ///
    /// 可視性（所有 OR メンバー OR タスクアサイン経由の和集合）でスコープし、
    /// 作成日時降順。各行に呼び出しユーザーのアサインタスク数を注釈する。
    /// 注釈のため `Scope::All` でも呼び出しユーザーIDが必要。
    pub async fn list(
        &self,
        scope: &Scope,
        annotate_for: Uuid,
        status: Option<&str>,
        client_id: Option<Uuid>,
    ) -> Result<Vec<ProjectWithTaskCount>, sqlx::Error> {
        match scope {
            Scope::All => {
                sqlx::query_as::<_, ProjectWithTaskCount>(
                    r#"
                    SELECT p.id, p.owner_id, p.client_id, p.name, p.description, p.color, p.status,
                           (SELECT COUNT(*) FROM tasks t
                            JOIN task_assignments ta ON ta.task_id = t.id
                            WHERE t.project_id = p.id AND ta.user_id = $1) AS task_count,
                           p.created_at, p.updated_at
                    FROM projects p
                    WHERE ($2::text IS NULL OR p.status = $2)
                      AND ($3::uuid IS NULL OR p.client_id = $3)
                    ORDER BY p.created_at DESC
                    "#,
                )
                .bind(annotate_for)
                .bind(status)
                .bind(client_id)
                .fetch_all(&self.pool)
                .await
            }
            Scope::RelatedTo(user_id) => {
                sqlx::query_as::<_, ProjectWithTaskCount>(
                    r#"
                    SELECT p.id, p.owner_id, p.client_id, p.name, p.description, p.color, p.status,
                           (SELECT COUNT(*) FROM tasks t
                            JOIN task_assignments ta ON ta.task_id = t.id
                            WHERE t.project_id = p.id AND ta.user_id = $1) AS task_count,
                           p.created_at, p.updated_at
                    FROM projects p
                    WHERE (p.owner_id = $1
                           OR EXISTS (SELECT 1 FROM project_members pm
                                      WHERE pm.project_id = p.id AND pm.user_id = $1)
                           OR EXISTS (SELECT 1 FROM task_assignments ta
                                      JOIN tasks t ON t.id = ta.task_id
                                      WHERE t.project_id = p.id AND ta.user_id = $1))
                      AND ($2::text IS NULL OR p.status = $2)
                      AND ($3::uuid IS NULL OR p.client_id = $3)
                    ORDER BY p.created_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(status)
                .bind(client_id)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// IDでプロジェクトを検索（スコープなし）
    pub async fn find_by_id(&self, project_id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT id, owner_id, client_id, name, description, color, status,
                   created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// プロジェクトが指定ユーザーから可視か
    pub async fn is_visible_to(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM projects p
                WHERE p.id = $1
                  AND (p.owner_id = $2
                       OR EXISTS (SELECT 1 FROM project_members pm
                                  WHERE pm.project_id = p.id AND pm.user_id = $2)
                       OR EXISTS (SELECT 1 FROM task_assignments ta
                                  JOIN tasks t ON t.id = ta.task_id
                                  WHERE t.project_id = p.id AND ta.user_id = $2))
            )
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// プロジェクトを作成（メンバーシップと同一トランザクション）
    ///
    /// 作成者は必ず admin ロールのメンバーとして登録される
    pub async fn create(
        &self,
        owner_id: Uuid,
        input: &ProjectInput<'_>,
        member_ids: &[Uuid],
    ) -> Result<Project, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (owner_id, client_id, name, description, color, status)
            VALUES ($1, $2, $3, $4, COALESCE($5, '#8b5cf6'), $6)
            RETURNING id, owner_id, client_id, name, description, color, status,
                      created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(input.client_id)
        .bind(input.name)
        .bind(input.description)
        .bind(input.color)
        .bind(input.status)
        .fetch_one(&mut *tx)
        .await?;

        for (user_id, role) in desired_members(Some(owner_id), member_ids) {
            sqlx::query(
                r#"
                INSERT INTO project_members (project_id, user_id, role)
                VALUES ($1, $2, $3)
                ON CONFLICT (project_id, user_id) DO NOTHING
                "#,
            )
            .bind(project.id)
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(project)
    }

    /// プロジェクトを更新し、member_ids 指定時はメンバー集合を差分照合する
    ///
    /// 照合は集合セマンティクス: 望ましい集合にない行のみ削除し、
    /// 新規行のみ挿入する（既存行の joined_at を保持）。
    /// 所有者は指定から漏れても必ず admin として保持される。
    pub async fn update(
        &self,
        project_id: Uuid,
        input: &ProjectInput<'_>,
        member_ids: Option<&[Uuid]>,
    ) -> Result<Option<Project>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET name = $2, description = $3, color = COALESCE($4, color),
                status = $5, client_id = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING id, owner_id, client_id, name, description, color, status,
                      created_at, updated_at
            "#,
        )
        .bind(project_id)
        .bind(input.name)
        .bind(input.description)
        .bind(input.color)
        .bind(input.status)
        .bind(input.client_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(project) = project else {
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(member_ids) = member_ids {
            let desired = desired_members(project.owner_id, member_ids);
            let keep_ids: Vec<Uuid> = desired.iter().map(|(id, _)| *id).collect();

            sqlx::query(
                r#"
                DELETE FROM project_members
                WHERE project_id = $1 AND user_id <> ALL($2)
                "#,
            )
            .bind(project_id)
            .bind(&keep_ids)
            .execute(&mut *tx)
            .await?;

            for (user_id, role) in desired {
                if Some(user_id) == project.owner_id {
                    // 所有者は既存行があっても admin に引き上げる（不変条件）
                    sqlx::query(
                        r#"
                        INSERT INTO project_members (project_id, user_id, role)
                        VALUES ($1, $2, 'admin')
                        ON CONFLICT (project_id, user_id) DO UPDATE SET role = 'admin'
                        "#,
                    )
                    .bind(project_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                } else {
                    sqlx::query(
                        r#"
                        INSERT INTO project_members (project_id, user_id, role)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (project_id, user_id) DO NOTHING
                        "#,
                    )
                    .bind(project_id)
                    .bind(user_id)
                    .bind(role.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;

        Ok(Some(project))
    }

    /// プロジェクトを削除
    pub async fn delete(&self, project_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// プロジェクトのメンバーシップ一覧
    pub async fn members(&self, project_id: Uuid) -> Result<Vec<ProjectMember>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            SELECT id, project_id, user_id, role, joined_at
            FROM project_members
            WHERE project_id = $1
            ORDER BY joined_at
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    /// ステータス別のプロジェクト数（集計エンジン用）
    pub async fn status_counts(&self, scope: &Scope) -> Result<Vec<StatusCount>, sqlx::Error> {
        match scope {
            Scope::All => {
                sqlx::query_as::<_, StatusCount>(
                    "SELECT status, COUNT(*) AS count FROM projects GROUP BY status",
                )
                .fetch_all(&self.pool)
                .await
            }
            Scope::RelatedTo(user_id) => {
                sqlx::query_as::<_, StatusCount>(
                    r#"
                    SELECT p.status, COUNT(*) AS count
                    FROM projects p
                    WHERE p.owner_id = $1
                       OR EXISTS (SELECT 1 FROM project_members pm
                                  WHERE pm.project_id = p.id AND pm.user_id = $1)
                       OR EXISTS (SELECT 1 FROM task_assignments ta
                                  JOIN tasks t ON t.id = ta.task_id
                                  WHERE t.project_id = p.id AND ta.user_id = $1)
                    GROUP BY p.status
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        }
    }
}

/// 望ましいメンバー集合を計算する
///
/// 所有者は member_ids から漏れていても必ず含まれ、ロールは admin。
/// それ以外は member。重複IDは一度だけ現れる。
pub fn desired_members(owner_id: Option<Uuid>, member_ids: &[Uuid]) -> Vec<(Uuid, MemberRole)> {
    let mut desired: Vec<(Uuid, MemberRole)> = Vec::new();

    if let Some(owner_id) = owner_id {
        desired.push((owner_id, MemberRole::Admin));
    }

    for &id in member_ids {
        if Some(id) == owner_id || desired.iter().any(|(existing, _)| *existing == id) {
            continue;
        }
        desired.push((id, MemberRole::Member));
    }

    desired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_members_keeps_owner_as_admin() {
        let owner = Uuid::new_v4();
        let c = Uuid::new_v4();

        // 所有者が member_ids から漏れても admin として保持される
        let desired = desired_members(Some(owner), &[c]);
        assert_eq!(desired.len(), 2);
        assert_eq!(desired[0], (owner, MemberRole::Admin));
        assert_eq!(desired[1], (c, MemberRole::Member));
    }

    #[test]
    fn test_desired_members_owner_in_list_stays_admin() {
        let owner = Uuid::new_v4();
        let b = Uuid::new_v4();

        let desired = desired_members(Some(owner), &[owner, b]);
        assert_eq!(desired.len(), 2);
        assert_eq!(desired[0], (owner, MemberRole::Admin));
        assert_eq!(desired[1], (b, MemberRole::Member));
    }

    #[test]
    fn test_desired_members_dedupes() {
        let a = Uuid::new_v4();
        let desired = desired_members(None, &[a, a, a]);
        assert_eq!(desired, vec![(a, MemberRole::Member)]);
    }

    #[test]
    fn test_desired_members_without_owner() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let desired = desired_members(None, &[a, b]);
        assert_eq!(
            desired,
            vec![(a, MemberRole::Member), (b, MemberRole::Member)]
        );
    }
}
