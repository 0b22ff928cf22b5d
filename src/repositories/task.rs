use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use crate::models::Task;
use crate::repositories::project::StatusCount;
use crate::services::visibility::Scope;

const TASK_COLUMNS: &str = "id, project_id, title, description, status, priority, due_date, \
     progress, time_tracked_seconds, custom_fields, created_by, updated_by, created_at, updated_at";

/// タスク作成・更新の書き込みフィールド
#[derive(Debug)]
pub struct TaskInput<'a> {
    pub project_id: Option<Uuid>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub status: &'a str,
    pub priority: &'a str,
    pub due_date: Option<Date>,
    pub progress: i16,
    pub custom_fields: Option<&'a serde_json::Value>,
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// タスク一覧
    ///
    /// 可視性はアサイン OR 作成者 OR 可視プロジェクト内の和集合
    /// （アサインからの導出は片方向: プロジェクトが見えても
    /// 無関係のタスクまで見えるのは可視プロジェクト句による）
    pub async fn list(
        &self,
        scope: &Scope,
        project_id: Option<Uuid>,
        status: Option<&str>,
        priority: Option<&str>,
    ) -> Result<Vec<Task>, sqlx::Error> {
        match scope {
            Scope::All => {
                sqlx::query_as::<_, Task>(&format!(
                    r#"
                    SELECT {TASK_COLUMNS} FROM tasks t
                    WHERE ($1::uuid IS NULL OR t.project_id = $1)
                      AND ($2::text IS NULL OR t.status = $2)
                      AND ($3::text IS NULL OR t.priority = $3)
                    ORDER BY t.created_at DESC
                    "#
                ))
                .bind(project_id)
                .bind(status)
                .bind(priority)
                .fetch_all(&self.pool)
                .await
            }
            Scope::RelatedTo(user_id) => {
                sqlx::query_as::<_, Task>(&format!(
                    r#"
                    SELECT {TASK_COLUMNS} FROM tasks t
                    WHERE (EXISTS (SELECT 1 FROM task_assignments ta
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
                      AND ($2::uuid IS NULL OR t.project_id = $2)
                      AND ($3::text IS NULL OR t.status = $3)
                      AND ($4::text IS NULL OR t.priority = $4)
                    ORDER BY t.created_at DESC
                    "#
                ))
                .bind(user_id)
                .bind(project_id)
                .bind(status)
                .bind(priority)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// IDでタスクを検索（スコープなし）
    pub async fn find_by_id(&self, task_id: Uuid) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// タスクが指定ユーザーから可視か
    pub async fn is_visible_to(&self, task_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM tasks t
                WHERE t.id = $1
                  AND (EXISTS (SELECT 1 FROM task_assignments ta
                               WHERE ta.task_id = t.id AND ta.user_id = $2)
                       OR t.created_by = $2
                       OR (t.project_id IS NOT NULL AND t.project_id IN (
                            SELECT p.id FROM projects p
                            WHERE p.owner_id = $2
                               OR EXISTS (SELECT 1 FROM project_members pm
                                          WHERE pm.project_id = p.id AND pm.user_id = $2)
                               OR EXISTS (SELECT 1 FROM task_assignments ta
                                          JOIN tasks t2 ON t2.id = ta.task_id
                                          WHERE t2.project_id = p.id AND ta.user_id = $2))))
            )
            "#,
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// タスクを作成（アサインと同一トランザクション）
    pub async fn create(
        &self,
        input: &TaskInput<'_>,
        created_by: Uuid,
        assignee_ids: &[Uuid],
    ) -> Result<Task, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (project_id, title, description, status, priority, due_date,
                               progress, custom_fields, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, '{{}}'::jsonb), $9, $9)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(input.project_id)
        .bind(input.title)
        .bind(input.description)
        .bind(input.status)
        .bind(input.priority)
        .bind(input.due_date)
        .bind(input.progress)
        .bind(input.custom_fields)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        for &user_id in dedup(assignee_ids).iter() {
            sqlx::query(
                r#"
                INSERT INTO task_assignments (task_id, user_id)
                VALUES ($1, $2)
                ON CONFLICT (task_id, user_id) DO NOTHING
                "#,
            )
            .bind(task.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(task)
    }

    /// タスクを更新し、assignee_ids 指定時はアサイン集合を差分照合する
    ///
    /// 照合は集合セマンティクス: 不要な行のみ削除、新規行のみ挿入
    /// （既存行の assigned_at を保持）
    pub async fn update(
        &self,
        task_id: Uuid,
        input: &TaskInput<'_>,
        updated_by: Uuid,
        assignee_ids: Option<&[Uuid]>,
    ) -> Result<Option<Task>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET project_id = $2, title = $3, description = $4, status = $5, priority = $6,
                due_date = $7, progress = $8,
                custom_fields = COALESCE($9, custom_fields),
                updated_by = $10, updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(input.project_id)
        .bind(input.title)
        .bind(input.description)
        .bind(input.status)
        .bind(input.priority)
        .bind(input.due_date)
        .bind(input.progress)
        .bind(input.custom_fields)
        .bind(updated_by)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(task) = task else {
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(assignee_ids) = assignee_ids {
            let desired = dedup(assignee_ids);

            sqlx::query(
                r#"
                DELETE FROM task_assignments
                WHERE task_id = $1 AND user_id <> ALL($2)
                "#,
            )
            .bind(task_id)
            .bind(&desired)
            .execute(&mut *tx)
            .await?;

            for &user_id in desired.iter() {
                sqlx::query(
                    r#"
                    INSERT INTO task_assignments (task_id, user_id)
                    VALUES ($1, $2)
                    ON CONFLICT (task_id, user_id) DO NOTHING
                    "#,
                )
                .bind(task_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        Ok(Some(task))
    }

    /// タスクを削除
    pub async fn delete(&self, task_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// タスクのアサイン先ユーザーID一覧
    pub async fn assignee_ids(&self, task_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM task_assignments
            WHERE task_id = $1
            ORDER BY assigned_at
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
    }

    /// ステータス別のタスク数（集計エンジン用）
    pub async fn status_counts(&self, scope: &Scope) -> Result<Vec<StatusCount>, sqlx::Error> {
        match scope {
            Scope::All => {
                sqlx::query_as::<_, StatusCount>(
                    "SELECT status, COUNT(*) AS count FROM tasks GROUP BY status",
                )
                .fetch_all(&self.pool)
                .await
            }
            Scope::RelatedTo(user_id) => {
                sqlx::query_as::<_, StatusCount>(
                    r#"
                    SELECT t.status, COUNT(*) AS count
                    FROM tasks t
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
                                          WHERE t2.project_id = p.id AND ta.user_id = $1)))
                    GROUP BY t.status
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// 指定メンバーにアサインされたタスク数
    ///
    /// 集計エンジンのチーム一覧用。呼び出しユーザーのスコープで絞る:
    /// - `Scope::All`: 全タスク
    /// - `Scope::RelatedTo`: 呼び出しユーザーの可視プロジェクト内のみ
    pub async fn count_assigned_to(
        &self,
        member_id: Uuid,
        scope: &Scope,
    ) -> Result<i64, sqlx::Error> {
        match scope {
            Scope::All => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*) FROM task_assignments ta
                    WHERE ta.user_id = $1
                    "#,
                )
                .bind(member_id)
                .fetch_one(&self.pool)
                .await
            }
            Scope::RelatedTo(caller_id) => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*) FROM task_assignments ta
                    JOIN tasks t ON t.id = ta.task_id
                    WHERE ta.user_id = $1
                      AND t.project_id IN (
                        SELECT p.id FROM projects p
                        WHERE p.owner_id = $2
                           OR EXISTS (SELECT 1 FROM project_members pm
                                      WHERE pm.project_id = p.id AND pm.user_id = $2)
                           OR EXISTS (SELECT 1 FROM task_assignments ta2
                                      JOIN tasks t2 ON t2.id = ta2.task_id
                                      WHERE t2.project_id = p.id AND ta2.user_id = $2))
                    "#,
                )
                .bind(member_id)
                .bind(caller_id)
                .fetch_one(&self.pool)
                .await
            }
        }
    }
}

/// 順序を保ったままIDを重複排除する
fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for &id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserves_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup(&[a, b, a, b, a]), vec![a, b]);
    }

    #[test]
    fn test_dedup_empty() {
        assert!(dedup(&[]).is_empty());
    }
}
