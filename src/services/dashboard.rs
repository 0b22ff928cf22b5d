//! 集計エンジン
//!
//! 可視性リゾルバのスコープ済み集合からダッシュボード統計を計算する。
//! 読み取り専用であり、状態を一切変更しない。計算中の失敗は
//! サービスエラーとして伝播し、部分的なペイロードは返さない。

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::repositories::project::StatusCount;
use crate::repositories::{ProjectRepository, TaskRepository, UserRepository};
use crate::services::visibility::{self, CallerContext, Scope};

/// チーム一覧の最大表示件数
const TEAM_PAGE_SIZE: i64 = 10;

#[derive(Debug, Serialize)]
pub struct DashboardStatistics {
    pub overview: Overview,
    pub projects: ProjectStatistics,
    pub tasks: TaskStatistics,
    pub team: TeamStatistics,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub total_projects: i64,
    pub active_tasks: i64,
    pub total_tasks: i64,
    pub team_members: i64,
}

#[derive(Debug, Serialize)]
pub struct ProjectStatistics {
    pub total: i64,
    pub by_status: ProjectStatusBuckets,
    pub progress_percentage: i64,
}

/// ステータス別プロジェクト数
///
/// 固定の列挙のみを数える。未知のステータスはどのバケットにも
/// 入らないが total には含まれる（クラッシュさせない）。
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ProjectStatusBuckets {
    pub open: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub archived: i64,
    pub active: i64,
}

#[derive(Debug, Serialize)]
pub struct TaskStatistics {
    pub total: i64,
    pub by_status: TaskStatusBuckets,
    pub completion_percentage: i64,
}

/// ステータス別タスク数
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct TaskStatusBuckets {
    pub to_do: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub review: i64,
    pub open: i64,
    pub active: i64,
}

#[derive(Debug, Serialize)]
pub struct TeamStatistics {
    pub total_members: i64,
    pub members: Vec<TeamMemberSummary>,
}

#[derive(Debug, Serialize)]
pub struct TeamMemberSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(rename = "tasksCount")]
    pub tasks_count: i64,
    pub profile_image_url: Option<String>,
}

/// ダッシュボードサービス
#[derive(Clone)]
pub struct DashboardService {
    project_repo: ProjectRepository,
    task_repo: TaskRepository,
    user_repo: UserRepository,
}

impl DashboardService {
    /// 新しい DashboardService を作成
    pub fn new(
        project_repo: ProjectRepository,
        task_repo: TaskRepository,
        user_repo: UserRepository,
    ) -> Self {
        Self {
            project_repo,
            task_repo,
            user_repo,
        }
    }

    /// ダッシュボード統計を計算
    pub async fn compute(&self, caller: &CallerContext) -> Result<DashboardStatistics, AppError> {
        let is_admin = caller.is_admin();
        let project_scope = visibility::project_scope(caller, false);
        let task_scope = visibility::task_scope(caller);
        let team_scope = visibility::team_scope(caller);

        // プロジェクト統計
        let project_counts = self.project_repo.status_counts(&project_scope).await?;
        let (total_projects, project_map) = fold_counts(&project_counts);
        let project_buckets = ProjectStatusBuckets::from_counts(&project_map);
        let project_progress = completion_percentage(project_buckets.completed, total_projects);

        // タスク統計
        let task_counts = self.task_repo.status_counts(&task_scope).await?;
        let (total_tasks, task_map) = fold_counts(&task_counts);
        let task_buckets = TaskStatusBuckets::from_counts(&task_map);
        let task_completion = completion_percentage(task_buckets.completed, total_tasks);
        let active_tasks = total_tasks - task_buckets.completed;

        // チーム統計
        // メンバーごとのタスク数は、一般ユーザーなら呼び出しユーザーの
        // 可視プロジェクト内に限定し、管理者なら全タスクを数える
        let total_members = self.user_repo.count_team_members(&team_scope).await?;
        let members = self
            .user_repo
            .list_team_members(&team_scope, Some(TEAM_PAGE_SIZE))
            .await?;

        let count_scope = if is_admin {
            Scope::All
        } else {
            Scope::RelatedTo(caller.user_id)
        };

        let mut member_summaries = Vec::with_capacity(members.len());
        for member in members {
            let tasks_count = self
                .task_repo
                .count_assigned_to(member.id, &count_scope)
                .await?;
            member_summaries.push(TeamMemberSummary {
                id: member.id,
                email: member.email.clone(),
                name: member.display_name(),
                role: member.role,
                tasks_count,
                profile_image_url: member.profile_image_url,
            });
        }

        Ok(DashboardStatistics {
            overview: Overview {
                total_projects,
                active_tasks,
                total_tasks,
                team_members: total_members,
            },
            projects: ProjectStatistics {
                total: total_projects,
                by_status: project_buckets,
                progress_percentage: project_progress,
            },
            tasks: TaskStatistics {
                total: total_tasks,
                by_status: task_buckets,
                completion_percentage: task_completion,
            },
            team: TeamStatistics {
                total_members,
                members: member_summaries,
            },
            is_admin,
        })
    }
}

/// GROUP BY の結果を (総数, ステータス→件数) に畳み込む
///
/// 未知のステータスも総数には含める
fn fold_counts(rows: &[StatusCount]) -> (i64, HashMap<&str, i64>) {
    let mut total = 0;
    let mut map = HashMap::new();
    for row in rows {
        total += row.count;
        *map.entry(row.status.as_str()).or_insert(0) += row.count;
    }
    (total, map)
}

impl ProjectStatusBuckets {
    fn from_counts(map: &HashMap<&str, i64>) -> Self {
        let get = |key: &str| map.get(key).copied().unwrap_or(0);
        Self {
            open: get("todo"),
            in_progress: get("in-progress"),
            completed: get("completed"),
            archived: get("archived"),
            active: get("todo") + get("in-progress"),
        }
    }
}

impl TaskStatusBuckets {
    fn from_counts(map: &HashMap<&str, i64>) -> Self {
        let get = |key: &str| map.get(key).copied().unwrap_or(0);
        Self {
            to_do: get("to-do"),
            in_progress: get("in-progress"),
            completed: get("completed"),
            review: get("review"),
            open: get("to-do") + get("review"),
            active: get("in-progress"),
        }
    }
}

/// 完了率（%）
///
/// 総数0のときは0を返す（ゼロ除算させない）。四捨五入。
fn completion_percentage(completed: i64, total: i64) -> i64 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, i64)]) -> Vec<StatusCount> {
        pairs
            .iter()
            .map(|(status, count)| StatusCount {
                status: status.to_string(),
                count: *count,
            })
            .collect()
    }

    #[test]
    fn test_completion_percentage_zero_total() {
        assert_eq!(completion_percentage(0, 0), 0);
    }

    #[test]
    fn test_completion_percentage_all_completed() {
        assert_eq!(completion_percentage(7, 7), 100);
    }

    #[test]
    fn test_completion_percentage_rounds() {
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 2), 50);
    }

    #[test]
    fn test_fold_counts_includes_unknown_statuses_in_total() {
        let rows = rows(&[("todo", 2), ("mystery", 3), ("completed", 1)]);
        let (total, map) = fold_counts(&rows);
        assert_eq!(total, 6);
        assert_eq!(map.get("mystery"), Some(&3));
    }

    #[test]
    fn test_project_buckets_omit_unknown_statuses() {
        let rows = rows(&[("todo", 2), ("in-progress", 1), ("mystery", 5)]);
        let (total, map) = fold_counts(&rows);
        let buckets = ProjectStatusBuckets::from_counts(&map);

        // 未知のステータスはバケットに現れないが total には含まれる
        assert_eq!(total, 8);
        assert_eq!(
            buckets,
            ProjectStatusBuckets {
                open: 2,
                in_progress: 1,
                completed: 0,
                archived: 0,
                active: 3,
            }
        );
    }

    #[test]
    fn test_task_buckets_composite_counts() {
        let rows = rows(&[
            ("to-do", 4),
            ("review", 2),
            ("in-progress", 3),
            ("completed", 1),
        ]);
        let (total, map) = fold_counts(&rows);
        let buckets = TaskStatusBuckets::from_counts(&map);

        assert_eq!(total, 10);
        assert_eq!(buckets.open, 6); // to-do + review
        assert_eq!(buckets.active, 3); // in-progress
        assert_eq!(buckets.completed, 1);
    }

    #[test]
    fn test_empty_counts_fold_to_zero_buckets() {
        let (total, map) = fold_counts(&[]);
        assert_eq!(total, 0);
        assert_eq!(
            TaskStatusBuckets::from_counts(&map),
            TaskStatusBuckets::default()
        );
        assert_eq!(completion_percentage(0, total), 0);
    }
}
