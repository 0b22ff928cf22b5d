use axum::{Json, extract::State};

use crate::error::AppError;
use crate::services::DashboardService;
use crate::services::dashboard::DashboardStatistics;
use crate::services::visibility::CallerContext;
use crate::state::AppState;

/// ダッシュボード統計ハンドラー
///
/// GET /api/dashboard/statistics
///
/// 呼び出しユーザーの可視集合からプロジェクト・タスク・チームの
/// 統計を集計して返す。読み取り専用。
pub async fn dashboard_statistics(
    State(state): State<AppState>,
    caller: CallerContext,
) -> Result<Json<DashboardStatistics>, AppError> {
    let dashboard_service = DashboardService::new(
        state.project_repo.clone(),
        state.task_repo.clone(),
        state.user_repo.clone(),
    );

    let statistics = dashboard_service.compute(&caller).await?;

    Ok(Json(statistics))
}
