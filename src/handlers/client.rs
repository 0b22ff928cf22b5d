use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Client;
use crate::repositories::client::ClientInput;
use crate::services::visibility::CallerContext;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClientListQuery {
    pub status: Option<bool>,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientCreateRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default = "default_status")]
    pub status: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClientUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub status: Option<bool>,
}

fn default_status() -> bool {
    true
}

/// クライアント一覧ハンドラー
///
/// GET /api/clients
pub async fn list_clients(
    State(state): State<AppState>,
    _caller: CallerContext,
    Query(query): Query<ClientListQuery>,
) -> Result<Json<Vec<Client>>, AppError> {
    let clients = state
        .client_repo
        .list(query.status, query.company.as_deref())
        .await?;

    Ok(Json(clients))
}

/// クライアント作成ハンドラー
///
/// POST /api/clients
pub async fn create_client(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(request): Json<ClientCreateRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    validate_name(&request.name)?;

    let input = ClientInput {
        name: request.name.trim(),
        email: request.email.as_deref(),
        phone: request.phone.as_deref(),
        company: request.company.as_deref(),
        status: request.status,
    };

    let client = state.client_repo.create(caller.user_id, &input).await?;

    tracing::info!(client_id = %client.id, "クライアント作成");

    Ok((StatusCode::CREATED, Json(client)))
}

/// クライアント取得ハンドラー
///
/// GET /api/clients/{id}
pub async fn get_client(
    State(state): State<AppState>,
    _caller: CallerContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    let client = state
        .client_repo
        .find_by_id(client_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(client))
}

/// クライアント更新ハンドラー
///
/// PUT /api/clients/{id}
///
/// 省略されたフィールドは既存値を保持する。
pub async fn update_client(
    State(state): State<AppState>,
    _caller: CallerContext,
    Path(client_id): Path<Uuid>,
    Json(request): Json<ClientUpdateRequest>,
) -> Result<Json<Client>, AppError> {
    let existing = state
        .client_repo
        .find_by_id(client_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(name) = request.name.as_deref() {
        validate_name(name)?;
    }

    let name = request.name.unwrap_or(existing.name);
    let email = request.email.or(existing.email);
    let phone = request.phone.or(existing.phone);
    let company = request.company.or(existing.company);

    let input = ClientInput {
        name: name.trim(),
        email: email.as_deref(),
        phone: phone.as_deref(),
        company: company.as_deref(),
        status: request.status.unwrap_or(existing.status),
    };

    let client = state
        .client_repo
        .update(client_id, &input)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(client_id = %client.id, "クライアント更新");

    Ok(Json(client))
}

/// クライアント削除ハンドラー
///
/// DELETE /api/clients/{id}
pub async fn delete_client(
    State(state): State<AppState>,
    _caller: CallerContext,
    Path(client_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.client_repo.delete(client_id).await?;
    if !deleted {
        return Err(AppError::NotFound);
    }

    tracing::info!(client_id = %client_id, "クライアント削除");

    Ok(StatusCode::NO_CONTENT)
}

/// クライアント名のバリデーション
fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("クライアント名は必須です".to_string()));
    }
    if name.len() > 120 {
        return Err(AppError::Validation(
            "クライアント名は120文字以内で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_rejects_empty() {
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_validate_name_accepts_normal() {
        assert!(validate_name("株式会社サンプル").is_ok());
    }
}
