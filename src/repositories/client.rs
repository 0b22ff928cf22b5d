use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Client;

const CLIENT_COLUMNS: &str =
    "id, owner_id, name, email, phone, company, status, created_at, updated_at";

/// クライアント作成・更新の書き込みフィールド
#[derive(Debug)]
pub struct ClientInput<'a> {
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub company: Option<&'a str>,
    pub status: bool,
}

#[derive(Clone)]
pub struct ClientRepository {
    pool: PgPool,
}

impl ClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// クライアント一覧（作成日時降順）
    pub async fn list(
        &self,
        status: Option<bool>,
        company: Option<&str>,
    ) -> Result<Vec<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>(&format!(
            r#"
            SELECT {CLIENT_COLUMNS} FROM clients
            WHERE ($1::boolean IS NULL OR status = $1)
              AND ($2::text IS NULL OR company = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(status)
        .bind(company)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find_by_id(&self, client_id: Uuid) -> Result<Option<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        input: &ClientInput<'_>,
    ) -> Result<Client, sqlx::Error> {
        sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients (owner_id, name, email, phone, company, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(input.name)
        .bind(input.email)
        .bind(input.phone)
        .bind(input.company)
        .bind(input.status)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update(
        &self,
        client_id: Uuid,
        input: &ClientInput<'_>,
    ) -> Result<Option<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients
            SET name = $2, email = $3, phone = $4, company = $5, status = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(input.name)
        .bind(input.email)
        .bind(input.phone)
        .bind(input.company)
        .bind(input.status)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete(&self, client_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
