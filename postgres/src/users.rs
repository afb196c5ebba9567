//! `PostgreSQL` user directory.

use crate::{corrupt_column, storage_fault};
use boxoffice_core::Result;
use boxoffice_core::providers::UserDirectory;
use boxoffice_core::types::{Role, User, UserId};
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    role: String,
}

/// Reads `users(id, role)`.
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    /// Create a directory over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserDirectory for PostgresUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, role FROM users WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_fault("Failed to load user", &e))?;

        row.map(|row| -> Result<User> {
            let role = row
                .role
                .parse::<Role>()
                .map_err(|_| corrupt_column("users.role"))?;
            Ok(User {
                id: UserId(row.id),
                role,
            })
        })
        .transpose()
    }
}
