use async_trait::async_trait;
use postino_core::{new_id, now_timestamp, utils::to_unix_micros, Group, User};
use sqlx::SqlitePool;

use crate::error::ServiceError;

/// Lookups the delivery path needs. The mutating operations live on
/// [`SqliteDirectory`] and back the admin endpoints.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Members of `group_id`, each listed once. Unknown groups have none.
    async fn list_group_members(&self, group_id: &str) -> Result<Vec<String>, ServiceError>;

    /// Whether `blocker_id` refuses direct messages from `blocked_id`.
    async fn is_blocked(&self, blocker_id: &str, blocked_id: &str) -> Result<bool, ServiceError>;
}

pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register_user(&self, username: &str) -> Result<User, ServiceError> {
        let user = User {
            user_id: new_id(),
            username: username.to_string(),
            created_at: now_timestamp(),
        };
        sqlx::query("INSERT INTO users (user_id, username, created_at) VALUES (?, ?, ?)")
            .bind(&user.user_id)
            .bind(&user.username)
            .bind(to_unix_micros(user.created_at))
            .execute(&self.pool)
            .await?;
        tracing::info!(user_id = %user.user_id, "user registered");
        Ok(user)
    }

    pub async fn create_group(&self, name: &str) -> Result<Group, ServiceError> {
        let group = Group {
            group_id: new_id(),
            name: name.to_string(),
            created_at: now_timestamp(),
        };
        sqlx::query("INSERT INTO groups (group_id, name, created_at) VALUES (?, ?, ?)")
            .bind(&group.group_id)
            .bind(&group.name)
            .bind(to_unix_micros(group.created_at))
            .execute(&self.pool)
            .await?;
        tracing::info!(group_id = %group.group_id, "group created");
        Ok(group)
    }

    /// Adds or removes a member. Both directions are idempotent.
    pub async fn set_membership(
        &self,
        group_id: &str,
        user_id: &str,
        member: bool,
    ) -> Result<(), ServiceError> {
        // INSERT OR IGNORE: aggiungere due volte lo stesso membro non fa nulla
        let query = if member {
            sqlx::query(
                "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)",
            )
            .bind(group_id)
            .bind(user_id)
            .bind(to_unix_micros(now_timestamp()))
        } else {
            sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
                .bind(group_id)
                .bind(user_id)
        };
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Creates or lifts a block of `blocked_id` by `blocker_id`. Idempotent.
    pub async fn set_block(
        &self,
        blocker_id: &str,
        blocked_id: &str,
        blocked: bool,
    ) -> Result<(), ServiceError> {
        let query = if blocked {
            sqlx::query(
                "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(blocker_id)
            .bind(blocked_id)
            .bind(to_unix_micros(now_timestamp()))
        } else {
            sqlx::query("DELETE FROM blocks WHERE blocker_id = ? AND blocked_id = ?")
                .bind(blocker_id)
                .bind(blocked_id)
        };
        query.execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn list_group_members(&self, group_id: &str) -> Result<Vec<String>, ServiceError> {
        // query_scalar mappa ogni riga sul singolo valore user_id
        let members: Vec<String> =
            sqlx::query_scalar("SELECT user_id FROM group_members WHERE group_id = ? ORDER BY user_id")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(members)
    }

    async fn is_blocked(&self, blocker_id: &str, blocked_id: &str) -> Result<bool, ServiceError> {
        let found: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM blocks WHERE blocker_id = ? AND blocked_id = ?",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .fetch_one(&self.pool) // COUNT ritorna sempre esattamente una riga
        .await?;
        Ok(found > 0)
    }
}
