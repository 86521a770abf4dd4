//! Database queries for member identity and role lookups.

use crate::models::{Member, MemberRole};
use sqlx::{Executor, Sqlite};

/// Resolve a member by ID.
pub async fn get_member<'e, E>(executor: E, member_id: i64) -> Result<Option<Member>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Member>("SELECT id, name, role, created_at FROM members WHERE id = ?")
        .bind(member_id)
        .fetch_optional(executor)
        .await
}

/// Resolve a member with the transaction's first write.
///
/// The no-op update takes the database write lock before anything is read,
/// like `lock_request` does for request rows.
pub async fn lock_member<'e, E>(executor: E, member_id: i64) -> Result<Option<Member>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Member>(
        "UPDATE members SET name = name WHERE id = ? RETURNING id, name, role, created_at",
    )
    .bind(member_id)
    .fetch_optional(executor)
    .await
}

/// Register a member.
pub async fn insert_member<'e, E>(
    executor: E,
    name: &str,
    role: MemberRole,
) -> Result<Member, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Member>(
        r#"
        INSERT INTO members (name, role, created_at)
        VALUES (?, ?, ?)
        RETURNING id, name, role, created_at
        "#,
    )
    .bind(name)
    .bind(role.to_string())
    .bind(chrono::Utc::now().timestamp())
    .fetch_one(executor)
    .await
}
