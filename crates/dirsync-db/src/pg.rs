//! PostgreSQL implementation of `RelationalStore`.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info, instrument};

use dirsync_core::{Group, NewGroup, NewUser, RelationalStore, Role, StoreError, StoreKind, User};

use crate::error::DbError;

const GROUP_COLUMNS: &str = "id, source_dept_id, source_dept_parent_id, parent_id, group_name, \
    remark, source, group_dn, group_type, creator, created_at";

const USER_COLUMNS: &str = "id, user_dn, username, nickname, given_name, mail, mobile, \
    job_number, position, source_user_id, source_union_id, departments, source, creator, \
    created_at";

/// Relational store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(DbError::Connect)?;

        info!(max_connections, "Database pool created");
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        info!("Running database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(DbError::Migrate)?;

        info!("Migrations completed successfully");
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error, turning unique violations into `AlreadyExists`.
fn store_error(context: &str, key: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::AlreadyExists {
                store: StoreKind::Relational,
                key: key.to_string(),
            };
        }
    }
    StoreError::relational_with_source(format!("{context} ({key})"), err)
}

#[async_trait]
impl RelationalStore for PgStore {
    #[instrument(skip(self))]
    async fn find_group_by_source_dept_id(
        &self,
        source_dept_id: &str,
    ) -> Result<Option<Group>, StoreError> {
        sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM directory_groups WHERE source_dept_id = $1"
        ))
        .bind(source_dept_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("find group", source_dept_id, e))
    }

    #[instrument(skip(self))]
    async fn group_exists_by_dn(&self, group_dn: &str) -> Result<bool, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r"
            SELECT 1 FROM directory_groups WHERE lower(group_dn) = lower($1)
            ",
        )
        .bind(group_dn)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("check group", group_dn, e))?;

        Ok(row.is_some())
    }

    async fn get_groups_by_source_dept_ids(
        &self,
        source_dept_ids: &[String],
    ) -> Result<Vec<Group>, StoreError> {
        if source_dept_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM directory_groups WHERE source_dept_id = ANY($1)"
        ))
        .bind(source_dept_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("get groups", &source_dept_ids.join(","), e))
    }

    async fn get_groups_by_ids(&self, ids: &[i64]) -> Result<Vec<Group>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM directory_groups WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("get groups", &format!("{ids:?}"), e))
    }

    async fn list_groups_by_source(&self, source: &str) -> Result<Vec<Group>, StoreError> {
        sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM directory_groups WHERE source = $1 ORDER BY id"
        ))
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("list groups", source, e))
    }

    #[instrument(skip(self, group), fields(group_dn = %group.group_dn))]
    async fn create_group(&self, group: &NewGroup) -> Result<Group, StoreError> {
        let created: Group = sqlx::query_as(&format!(
            r"
            INSERT INTO directory_groups
                (source_dept_id, source_dept_parent_id, parent_id, group_name, remark,
                 source, group_dn, group_type, creator)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {GROUP_COLUMNS}
            "
        ))
        .bind(&group.source_dept_id)
        .bind(&group.source_dept_parent_id)
        .bind(group.parent_id)
        .bind(&group.group_name)
        .bind(&group.remark)
        .bind(&group.source)
        .bind(&group.group_dn)
        .bind(&group.group_type)
        .bind(&group.creator)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("create group", &group.group_dn, e))?;

        debug!(id = created.id, "Group row created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn find_user_by_union_id(
        &self,
        source_union_id: &str,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM directory_users WHERE source_union_id = $1"
        ))
        .bind(source_union_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("find user", source_union_id, e))
    }

    async fn user_exists_by_union_id(&self, source_union_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r"
            SELECT 1 FROM directory_users WHERE source_union_id = $1
            ",
        )
        .bind(source_union_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("check user", source_union_id, e))?;

        Ok(row.is_some())
    }

    async fn find_user_by_dn(&self, user_dn: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM directory_users WHERE lower(user_dn) = lower($1)"
        ))
        .bind(user_dn)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("find user", user_dn, e))
    }

    async fn user_exists_by_dn(&self, user_dn: &str) -> Result<bool, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r"
            SELECT 1 FROM directory_users WHERE lower(user_dn) = lower($1)
            ",
        )
        .bind(user_dn)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("check user", user_dn, e))?;

        Ok(row.is_some())
    }

    async fn list_users_by_source(&self, source: &str) -> Result<Vec<User>, StoreError> {
        sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM directory_users WHERE source = $1 ORDER BY id"
        ))
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("list users", source, e))
    }

    async fn get_user_group_ids(&self, user_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r"
            SELECT group_id FROM group_members WHERE user_id = $1 ORDER BY group_id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("get memberships", &user_id.to_string(), e))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self, user), fields(user_dn = %user.user_dn))]
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let key = user.user_dn.as_str();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", key, e))?;

        let created: User = sqlx::query_as(&format!(
            r"
            INSERT INTO directory_users
                (user_dn, username, nickname, given_name, mail, mobile, job_number, position,
                 source_user_id, source_union_id, departments, source, creator, password)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&user.user_dn)
        .bind(&user.username)
        .bind(&user.nickname)
        .bind(&user.given_name)
        .bind(&user.mail)
        .bind(&user.mobile)
        .bind(&user.job_number)
        .bind(&user.position)
        .bind(&user.source_user_id)
        .bind(&user.source_union_id)
        .bind(&user.departments)
        .bind(&user.source)
        .bind(&user.creator)
        .bind(&user.password)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| store_error("create user", key, e))?;

        if !user.group_ids.is_empty() {
            sqlx::query(
                r"
                INSERT INTO group_members (group_id, user_id)
                SELECT unnest($1::BIGINT[]), $2
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(&user.group_ids)
            .bind(created.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("add memberships", key, e))?;
        }

        if !user.role_ids.is_empty() {
            sqlx::query(
                r"
                INSERT INTO user_roles (user_id, role_id)
                SELECT $1, unnest($2::BIGINT[])
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(created.id)
            .bind(&user.role_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("add roles", key, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| store_error("commit", key, e))?;

        debug!(id = created.id, "User row created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn delete_users(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r"
            DELETE FROM directory_users WHERE id = ANY($1)
            ",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("delete users", &format!("{ids:?}"), e))?;

        Ok(result.rows_affected())
    }

    async fn get_roles_by_ids(&self, ids: &[i64]) -> Result<Vec<Role>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as(
            r"
            SELECT id, name, keyword FROM roles WHERE id = ANY($1) ORDER BY id
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("get roles", &format!("{ids:?}"), e))
    }
}
