use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::repo_types::{
    Activity, AuditLogEntry, FailedLoginEntry, NewUser, ProfileUpdate, User, UserRow,
};
use crate::store::PgStore;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, mfa_secret, mfa_last_step, \
                            profile_picture_url, created_at";

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Inserts the user; `None` when the email is already registered.
    async fn create_user(&self, new: NewUser) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    /// Case-insensitive substring match on name or email.
    async fn search_users(&self, query: &str) -> anyhow::Result<Vec<User>>;
    /// `None` when no user has this id.
    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> anyhow::Result<Option<User>>;
    /// Removes the user and their enrollments. `false` when nothing was deleted.
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Stores a fresh TOTP secret and forgets the last consumed step.
    async fn set_mfa_secret(&self, id: Uuid, secret: &str) -> anyhow::Result<()>;
    /// Marks `step` as used. Returns `false` when that step (or a later one)
    /// was already consumed.
    async fn consume_otp_step(&self, id: Uuid, step: i64) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn record_audit(&self, user_email: &str, activity: Activity) -> anyhow::Result<()>;
    async fn record_failed_login(&self, email: &str, ip_address: &str) -> anyhow::Result<()>;
    /// Newest first.
    async fn list_audit_logs(&self) -> anyhow::Result<Vec<AuditLogEntry>>;
    /// Newest first.
    async fn list_failed_logins(&self) -> anyhow::Result<Vec<FailedLoginEntry>>;
}

#[async_trait]
impl UserRepo for PgStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, profile_picture_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(&new.profile_picture_url)
        .fetch_optional(&self.pool)
        .await
        .context("insert user")?;
        row.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("list users")?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn search_users(&self, query: &str) -> anyhow::Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE name ILIKE $1 OR email ILIKE $1
             ORDER BY created_at ASC
            "#
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .context("search users")?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name                = COALESCE($2, name),
                   profile_picture_url = COALESCE($3, profile_picture_url)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.profile_picture_url)
        .fetch_optional(&self.pool)
        .await
        .context("update profile")?;
        row.map(User::try_from).transpose()
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        // enrollments go with the user via ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_mfa_secret(&self, id: Uuid, secret: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET mfa_secret = $2, mfa_last_step = NULL WHERE id = $1")
            .bind(id)
            .bind(secret)
            .execute(&self.pool)
            .await
            .context("set mfa secret")?;
        Ok(())
    }

    async fn consume_otp_step(&self, id: Uuid, step: i64) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET mfa_last_step = $2
             WHERE id = $1
               AND (mfa_last_step IS NULL OR mfa_last_step < $2)
            "#,
        )
        .bind(id)
        .bind(step)
        .execute(&self.pool)
        .await
        .context("consume otp step")?;
        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl AuditRepo for PgStore {
    async fn record_audit(&self, user_email: &str, activity: Activity) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO audit_logs (id, user_email, activity) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(user_email)
            .bind(activity.as_str())
            .execute(&self.pool)
            .await
            .context("insert audit log")?;
        Ok(())
    }

    async fn record_failed_login(&self, email: &str, ip_address: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO failed_logins (id, email, ip_address) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(ip_address)
            .execute(&self.pool)
            .await
            .context("insert failed login")?;
        Ok(())
    }

    async fn list_audit_logs(&self) -> anyhow::Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, user_email, activity, created_at
              FROM audit_logs
             ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list audit logs")?;
        Ok(rows)
    }

    async fn list_failed_logins(&self) -> anyhow::Result<Vec<FailedLoginEntry>> {
        let rows = sqlx::query_as::<_, FailedLoginEntry>(
            r#"
            SELECT id, email, ip_address, created_at
              FROM failed_logins
             ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list failed logins")?;
        Ok(rows)
    }
}
