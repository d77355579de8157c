use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::repo::{AuditRepo, UserRepo};
use crate::courses::repo::{CourseRepo, EnrollmentRepo};

pub mod memory;

pub use memory::MemoryStore;

/// Every repository the handlers need, behind one handle.
pub trait Store: UserRepo + AuditRepo + CourseRepo + EnrollmentRepo {}

impl<T> Store for T where T: UserRepo + AuditRepo + CourseRepo + EnrollmentRepo {}

#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}
