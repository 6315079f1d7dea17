use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

use crate::models::ScrapedDataset;
use crate::traits::OutputSink;

pub const TABLE_NAME: &str = "scraped_data";

/// Relational sink: one parameterized insert per record into
/// `scraped_data`, whose columns are the field names.
pub struct SqlSink {
    pool: SqlitePool,
}

impl SqlSink {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePool::connect(db_url)
            .await
            .with_context(|| format!("failed to connect to {db_url}"))?;

        info!("Database connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_table(&self, fields: &[String]) -> Result<()> {
        let columns: Vec<String> = fields
            .iter()
            .map(|f| format!("{} TEXT", quote_ident(f)))
            .collect();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(TABLE_NAME),
            columns.join(", ")
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OutputSink for SqlSink {
    fn describe(&self) -> String {
        format!("database table {TABLE_NAME}")
    }

    async fn save(&self, fields: &[String], dataset: &ScrapedDataset) -> Result<()> {
        if fields.is_empty() {
            info!("No fields configured, nothing to insert");
            return Ok(());
        }
        self.ensure_table(fields).await?;

        let insert = insert_statement(fields);
        let mut tx = self.pool.begin().await?;
        for record in dataset.records() {
            let mut query = sqlx::query(&insert);
            for value in record.project(fields) {
                query = query.bind(value.map(str::to_string));
            }
            query
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to insert {record}"))?;
        }
        tx.commit().await?;

        info!("Inserted {} records into {}", dataset.len(), TABLE_NAME);
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn insert_statement(fields: &[String]) -> String {
    let columns: Vec<String> = fields.iter().map(|f| quote_ident(f)).collect();
    let placeholders = vec!["?"; fields.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(TABLE_NAME),
        columns.join(", "),
        placeholders
    )
}
