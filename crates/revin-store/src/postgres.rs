//! Postgres-backed durable store: UNNEST bulk load + insert-only merge.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::debug;

use crate::{snapshot, DurableStore, LandingTable, StoreError};

const PERMANENT_TABLE: &str = "reviews";
const REVIEW_COLUMNS: &str =
    "id, author, content, rating, helpfulness_count, submitted_at, source_version";

pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .map_err(StoreError::Connect)?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DurableStore for PgReviewStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {PERMANENT_TABLE} (
                id TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
                helpfulness_count INTEGER NOT NULL DEFAULT 0 CHECK (helpfulness_count >= 0),
                submitted_at TIMESTAMP NOT NULL,
                source_version TEXT NOT NULL
            )"
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                context: "creating permanent review table",
                source,
            })?;
        Ok(())
    }

    async fn create_landing(&self, landing: &LandingTable) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE {} (
                id TEXT NOT NULL,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                rating SMALLINT NOT NULL,
                helpfulness_count INTEGER NOT NULL,
                submitted_at TIMESTAMP NOT NULL,
                source_version TEXT NOT NULL
            )",
            landing.name()
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                context: "creating landing table",
                source,
            })?;
        debug!(landing = landing.name(), "created landing table");
        Ok(())
    }

    async fn load_landing(
        &self,
        landing: &LandingTable,
        snapshot: &Path,
    ) -> Result<u64, StoreError> {
        let records = snapshot::read_snapshot(snapshot)?;
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let authors: Vec<String> = records.iter().map(|r| r.author.clone()).collect();
        let contents: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let ratings: Vec<i16> = records.iter().map(|r| r.rating).collect();
        let helpfulness: Vec<i32> = records.iter().map(|r| r.helpfulness_count).collect();
        let submitted: Vec<NaiveDateTime> = records.iter().map(|r| r.submitted_at).collect();
        let versions: Vec<String> = records.iter().map(|r| r.source_version.clone()).collect();

        let sql = format!(
            "INSERT INTO {} ({REVIEW_COLUMNS})
             SELECT * FROM UNNEST(
                 $1::text[], $2::text[], $3::text[], $4::smallint[],
                 $5::integer[], $6::timestamp[], $7::text[]
             )",
            landing.name()
        );
        let result = sqlx::query(&sql)
            .bind(&ids)
            .bind(&authors)
            .bind(&contents)
            .bind(&ratings)
            .bind(&helpfulness)
            .bind(&submitted)
            .bind(&versions)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                context: "bulk-loading snapshot into landing table",
                source,
            })?;

        debug!(
            landing = landing.name(),
            rows = result.rows_affected(),
            "loaded landing table"
        );
        Ok(result.rows_affected())
    }

    async fn merge_landing(&self, landing: &LandingTable) -> Result<u64, StoreError> {
        // One atomic set operation; concurrent runs race on the primary key
        // and the loser's rows are skipped, never duplicated.
        let sql = format!(
            "INSERT INTO {PERMANENT_TABLE} ({REVIEW_COLUMNS})
             SELECT {REVIEW_COLUMNS} FROM {}
             ON CONFLICT (id) DO NOTHING",
            landing.name()
        );
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                context: "merging landing table into permanent table",
                source,
            })?;
        Ok(result.rows_affected())
    }

    async fn drop_landing(&self, landing: &LandingTable) -> Result<(), StoreError> {
        let sql = format!("DROP TABLE IF EXISTS {}", landing.name());
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                context: "dropping landing table",
                source,
            })?;
        Ok(())
    }
}
