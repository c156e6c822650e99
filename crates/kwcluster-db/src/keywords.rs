//! Keyword record repository implementation.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use kwcluster_core::{
    Classification, Error, FetchOutcome, FetchResult, IntentLabels, KeywordRecord,
    KeywordRepository, MergedKeyword, Result,
};

const RECORD_COLUMNS: &str = "id, job_id, sequence_index, keyword, search_volume, \
     original_search_volume, word_count, fetch_outcome, result_links, result_titles, \
     classification, merged_keywords, search_intent, intent_type";

/// PostgreSQL implementation of KeywordRepository.
#[derive(Clone)]
pub struct PgKeywordRepository {
    pool: Pool<Postgres>,
}

impl PgKeywordRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_record_row(row: sqlx::postgres::PgRow) -> Result<KeywordRecord> {
        let outcome: Option<String> = row.get("fetch_outcome");
        let classification: String = row.get("classification");
        let merged: Json<Vec<MergedKeyword>> = row.get("merged_keywords");

        Ok(KeywordRecord {
            id: row.get("id"),
            job_id: row.get("job_id"),
            sequence_index: row.get("sequence_index"),
            keyword: row.get("keyword"),
            search_volume: row.get("search_volume"),
            original_search_volume: row.get("original_search_volume"),
            word_count: row.get("word_count"),
            fetch_outcome: outcome
                .as_deref()
                .map(str::parse::<FetchOutcome>)
                .transpose()?,
            result_links: row.get("result_links"),
            result_titles: row.get("result_titles"),
            classification: classification.parse::<Classification>()?,
            merged_keywords: merged.0,
            search_intent: row.get("search_intent"),
            intent_type: row.get("intent_type"),
        })
    }
}

#[async_trait]
impl KeywordRepository for PgKeywordRepository {
    async fn count_for_job(&self, job_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keyword_record WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    async fn insert_batch(&self, records: &[KeywordRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let job_ids: Vec<Uuid> = records.iter().map(|r| r.job_id).collect();
        let seqs: Vec<i32> = records.iter().map(|r| r.sequence_index).collect();
        let keywords: Vec<&str> = records.iter().map(|r| r.keyword.as_str()).collect();
        let volumes: Vec<i64> = records.iter().map(|r| r.original_search_volume).collect();
        let word_counts: Vec<Option<i32>> = records.iter().map(|r| r.word_count).collect();

        sqlx::query(
            "INSERT INTO keyword_record
                 (id, job_id, sequence_index, keyword, search_volume, original_search_volume, word_count)
             SELECT id, job_id, seq, kw, vol, vol, wc
             FROM UNNEST($1::uuid[], $2::uuid[], $3::int4[], $4::text[], $5::int8[], $6::int4[])
                  AS t(id, job_id, seq, kw, vol, wc)",
        )
        .bind(&ids)
        .bind(&job_ids)
        .bind(&seqs)
        .bind(&keywords)
        .bind(&volumes)
        .bind(&word_counts)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "keywords",
            op = "insert_batch",
            keyword_count = records.len(),
            "Keyword records inserted"
        );
        Ok(())
    }

    async fn record_fetch_results(&self, results: &[(Uuid, FetchResult)]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for (record_id, result) in results {
            sqlx::query(
                "UPDATE keyword_record
                 SET fetch_outcome = $1, result_links = $2, result_titles = $3
                 WHERE id = $4",
            )
            .bind(result.outcome.as_str())
            .bind(&result.links)
            .bind(&result.titles)
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<KeywordRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM keyword_record
             WHERE job_id = $1 ORDER BY sequence_index ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_record_row).collect()
    }

    async fn save_classification(&self, records: &[KeywordRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for record in records {
            sqlx::query(
                "UPDATE keyword_record
                 SET classification = $1, search_volume = $2, merged_keywords = $3
                 WHERE id = $4",
            )
            .bind(record.classification.as_str())
            .bind(record.search_volume)
            .bind(Json(&record.merged_keywords))
            .bind(record.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn set_intent(&self, record_id: Uuid, labels: &IntentLabels) -> Result<()> {
        sqlx::query(
            "UPDATE keyword_record SET search_intent = $1, intent_type = $2 WHERE id = $3",
        )
        .bind(&labels.intent)
        .bind(&labels.kind)
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_primary_for_job(&self, job_id: Uuid) -> Result<Vec<KeywordRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM keyword_record
             WHERE job_id = $1 AND classification = 'primary'
             ORDER BY sequence_index ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_record_row).collect()
    }

    async fn delete_for_job(&self, job_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM keyword_record WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
