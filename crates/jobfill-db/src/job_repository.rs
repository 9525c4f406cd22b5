use sqlx::{PgPool, Pool, Postgres, QueryBuilder};

use jobfill_core::error::AppError;
use jobfill_core::job::{CandidateFilter, CandidateJob};
use jobfill_core::traits::JobStore;

/// A row counts as missing its description if it is NULL, empty, or the
/// literal string 'None' left behind by an earlier importer.
const MISSING_DESCRIPTION: &str =
    "(description IS NULL OR description = '' OR description = 'None')";

/// PostgreSQL-backed job store. Description writes are conditional on the
/// row still being empty, so concurrent regional instances race safely:
/// the loser's update affects zero rows.
#[derive(Clone)]
pub struct JobRepository {
    pool: Pool<Postgres>,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    url: String,
    title: String,
    pay_range: Option<String>,
}

impl From<CandidateRow> for CandidateJob {
    fn from(row: CandidateRow) -> Self {
        CandidateJob {
            id: row.id,
            url: row.url,
            title: row.title,
            pay_range: row.pay_range,
        }
    }
}

impl JobStore for JobRepository {
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<CandidateJob>, AppError> {
        let mut query = QueryBuilder::new(format!(
            "SELECT id, url, title, pay_range FROM jobs WHERE {MISSING_DESCRIPTION}"
        ));
        if !filter.include_inactive {
            query.push(" AND is_active = TRUE");
        }
        if let Some(region) = filter.region {
            query.push(" AND region = ").push_bind(region.as_str());
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let rows = query
            .build_query_as::<CandidateRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_description(
        &self,
        job_id: i64,
        description: &str,
        suburb: Option<&str>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET description = $2, suburb = COALESCE($3, suburb), updated_at = NOW()
            WHERE id = $1 AND {MISSING_DESCRIPTION}
            "#
        ))
        .bind(job_id)
        .bind(description)
        .bind(suburb)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn update_salary(
        &self,
        job_id: i64,
        min_salary: i32,
        max_salary: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET min_salary = $2, max_salary = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(min_salary)
        .bind(max_salary)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn update_tech_stack(&self, job_id: i64, stack: &[String]) -> Result<(), AppError> {
        let stack_json = serde_json::to_value(stack)?;
        sqlx::query(
            r#"
            UPDATE jobs
            SET tech_stack = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(stack_json)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn tech_stack_candidates(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<(i64, String)>, AppError> {
        let mut query = QueryBuilder::new(
            "SELECT id, description FROM jobs \
             WHERE description IS NOT NULL AND description <> '' AND description <> 'None' \
               AND tech_stack IS NULL \
             ORDER BY created_at DESC",
        );
        if let Some(limit) = limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        query
            .build_query_as::<(i64, String)>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn salary_candidates(&self, limit: Option<i64>) -> Result<Vec<(i64, String)>, AppError> {
        let mut query = QueryBuilder::new(
            "SELECT id, pay_range FROM jobs \
             WHERE pay_range IS NOT NULL AND pay_range <> '' \
               AND min_salary IS NULL \
             ORDER BY created_at DESC",
        );
        if let Some(limit) = limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        query
            .build_query_as::<(i64, String)>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn zero_empty_pay_ranges(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET min_salary = 0, max_salary = 0, updated_at = NOW()
            WHERE (pay_range IS NULL OR pay_range = '') AND min_salary IS NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
