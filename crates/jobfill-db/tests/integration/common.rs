use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// SQL migration statements, executed one at a time.
const MIGRATIONS: &[&str] = &[
    // 0001_jobs.sql
    r#"CREATE TABLE IF NOT EXISTS jobs (
        id BIGINT PRIMARY KEY,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        region TEXT NOT NULL DEFAULT 'Perth',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        description TEXT,
        suburb TEXT,
        pay_range TEXT,
        min_salary INTEGER,
        max_salary INTEGER,
        tech_stack JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_missing_description
        ON jobs(created_at DESC)
        WHERE description IS NULL OR description = '' OR description = 'None'"#,
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_region ON jobs(region, created_at DESC)"#,
];

/// Spins up a PostgreSQL container and returns a connected pool.
///
/// The `ContainerAsync` must be kept in scope for the test duration —
/// dropping it will stop the container.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "jobfill_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/jobfill_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    // Run migrations one statement at a time
    for migration in MIGRATIONS {
        sqlx::query(migration)
            .execute(&pool)
            .await
            .expect("Failed to run migration");
    }

    (pool, container)
}

/// Insert a job row. `age_minutes` pushes `created_at` into the past so
/// tests can assert ordering.
pub async fn insert_job(
    pool: &PgPool,
    id: i64,
    region: &str,
    description: Option<&str>,
    pay_range: Option<&str>,
    is_active: bool,
    age_minutes: i32,
) {
    sqlx::query(
        r#"
        INSERT INTO jobs (id, url, title, region, is_active, description, pay_range, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW() - ($8 || ' minutes')::interval)
        "#,
    )
    .bind(id)
    .bind(format!("https://example.com/job/{id}"))
    .bind(format!("Job {id}"))
    .bind(region)
    .bind(is_active)
    .bind(description)
    .bind(pay_range)
    .bind(age_minutes.to_string())
    .execute(pool)
    .await
    .expect("Failed to insert job");
}
