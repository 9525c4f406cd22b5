use jobfill_core::job::CandidateFilter;
use jobfill_core::region::Region;
use jobfill_core::traits::JobStore;
use jobfill_db::JobRepository;

use crate::common::{insert_job, setup_test_db};

fn all_filter() -> CandidateFilter {
    CandidateFilter {
        region: None,
        include_inactive: true,
        limit: None,
    }
}

#[tokio::test]
async fn candidates_match_all_missing_description_shapes() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());

    insert_job(&pool, 1, "Perth", None, None, true, 0).await;
    insert_job(&pool, 2, "Perth", Some(""), None, true, 0).await;
    insert_job(&pool, 3, "Perth", Some("None"), None, true, 0).await;
    insert_job(&pool, 4, "Perth", Some("already written"), None, true, 0).await;

    let mut ids: Vec<i64> = repo
        .candidates(&all_filter())
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    ids.sort();

    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn candidates_filter_region_and_active() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());

    insert_job(&pool, 1, "Perth", None, None, true, 0).await;
    insert_job(&pool, 2, "Sydney", None, None, true, 0).await;
    insert_job(&pool, 3, "Perth", None, None, false, 0).await;

    let filter = CandidateFilter {
        region: Some(Region::Perth),
        include_inactive: false,
        limit: None,
    };
    let ids: Vec<i64> = repo
        .candidates(&filter)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn candidates_newest_first_with_limit() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());

    insert_job(&pool, 1, "Perth", None, None, true, 30).await;
    insert_job(&pool, 2, "Perth", None, None, true, 10).await;
    insert_job(&pool, 3, "Perth", None, None, true, 20).await;

    let filter = CandidateFilter {
        limit: Some(2),
        ..all_filter()
    };
    let ids: Vec<i64> = repo
        .candidates(&filter)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    assert_eq!(ids, vec![2, 3]);
}

#[tokio::test]
async fn conditional_update_writes_once() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());
    insert_job(&pool, 1, "Perth", None, None, true, 0).await;

    let first = repo
        .update_description(1, "first write", Some("Perth"))
        .await
        .unwrap();
    let second = repo
        .update_description(1, "second write", Some("Sydney"))
        .await
        .unwrap();

    assert_eq!(first, 1);
    assert_eq!(second, 0);

    let (description, suburb): (String, Option<String>) =
        sqlx::query_as("SELECT description, suburb FROM jobs WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(description, "first write");
    assert_eq!(suburb.as_deref(), Some("Perth"));
}

#[tokio::test]
async fn conditional_update_overwrites_none_placeholder() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());
    insert_job(&pool, 1, "Perth", Some("None"), None, true, 0).await;

    let rows = repo.update_description(1, "real content", None).await.unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn missing_suburb_keeps_existing_value() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());
    insert_job(&pool, 1, "Perth", None, None, true, 0).await;
    sqlx::query("UPDATE jobs SET suburb = 'Fremantle' WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();

    repo.update_description(1, "text", None).await.unwrap();

    let (suburb,): (Option<String>,) = sqlx::query_as("SELECT suburb FROM jobs WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(suburb.as_deref(), Some("Fremantle"));
}

#[tokio::test]
async fn unknown_job_id_affects_zero_rows() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let rows = repo.update_description(999, "text", None).await.unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn salary_and_tech_stack_updates_round_trip() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());
    insert_job(&pool, 1, "Perth", Some("desc"), Some("$100k - $120k"), true, 0).await;

    repo.update_salary(1, 100_000, 120_000).await.unwrap();
    repo.update_tech_stack(1, &["Rust".to_string(), "Postgres".to_string()])
        .await
        .unwrap();

    let (min, max, stack): (Option<i32>, Option<i32>, Option<serde_json::Value>) =
        sqlx::query_as("SELECT min_salary, max_salary, tech_stack FROM jobs WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(min, Some(100_000));
    assert_eq!(max, Some(120_000));
    assert_eq!(stack, Some(serde_json::json!(["Rust", "Postgres"])));
}

#[tokio::test]
async fn tech_stack_candidates_need_description_and_no_stack() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());

    insert_job(&pool, 1, "Perth", Some("has description"), None, true, 0).await;
    insert_job(&pool, 2, "Perth", None, None, true, 0).await;
    insert_job(&pool, 3, "Perth", Some("analyzed already"), None, true, 0).await;
    repo.update_tech_stack(3, &["Go".to_string()]).await.unwrap();

    let candidates = repo.tech_stack_candidates(None).await.unwrap();
    let ids: Vec<i64> = candidates.iter().map(|(id, _)| *id).collect();

    assert_eq!(ids, vec![1]);
    assert_eq!(candidates[0].1, "has description");
}

#[tokio::test]
async fn salary_candidates_need_pay_range_and_no_salary() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());

    insert_job(&pool, 1, "Perth", None, Some("$80k - $90k"), true, 0).await;
    insert_job(&pool, 2, "Perth", None, None, true, 0).await;
    insert_job(&pool, 3, "Perth", None, Some("$50/hr"), true, 0).await;
    repo.update_salary(3, 95_000, 95_000).await.unwrap();

    let candidates = repo.salary_candidates(None).await.unwrap();
    let ids: Vec<i64> = candidates.iter().map(|(id, _)| *id).collect();

    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn zero_empty_pay_ranges_batches_only_unset_rows() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool.clone());

    insert_job(&pool, 1, "Perth", None, None, true, 0).await;
    insert_job(&pool, 2, "Perth", None, Some(""), true, 0).await;
    insert_job(&pool, 3, "Perth", None, Some("$100k"), true, 0).await;
    insert_job(&pool, 4, "Perth", None, None, true, 0).await;
    repo.update_salary(4, 70_000, 80_000).await.unwrap();

    let zeroed = repo.zero_empty_pay_ranges().await.unwrap();
    assert_eq!(zeroed, 2);

    let (min,): (Option<i32>,) = sqlx::query_as("SELECT min_salary FROM jobs WHERE id = 3")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(min, None);
    let (min,): (Option<i32>,) = sqlx::query_as("SELECT min_salary FROM jobs WHERE id = 4")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(min, Some(70_000));
}
