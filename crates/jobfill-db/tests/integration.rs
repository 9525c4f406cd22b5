#[path = "integration/common.rs"]
mod common;
#[path = "integration/job_store_tests.rs"]
mod job_store_tests;
