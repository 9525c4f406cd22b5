pub mod analysis;
pub mod backfill;
pub mod config;
pub mod enrich;
pub mod error;
pub mod job;
pub mod keypool;
pub mod pacing;
pub mod region;
pub mod stats;
pub mod testutil;
pub mod traits;

pub use analysis::AnalysisClient;
pub use backfill::Backfiller;
pub use config::{BackfillConfig, MAX_WORKERS};
pub use error::AppError;
pub use job::{CandidateFilter, CandidateJob, EnrichmentItem, FetchOutcome};
pub use region::Region;
pub use stats::{RunStatistics, StatsSnapshot};
pub use traits::{
    AnalysisTransport, AuditLog, DetailSession, JobStore, SessionFactory, TextCleaner,
    TextEnricher,
};
