// Postgres-backed stores for the analysis pipeline

pub mod analysis_job;
pub mod queries;
pub mod report;

pub use analysis_job::PgJobStore;
pub use report::{PgReportStore, PgReportTransaction};
