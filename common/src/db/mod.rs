// Database layer module

pub mod memory;
pub mod pool;
pub mod repositories;
pub mod store;

pub use memory::{InMemoryJobStore, InMemoryReportStore};
pub use pool::DbPool;
pub use repositories::{PgJobStore, PgReportStore};
pub use store::{JobStore, ReportStore, ReportTransaction};
