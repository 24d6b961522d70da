// SQL query constants for repositories
// Centralizes repeated SELECT column lists

/// SQL query fragments for the analysis_jobs table
pub mod analysis_job_queries {
    /// All columns for analysis_jobs, in `AnalysisJob` field order
    pub const SELECT_ALL_COLUMNS: &str = r#"id, name, external_batch_id, status,
        created_at, completed_at, raw_result, error_message, version"#;
}

/// SQL query fragments for the requesters table
pub mod requester_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, name, email, department_id, created_at"#;
}
