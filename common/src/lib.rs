// Common library for the helpdesk analysis pipeline, shared by the api and scheduler

pub mod analysis_client;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod ingestion;
pub mod models;
pub mod parser;
pub mod poller;
pub mod processor;
pub mod resync;
pub mod service;
pub mod telemetry;
