//! Integration tests module
//!
//! End-to-end tests of the sync orchestrator against memory and SQLite
//! backends, with remote sites mocked by wiremock:
//! - Push ingestion, dedup and policy enforcement
//! - Feed sync, scheduled cycles and health checks
//! - Resumable sitemap imports driven by the task queue
//! - Featured image import
//! - Error handling and permission scenarios

pub mod assets_test;
pub mod error_scenarios;
pub mod feed_test;
pub mod import_test;
pub mod push_test;
