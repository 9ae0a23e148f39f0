//! HTTP API Tests

mod metrics_tests;
mod online_tests;
mod upgrade_tests;
