//! Hub Scenario Tests

mod delivery_tests;
mod membership_tests;
mod offline_tests;
