//! Integration tests for Sumi-Harvest
//!
//! These tests use wiremock to stand in for the external sites and APIs,
//! and exercise fetching, crawling and persistence end-to-end.

mod common;
mod crawl_tests;
mod fetcher_tests;
mod pipeline_tests;
