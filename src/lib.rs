//! Scheduled newsletter delivery.
//!
//! The crate pages through active subscribers, filters out users that already
//! received a given issue or campaign, builds provider-agnostic send requests
//! and hands them to an email provider in rate-limited batches. Outcomes are
//! persisted after every batch so an interrupted run can be resumed by simply
//! triggering it again.

pub mod api;
pub mod config;
pub mod db;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod models;
pub mod repository;
pub mod schema;
pub mod unsubscribe;
