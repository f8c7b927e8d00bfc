//! Single-file SQLite store for the electricity tracker.
//!
//! This crate provides:
//! - Idempotent schema creation on every open (safe for cron invocations)
//! - Upsert-by-primary-key ingestion of consumption and tariff data
//! - The date-bucketed cost join (consumption x unit rates + standing charges)
//! - Append-only sync and alert logs
//! - A typed key/value settings table for bot state

pub mod db;
pub mod settings;

pub use db::{AlertRecord, Store, StoreError, SyncRecord, UsageRow};
pub use settings::keys;
