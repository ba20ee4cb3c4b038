//! shows-bot - TV show tracking with multi-provider search and episode notifications.
//!
//! This crate provides:
//! - Show search reconciled across providers (TVMaze, TMDB)
//! - Idempotent episode ingestion
//! - A periodic, non-reentrant notification sweep with at-most-once records

pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod provider;
pub mod repository;
pub mod service;
pub mod task;
