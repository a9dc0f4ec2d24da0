pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod idempotency;
pub mod ids;
pub mod models;
pub mod money;
pub mod observability;
pub mod repositories;
pub mod services;
