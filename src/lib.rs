pub mod backfill;
pub mod config;
pub mod driver;
pub mod error;
pub mod fake_feed;
pub mod feed;
pub mod http_client;
pub mod models;
pub mod names;
pub mod reconcile;
pub mod report;
pub mod resolver;
pub mod standings;
pub mod store;
pub mod sweep;
