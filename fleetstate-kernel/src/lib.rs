pub mod config;
pub mod health;
pub mod http;
pub mod ingest;
pub mod merge;
pub mod models;
pub mod mqtt;
pub mod store;
