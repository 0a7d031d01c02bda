pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ingest;
pub mod source;
