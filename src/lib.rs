pub mod aggregator;
pub mod config;
pub mod health;
pub mod ingest;
pub mod mapper;
pub mod models;
pub mod notifier;
pub mod payee;
pub mod requisition;
pub mod state;
pub mod storage;
#[cfg(test)]
pub mod test_utils;

pub use state::{setup, AppState};
