pub mod agents;
pub mod config;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod registry;
pub mod sqlite;
