pub mod app;
pub mod batch;
pub mod config;
pub mod currency;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod harmonize;
pub mod merge;
pub mod output;
pub mod prompt;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod table;
