pub mod ads;
pub mod analytics;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod humanize;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod records;
pub mod runtime;
pub mod spreadsheet;
pub mod storage;
pub mod store;
