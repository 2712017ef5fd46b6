pub mod asset_cache;
pub mod board;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod fetch;
pub mod keyword_index;
pub mod models;
pub mod search;
pub mod speech;
pub mod utils;
