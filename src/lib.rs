pub mod adapters;
pub mod chat;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod jobs;
pub mod normalize;
pub mod ports;
pub mod scrape;
pub mod search;
