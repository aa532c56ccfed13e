//! Real-time transit vehicle tracker
//!
//! Polls a GTFS-realtime vehicle positions feed, keeps the latest snapshot
//! in memory and serves it over HTTP.

pub mod api;
pub mod config;
pub mod errors;
pub mod feed;
pub mod models;
pub mod poller;
pub mod store;
