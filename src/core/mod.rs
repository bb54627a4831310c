//! Core translation engine module

pub mod client;
pub mod config;
pub mod cost_tracker;
pub mod errors;
pub mod models;
pub mod retry;
