pub mod api;
pub mod app;
pub mod bot;
pub mod cache;
pub mod commands;
pub mod config;
pub mod fetch_error;
pub mod fetcher;
pub mod models;
pub mod notifier;
pub mod plot;
pub mod scheduler;
pub mod telegram;
pub mod tracker;
pub mod utils;
