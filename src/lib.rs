pub mod config;
pub mod context;
pub mod ffmpeg;
pub mod handlers;
pub mod media;
pub mod models;
pub mod progress;
pub mod queue;
pub mod routes;
pub mod store;
pub mod worker;
