pub mod board;
pub mod bridge;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod sink;
