pub mod chat;
pub mod chat_api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod relay;
