pub mod chat;
pub mod config;
mod config_env;
pub mod llm;
pub mod models;
pub mod prayer_times;
pub mod repos;
pub mod sessions;
pub mod sql_gate;
pub mod timezone;
pub mod tools;
