pub mod auth;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod groups;
pub mod invite_code;
pub mod membership;
pub mod shopping;
pub mod users;
