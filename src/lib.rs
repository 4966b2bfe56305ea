//! Mailbot: answers structured email subject lines from a role table.

pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod table;
