//! Inbox auto-reply poller.

pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
