//! tokenscope: token trader analytics over chat.
//!
//! A user picks a query from a chat menu, supplies a contract address
//! (and, for trades, a time range), and receives the result of a saved
//! query on a remote analytics engine as formatted text or a CSV file.

pub mod bootstrap;
pub mod channels;
pub mod cli;
pub mod config;
pub mod error;
pub mod lookup;
pub mod query;
pub mod report;
pub mod session;

pub use config::Config;
