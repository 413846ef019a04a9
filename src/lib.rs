//! Multi-chain payment verification and webhook reconciliation engine.
//!
//! Tracks payment intents against pluggable blockchain backends. Settlement
//! state is driven from two directions: active verification polls the chain
//! through a [`chains::ChainProcessor`], and passive reconciliation ingests
//! provider webhooks at-least-once while applying each one exactly once
//! through the attempt ledger in [`database`].

pub mod api;
pub mod chains;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod services;
