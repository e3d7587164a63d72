//! # Tool Gateway Library
//!
//! Core of the multi-tenant tool gateway: the translated provider catalog,
//! per-user credentials, pluggable adapters (MCP over stdio among them), the
//! recorded invocation pipeline and the HTTP surface over all of it.

pub mod adapters;
pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod contracts;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod i18n;
pub mod invocations;
pub mod loader;
pub mod models;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub mod translations;
pub use migration;
