//! Core modules: the data model, registry and resolver, the validation
//! engine and its two cache tiers.

pub mod adapter;
pub mod audit;
pub mod codes;
pub mod config;
pub mod constraint;
pub mod engine;
pub mod error;
pub mod output;
pub mod overrides;
pub mod patterns;
pub mod project;
pub mod registry;
pub mod resolver;
pub mod semantic;
pub mod session_cache;
pub mod tags;
pub mod time;
pub mod validation_cache;
pub mod violation;
pub mod watch;
