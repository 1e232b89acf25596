//! Resilient structured generation and evaluation of synthetic support conversations.
//!
//! The building blocks, bottom-up:
//!
//! - [`structured`]: schema-validated generation over a [`structured::Provider`],
//!   with retry, pacing, a prompt-only fallback and deterministic repair.
//! - [`gemini`]: the production provider.
//! - [`cache`] and [`store`]: the replay cache and durable JSON/JSONL output.
//! - [`batch`]: resumable, ordered batch runs for dataset generation and evaluation.
//! - [`domain`]: support-conversation models, prompts, planning and aggregates.

pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod store;
pub mod structured;
pub mod ui;

pub use error::ForgeError;
