//! Production [`Provider`](crate::structured::Provider) for Google Gemini.

pub mod client;
pub mod types;

pub use client::{API_URL, GeminiClient, classify_error};
