//! # sage-explain
//!
//! Streaming client for the Code Sage AI explanation endpoint.
//!
//! The endpoint answers a `{"prompt": ...}` POST with a body of
//! `data: {"content": "..."}` lines terminated by `data: [DONE]`. This crate
//! turns that body into a lazy [`ExplanationStream`] of [`StreamChunk`]s.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use sage_explain::{ExplanationClient, ExplanationSource, StreamChunk};
//!
//! let client = ExplanationClient::new("http://localhost:3000/api/ai")?;
//! let mut chunks = client.explain("Explain quicksort").await?;
//!
//! while let Some(chunk) = chunks.next().await {
//!     match chunk? {
//!         StreamChunk::Text(text) => print!("{text}"),
//!         StreamChunk::Done => break,
//!     }
//! }
//! ```

pub mod client;
pub mod decoder;
pub mod error;

pub use client::{DEFAULT_ENDPOINT, ExplainConfig, ExplanationClient, ExplanationSource};
pub use decoder::{
    DATA_PREFIX, DONE_SENTINEL, ExplanationStream, LineDecoder, StreamChunk, parse_event_stream,
    parse_line,
};
pub use error::{ExplainError, Result};
