//! Pipeline stages for photo-to-report generation.
//!
//! Each submodule implements exactly one step, so each can be tested in
//! isolation and swapped (e.g. a fixture analyzer in tests) without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! analyze ──▶ parse ──▶ advise ──▶ postprocess ──▶ compose
//! (process)   (JSON)    (6× LLM)   (cleanup)       (lopdf, photo)
//! ```
//!
//! 1. [`analyze`] runs the external analyzer on the stored photo and
//!    collects its stdout
//! 2. [`parse`] locates the JSON object in that output and projects the
//!    four recognised fields
//! 3. [`advise`] issues the six advisory calls concurrently; the only stage
//!    with network I/O
//! 4. [`postprocess`] strips Markdown artefacts from each completion
//! 5. [`compose`] lays out the one-page report; [`photo`] prepares the
//!    portrait it embeds. Runs in `spawn_blocking`

pub mod advise;
pub mod analyze;
pub mod compose;
pub mod parse;
pub mod photo;
pub mod postprocess;
