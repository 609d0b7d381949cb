//! Pipeline stages for label extraction.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──▶ (text ≥ threshold) ─────────────────────▶ llm (text)   ─┐
//! pdf text ──┤                                                            ├──▶ postprocess
//!            └──▶ (short / failed) ──▶ pdf render ──▶ encode ──▶ llm (vision) ─┘
//! ```
//!
//! 1. [`pdf`]     : text layer and page rasterisation; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 2. [`classify`]: the scanned-document heuristic
//! 3. [`encode`]  : PNG-encode and base64-wrap each rendered page
//! 4. [`llm`]     : one bounded inference call; quota refusals degrade
//! 5. [`postprocess`]: fence unwrapping, JSON parsing, schema validation

pub mod classify;
pub mod encode;
pub mod llm;
pub mod pdf;
pub mod postprocess;
