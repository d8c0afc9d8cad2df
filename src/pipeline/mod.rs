//! Pipeline stages for screenshot-to-HTML generation.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped (another capture backend, another model
//! endpoint) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! capture ──▶ slice ──▶ normalize ──▶ compose ──▶ model ──▶ postprocess
//! (URL→PNG)   (bands)   (JPEG/b64)    (messages)  (VLM)     (opt-in)
//! ```
//!
//! 1. [`capture`]   — turn a URL into screenshot bytes behind a trait
//! 2. [`slice`]     — decode to RGB and cut tall images into horizontal bands
//! 3. [`normalize`] — JPEG-encode each band, lowering quality until the
//!    base64 payload fits; runs in `spawn_blocking`
//! 4. [`compose`]   — build the system + user messages with labelled images
//! 5. [`model`]     — one chat-completion call; the only stage with network I/O
//! 6. [`postprocess`] — strip fences and chatter around the returned document

pub mod capture;
pub mod compose;
pub mod model;
pub mod normalize;
pub mod postprocess;
pub mod slice;
