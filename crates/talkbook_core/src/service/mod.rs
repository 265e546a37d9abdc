//! Use-case services built on top of the Document model.
//!
//! # Responsibility
//! - Orchestrate multi-step operations (audio import) over a Document.
//! - Keep external decoders behind traits.

pub mod conversion;
