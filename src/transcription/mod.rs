//! Remote transcription endpoint client
//!
//! One multipart POST per artifact; the service answers with
//! `{"transcription": "..."}` on success or a non-2xx status (usually with an
//! `{"error": "..."}` body) on failure.

pub mod client;

pub use client::{HttpTranscriptionClient, Transcriber, TranscriptionError};
