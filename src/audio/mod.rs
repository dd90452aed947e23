pub mod capture;
pub mod controller;
pub mod microphone;
pub mod resolve;

pub use capture::{AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureError};
pub use controller::MediaCaptureController;
pub use microphone::MicrophoneBackend;
pub use resolve::{ArtifactSource, AudioArtifact, AudioSourceResolver, ResolveError};
