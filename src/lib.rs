pub mod audio;
pub mod config;
pub mod session;
pub mod transcription;

pub use audio::{
    ArtifactSource, AudioArtifact, AudioFrame, AudioSourceResolver, CaptureBackend,
    CaptureBackendFactory, CaptureConfig, CaptureError, MediaCaptureController, ResolveError,
};
pub use config::Config;
pub use session::{SessionEvent, SessionHandle, SessionStateMachine, UiState};
pub use transcription::{HttpTranscriptionClient, Transcriber, TranscriptionError};
