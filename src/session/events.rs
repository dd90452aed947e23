use crate::audio::AudioFrame;
use crate::transcription::TranscriptionError;

/// Messages consumed by the session state machine
///
/// Hardware callbacks and the transcription task never mutate session state
/// directly; everything arrives here and goes through one transition function.
#[derive(Debug)]
pub enum SessionEvent {
    /// User asked to start microphone capture
    StartCapture,
    /// User asked to stop capture and transcribe
    StopCapture,
    /// User selected a file to transcribe
    UploadFile { file_name: String, bytes: Vec<u8> },
    /// User acknowledged a terminal state
    Acknowledge,
    /// A buffered audio chunk arrived from the capture backend
    ChunkArrived(AudioFrame),
    /// The capture stream ended without a stop request
    StreamClosed,
    /// The in-flight transcription finished
    TranscriptionFinished(Result<String, TranscriptionError>),
    /// Stop the event loop
    Shutdown,
}
