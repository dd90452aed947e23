use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::capture::{AudioFrame, CaptureBackend, CaptureError};
use crate::session::SessionEvent;

/// The live window during which the microphone is buffering audio
struct RecordingSession {
    id: Uuid,
    frames: Vec<AudioFrame>,
}

/// Owns the microphone resource and the at-most-one recording session
///
/// Frames never reach session state directly: the backend's receiver is
/// drained by a forwarding task that re-tags each frame as a
/// `SessionEvent::ChunkArrived` message for the state machine.
pub struct MediaCaptureController {
    backend: Box<dyn CaptureBackend>,
    session: Option<RecordingSession>,
}

impl MediaCaptureController {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Request microphone access and open a recording session
    pub async fn start(
        &mut self,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<(), CaptureError> {
        if self.session.is_some() || self.backend.is_capturing() {
            warn!("Capture already active; ignoring start");
            return Ok(());
        }

        let mut frame_rx = self.backend.start().await?;
        let id = Uuid::new_v4();

        info!("Capture session {} started on {}", id, self.backend.name());

        // The task ends when the backend drops its sender; frames racing a
        // stop request still arrive as events and are dropped by the state
        // machine's guard, never buffered late
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if events.send(SessionEvent::ChunkArrived(frame)).await.is_err() {
                    return;
                }
            }
            // Sender gone while we were still listening: the stream died
            let _ = events.send(SessionEvent::StreamClosed).await;
        });

        self.session = Some(RecordingSession {
            id,
            frames: Vec::new(),
        });

        Ok(())
    }

    /// Buffer a chunk delivered back by the state machine
    pub fn push_frame(&mut self, frame: AudioFrame) {
        if let Some(session) = &mut self.session {
            session.frames.push(frame);
        }
    }

    /// Stop capturing and hand back the buffered frames
    ///
    /// The hardware stream is released before this returns, even when the
    /// backend reports a shutdown error.
    pub async fn stop(&mut self) -> Result<Vec<AudioFrame>, CaptureError> {
        let Some(session) = self.session.take() else {
            return Ok(Vec::new());
        };

        let stop_result = self.backend.stop().await;

        info!(
            "Capture session {} stopped ({} chunks buffered)",
            session.id,
            session.frames.len()
        );

        stop_result?;
        Ok(session.frames)
    }

    /// Release the stream and discard the session
    pub async fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.backend.stop().await {
                warn!("Backend stop failed during abort: {}", e);
            }
            info!("Capture session {} aborted", session.id);
        }
    }
}
