use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::events::SessionEvent;
use super::state::UiState;
use crate::audio::{
    AudioArtifact, AudioFrame, AudioSourceResolver, CaptureBackend, MediaCaptureController,
};
use crate::transcription::{Transcriber, TranscriptionError};

/// Clonable surface for user actions and state observation
#[derive(Clone)]
pub struct SessionHandle {
    event_tx: mpsc::Sender<SessionEvent>,
    state_rx: watch::Receiver<UiState>,
}

impl SessionHandle {
    pub async fn start_capture(&self) -> Result<()> {
        self.send(SessionEvent::StartCapture).await
    }

    pub async fn stop_capture(&self) -> Result<()> {
        self.send(SessionEvent::StopCapture).await
    }

    pub async fn upload_file(&self, file_name: String, bytes: Vec<u8>) -> Result<()> {
        self.send(SessionEvent::UploadFile { file_name, bytes }).await
    }

    pub async fn acknowledge(&self) -> Result<()> {
        self.send(SessionEvent::Acknowledge).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionEvent::Shutdown).await
    }

    /// Current state snapshot
    pub fn state(&self) -> UiState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the state satisfies `predicate` and return it
    pub async fn wait_until<F>(&mut self, predicate: F) -> UiState
    where
        F: Fn(&UiState) -> bool,
    {
        loop {
            let current = self.state_rx.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            if self.state_rx.changed().await.is_err() {
                return self.state_rx.borrow().clone();
            }
        }
    }

    async fn send(&self, event: SessionEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| anyhow!("session event loop is not running"))
    }
}

/// Orchestrates capture → resolve → transcribe → present
///
/// All state lives behind one event loop; chunk arrival and transcription
/// completion come in as messages like every user action, so rapid toggling
/// can never observe a half-applied transition.
pub struct SessionStateMachine {
    controller: MediaCaptureController,
    transcriber: Arc<dyn Transcriber>,
    state_tx: watch::Sender<UiState>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: mpsc::Receiver<SessionEvent>,
}

impl SessionStateMachine {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        transcriber: Arc<dyn Transcriber>,
    ) -> (Self, SessionHandle) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(UiState::Idle);

        let machine = Self {
            controller: MediaCaptureController::new(backend),
            transcriber,
            state_tx,
            event_tx: event_tx.clone(),
            event_rx,
        };
        let handle = SessionHandle { event_tx, state_rx };

        (machine, handle)
    }

    /// Run the event loop until `Shutdown` arrives
    pub async fn run(mut self) {
        while let Some(event) = self.event_rx.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                break;
            }
            self.handle_event(event).await;
        }

        // Never leave the microphone open behind a dead loop
        if self.controller.is_active() {
            self.controller.abort().await;
        }
        info!("Session event loop stopped");
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StartCapture => self.on_start_capture().await,
            SessionEvent::StopCapture => self.on_stop_capture().await,
            SessionEvent::UploadFile { file_name, bytes } => {
                self.on_upload(file_name, bytes).await
            }
            SessionEvent::Acknowledge => self.on_acknowledge(),
            SessionEvent::ChunkArrived(frame) => self.on_chunk(frame),
            SessionEvent::StreamClosed => self.on_stream_closed().await,
            SessionEvent::TranscriptionFinished(result) => self.on_transcription_finished(result),
            SessionEvent::Shutdown => unreachable!("handled by run()"),
        }
    }

    async fn on_start_capture(&mut self) {
        match self.state() {
            UiState::Recording | UiState::Transcribing => {
                warn!("Capture start ignored in {:?}", self.state());
                return;
            }
            // Succeeded/Failed count as acknowledged once the user acts again
            _ => {}
        }

        match self.controller.start(self.event_tx.clone()).await {
            Ok(()) => self.set_state(UiState::Recording),
            Err(e) => {
                error!("Failed to start capture: {}", e);
                self.set_state(UiState::Failed(e.to_string()));
            }
        }
    }

    async fn on_stop_capture(&mut self) {
        if self.state() != UiState::Recording {
            // Idempotent guard: rapid double-clicks are not an error
            debug!("Capture stop ignored in {:?}", self.state());
            return;
        }

        let frames = match self.controller.stop().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Capture shutdown failed: {}", e);
                self.set_state(UiState::Failed(e.to_string()));
                return;
            }
        };

        match AudioSourceResolver::from_capture(&frames) {
            Ok(artifact) => self.submit(artifact),
            Err(e) => {
                error!("Failed to assemble capture artifact: {}", e);
                self.set_state(UiState::Failed(e.to_string()));
            }
        }
    }

    async fn on_upload(&mut self, file_name: String, bytes: Vec<u8>) {
        match self.state() {
            UiState::Recording | UiState::Transcribing => {
                warn!("Upload of {} ignored in {:?}", file_name, self.state());
                return;
            }
            _ => {}
        }

        match AudioSourceResolver::from_upload(&file_name, bytes) {
            Ok(artifact) => self.submit(artifact),
            Err(e) => {
                warn!("Upload rejected: {}", e);
                self.set_state(UiState::Failed(e.to_string()));
            }
        }
    }

    fn on_chunk(&mut self, frame: AudioFrame) {
        if self.state() == UiState::Recording {
            self.controller.push_frame(frame);
        } else {
            // Chunks racing a stop request are dropped, never processed late
            debug!("Dropped chunk outside of Recording");
        }
    }

    async fn on_stream_closed(&mut self) {
        if self.state() != UiState::Recording {
            return;
        }

        self.controller.abort().await;
        self.set_state(UiState::Failed(
            "capture stream closed unexpectedly".to_string(),
        ));
    }

    fn on_transcription_finished(&mut self, result: Result<String, TranscriptionError>) {
        if self.state() != UiState::Transcribing {
            warn!("Transcription result arrived in {:?}; ignoring", self.state());
            return;
        }

        match result {
            Ok(text) => self.set_state(UiState::Succeeded(text)),
            Err(e) => self.set_state(UiState::Failed(e.to_string())),
        }
    }

    fn on_acknowledge(&mut self) {
        if self.state().is_terminal() {
            self.set_state(UiState::Idle);
        }
    }

    /// Hand an artifact to the transcriber; the result comes back as an event
    ///
    /// The state guard above means at most one submission is ever in flight.
    fn submit(&mut self, artifact: AudioArtifact) {
        let transcriber = Arc::clone(&self.transcriber);
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            let result = transcriber.submit(&artifact).await;
            if events
                .send(SessionEvent::TranscriptionFinished(result))
                .await
                .is_err()
            {
                error!("Session event loop gone before transcription result arrived");
            }
        });

        self.set_state(UiState::Transcribing);
    }

    fn state(&self) -> UiState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&mut self, state: UiState) {
        info!("UI state: {:?}", state);
        // send_replace stores the value even with no receivers left, so the
        // guards above never run against a stale state in a headless machine
        self.state_tx.send_replace(state);
    }
}
