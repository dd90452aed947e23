// Integration tests for the session state machine
//
// A scripted capture backend and a canned transcriber stand in for the
// microphone and the remote service, so every transition can be driven
// deterministically: capture cycles, idempotent stops, re-entrancy guards,
// and the failure paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use speechpad::{
    ArtifactSource, AudioArtifact, AudioFrame, CaptureBackend, CaptureError,
    MediaCaptureController, SessionHandle, SessionStateMachine, Transcriber, TranscriptionError,
    UiState,
};
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;

/// Capture backend that emits a fixed set of frames and records stream release
struct ScriptedBackend {
    frames: Vec<AudioFrame>,
    deny_permission: bool,
    /// Drop the sender right after emitting, simulating a dying stream
    close_after_send: bool,
    started: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    hold: Option<mpsc::Sender<AudioFrame>>,
    /// When set, receives a clone of the frame sender so a test can inject
    /// frames that race the stop request
    tap: Option<Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>>,
    capturing: bool,
}

impl ScriptedBackend {
    fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            deny_permission: false,
            close_after_send: false,
            started: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
            hold: None,
            tap: None,
            capturing: false,
        }
    }
}

#[async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.deny_permission {
            return Err(CaptureError::PermissionDenied(
                "microphone access refused".to_string(),
            ));
        }

        self.started.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        self.capturing = true;

        let (tx, rx) = mpsc::channel(16);
        for frame in self.frames.clone() {
            tx.send(frame).await.expect("frame channel closed");
        }
        if let Some(tap) = &self.tap {
            *tap.lock().unwrap() = Some(tx.clone());
        }
        if !self.close_after_send {
            // Keep the sender alive so the stream stays open until stop()
            self.hold = Some(tx);
        }

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.capturing = false;
        self.hold = None;
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Transcriber that returns a canned response and counts submissions
struct CannedTranscriber {
    response: Result<String, TranscriptionError>,
    calls: Arc<AtomicUsize>,
    last_artifact: Arc<Mutex<Option<AudioArtifact>>>,
    /// When set, submissions block until the gate is notified
    gate: Option<Arc<Notify>>,
}

impl CannedTranscriber {
    fn succeeding(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            last_artifact: Arc::new(Mutex::new(None)),
            gate: None,
        }
    }

    fn failing(error: TranscriptionError) -> Self {
        Self {
            response: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
            last_artifact: Arc::new(Mutex::new(None)),
            gate: None,
        }
    }
}

#[async_trait]
impl Transcriber for CannedTranscriber {
    async fn submit(&self, artifact: &AudioArtifact) -> Result<String, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_artifact.lock().unwrap() = Some(artifact.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.response.clone()
    }
}

fn frame(samples: Vec<i16>) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
    }
}

fn spawn_machine(
    backend: ScriptedBackend,
    transcriber: CannedTranscriber,
) -> SessionHandle {
    let (machine, handle) = SessionStateMachine::new(Box::new(backend), Arc::new(transcriber));
    tokio::spawn(machine.run());
    handle
}

#[tokio::test]
async fn capture_cycle_produces_one_microphone_artifact() -> Result<()> {
    let backend = ScriptedBackend::new(vec![frame(vec![1, 2, 3]), frame(vec![4, 5, 6])]);
    let released = Arc::clone(&backend.released);
    let transcriber = CannedTranscriber::succeeding("azul");
    let calls = Arc::clone(&transcriber.calls);
    let last_artifact = Arc::clone(&transcriber.last_artifact);

    let mut handle = spawn_machine(backend, transcriber);

    handle.start_capture().await?;
    let state = handle.wait_until(|s| *s != UiState::Idle).await;
    assert_eq!(state, UiState::Recording);

    // Let the forwarding task deliver both chunks before stopping
    sleep(Duration::from_millis(50)).await;
    handle.stop_capture().await?;

    let state = handle.wait_until(UiState::is_terminal).await;
    assert_eq!(state, UiState::Succeeded("azul".to_string()));

    assert_eq!(calls.load(Ordering::SeqCst), 1, "Exactly one submission");
    assert!(released.load(Ordering::SeqCst), "Stream should be released");

    let artifact = last_artifact.lock().unwrap().clone().expect("artifact");
    assert_eq!(artifact.source, ArtifactSource::Microphone);
    assert_eq!(artifact.mime_type, "audio/wav");
    // 44-byte WAV header plus 6 i16 samples
    assert_eq!(artifact.bytes.len(), 44 + 12);

    handle.acknowledge().await?;
    let state = handle.wait_until(|s| *s == UiState::Idle).await;
    assert_eq!(state, UiState::Idle);

    Ok(())
}

#[tokio::test]
async fn stop_capture_while_idle_is_a_noop() -> Result<()> {
    let backend = ScriptedBackend::new(vec![]);
    let started = Arc::clone(&backend.started);

    let handle = spawn_machine(backend, CannedTranscriber::succeeding("unused"));

    handle.stop_capture().await?;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.state(), UiState::Idle, "State should not change");
    assert_eq!(started.load(Ordering::SeqCst), 0, "No session was opened");

    Ok(())
}

#[tokio::test]
async fn start_capture_ignored_while_transcribing() -> Result<()> {
    let backend = ScriptedBackend::new(vec![frame(vec![0; 160])]);
    let started = Arc::clone(&backend.started);

    let gate = Arc::new(Notify::new());
    let mut transcriber = CannedTranscriber::succeeding("done");
    transcriber.gate = Some(Arc::clone(&gate));

    let mut handle = spawn_machine(backend, transcriber);

    handle.start_capture().await?;
    handle.wait_until(|s| *s == UiState::Recording).await;
    sleep(Duration::from_millis(20)).await;

    handle.stop_capture().await?;
    handle.wait_until(|s| *s == UiState::Transcribing).await;

    // A second start must not open a second session
    handle.start_capture().await?;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), UiState::Transcribing);
    assert_eq!(started.load(Ordering::SeqCst), 1, "No second session");

    gate.notify_one();
    let state = handle.wait_until(UiState::is_terminal).await;
    assert_eq!(state, UiState::Succeeded("done".to_string()));

    Ok(())
}

#[tokio::test]
async fn upload_ignored_while_recording() -> Result<()> {
    let backend = ScriptedBackend::new(vec![]);
    let transcriber = CannedTranscriber::succeeding("ok");
    let calls = Arc::clone(&transcriber.calls);

    let mut handle = spawn_machine(backend, transcriber);

    handle.start_capture().await?;
    handle.wait_until(|s| *s == UiState::Recording).await;

    handle
        .upload_file("clip.wav".to_string(), vec![0, 1, 2, 3])
        .await?;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.state(), UiState::Recording);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "Upload must not submit");

    handle.stop_capture().await?;
    let state = handle.wait_until(UiState::is_terminal).await;
    assert_eq!(state, UiState::Succeeded("ok".to_string()));

    Ok(())
}

#[tokio::test]
async fn invalid_upload_never_issues_a_request() -> Result<()> {
    let backend = ScriptedBackend::new(vec![]);
    let transcriber = CannedTranscriber::succeeding("unused");
    let calls = Arc::clone(&transcriber.calls);

    let mut handle = spawn_machine(backend, transcriber);

    handle
        .upload_file("notes.txt".to_string(), b"just text".to_vec())
        .await?;

    let state = handle.wait_until(UiState::is_terminal).await;
    match state {
        UiState::Failed(message) => {
            assert!(
                message.contains("notes.txt"),
                "Message should name the file: {}",
                message
            );
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0, "No request was issued");

    handle.acknowledge().await?;
    let state = handle.wait_until(|s| *s == UiState::Idle).await;
    assert_eq!(state, UiState::Idle);

    Ok(())
}

#[tokio::test]
async fn server_failure_message_embeds_status() -> Result<()> {
    let backend = ScriptedBackend::new(vec![]);
    let transcriber = CannedTranscriber::failing(TranscriptionError::ServerError(
        "500 Internal Server Error: Transcription failed due to a model error.".to_string(),
    ));

    let mut handle = spawn_machine(backend, transcriber);

    handle
        .upload_file("clip.wav".to_string(), vec![1, 2, 3])
        .await?;

    let state = handle.wait_until(UiState::is_terminal).await;
    match state {
        UiState::Failed(message) => {
            assert!(message.contains("500"), "Expected status in: {}", message);
        }
        other => panic!("Expected Failed, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn permission_denied_surfaces_as_failed_state() -> Result<()> {
    let mut backend = ScriptedBackend::new(vec![]);
    backend.deny_permission = true;
    let started = Arc::clone(&backend.started);
    let transcriber = CannedTranscriber::succeeding("unused");
    let calls = Arc::clone(&transcriber.calls);

    let mut handle = spawn_machine(backend, transcriber);

    handle.start_capture().await?;
    let state = handle.wait_until(UiState::is_terminal).await;
    match state {
        UiState::Failed(message) => {
            assert!(
                message.contains("access denied"),
                "Expected denial message, got: {}",
                message
            );
        }
        other => panic!("Expected Failed, got {:?}", other),
    }

    assert_eq!(started.load(Ordering::SeqCst), 0, "No session was opened");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "Nothing was submitted");

    Ok(())
}

#[tokio::test]
async fn dying_stream_releases_hardware_and_fails() -> Result<()> {
    let mut backend = ScriptedBackend::new(vec![frame(vec![7, 8])]);
    backend.close_after_send = true;
    let released = Arc::clone(&backend.released);

    let mut handle = spawn_machine(backend, CannedTranscriber::succeeding("unused"));

    handle.start_capture().await?;
    let state = handle.wait_until(UiState::is_terminal).await;
    match state {
        UiState::Failed(message) => {
            assert!(
                message.contains("closed unexpectedly"),
                "Unexpected message: {}",
                message
            );
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    assert!(released.load(Ordering::SeqCst), "Stream should be released");

    Ok(())
}

#[tokio::test]
async fn chunk_arriving_after_stop_is_dropped() -> Result<()> {
    let mut backend = ScriptedBackend::new(vec![frame(vec![1, 2])]);
    let tap = Arc::new(Mutex::new(None));
    backend.tap = Some(Arc::clone(&tap));

    let gate = Arc::new(Notify::new());
    let mut transcriber = CannedTranscriber::succeeding("azul");
    transcriber.gate = Some(Arc::clone(&gate));
    let last_artifact = Arc::clone(&transcriber.last_artifact);

    let mut handle = spawn_machine(backend, transcriber);

    handle.start_capture().await?;
    handle.wait_until(|s| *s == UiState::Recording).await;
    sleep(Duration::from_millis(50)).await;

    handle.stop_capture().await?;
    handle.wait_until(|s| *s == UiState::Transcribing).await;

    // A frame still buffered in the platform can race the stop request;
    // it arrives as an event after the session already closed
    let late_tx = tap.lock().unwrap().clone().expect("sender tapped on start");
    late_tx
        .send(frame(vec![9, 9, 9, 9]))
        .await
        .expect("frame channel closed");
    sleep(Duration::from_millis(50)).await;

    gate.notify_one();
    let state = handle.wait_until(UiState::is_terminal).await;
    assert_eq!(state, UiState::Succeeded("azul".to_string()));

    let artifact = last_artifact.lock().unwrap().clone().expect("artifact");
    // Header plus the two pre-stop samples; the late chunk is not processed
    assert_eq!(artifact.bytes.len(), 44 + 4);

    Ok(())
}

#[tokio::test]
async fn state_guards_hold_without_a_state_observer() -> Result<()> {
    let backend = ScriptedBackend::new(vec![]);
    let transcriber = CannedTranscriber::succeeding("ok");
    let calls = Arc::clone(&transcriber.calls);

    let (machine, handle) = SessionStateMachine::new(Box::new(backend), Arc::new(transcriber));

    // Queue two uploads and drop every state receiver before the machine
    // runs: the transition guards must still see the Transcribing state
    handle
        .upload_file("first.wav".to_string(), vec![1, 2])
        .await?;
    handle
        .upload_file("second.wav".to_string(), vec![3, 4])
        .await?;
    handle.shutdown().await?;
    drop(handle);

    tokio::spawn(machine.run()).await?;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "Second upload must be ignored while the first is in flight"
    );

    Ok(())
}

#[tokio::test]
async fn controller_does_not_reopen_a_live_stream() -> Result<()> {
    let mut backend = ScriptedBackend::new(vec![]);
    // Stream already live without any session bookkeeping
    backend.capturing = true;
    let started = Arc::clone(&backend.started);

    let mut controller = MediaCaptureController::new(Box::new(backend));
    let (events, _events_rx) = mpsc::channel(16);

    controller.start(events).await?;

    assert!(!controller.is_active(), "No session may be opened");
    assert_eq!(
        started.load(Ordering::SeqCst),
        0,
        "Backend start must not be called again"
    );

    Ok(())
}

#[tokio::test]
async fn machine_returns_to_idle_before_next_attempt() -> Result<()> {
    let backend = ScriptedBackend::new(vec![frame(vec![1, 1])]);
    let started = Arc::clone(&backend.started);
    let transcriber = CannedTranscriber::succeeding("first");
    let calls = Arc::clone(&transcriber.calls);

    let mut handle = spawn_machine(backend, transcriber);

    handle.start_capture().await?;
    handle.wait_until(|s| *s == UiState::Recording).await;
    sleep(Duration::from_millis(20)).await;
    handle.stop_capture().await?;
    handle.wait_until(UiState::is_terminal).await;

    handle.acknowledge().await?;
    handle.wait_until(|s| *s == UiState::Idle).await;

    // A fresh cycle is allowed again
    handle.start_capture().await?;
    handle.wait_until(|s| *s == UiState::Recording).await;
    sleep(Duration::from_millis(20)).await;
    handle.stop_capture().await?;
    let state = handle.wait_until(UiState::is_terminal).await;

    assert_eq!(state, UiState::Succeeded("first".to_string()));
    assert_eq!(started.load(Ordering::SeqCst), 2, "Two sessions, in sequence");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    Ok(())
}
