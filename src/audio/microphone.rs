// Microphone capture backend using cpal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::capture::{AudioFrame, CaptureBackend, CaptureConfig, CaptureError};

/// Default-input-device microphone backend
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread for
/// the whole capture session. The thread drops the stream (releasing the
/// device) as soon as the stop flag is set, whatever happens downstream.
pub struct MicrophoneBackend {
    config: CaptureConfig,
    stop_flag: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    capturing: bool,
}

impl MicrophoneBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            capturing: false,
        }
    }

    fn run_stream(
        config: CaptureConfig,
        stop_flag: Arc<AtomicBool>,
        frames: mpsc::Sender<AudioFrame>,
        ready: oneshot::Sender<Result<(), CaptureError>>,
    ) {
        let host = cpal::default_host();
        let Some(device) = host.default_input_device() else {
            // Most hosts report a denied microphone as an absent device
            let _ = ready.send(Err(CaptureError::PermissionDenied(
                "no default input device available".to_string(),
            )));
            return;
        };

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples_per_frame = (config.sample_rate as u64 * config.buffer_duration_ms / 1000)
            as usize
            * config.channels as usize;
        let mut pending: Vec<i16> = Vec::with_capacity(samples_per_frame);
        let sample_rate = config.sample_rate;
        let channels = config.channels;

        let stream = match device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push((sample * i16::MAX as f32) as i16);
                    if pending.len() >= samples_per_frame {
                        let samples =
                            std::mem::replace(&mut pending, Vec::with_capacity(samples_per_frame));
                        let frame = AudioFrame {
                            samples,
                            sample_rate,
                            channels,
                        };
                        // The audio callback must not block; a full channel
                        // means the consumer fell behind and the frame is lost
                        if frames.try_send(frame).is_err() {
                            return;
                        }
                    }
                }
            },
            |err| warn!("Microphone stream error: {}", err),
            None,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(Self::map_build_error(e)));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = ready.send(Err(CaptureError::Stream(e.to_string())));
            return;
        }

        let _ = ready.send(Ok(()));

        while !stop_flag.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(20));
        }

        // Dropping the stream releases the device
        drop(stream);
    }

    fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable(err.to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported => {
                CaptureError::DeviceUnavailable(err.to_string())
            }
            other => CaptureError::Stream(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.capturing {
            return Err(CaptureError::Stream("already capturing".to_string()));
        }

        self.stop_flag.store(false, Ordering::Release);

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();
        let config = self.config.clone();
        let stop_flag = Arc::clone(&self.stop_flag);

        let worker =
            thread::spawn(move || Self::run_stream(config, stop_flag, frame_tx, ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(
                    "Microphone capture started ({}Hz, {} channels, {}ms buffers)",
                    self.config.sample_rate, self.config.channels, self.config.buffer_duration_ms
                );
                self.worker = Some(worker);
                self.capturing = true;
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::Stream(
                "capture thread exited before reporting readiness".to_string(),
            )),
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.capturing {
            return Ok(());
        }

        self.stop_flag.store(true, Ordering::Release);

        if let Some(worker) = self.worker.take() {
            let joined = tokio::task::spawn_blocking(move || worker.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("Microphone capture thread did not shut down cleanly");
            }
        }

        self.capturing = false;
        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}
