use std::io::Cursor;

use thiserror::Error;
use tracing::info;

use super::capture::AudioFrame;

/// Container mime type for microphone artifacts
pub const CAPTURE_MIME: &str = "audio/wav";

const DEFAULT_SAMPLE_RATE: u32 = 16000;
const DEFAULT_CHANNELS: u16 = 1;

/// Media types accepted for upload, by file extension
const AUDIO_TYPES: &[(&str, &str)] = &[
    ("wav", "audio/wav"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("webm", "audio/webm"),
];

/// Where an artifact's audio came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    Microphone,
    Upload,
}

/// An immutable in-memory audio payload ready for transmission
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    /// Filename hint sent with the multipart request
    pub file_name: String,
    pub source: ArtifactSource,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Not an audio file: {0}")]
    InvalidFileType(String),

    #[error("Failed to encode captured audio: {0}")]
    Encode(String),
}

/// Normalizes live capture or an uploaded file into a single `AudioArtifact`
pub struct AudioSourceResolver;

impl AudioSourceResolver {
    /// Concatenate ordered capture chunks into one WAV artifact
    pub fn from_capture(frames: &[AudioFrame]) -> Result<AudioArtifact, ResolveError> {
        let (sample_rate, channels) = frames
            .first()
            .map(|frame| (frame.sample_rate, frame.channels))
            .unwrap_or((DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS));

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| ResolveError::Encode(e.to_string()))?;

            for frame in frames {
                for &sample in &frame.samples {
                    writer
                        .write_sample(sample)
                        .map_err(|e| ResolveError::Encode(e.to_string()))?;
                }
            }

            writer
                .finalize()
                .map_err(|e| ResolveError::Encode(e.to_string()))?;
        }

        let bytes = cursor.into_inner();
        info!(
            "Assembled capture artifact: {} bytes from {} chunks",
            bytes.len(),
            frames.len()
        );

        Ok(AudioArtifact {
            bytes,
            mime_type: CAPTURE_MIME,
            file_name: "capture.wav".to_string(),
            source: ArtifactSource::Microphone,
        })
    }

    /// Wrap an uploaded file's bytes without re-encoding
    ///
    /// The media type comes from the file extension; anything that is not a
    /// known audio format is rejected before any network request happens.
    pub fn from_upload(file_name: &str, bytes: Vec<u8>) -> Result<AudioArtifact, ResolveError> {
        let extension = file_name
            .rsplit('.')
            .next()
            .filter(|ext| *ext != file_name)
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ResolveError::InvalidFileType(file_name.to_string()))?;

        let mime_type = AUDIO_TYPES
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, mime)| *mime)
            .ok_or_else(|| ResolveError::InvalidFileType(file_name.to_string()))?;

        info!(
            "Accepted upload {} as {} ({} bytes)",
            file_name,
            mime_type,
            bytes.len()
        );

        Ok(AudioArtifact {
            bytes,
            mime_type,
            file_name: file_name.to_string(),
            source: ArtifactSource::Upload,
        })
    }
}
