//! Error type shared by the transport, the audio engine and the event loop.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The serial device could not be opened at startup
    #[error("Failed to open serial port {port}: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// A read or availability check failed while the loop was running
    #[error("Serial read failed: {0}")]
    SerialRead(#[source] std::io::Error),

    #[error("Speech synthesis failed ({backend}): {source}")]
    Synthesis {
        backend: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("No audio output device available: {0}")]
    OutputDevice(#[from] rodio::StreamError),

    #[error("Failed to create playback sink: {0}")]
    Sink(#[from] rodio::PlayError),

    #[error("Cannot open sound file {path}: {source}")]
    SoundFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode audio from {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: rodio::decoder::DecoderError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl BridgeError {
    /// Transport failures end the loop even when handler errors are tolerated.
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::PortOpen { .. } | BridgeError::SerialRead(_))
    }
}
