use crate::backends::SpeechBackend;
use crate::error::BridgeError;
use log::{debug, info};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

/// Blocking speech and playback. Both calls return only once the audio has
/// finished playing.
pub trait AudioOutput {
    fn speak_blocking(&self, text: &str) -> Result<(), BridgeError>;
    fn play_file(&self, path: &Path) -> Result<(), BridgeError>;
}

pub struct AudioEngine {
    // Audio stream must outlive every sink created from the handle
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    backend: Box<dyn SpeechBackend>,
    volume: f32,
}

impl AudioEngine {
    /// Opens the default output device. The returned engine is tied to the
    /// calling thread.
    pub fn new(backend: Box<dyn SpeechBackend>, volume: f32) -> Result<Self, BridgeError> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        info!("Audio: output ready, speech backend {}", backend.id());
        Ok(Self {
            _stream: stream,
            stream_handle,
            backend,
            volume,
        })
    }

    fn play_to_end<R>(&self, reader: R, what: &str) -> Result<(), BridgeError>
    where
        R: Read + Seek + Send + Sync + 'static,
    {
        let source = Decoder::new(reader).map_err(|source| BridgeError::Decode {
            what: what.to_string(),
            source,
        })?;
        let sink = Sink::try_new(&self.stream_handle)?;
        sink.set_volume(self.volume);
        sink.append(source.convert_samples::<f32>());
        sink.sleep_until_end();
        Ok(())
    }
}

impl AudioOutput for AudioEngine {
    fn speak_blocking(&self, text: &str) -> Result<(), BridgeError> {
        if text.trim().is_empty() {
            debug!("TTS: nothing to say");
            return Ok(());
        }

        let wav = self
            .backend
            .synthesize(text)
            .map_err(|source| BridgeError::Synthesis {
                backend: self.backend.id(),
                source,
            })?;
        self.play_to_end(Cursor::new(wav), self.backend.id())
    }

    fn play_file(&self, path: &Path) -> Result<(), BridgeError> {
        let file = File::open(path).map_err(|source| BridgeError::SoundFile {
            path: path.to_path_buf(),
            source,
        })?;
        self.play_to_end(BufReader::new(file), &path.display().to_string())
    }
}
