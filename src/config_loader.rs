use crate::dispatcher::{LoopOptions, SoundSet};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Serial link
    pub serial_port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub settle_delay_ms: u64, // Time the board needs to reset after the port opens
    pub idle_poll_ms: u64,
    // Sounds
    pub ready_sound: PathBuf,
    pub scream_sound: PathBuf,
    pub scream_repeats: u32,
    pub playback_volume: f32, // 0.0 - 1.0
    // Speech
    pub tts_backend: String, // "espeak" or "piper"
    pub tts_voice: String,   // Empty means the engine default
    pub piper_binary: String,
    pub piper_model: String, // Path to the .onnx voice model
    // Behaviour on handler failure
    pub fail_fast: bool,
}

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM5"
    } else {
        "/dev/ttyACM0"
    }
}

fn default_sound(file: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("speechd-serial")
        .join(file)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial_port: default_port().to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            settle_delay_ms: 2000,
            idle_poll_ms: 10,
            ready_sound: default_sound("ready.mp3"),
            scream_sound: default_sound("scream.mp3"),
            scream_repeats: 3,
            playback_volume: 1.0,
            tts_backend: "espeak".to_string(),
            tts_voice: String::new(),
            piper_binary: "piper".to_string(),
            piper_model: String::new(),
            fail_fast: true,
        }
    }
}

impl Settings {
    /// Layers the built-in defaults, the optional config files, an explicit
    /// file (if any) and `SERIAL_SPEECH_*` environment variables, in that order.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("SerialSpeech").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/speechd-serial/SerialSpeech",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            );

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // e.g. SERIAL_SPEECH_SERIAL_PORT=/dev/ttyUSB0
        let settings: Settings = builder
            .add_source(Environment::with_prefix("SERIAL_SPEECH"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial_port.trim().is_empty() {
            return Err(ConfigError::Message("serial_port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Message("baud_rate must be greater than 0".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "read_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.scream_repeats == 0 {
            return Err(ConfigError::Message(
                "scream_repeats must be at least 1".to_string(),
            ));
        }
        if self.playback_volume < 0.0 || self.playback_volume > 1.0 {
            return Err(ConfigError::Message(format!(
                "Invalid playback_volume: {}. Must be between 0.0 and 1.0",
                self.playback_volume
            )));
        }
        match self.tts_backend.as_str() {
            "espeak" => {}
            "piper" if self.piper_model.trim().is_empty() => {
                return Err(ConfigError::Message(
                    "piper_model must be set when tts_backend is \"piper\"".to_string(),
                ));
            }
            "piper" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "Unknown tts_backend: {}. Expected \"espeak\" or \"piper\"",
                    other
                )));
            }
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn voice(&self) -> Option<&str> {
        let voice = self.tts_voice.trim();
        (!voice.is_empty()).then_some(voice)
    }

    pub fn sounds(&self) -> SoundSet {
        SoundSet {
            ready: self.ready_sound.clone(),
            scream: self.scream_sound.clone(),
        }
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            scream_repeats: self.scream_repeats,
            idle_poll: Duration::from_millis(self.idle_poll_ms),
            fail_fast: self.fail_fast,
        }
    }
}
