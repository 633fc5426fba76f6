pub mod espeak;
pub mod piper;

use crate::config_loader::Settings;
use espeak::EspeakBackend;
use piper::PiperBackend;
use std::io::{self, Write};
use std::process::{Command, Stdio};

/// Trait that all speech synthesis backends must implement.
/// This allows the bridge to plug in different engines (eSpeak, Piper, ...)
pub trait SpeechBackend: Send + Sync {
    /// Returns the WAV data (stdout) of the synthesis process or an error
    fn synthesize(&self, text: &str) -> std::io::Result<Vec<u8>>;

    /// Returns the unique ID of the backend (e.g., "espeak-ng")
    fn id(&self) -> &'static str;
}

/// Builds the backend named by `tts_backend`. Settings are validated before
/// this is called, so anything other than "piper" means eSpeak.
pub fn from_settings(settings: &Settings) -> Box<dyn SpeechBackend> {
    match settings.tts_backend.as_str() {
        "piper" => Box::new(PiperBackend::new(
            &settings.piper_binary,
            &settings.piper_model,
        )),
        _ => Box::new(EspeakBackend::new(settings.voice())),
    }
}

/// Runs a synthesizer and collects the WAV it writes to stdout. `input`, if
/// any, is written to stdin and the pipe closed. A non-zero exit status becomes
/// an error carrying the tool's stderr.
pub(crate) fn run_synthesizer(
    mut cmd: Command,
    input: Option<&[u8]>,
    engine: &str,
) -> io::Result<Vec<u8>> {
    let stdin = if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = cmd
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let (Some(bytes), Some(mut pipe)) = (input, child.stdin.take()) {
        pipe.write_all(bytes)?;
    }

    let output = child.wait_with_output()?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} error ({}): {}", engine, output.status, stderr.trim()),
        ))
    }
}
