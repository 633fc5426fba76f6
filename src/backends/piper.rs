use super::{run_synthesizer, SpeechBackend};
use std::io::{Error, ErrorKind, Result};
use std::path::PathBuf;
use std::process::Command;

pub struct PiperBackend {
    binary_path: String,
    model: PathBuf,
}

impl PiperBackend {
    pub fn new(binary_path: &str, model: &str) -> Self {
        Self {
            binary_path: binary_path.to_string(),
            model: PathBuf::from(model),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        // "-" sends the WAV to stdout; the text goes in on stdin
        cmd.arg("-m").arg(&self.model).arg("--output_file").arg("-");
        cmd
    }
}

impl SpeechBackend for PiperBackend {
    fn id(&self) -> &'static str {
        "piper"
    }

    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if !self.model.exists() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("Piper model not found: {}", self.model.display()),
            ));
        }
        let line = format!("{}\n", text);
        run_synthesizer(self.command(), Some(line.as_bytes()), "piper")
    }
}
