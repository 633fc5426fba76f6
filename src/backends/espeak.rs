use super::{run_synthesizer, SpeechBackend};

use std::io::Result;
use std::process::Command;

pub struct EspeakBackend {
    voice: Option<String>,
}

impl EspeakBackend {
    pub fn new(voice: Option<&str>) -> Self {
        Self {
            voice: voice.map(str::to_string),
        }
    }

    fn command(&self, text: &str) -> Command {
        let mut cmd = Command::new("espeak-ng");
        cmd.arg("--stdout");
        if let Some(voice) = &self.voice {
            cmd.arg("-v").arg(voice);
        }
        // "--" keeps payload text such as "-hello" from being read as a flag
        cmd.arg("--").arg(text);
        cmd
    }
}

impl SpeechBackend for EspeakBackend {
    fn id(&self) -> &'static str {
        "espeak-ng"
    }

    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        run_synthesizer(self.command(text), None, "espeak")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_default_voice_arguments() {
        let backend = EspeakBackend::new(None);
        let cmd = backend.command("Hello World");
        assert_eq!(cmd.get_program(), "espeak-ng");
        assert_eq!(args(&cmd), vec!["--stdout", "--", "Hello World"]);
    }

    #[test]
    fn test_voice_arguments() {
        let backend = EspeakBackend::new(Some("en-us"));
        let cmd = backend.command("-dash first");
        assert_eq!(args(&cmd), vec!["--stdout", "-v", "en-us", "--", "-dash first"]);
    }
}
