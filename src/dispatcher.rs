//! The event loop: waits for trigger tokens on the serial line and runs the
//! matching handler to completion before reading anything else.

use crate::engine::AudioOutput;
use crate::error::BridgeError;
use crate::transport::LineSource;
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Control tokens the board can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Speak the next two lines, then play the ready sound
    Ready,
    /// Play the scream sound several times
    Read,
}

impl Trigger {
    /// Case- and whitespace-insensitive exact match.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "ready" => Some(Trigger::Ready),
            "read" => Some(Trigger::Read),
            _ => None,
        }
    }
}

/// What a single line led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Ignored,
    Spoke { utterance: String },
    Screamed { plays: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSet {
    pub ready: PathBuf,
    pub scream: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    pub scream_repeats: u32,
    pub idle_poll: Duration,
    /// Stop the loop on the first handler failure
    pub fail_fast: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            scream_repeats: 3,
            idle_poll: Duration::from_millis(10),
            fail_fast: true,
        }
    }
}

/// Shared between the event loop thread and the signal handler.
#[derive(Debug, Default)]
pub struct LoopControl {
    shutdown: AtomicBool,
    dispatching: AtomicBool,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the loop to stop. Returns `true` when the loop is idle and will
    /// exit on its own, `false` when a handler is running and the caller has
    /// to abort the process itself.
    pub fn request_shutdown(&self) -> bool {
        self.shutdown.store(true, Ordering::SeqCst);
        !self.dispatching.load(Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Marks a handler as running. Fails if a shutdown slipped in after the
    /// last idle check, so a request never lands between the two.
    fn begin_dispatch(&self) -> bool {
        self.dispatching.store(true, Ordering::SeqCst);
        if self.shutdown.load(Ordering::SeqCst) {
            self.dispatching.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn end_dispatch(&self) {
        self.dispatching.store(false, Ordering::SeqCst);
    }
}

pub struct EventLoop<S, A> {
    source: S,
    output: A,
    sounds: SoundSet,
    options: LoopOptions,
}

impl<S: LineSource, A: AudioOutput> EventLoop<S, A> {
    pub fn new(source: S, output: A, sounds: SoundSet, options: LoopOptions) -> Self {
        Self {
            source,
            output,
            sounds,
            options,
        }
    }

    /// Runs until a shutdown is requested while idle. A handler in progress
    /// is marked in `control`; stopping one is left to the caller.
    pub fn run(&mut self, control: &LoopControl) -> Result<(), BridgeError> {
        info!("Waiting for tokens...");
        while !control.is_shutdown() {
            if !self.source.has_pending()? {
                std::thread::sleep(self.options.idle_poll);
                continue;
            }
            if !control.begin_dispatch() {
                break;
            }
            let result = self.read_and_dispatch();
            control.end_dispatch();

            match result {
                Ok(_) => {}
                Err(e) if e.is_transport() || self.options.fail_fast => return Err(e),
                Err(e) => error!("Handler failed, continuing: {}", e),
            }
        }
        info!("Exiting...");
        Ok(())
    }

    /// Reads and dispatches one line if input is waiting. Returns `None`
    /// without blocking when there is nothing to read.
    pub fn poll_once(&mut self) -> Result<Option<Dispatch>, BridgeError> {
        if !self.source.has_pending()? {
            return Ok(None);
        }
        self.read_and_dispatch().map(Some)
    }

    fn read_and_dispatch(&mut self) -> Result<Dispatch, BridgeError> {
        let line = self.source.read_line()?;
        self.dispatch_line(&line)
    }

    pub fn dispatch_line(&mut self, raw: &str) -> Result<Dispatch, BridgeError> {
        debug!("Decoded: '{}'", raw.trim());
        match Trigger::parse(raw) {
            Some(Trigger::Ready) => self.on_ready(),
            Some(Trigger::Read) => self.on_read(),
            None => Ok(Dispatch::Ignored),
        }
    }

    fn on_ready(&mut self) -> Result<Dispatch, BridgeError> {
        info!("Matched 'ready'");
        // Payload lines keep their case
        let first = self.source.read_line()?;
        let second = self.source.read_line()?;
        let utterance = format!("{} {}", first.trim(), second.trim());

        info!("TTS: {}", utterance);
        self.output.speak_blocking(&utterance)?;

        info!("Audio: playing {}", self.sounds.ready.display());
        self.output.play_file(&self.sounds.ready)?;
        Ok(Dispatch::Spoke { utterance })
    }

    fn on_read(&mut self) -> Result<Dispatch, BridgeError> {
        let plays = self.options.scream_repeats;
        info!("Matched 'read', screaming {} times", plays);
        for i in 1..=plays {
            info!("Audio: scream #{}", i);
            self.output.play_file(&self.sounds.scream)?;
        }
        Ok(Dispatch::Screamed { plays })
    }

    /// Hands the transport and the output back so the caller decides when
    /// they are released.
    pub fn into_parts(self) -> (S, A) {
        (self.source, self.output)
    }
}
