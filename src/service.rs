use crate::backends;
use crate::config_loader::Settings;
use crate::dispatcher::{EventLoop, LoopControl};
use crate::engine::AudioEngine;
use crate::error::BridgeError;
use crate::transport::SerialTransport;

/// Acquires the audio engine and the serial port, then runs the event loop
/// on the calling thread until `control` asks it to stop or a fatal error
/// occurs.
///
/// Both resources are dropped before this returns, on every path.
pub fn run(settings: &Settings, control: &LoopControl) -> Result<(), BridgeError> {
    let backend = backends::from_settings(settings);
    let engine = AudioEngine::new(backend, settings.playback_volume)?;

    let transport = SerialTransport::open(
        &settings.serial_port,
        settings.baud_rate,
        settings.read_timeout(),
        settings.settle_delay(),
    )?;

    let mut event_loop = EventLoop::new(
        transport,
        engine,
        settings.sounds(),
        settings.loop_options(),
    );
    let result = event_loop.run(control);

    let (transport, engine) = event_loop.into_parts();
    drop(transport);
    drop(engine);
    result
}
