//! Audio sinks
//!
//! The playback router streams processed blocks into an [`AudioSink`].
//! The default build ships a discarding sink and a collecting sink for
//! headless use and tests; the `device-playback` feature adds a sink
//! backed by a physical output device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Destination for processed playback audio
pub trait AudioSink: Send {
    /// Accept one interleaved block
    fn write(&mut self, interleaved: &[f32], channels: u16, sample_rate: u32) -> Result<()>;

    /// Output should go quiet without losing position
    fn pause(&mut self) {}

    /// Resume after `pause`
    fn resume(&mut self) {}

    /// No more blocks are coming for this stream
    fn finish(&mut self) {}
}

/// Discards everything
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _interleaved: &[f32], _channels: u16, _sample_rate: u32) -> Result<()> {
        Ok(())
    }
}

/// Collects written samples, for tests and headless inspection
#[derive(Default)]
pub struct MemorySink {
    samples: Arc<Mutex<Vec<f32>>>,
    writes: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected samples
    pub fn samples(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.samples)
    }

    /// Shared handle to the write counter
    pub fn writes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.writes)
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, interleaved: &[f32], _channels: u16, _sample_rate: u32) -> Result<()> {
        self.samples
            .lock()
            .expect("memory sink poisoned")
            .extend_from_slice(interleaved);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(feature = "device-playback")]
pub use device::DeviceSink;

#[cfg(feature = "device-playback")]
mod device {
    use super::AudioSink;
    use crate::error::{Result, VocoError};
    use std::sync::mpsc::{self, Sender};

    enum SinkMsg {
        Samples(Vec<f32>, u16, u32),
        Pause,
        Resume,
        Finish,
    }

    /// Physical output device sink (rodio)
    ///
    /// The output stream is not `Send`, so it lives on a dedicated thread
    /// fed through a channel.
    pub struct DeviceSink {
        tx: Sender<SinkMsg>,
    }

    impl DeviceSink {
        /// Open the default output device
        pub fn try_new() -> Result<Self> {
            let (tx, rx) = mpsc::channel::<SinkMsg>();
            let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();

            std::thread::spawn(move || {
                let (stream, handle) = match rodio::OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let sink = match rodio::Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(msg) = rx.recv() {
                    match msg {
                        SinkMsg::Samples(samples, channels, rate) => {
                            sink.append(rodio::buffer::SamplesBuffer::new(channels, rate, samples));
                        }
                        SinkMsg::Pause => sink.pause(),
                        SinkMsg::Resume => sink.play(),
                        SinkMsg::Finish => {
                            sink.sleep_until_end();
                            break;
                        }
                    }
                }
                drop(stream);
            });

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Self { tx }),
                Ok(Err(reason)) => Err(VocoError::ExportFailed {
                    reason: format!("audio device unavailable: {}", reason),
                }),
                Err(_) => Err(VocoError::ExportFailed {
                    reason: "audio device thread died".to_string(),
                }),
            }
        }
    }

    impl AudioSink for DeviceSink {
        fn write(&mut self, interleaved: &[f32], channels: u16, sample_rate: u32) -> Result<()> {
            self.tx
                .send(SinkMsg::Samples(interleaved.to_vec(), channels, sample_rate))
                .map_err(|_| VocoError::ExportFailed {
                    reason: "audio device thread died".to_string(),
                })
        }

        fn pause(&mut self) {
            let _ = self.tx.send(SinkMsg::Pause);
        }

        fn resume(&mut self) {
            let _ = self.tx.send(SinkMsg::Resume);
        }

        fn finish(&mut self) {
            let _ = self.tx.send(SinkMsg::Finish);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
