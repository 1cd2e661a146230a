//! Audio sink capability: the external interface the generator writes
//! rendered samples to. Wraps direct `rodio`/`hound` use behind a small sink
//! trait with null, console-beeper, streaming and WAV-file implementations.

use std::fs::File;
use std::io::BufWriter;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::time::Duration;

use hound::{WavSpec, WavWriter};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use crate::error::{CwError, CwResult};

/// External audio-sink capability consumed by the generator (C6).
pub trait AudioSink: Send {
    fn open(&mut self) -> CwResult<()>;
    fn write(&mut self, samples: &[i16]) -> CwResult<usize>;
    fn close(&mut self) -> CwResult<()>;
    fn min_buffer_samples(&self) -> usize;
    fn max_buffer_samples(&self) -> usize;
    fn preferred_sample_rate(&self) -> u32;
}

/// Discards everything written to it.
#[derive(Debug, Default)]
pub struct NullSink {
    opened: bool,
}

impl NullSink {
    pub fn new() -> Self {
        NullSink::default()
    }
}

impl AudioSink for NullSink {
    fn open(&mut self) -> CwResult<()> {
        self.opened = true;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> CwResult<usize> {
        if !self.opened {
            return Err(CwError::NotRunning);
        }
        Ok(samples.len())
    }

    fn close(&mut self) -> CwResult<()> {
        self.opened = false;
        Ok(())
    }

    fn min_buffer_samples(&self) -> usize {
        1
    }

    fn max_buffer_samples(&self) -> usize {
        usize::MAX
    }

    fn preferred_sample_rate(&self) -> u32 {
        44_100
    }
}

/// Tone-frequency-and-on/off-only sink, for a console beeper backend:
/// ignores waveform shape and just toggles a square tone when the written
/// buffer carries nonzero samples.
pub struct ConsoleBeeperSink {
    frequency_hz: i32,
    stream: Option<OutputStream>,
    handle: Option<OutputStreamHandle>,
    sink: Option<Sink>,
    is_on: bool,
}

impl ConsoleBeeperSink {
    pub fn new(frequency_hz: i32) -> Self {
        ConsoleBeeperSink {
            frequency_hz,
            stream: None,
            handle: None,
            sink: None,
            is_on: false,
        }
    }
}

impl AudioSink for ConsoleBeeperSink {
    fn open(&mut self) -> CwResult<()> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| CwError::SinkError(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| CwError::SinkError(e.to_string()))?;
        self.stream = Some(stream);
        self.handle = Some(handle);
        self.sink = Some(sink);
        self.is_on = false;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> CwResult<usize> {
        let sink = self.sink.as_ref().ok_or(CwError::NotRunning)?;
        let on = samples.iter().any(|&s| s != 0);
        if on != self.is_on {
            self.is_on = on;
            sink.stop();
            if on {
                let wave = rodio::source::SineWave::new(self.frequency_hz.max(1) as f32)
                    .amplify(0.2);
                sink.append(wave);
            }
        }
        Ok(samples.len())
    }

    fn close(&mut self) -> CwResult<()> {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.handle = None;
        self.stream = None;
        Ok(())
    }

    fn min_buffer_samples(&self) -> usize {
        64
    }

    fn max_buffer_samples(&self) -> usize {
        4096
    }

    fn preferred_sample_rate(&self) -> u32 {
        44_100
    }
}

/// Streams i16 PCM to the default output device through a bounded channel
/// feeding a `rodio::Source`.
pub struct RodioSink {
    sample_rate: u32,
    stream: Option<OutputStream>,
    sink: Option<Sink>,
    sender: Option<SyncSender<i16>>,
}

struct ChannelSource {
    receiver: Receiver<i16>,
    sample_rate: u32,
}

impl Iterator for ChannelSource {
    type Item = i16;
    fn next(&mut self) -> Option<i16> {
        self.receiver.recv().ok()
    }
}

impl Source for ChannelSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }
    fn channels(&self) -> u16 {
        1
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl RodioSink {
    pub fn new(sample_rate: u32) -> Self {
        RodioSink {
            sample_rate,
            stream: None,
            sink: None,
            sender: None,
        }
    }
}

impl AudioSink for RodioSink {
    fn open(&mut self) -> CwResult<()> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| CwError::SinkError(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| CwError::SinkError(e.to_string()))?;
        let (tx, rx) = sync_channel::<i16>(self.max_buffer_samples() * 4);
        sink.append(ChannelSource {
            receiver: rx,
            sample_rate: self.sample_rate,
        });
        self.stream = Some(stream);
        self.sink = Some(sink);
        self.sender = Some(tx);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> CwResult<usize> {
        let tx = self.sender.as_ref().ok_or(CwError::NotRunning)?;
        for &s in samples {
            tx.send(s).map_err(|e| CwError::SinkError(e.to_string()))?;
        }
        Ok(samples.len())
    }

    fn close(&mut self) -> CwResult<()> {
        self.sender = None;
        if let Some(sink) = self.sink.take() {
            sink.sleep_until_end();
        }
        self.stream = None;
        Ok(())
    }

    fn min_buffer_samples(&self) -> usize {
        256
    }

    fn max_buffer_samples(&self) -> usize {
        4096
    }

    fn preferred_sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Renders i16 PCM to a WAV file instead of playing it.
pub struct WavSink {
    path: String,
    sample_rate: u32,
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn new(path: impl Into<String>, sample_rate: u32) -> Self {
        WavSink {
            path: path.into(),
            sample_rate,
            writer: None,
        }
    }
}

impl AudioSink for WavSink {
    fn open(&mut self) -> CwResult<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = WavWriter::create(&self.path, spec).map_err(|e| CwError::SinkError(e.to_string()))?;
        self.writer = Some(writer);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> CwResult<usize> {
        let writer = self.writer.as_mut().ok_or(CwError::NotRunning)?;
        for &s in samples {
            writer
                .write_sample(s)
                .map_err(|e| CwError::SinkError(e.to_string()))?;
        }
        Ok(samples.len())
    }

    fn close(&mut self) -> CwResult<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| CwError::SinkError(e.to_string()))?;
        }
        Ok(())
    }

    fn min_buffer_samples(&self) -> usize {
        1
    }

    fn max_buffer_samples(&self) -> usize {
        usize::MAX
    }

    fn preferred_sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_requires_open() {
        let mut s = NullSink::new();
        assert_eq!(s.write(&[1, 2, 3]), Err(CwError::NotRunning));
        s.open().unwrap();
        assert_eq!(s.write(&[1, 2, 3]).unwrap(), 3);
        s.close().unwrap();
    }
}
