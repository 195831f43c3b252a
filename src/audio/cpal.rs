// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error as StdError;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::source::{SourceError, TrackSource};
use crate::error::Error;

/// The ring between the decode worker and the output callback, in samples.
/// Roughly a third of a second of stereo audio at 48kHz.
const RING_CAPACITY: usize = 1 << 15;

/// How long the decode worker sleeps when the ring is full.
const FEED_BACKOFF: Duration = Duration::from_millis(5);

/// Lock-free circular buffer between the decode worker and the output
/// callback. Clearing is done by the worker only; the callback only reads.
struct RingBuffer {
    buffer: Vec<f32>,
    /// Capacity, always a power of 2.
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

impl RingBuffer {
    fn new(capacity: usize) -> RingBuffer {
        let cap = capacity.next_power_of_two();
        RingBuffer {
            buffer: vec![0.0; cap],
            capacity: cap,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Number of samples available to read.
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.capacity - read + write
        }
    }

    /// Space available to write.
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Writes samples into the ring. Returns the number actually written.
    fn write(&self, samples: &[f32]) -> usize {
        let space = self.space();
        if space == 0 {
            return 0;
        }
        let to_write = space.min(samples.len());
        let write = self.write_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        // Write in one or two chunks (if wrap-around).
        let first_chunk = (self.capacity - write).min(to_write);
        unsafe {
            let ptr = self.buffer.as_ptr().add(write) as *mut f32;
            std::ptr::copy_nonoverlapping(samples.as_ptr(), ptr, first_chunk);
        }
        if to_write > first_chunk {
            let second_chunk = to_write - first_chunk;
            unsafe {
                let ptr = self.buffer.as_ptr() as *mut f32;
                std::ptr::copy_nonoverlapping(samples.as_ptr().add(first_chunk), ptr, second_chunk);
            }
        }

        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Reads samples from the ring. Returns the number actually read.
    fn read(&self, output: &mut [f32]) -> usize {
        let available = self.available();
        if available == 0 {
            return 0;
        }
        let to_read = available.min(output.len());
        let read = self.read_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        let first_chunk = (self.capacity - read).min(to_read);
        unsafe {
            let ptr = self.buffer.as_ptr().add(read);
            std::ptr::copy_nonoverlapping(ptr, output.as_mut_ptr(), first_chunk);
        }
        if to_read > first_chunk {
            let second_chunk = to_read - first_chunk;
            unsafe {
                let ptr = self.buffer.as_ptr();
                std::ptr::copy_nonoverlapping(
                    ptr,
                    output.as_mut_ptr().add(first_chunk),
                    second_chunk,
                );
            }
        }

        self.read_pos
            .store((read + to_read) & mask, Ordering::Release);
        to_read
    }

    /// Discards everything queued for the callback.
    fn clear(&self) {
        self.read_pos
            .store(self.write_pos.load(Ordering::Acquire), Ordering::Release);
    }
}

enum Command {
    Play(TrackSource),
    Stop,
}

/// A small wrapper around a cpal::Device. The output stream and the decode
/// loop live on one dedicated worker thread that owns the audio output for
/// the lifetime of the device; the device itself only queues commands.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The maximum number of output channels the device supports.
    max_channels: u16,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Whether output is paused. Read by the output callback.
    paused: Arc<AtomicBool>,
    /// Commands to the worker thread, created on first playback.
    worker: Mutex<Option<Sender<Command>>>,
}

impl Device {
    /// Lists the output devices of the default host.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn StdError>> {
        let host = cpal::default_host();
        let mut devices: Vec<Box<dyn super::Device>> = Vec::new();
        for device in host.output_devices()? {
            devices.push(Box::new(Device::wrap(device, host.id())?));
        }
        devices.sort_by_key(|device| device.to_string());
        Ok(devices)
    }

    /// Gets the output device with the given name, or the host default for
    /// "default".
    pub fn get(name: &str) -> Result<Device, Box<dyn StdError>> {
        let host = cpal::default_host();

        if name == "default" {
            let device = host
                .default_output_device()
                .ok_or("no default output device")?;
            return Device::wrap(device, host.id());
        }

        let mut matches: Vec<cpal::Device> = Vec::new();
        for device in host.output_devices()? {
            if device.name()?.contains(name) {
                matches.push(device);
            }
        }
        if matches.is_empty() {
            return Err(format!("no output device found with name {}", name).into());
        }
        if matches.len() > 1 {
            return Err(format!(
                "found too many devices that match ({}), use a less ambiguous device name",
                matches
                    .iter()
                    .map(|device| device.name().unwrap_or_default())
                    .collect::<Vec<String>>()
                    .join(", ")
            )
            .into());
        }

        Device::wrap(matches.swap_remove(0), host.id())
    }

    fn wrap(device: cpal::Device, host_id: cpal::HostId) -> Result<Device, Box<dyn StdError>> {
        let name = device.name()?;
        let max_channels = device
            .supported_output_configs()?
            .map(|config| config.channels())
            .max()
            .unwrap_or(2);

        Ok(Device {
            name,
            host_id,
            max_channels,
            device,
            paused: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    /// Returns the command sender for the worker thread, starting the worker
    /// and its output stream on first use.
    fn worker(&self) -> Result<Sender<Command>, Error> {
        let mut worker = self.worker.lock();
        if let Some(sender) = worker.as_ref() {
            return Ok(sender.clone());
        }

        let config = self
            .device
            .default_output_config()
            .map_err(|e| Error::Device(e.to_string()))?;
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let device = self.device.clone();
        let paused = self.paused.clone();
        let name = self.name.clone();
        thread::spawn(move || run_output(device, config, paused, cmd_rx, name));

        *worker = Some(cmd_tx.clone());
        Ok(cmd_tx)
    }
}

impl super::Device for Device {
    fn play_from(&self, path: &Path, start: Duration) -> Result<(), Error> {
        let span = span!(Level::DEBUG, "play from (cpal)");
        let _enter = span.enter();

        // Opening and seeking the track happens on the caller's thread so
        // that an unreadable file surfaces synchronously.
        let source = TrackSource::open(path, start).map_err(|e| match e {
            SourceError::Io(_) => Error::TrackUnavailable(path.to_path_buf()),
            e => Error::Device(e.to_string()),
        })?;

        debug!(
            device = self.name,
            track = %path.display(),
            start = ?start,
            "Starting output."
        );

        self.paused.store(false, Ordering::Relaxed);
        self.worker()?
            .send(Command::Play(source))
            .map_err(|e| Error::Device(e.to_string()))
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.paused.store(false, Ordering::Relaxed);
        if let Some(sender) = self.worker.lock().as_ref() {
            let _ = sender.send(Command::Stop);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Dropping the sender disconnects the worker, which tears down the
        // output stream.
        self.worker.lock().take();
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Nearest-frame rate conversion and channel mapping from the decoded stream
/// to the output stream format.
struct Converter {
    src_channels: usize,
    dst_channels: usize,
    step: f64,
    pos: f64,
}

impl Converter {
    fn new(src_channels: u16, src_rate: u32, dst_channels: u16, dst_rate: u32) -> Converter {
        Converter {
            src_channels: src_channels.max(1) as usize,
            dst_channels: dst_channels.max(1) as usize,
            step: src_rate as f64 / dst_rate as f64,
            pos: 0.0,
        }
    }

    fn convert(&mut self, input: &[f32]) -> Vec<f32> {
        let frames = input.len() / self.src_channels;
        let mut out =
            Vec::with_capacity((frames as f64 / self.step) as usize * self.dst_channels + 8);
        while self.pos < frames as f64 {
            let frame = self.pos as usize;
            for ch in 0..self.dst_channels {
                let src_ch = ch.min(self.src_channels - 1);
                out.push(input[frame * self.src_channels + src_ch]);
            }
            self.pos += self.step;
        }
        self.pos -= frames as f64;
        out
    }
}

/// The worker thread: owns the output stream and decodes the current track
/// into the ring. A new play command replaces the current track; stop drops
/// it. The thread exits when the device is dropped.
fn run_output(
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    paused: Arc<AtomicBool>,
    cmd_rx: Receiver<Command>,
    name: String,
) {
    let span = span!(Level::INFO, "audio output");
    let _enter = span.enter();

    let ring = Arc::new(RingBuffer::new(RING_CAPACITY));
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();
    let out_channels = stream_config.channels;
    let out_rate = stream_config.sample_rate;

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, &ring, &paused),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, &ring, &paused),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, &ring, &paused),
        other => {
            error!(device = name, format = ?other, "Unsupported output sample format.");
            return;
        }
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            error!(err = %e, device = name, "Error building output stream.");
            return;
        }
    };
    if let Err(e) = stream.play() {
        error!(err = %e, device = name, "Error starting output stream.");
        return;
    }

    info!(
        device = name,
        channels = out_channels,
        sample_rate = out_rate,
        "Audio output started."
    );

    let mut current: Option<(TrackSource, Converter)> = None;
    loop {
        // Block for a command while idle, poll between blocks while feeding.
        let command = if current.is_some() {
            match cmd_rx.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return,
            }
        } else {
            match cmd_rx.recv() {
                Ok(command) => Some(command),
                Err(_) => return,
            }
        };

        if let Some(command) = command {
            match command {
                Command::Play(source) => {
                    let converter =
                        Converter::new(source.channels(), source.sample_rate(), out_channels, out_rate);
                    ring.clear();
                    current = Some((source, converter));
                }
                Command::Stop => {
                    ring.clear();
                    current = None;
                }
            }
            continue;
        }

        let (source, converter) = current.as_mut().expect("current source must be set");
        match source.next_block() {
            Ok(Some(block)) => {
                let out = converter.convert(&block);
                let mut written = 0;
                while written < out.len() {
                    written += ring.write(&out[written..]);
                    if written < out.len() {
                        // React to queued commands rather than finishing the
                        // block; any pending command discards the ring anyway.
                        if !cmd_rx.is_empty() {
                            break;
                        }
                        thread::sleep(FEED_BACKOFF);
                    }
                }
            }
            // End of file: the ring drains and output falls silent until the
            // next command.
            Ok(None) => current = None,
            Err(e) => {
                error!(err = %e, device = name, "Error decoding track, stopping output.");
                ring.clear();
                current = None;
            }
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<RingBuffer>,
    paused: &Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let ring = ring.clone();
    let paused = paused.clone();
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // While paused the ring is left untouched so the playback
            // position freezes in place.
            if paused.load(Ordering::Relaxed) {
                data.fill(T::EQUILIBRIUM);
                return;
            }

            scratch.resize(data.len(), 0.0);
            let read = ring.read(&mut scratch);
            scratch[read..].fill(0.0);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |e| error!(err = %e, "Output stream error."),
        None,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ring_buffer_wraps() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.available(), 0);

        let samples: Vec<f32> = (0..6).map(|i| i as f32).collect();
        assert_eq!(ring.write(&samples), 6);
        assert_eq!(ring.available(), 6);

        let mut out = vec![0.0; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0]);

        // Wrap around the end of the backing buffer.
        assert_eq!(ring.write(&samples[..4]), 4);
        let mut out = vec![0.0; 6];
        assert_eq!(ring.read(&mut out), 6);
        assert_eq!(out, vec![4.0, 5.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_ring_buffer_clear() {
        let ring = RingBuffer::new(8);
        ring.write(&[1.0, 2.0, 3.0]);
        ring.clear();
        assert_eq!(ring.available(), 0);

        let mut out = vec![0.0; 4];
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn test_converter_channel_mapping() {
        // Mono source to stereo output at the same rate.
        let mut converter = Converter::new(1, 48000, 2, 48000);
        let out = converter.convert(&[0.1, 0.2]);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);

        // Stereo source to mono output keeps the left channel.
        let mut converter = Converter::new(2, 48000, 1, 48000);
        let out = converter.convert(&[0.1, 0.9, 0.2, 0.8]);
        assert_eq!(out, vec![0.1, 0.2]);
    }

    #[test]
    fn test_converter_rate_conversion() {
        // Downsampling by half produces half the frames.
        let mut converter = Converter::new(1, 48000, 1, 24000);
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = converter.convert(&input);
        assert_eq!(out.len(), 50);

        // Upsampling doubles them, carrying position across blocks.
        let mut converter = Converter::new(1, 24000, 1, 48000);
        let first = converter.convert(&input[..50]);
        let second = converter.convert(&input[50..]);
        assert_eq!(first.len() + second.len(), 200);
    }
}
