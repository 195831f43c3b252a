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
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use symphonia::default::{get_codecs, get_probe};

/// Error types for track decoding.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Unsupported track '{0}': {1}")]
    Unsupported(String, String),

    #[error("Audio decode error: {0}")]
    Decode(#[from] SymphoniaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decodes an audio file (WAV, MP3, FLAC, OGG, ...) into interleaved f32
/// sample blocks, starting at a given offset. This uses symphonia for both
/// demuxing and decoding; seeking past the end of the file is not an error
/// and simply yields no samples.
pub struct TrackSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    finished: bool,
}

impl TrackSource {
    /// Opens the given track and seeks to the start offset.
    pub fn open(path: &Path, start: Duration) -> Result<TrackSource, SourceError> {
        let file = File::open(path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // A hint helps the format registry guess the container.
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let display = path.display().to_string();
        let fmt_opts: FormatOptions = Default::default();
        let meta_opts: MetadataOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| SourceError::Unsupported(display.clone(), e.to_string()))?;

        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                SourceError::Unsupported(display.clone(), "no audio track found".to_string())
            })?;
        let track_id = track.id;
        let params = &track.codec_params;

        let sample_rate = params.sample_rate.ok_or_else(|| {
            SourceError::Unsupported(display.clone(), "sample rate not specified".to_string())
        })?;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let decoder_opts: DecoderOptions = Default::default();
        let decoder = get_codecs()
            .make(params, &decoder_opts)
            .map_err(|e| SourceError::Unsupported(display, e.to_string()))?;

        let mut source = TrackSource {
            format_reader,
            decoder,
            track_id,
            channels,
            sample_rate,
            finished: false,
        };

        if !start.is_zero() {
            let seek_to = SeekTo::Time {
                time: Time::from(start),
                track_id: Some(track_id),
            };
            match source.format_reader.seek(SeekMode::Accurate, seek_to) {
                Ok(_) => source.decoder.reset(),
                // An out-of-range seek means the offset is past the end of
                // the file; the source just reports EOF.
                Err(SymphoniaError::SeekError(_)) => source.finished = true,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(source)
    }

    /// The channel count of the decoded stream.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// The sample rate of the decoded stream.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decodes the next packet into interleaved f32 samples. Returns
    /// Ok(None) at the end of the file.
    pub fn next_block(&mut self) -> Result<Option<Vec<f32>>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    return Ok(None);
                }
                // Some decoders report EOF as a decode error.
                Err(SymphoniaError::DecodeError(_)) => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    self.decoder.decode(&packet)?
                }
                Err(e) => return Err(e.into()),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            buf.copy_interleaved_ref(decoded);
            return Ok(Some(buf.samples().to_vec()));
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    /// Writes a one second 440Hz mono wav file and returns its path.
    fn write_test_wav(dir: &Path, sample_rate: u32) -> PathBuf {
        let path = dir.join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("failed to create wav");
        for i in 0..sample_rate {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin();
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .expect("failed to write sample");
        }
        writer.finalize().expect("failed to finalize wav");
        path
    }

    #[test]
    fn test_decodes_from_offset() -> Result<(), SourceError> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = write_test_wav(dir.path(), 8000);

        let mut source = TrackSource::open(&path, Duration::from_millis(500))?;
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 8000);

        let mut total = 0;
        while let Some(block) = source.next_block()? {
            total += block.len();
        }
        // Half the file remains after the seek, modulo packet granularity.
        assert!(total > 0);
        assert!(total <= 4500, "decoded {} samples after seek", total);
        Ok(())
    }

    #[test]
    fn test_seek_past_end_yields_no_samples() -> Result<(), SourceError> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = write_test_wav(dir.path(), 8000);

        let mut source = TrackSource::open(&path, Duration::from_secs(600))?;
        assert!(source.next_block()?.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = TrackSource::open(Path::new("missing.wav"), Duration::ZERO);
        assert!(matches!(err, Err(SourceError::Io(_))));
    }
}
