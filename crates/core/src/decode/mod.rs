//! File decoding into per-channel sample buffers.
//!
//! Two formats are understood, selected by the exact (case-sensitive) file
//! extension: `.wav` files are read with `hound`, `.mp3` files are decoded
//! with `symphonia`. Both produce a [`DecodedSource`] holding equal-length
//! left and right channels in `[-1, 1]`.

use std::{fs::File, path::Path};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{Result, SpectrumError};

/// Container formats the player can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    /// Picks the decoder from the path's extension. Matching is exact, so
    /// `song.WAV` is rejected.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        match extension {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            other => Err(SpectrumError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Fully decoded audio, read-only once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSource {
    left: Vec<f32>,
    right: Vec<f32>,
    sample_rate: u32,
}

impl DecodedSource {
    /// Builds a source from two channels of equal length.
    pub fn from_channels(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if left.len() != right.len() {
            return Err(SpectrumError::msg(format!(
                "channel lengths differ: left has {} frames, right has {}",
                left.len(),
                right.len()
            )));
        }
        if sample_rate == 0 {
            return Err(SpectrumError::msg("sample rate must be positive"));
        }

        Ok(Self {
            left,
            right,
            sample_rate,
        })
    }

    /// Builds a source from a single channel played on both sides.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::from_channels(samples.clone(), samples, sample_rate)
    }

    /// Splits interleaved frames. Mono is duplicated into both channels and
    /// stereo is split in left/right order; other layouts are rejected.
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        match channels {
            1 => Self::from_mono(samples.to_vec(), sample_rate),
            2 => {
                let frames = samples.len() / 2;
                let mut left = Vec::with_capacity(frames);
                let mut right = Vec::with_capacity(frames);
                for frame in samples.chunks_exact(2) {
                    left.push(frame[0]);
                    right.push(frame[1]);
                }
                Self::from_channels(left, right, sample_rate)
            }
            other => Err(SpectrumError::msg(format!(
                "unsupported channel count {other}, expected mono or stereo"
            ))),
        }
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames in each channel.
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }
}

/// Decodes the file at `path`, choosing the decoder by extension.
pub fn load(path: impl AsRef<Path>) -> Result<DecodedSource> {
    let path = path.as_ref();
    let source = match AudioFormat::from_path(path)? {
        AudioFormat::Wav => load_wav(path)?,
        AudioFormat::Mp3 => load_mp3(path)?,
    };

    tracing::debug!(
        path = %path.display(),
        sample_rate = source.sample_rate(),
        frames = source.frames(),
        "decoded audio file"
    );
    Ok(source)
}

fn load_wav(path: &Path) -> Result<DecodedSource> {
    let mut reader = hound::WavReader::open(path).map_err(|err| SpectrumError::decode(path, err))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|err| SpectrumError::decode(path, err))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|err| SpectrumError::decode(path, err))?
        }
    };

    DecodedSource::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
        .map_err(|err| SpectrumError::decode(path, err))
}

fn load_mp3(path: &Path) -> Result<DecodedSource> {
    let file = File::open(path).map_err(|err| SpectrumError::decode(path, err))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| SpectrumError::decode(path, err))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| SpectrumError::decode(path, "no audio track found"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SpectrumError::decode(path, "stream does not declare a sample rate"))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| SpectrumError::decode(path, err))?;

    let mut interleaved = Vec::new();
    let mut channels = 0;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(err) => return Err(SpectrumError::decode(path, err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count();
                let mut buffer = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buffer.samples());
            }
            // A corrupt frame is skipped; the decoder resynchronises on the next one.
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::warn!(path = %path.display(), reason, "skipping undecodable mp3 frame");
            }
            Err(err) => return Err(SpectrumError::decode(path, err)),
        }
    }

    if channels == 0 {
        return Err(SpectrumError::decode(path, "stream contains no audio frames"));
    }

    DecodedSource::from_interleaved(&interleaved, channels, sample_rate)
        .map_err(|err| SpectrumError::decode(path, err))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn mono_wav_fills_both_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples: Vec<i16> = (0..100).map(|i| (i * 300 - 15_000) as i16).collect();
        write_wav(&path, 1, &samples);

        let source = load(&path).unwrap();
        assert_eq!(source.sample_rate(), 8_000);
        assert_eq!(source.frames(), 100);
        assert_eq!(source.left().len(), 100);
        assert_eq!(source.right().len(), 100);
        assert_eq!(source.left(), source.right());
        assert!((source.left()[0] - (-15_000.0 / 32_768.0)).abs() < 1e-6);
    }

    #[test]
    fn stereo_wav_is_deinterleaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, &[100, -100, 200, -200, 300, -300]);

        let source = load(&path).unwrap();
        let scale = 1.0 / 32_768.0;
        assert_eq!(source.left(), &[100.0 * scale, 200.0 * scale, 300.0 * scale]);
        assert_eq!(source.right(), &[-100.0 * scale, -200.0 * scale, -300.0 * scale]);
    }

    #[test]
    fn float_wav_keeps_sample_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0.25_f32, -0.5, 1.0] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let source = load(&path).unwrap();
        assert_eq!(source.left(), &[0.25, -0.5, 1.0]);
    }

    #[test]
    fn extension_match_is_exact() {
        for name in ["song.flac", "song.WAV", "song.Mp3", "song"] {
            let err = load(PathBuf::from(name)).unwrap_err();
            assert!(matches!(err, SpectrumError::UnsupportedFormat(_)), "{name}");
            assert!(err.is_decode());
        }
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("absent.wav")).unwrap_err();
        assert!(matches!(err, SpectrumError::Decode { .. }));
    }

    #[test]
    fn malformed_mp3_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not an mpeg stream").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn rejects_surround_layouts() {
        assert!(DecodedSource::from_interleaved(&[0.0; 12], 6, 48_000).is_err());
    }
}
