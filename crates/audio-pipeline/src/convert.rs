//! Sample-format conversion to the fixed 16-bit output format.
//!
//! The pipeline plays everything as interleaved s16le at the source's own
//! sample rate and channel count, so the only conversion ever needed is the
//! sample format. Sources that already decode to signed 16-bit are copied
//! verbatim; everything else funnels through a reusable [`SampleBuffer`]
//! destination that converts while interleaving.

use anyhow::{Result, anyhow};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, SampleBuffer, Signal, SignalSpec};
use symphonia::core::codecs::CodecParameters;
use symphonia::core::sample::SampleFormat;

use crate::pcm::PcmBuffer;

/// Converts decoded frames into [`PcmBuffer`] blocks.
///
/// One converter serves one decode session: the source rate and channel
/// count are fixed at creation and every frame is checked against them, so a
/// stream that changes shape mid-flight surfaces as a recoverable per-frame
/// error instead of corrupt output.
pub struct FormatConverter {
    rate: u32,
    channels: usize,
    mode: ConvertMode,
}

enum ConvertMode {
    /// Source samples are already signed 16-bit; interleave them unchanged.
    Verbatim,
    /// Convert through a reusable destination buffer.
    ///
    /// `frames` tracks the allocation; the destination grows only when a
    /// frame needs more room and is never shrunk, and the decoded input is
    /// never copied anywhere else first.
    Sample { dst: SampleBuffer<i16>, frames: u64 },
}

impl FormatConverter {
    /// Choose the conversion mode for a track opened with `params`.
    ///
    /// Tracks whose codec reports native signed 16-bit output take the
    /// verbatim path; all other formats are converted.
    pub fn for_codec(params: &CodecParameters, spec: SignalSpec) -> Self {
        let mode = if matches!(params.sample_format, Some(SampleFormat::S16)) {
            ConvertMode::Verbatim
        } else {
            ConvertMode::Sample {
                dst: SampleBuffer::new(0, spec),
                frames: 0,
            }
        };
        Self {
            rate: spec.rate,
            channels: spec.channels.count(),
            mode,
        }
    }

    /// Whether frames are copied without format conversion.
    pub fn is_verbatim(&self) -> bool {
        matches!(self.mode, ConvertMode::Verbatim)
    }

    /// Convert one decoded frame into an owned PCM block.
    ///
    /// Errors are per-frame and recoverable: the caller drops the frame and
    /// keeps decoding.
    pub fn convert(&mut self, decoded: AudioBufferRef<'_>) -> Result<PcmBuffer> {
        let spec = *decoded.spec();
        if spec.rate != self.rate || spec.channels.count() != self.channels {
            return Err(anyhow!(
                "frame format changed mid-stream: {} Hz / {} ch, expected {} Hz / {} ch",
                spec.rate,
                spec.channels.count(),
                self.rate,
                self.channels
            ));
        }

        match &mut self.mode {
            ConvertMode::Verbatim => match decoded {
                AudioBufferRef::S16(buf) => Ok(interleave_native(&buf)),
                _ => Err(anyhow!("frame is not in the native 16-bit format")),
            },
            ConvertMode::Sample { dst, frames } => {
                let needed = decoded.frames() as u64;
                if needed > *frames {
                    *dst = SampleBuffer::new(needed, spec);
                    *frames = needed;
                }
                dst.copy_interleaved_ref(decoded);
                Ok(PcmBuffer::from_samples(dst.samples()))
            }
        }
    }
}

/// Interleave the planes of a native 16-bit frame, copying samples verbatim.
fn interleave_native(buf: &AudioBuffer<i16>) -> PcmBuffer {
    let frames = buf.frames();
    let channels = buf.spec().channels.count();
    let mut bytes = Vec::with_capacity(frames * channels * 2);
    for frame in 0..frames {
        for ch in 0..channels {
            bytes.extend_from_slice(&buf.chan(ch)[frame].to_le_bytes());
        }
    }
    PcmBuffer::new(bytes, frames * channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::Path;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    fn write_i16_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn write_f32_wav(path: &Path, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Decode every frame of `path` through `convert` and collect the bytes.
    fn decode_all(path: &Path, mut convert: impl FnMut(AudioBufferRef<'_>) -> Vec<u8>) -> Vec<u8> {
        let file = File::open(path).unwrap();
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .unwrap();
        let mut format = probed.format;
        let track = format.default_track().unwrap();
        let codec_params = track.codec_params.clone();
        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .unwrap();

        let mut out = Vec::new();
        while let Ok(packet) = format.next_packet() {
            let decoded = decoder.decode(&packet).unwrap();
            if decoded.frames() == 0 {
                continue;
            }
            out.extend_from_slice(&convert(decoded));
        }
        out
    }

    fn stereo_spec() -> SignalSpec {
        SignalSpec::new(
            44_100,
            symphonia::core::audio::Channels::FRONT_LEFT
                | symphonia::core::audio::Channels::FRONT_RIGHT,
        )
    }

    #[test]
    fn verbatim_mode_is_chosen_for_native_s16() {
        let mut params = CodecParameters::new();
        params.sample_format = Some(SampleFormat::S16);
        assert!(FormatConverter::for_codec(&params, stereo_spec()).is_verbatim());

        let mut params = CodecParameters::new();
        params.sample_format = Some(SampleFormat::F32);
        assert!(!FormatConverter::for_codec(&params, stereo_spec()).is_verbatim());

        // Unknown native format funnels through the converting path.
        let params = CodecParameters::new();
        assert!(!FormatConverter::for_codec(&params, stereo_spec()).is_verbatim());
    }

    #[test]
    fn converting_path_matches_verbatim_for_native_s16() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ramp.wav");
        let samples: Vec<i16> = (0..4096).map(|i| (i * 7 % 20_000) as i16 - 10_000).collect();
        write_i16_wav(&path, 2, &samples);

        let spec = stereo_spec();
        let mut params = CodecParameters::new();
        params.sample_format = Some(SampleFormat::S16);
        let mut verbatim = FormatConverter::for_codec(&params, spec);
        assert!(verbatim.is_verbatim());

        // Force the converting path over the same frames.
        let mut converting = FormatConverter::for_codec(&CodecParameters::new(), spec);
        assert!(!converting.is_verbatim());

        let direct_bytes = decode_all(&path, |frame| {
            verbatim.convert(frame).unwrap().bytes().to_vec()
        });
        let converted_bytes = decode_all(&path, |frame| {
            converting.convert(frame).unwrap().bytes().to_vec()
        });

        assert_eq!(direct_bytes.len(), samples.len() * 2);
        assert_eq!(direct_bytes, converted_bytes);

        let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(direct_bytes, expected);
    }

    #[test]
    fn f32_source_converts_to_scaled_s16() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("float.wav");
        write_f32_wav(&path, &[0.0, 0.25, 0.5, -0.5]);

        let spec = SignalSpec::new(44_100, symphonia::core::audio::Channels::FRONT_LEFT);
        let mut converter = FormatConverter::for_codec(&CodecParameters::new(), spec);

        let bytes = decode_all(&path, |frame| {
            converter.convert(frame).unwrap().bytes().to_vec()
        });

        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![0, 8192, 16384, -16384]);
    }

    #[test]
    fn verbatim_mode_rejects_foreign_frame_format() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("float.wav");
        write_f32_wav(&path, &[0.1; 64]);

        let spec = SignalSpec::new(44_100, symphonia::core::audio::Channels::FRONT_LEFT);
        let mut params = CodecParameters::new();
        params.sample_format = Some(SampleFormat::S16);
        let mut converter = FormatConverter::for_codec(&params, spec);

        let mut rejected = false;
        decode_all(&path, |frame| {
            rejected |= converter.convert(frame).is_err();
            Vec::new()
        });
        assert!(rejected);
    }

    #[test]
    fn frames_with_unexpected_shape_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_i16_wav(&path, 1, &[1, 2, 3, 4]);

        // Converter opened for a stereo 48 kHz track; mono 44.1 kHz frames
        // must surface as recoverable errors.
        let spec = SignalSpec::new(
            48_000,
            symphonia::core::audio::Channels::FRONT_LEFT
                | symphonia::core::audio::Channels::FRONT_RIGHT,
        );
        let mut params = CodecParameters::new();
        params.sample_format = Some(SampleFormat::S16);
        let mut converter = FormatConverter::for_codec(&params, spec);

        let mut rejected = false;
        decode_all(&path, |frame| {
            rejected |= converter.convert(frame).is_err();
            Vec::new()
        });
        assert!(rejected);
    }
}
