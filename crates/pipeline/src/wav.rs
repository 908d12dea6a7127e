//! WAV decoding, encoding and resampling
//!
//! All internal audio is mono `f32` in [-1.0, 1.0].

use std::io::Cursor;

use rubato::{FftFixedIn, Resampler};

use guided_audio_config::OutputEncoding;

use crate::PipelineError;

/// Input frames per resampler chunk
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Decode WAV bytes, downmixing to mono
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, PipelineError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Duration from the WAV header without decoding samples
pub fn duration_ms(bytes: &[u8]) -> Result<u64, PipelineError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let rate = reader.spec().sample_rate as u64;
    if rate == 0 {
        return Err(PipelineError::Audio("WAV header has a zero sample rate".to_string()));
    }
    Ok(reader.duration() as u64 * 1000 / rate)
}

/// Encode mono samples as WAV
pub fn encode(
    samples: &[f32],
    sample_rate: u32,
    encoding: OutputEncoding,
) -> Result<Vec<u8>, PipelineError> {
    let spec = match encoding {
        OutputEncoding::Pcm16 => hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
        OutputEncoding::Float32 => hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        match encoding {
            OutputEncoding::Pcm16 => {
                for &sample in samples {
                    let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    writer.write_sample(value)?;
                }
            }
            OutputEncoding::Float32 => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Number of samples covering `duration_ms` at `sample_rate`
pub fn samples_for(duration_ms: u64, sample_rate: u32) -> usize {
    (duration_ms * sample_rate as u64 / 1000) as usize
}

/// Encoded silence
pub fn silence(duration_ms: u64, sample_rate: u32) -> Result<Vec<u8>, PipelineError> {
    encode(
        &vec![0.0; samples_for(duration_ms, sample_rate)],
        sample_rate,
        OutputEncoding::Pcm16,
    )
}

/// Resample mono audio
///
/// The result holds exactly `len * to / from` samples: the resampler's
/// leading delay is skipped and the tail is flushed.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, PipelineError> {
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(PipelineError::Audio("Zero sample rate".to_string()));
    }

    let expected = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| PipelineError::Audio(format!("Resampler init failed: {}", e)))?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut pos = 0;
    while pos < input.len() {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(input.len());
        let chunk = [&input[pos..end]];

        let frames = if end - pos == needed {
            resampler.process(&chunk[..], None)
        } else {
            resampler.process_partial(Some(&chunk[..]), None)
        }
        .map_err(|e| PipelineError::Audio(format!("Resampling failed: {}", e)))?;

        output.extend_from_slice(&frames[0]);
        pos = end;
    }

    // Flush what the resampler still holds back
    while output.len() < expected + delay {
        let frames = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| PipelineError::Audio(format!("Resampling failed: {}", e)))?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    let mut resampled: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    resampled.resize(expected, 0.0);
    Ok(resampled)
}

/// Trim or zero-pad to exactly `len` samples
pub fn fit_to_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}
