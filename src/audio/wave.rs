//! In-memory waveform representation and WAV file I/O.

use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading or writing WAV files.
#[derive(Debug, Error)]
pub enum WaveError {
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("empty signal: {0}")]
    EmptySignal(String),
}

/// A decoded audio signal: mono samples in [-1.0, 1.0] plus the sample rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Root mean square of the samples.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| s as f64 * s as f64).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }

    /// Standard deviation of the samples. Speech is zero-centered, so this
    /// doubles as the raw volume measure persisted with each score.
    pub fn amplitude_std(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let n = self.samples.len() as f64;
        let mean: f64 = self.samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let var: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let d = s as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        var.sqrt()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()))
    }

    /// Loudness relative to full scale, in dB. Digital silence maps to
    /// negative infinity.
    pub fn dbfs(&self) -> f64 {
        let rms = self.rms();
        if rms <= 0.0 {
            return f64::NEG_INFINITY;
        }
        20.0 * rms.log10()
    }

    /// Multiply every sample by the linear equivalent of `gain_db`, clipping
    /// to full scale.
    pub fn apply_gain_db(&mut self, gain_db: f64) {
        let factor = 10.0_f64.powf(gain_db / 20.0) as f32;
        for s in &mut self.samples {
            *s = (*s * factor).clamp(-1.0, 1.0);
        }
    }

    /// Fraction of samples whose magnitude stays below `threshold`.
    pub fn quiet_fraction(&self, threshold: f32) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let quiet = self.samples.iter().filter(|s| s.abs() < threshold).count();
        quiet as f64 / self.samples.len() as f64
    }
}

/// Linear-interpolation resampling of a raw sample slice.
///
/// Endpoints map onto endpoints, matching a linspace-style grid. This is a
/// deliberately cheap resampler; the coarse per-chunk proxies it feeds do not
/// benefit from a windowed-sinc filter.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if samples.is_empty() || source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }
    let target_len =
        ((samples.len() as u64 * target_rate as u64) / source_rate as u64).max(1) as usize;
    if target_len == 1 || samples.len() == 1 {
        return vec![samples[0]];
    }
    let step = (samples.len() - 1) as f64 / (target_len - 1) as f64;
    let mut out = Vec::with_capacity(target_len);
    for i in 0..target_len {
        let pos = i as f64 * step;
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = if idx + 1 < samples.len() {
            samples[idx + 1]
        } else {
            a
        };
        out.push(a + (b - a) * frac);
    }
    out
}

/// Read a WAV file into a mono waveform, averaging channels when the source
/// is multi-channel.
pub fn read_wav(path: &Path) -> Result<Waveform, WaveError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << spec.bits_per_sample.saturating_sub(1)).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<f32>, hound::Error>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(Waveform {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write a mono waveform as 16-bit PCM WAV.
pub fn write_wav(path: &Path, waveform: &Waveform) -> Result<(), WaveError> {
    if waveform.samples.is_empty() {
        return Err(WaveError::EmptySignal(path.display().to_string()));
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in &waveform.samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()?;
    Ok(())
}
