use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{config::WindowFunction, Result, SpectrumError};

/// Per-bin magnitudes of one block, bins `0..N/2`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeSpectrum {
    bins: Vec<f32>,
}

impl MagnitudeSpectrum {
    pub fn new(bins: Vec<f32>) -> Self {
        Self { bins }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.bins
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Index of the strongest bin, ignoring NaNs.
    pub fn peak_bin(&self) -> Option<usize> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_nan())
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
    }

    /// Centre frequency of `bin` in Hz for a block analysed at `sample_rate`.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        let block_size = (self.bins.len() * 2).max(1);
        bin as f32 * sample_rate as f32 / block_size as f32
    }
}

impl AsRef<[f32]> for MagnitudeSpectrum {
    fn as_ref(&self) -> &[f32] {
        &self.bins
    }
}

/// Real-input transform of fixed size that turns a block into magnitudes.
///
/// The plan and all working buffers are allocated once at construction, so
/// [`SpectralTransform::transform`] only allocates the returned spectrum.
pub struct SpectralTransform {
    block_size: usize,
    window: Option<Vec<f32>>,
    fft: FftResources,
    packed: Vec<f32>,
}

impl SpectralTransform {
    /// Builds a transform without windowing.
    pub fn new(block_size: usize) -> Result<Self> {
        Self::with_window(block_size, WindowFunction::Rectangular)
    }

    pub fn with_window(block_size: usize, window: WindowFunction) -> Result<Self> {
        if block_size < 2 || block_size % 2 != 0 {
            return Err(SpectrumError::TransformInit(format!(
                "transform size must be even and at least 2, got {block_size}"
            )));
        }

        let fft = FftResources::plan(block_size)?;
        let window = match window {
            WindowFunction::Rectangular => None,
            WindowFunction::Hann => Some(
                (0..block_size)
                    .map(|index| hann_value(index, block_size))
                    .collect(),
            ),
        };

        Ok(Self {
            block_size,
            window,
            fft,
            packed: vec![0.0; block_size],
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of magnitudes produced per block.
    pub fn bin_count(&self) -> usize {
        self.block_size / 2
    }

    /// Packed coefficients of the most recent transform.
    pub fn packed(&self) -> &[f32] {
        &self.packed
    }

    /// Computes the magnitude spectrum of `block`, which must hold exactly
    /// `block_size` samples. Nothing is padded or truncated.
    pub fn transform(&mut self, block: &[f32]) -> Result<MagnitudeSpectrum> {
        if block.len() != self.block_size {
            return Err(SpectrumError::SizeMismatch {
                expected: self.block_size,
                actual: block.len(),
            });
        }

        match &self.window {
            Some(window) => {
                for ((input, sample), weight) in self.fft.input.iter_mut().zip(block).zip(window) {
                    *input = sample * weight;
                }
            }
            None => self.fft.input.copy_from_slice(block),
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        pack_half_complex(&self.fft.spectrum, &mut self.packed);
        let mut magnitudes = vec![0.0; self.bin_count()];
        magnitudes_from_packed(&self.packed, &mut magnitudes);
        Ok(MagnitudeSpectrum::new(magnitudes))
    }
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("block_size", &self.block_size)
            .field("windowed", &self.window.is_some())
            .finish()
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn plan(size: usize) -> Result<Self> {
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        if plan.len() != size {
            return Err(SpectrumError::TransformInit(format!(
                "planner returned a transform of length {} for size {size}",
                plan.len()
            )));
        }

        Ok(Self {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        })
    }
}

/// Writes `spectrum` (the `N/2 + 1` complex bins of a real transform of
/// length `N = packed.len()`) in half-complex order: `r0, r1, .., r(N/2),
/// i(N/2-1), .., i1`.
pub fn pack_half_complex(spectrum: &[Complex32], packed: &mut [f32]) {
    let n = packed.len();
    debug_assert_eq!(spectrum.len(), n / 2 + 1);

    for (k, bin) in spectrum.iter().enumerate().take(n / 2 + 1) {
        packed[k] = bin.re;
        if k > 0 && k < n - k {
            packed[n - k] = bin.im;
        }
    }
}

/// Rebuilds `magnitudes.len()` magnitudes from half-complex coefficients.
///
/// Bins 0 and `N/2` are purely real. For `0 < k < N/2` the real part is
/// `packed[k]` and the imaginary part `packed[N - k]`.
pub fn magnitudes_from_packed(packed: &[f32], magnitudes: &mut [f32]) {
    let n = packed.len();
    for (k, magnitude) in magnitudes.iter_mut().enumerate() {
        let real = packed[k];
        let imag = if k == 0 || k == n / 2 { 0.0 } else { packed[n - k] };
        *magnitude = (real * real + imag * imag).sqrt();
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn sine_peaks_at_expected_bin() {
        let block_size = 1024;
        let sample_rate = 44_100.0;
        let mut transform = SpectralTransform::new(block_size).unwrap();

        for frequency in [440.0_f32, 1_000.0, 5_512.5, 12_000.0] {
            let spectrum = transform
                .transform(&sine(frequency, sample_rate, block_size))
                .unwrap();
            let expected = (frequency * block_size as f32 / sample_rate).round() as i64;
            let peak = spectrum.peak_bin().unwrap() as i64;

            assert_eq!(spectrum.len(), block_size / 2);
            assert!((peak - expected).abs() <= 1, "{frequency} Hz peaked at {peak}");
        }
    }

    #[test]
    fn silence_has_zero_magnitude() {
        let mut transform = SpectralTransform::new(512).unwrap();
        let spectrum = transform.transform(&[0.0; 512]).unwrap();

        assert_eq!(spectrum.len(), 256);
        assert!(spectrum.as_slice().iter().all(|m| m.abs() <= f32::EPSILON));
    }

    #[test]
    fn short_block_is_rejected() {
        let mut transform = SpectralTransform::new(1024).unwrap();
        let err = transform.transform(&[0.5; 1000]).unwrap_err();

        assert!(matches!(
            err,
            SpectrumError::SizeMismatch {
                expected: 1024,
                actual: 1000
            }
        ));
    }

    #[test]
    fn long_block_is_rejected() {
        let mut transform = SpectralTransform::new(64).unwrap();
        assert!(transform.transform(&[0.5; 65]).is_err());
    }

    #[test]
    fn invalid_sizes_fail_construction() {
        for size in [0, 1, 7] {
            assert!(matches!(
                SpectralTransform::new(size),
                Err(SpectrumError::TransformInit(_))
            ));
        }
    }

    #[test]
    fn packed_layout_pairs_real_and_imaginary_parts() {
        let n = 16;
        let mut transform = SpectralTransform::new(n).unwrap();
        // cos at bin 3 lands on the real side, sin at bin 5 on the imaginary side.
        let block: Vec<f32> = (0..n)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / n as f32;
                (3.0 * phase).cos() + (5.0 * phase).sin()
            })
            .collect();

        let spectrum = transform.transform(&block).unwrap();
        let packed = transform.packed();

        assert!((packed[3] - n as f32 / 2.0).abs() < 1e-4);
        assert!(packed[n - 3].abs() < 1e-4);
        assert!(packed[5].abs() < 1e-4);
        assert!((packed[n - 5] + n as f32 / 2.0).abs() < 1e-4);
        assert!((spectrum.as_slice()[3] - 8.0).abs() < 1e-4);
        assert!((spectrum.as_slice()[5] - 8.0).abs() < 1e-4);
    }

    #[test]
    fn dc_and_nyquist_are_real() {
        let n = 8;
        let spectrum = vec![
            Complex32::new(4.0, 0.0),
            Complex32::new(1.0, 2.0),
            Complex32::new(0.0, -3.0),
            Complex32::new(5.0, 6.0),
            Complex32::new(-2.0, 0.0),
        ];
        let mut packed = vec![0.0; n];
        pack_half_complex(&spectrum, &mut packed);
        assert_eq!(packed, vec![4.0, 1.0, 0.0, 5.0, -2.0, 6.0, -3.0, 2.0]);

        let mut magnitudes = vec![0.0; n / 2];
        magnitudes_from_packed(&packed, &mut magnitudes);
        assert_eq!(magnitudes[0], 4.0);
        assert!((magnitudes[1] - 5.0_f32.sqrt()).abs() < 1e-6);
        assert_eq!(magnitudes[2], 3.0);
        assert!((magnitudes[3] - 61.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn hann_window_tapers_block_edges() {
        let n = 256;
        let mut plain = SpectralTransform::new(n).unwrap();
        let mut windowed = SpectralTransform::with_window(n, WindowFunction::Hann).unwrap();
        let dc = vec![1.0; n];

        let plain_dc = plain.transform(&dc).unwrap().as_slice()[0];
        let windowed_dc = windowed.transform(&dc).unwrap().as_slice()[0];

        assert!((plain_dc - n as f32).abs() < 1e-3);
        assert!(windowed_dc < plain_dc * 0.6);
    }

    #[test]
    fn bin_frequency_uses_block_size() {
        let spectrum = MagnitudeSpectrum::new(vec![0.0; 512]);
        assert!((spectrum.bin_frequency(23, 44_100) - 23.0 * 44_100.0 / 1024.0).abs() < 1e-3);
    }
}
