use crate::{config::RenderConfig, MagnitudeSpectrum, Result};

/// Consumer of magnitude spectra, typically a window drawing them.
///
/// The pipeline only relies on this capability; concrete styles (bars,
/// circles, terrain) live with whatever owns the window.
pub trait Visualizer {
    fn render(&mut self, spectrum: &MagnitudeSpectrum) -> Result<()>;

    /// Polled before each pull; `true` ends the render loop.
    fn should_close(&self) -> bool;

    /// Releases whatever the visualizer holds. Called once after the loop.
    fn cleanup(&mut self) {}
}

/// Exponential decay smoothing across successive spectra.
#[derive(Debug, Clone)]
pub struct SpectrumSmoother {
    decay: f32,
    values: Vec<f32>,
}

impl SpectrumSmoother {
    /// `decay` is the weight kept from the previous frame, clamped to `[0, 1]`.
    pub fn new(decay: f32) -> Self {
        Self {
            decay: decay.clamp(0.0, 1.0),
            values: Vec::new(),
        }
    }

    /// Folds `spectrum` into the running values. A change in bin count
    /// restarts smoothing from silence.
    pub fn apply(&mut self, spectrum: &[f32]) -> &[f32] {
        if self.values.len() != spectrum.len() {
            self.values = vec![0.0; spectrum.len()];
        }

        for (smoothed, magnitude) in self.values.iter_mut().zip(spectrum) {
            *smoothed = *smoothed * self.decay + magnitude * (1.0 - self.decay);
        }
        &self.values
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

/// Averages `values` into `bands` equally wide groups of bins.
///
/// Asking for more bands than bins yields one band per bin.
pub fn band_levels(values: &[f32], bands: usize) -> Vec<f32> {
    if values.is_empty() || bands == 0 {
        return Vec::new();
    }

    let bands = bands.min(values.len());
    (0..bands)
        .map(|band| {
            let start = band * values.len() / bands;
            let end = ((band + 1) * values.len() / bands).max(start + 1);
            let slice = &values[start..end];
            slice.iter().sum::<f32>() / slice.len() as f32
        })
        .collect()
}

/// Headless visualizer that reports smoothed band levels through `tracing`.
#[derive(Debug)]
pub struct TraceVisualizer {
    smoother: SpectrumSmoother,
    bands: usize,
    log_every: usize,
    sample_rate: u32,
    max_frames: Option<usize>,
    frames: usize,
    closed: bool,
}

impl TraceVisualizer {
    pub fn new(config: &RenderConfig, sample_rate: u32) -> Self {
        Self {
            smoother: SpectrumSmoother::new(config.smoothing_decay),
            bands: config.bands,
            log_every: config.log_every.max(1),
            sample_rate,
            max_frames: None,
            frames: 0,
            closed: false,
        }
    }

    /// Asks the render loop to stop after `frames` spectra.
    pub fn with_frame_limit(mut self, frames: usize) -> Self {
        self.max_frames = Some(frames);
        self
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn levels(&self) -> Vec<f32> {
        band_levels(self.smoother.values(), self.bands)
    }
}

impl Visualizer for TraceVisualizer {
    fn render(&mut self, spectrum: &MagnitudeSpectrum) -> Result<()> {
        self.smoother.apply(spectrum.as_slice());
        self.frames += 1;

        if self.frames % self.log_every == 0 {
            let levels = self.levels();
            let loudest = levels.iter().copied().fold(0.0_f32, f32::max);
            let dominant_hz = spectrum
                .peak_bin()
                .map(|bin| spectrum.bin_frequency(bin, self.sample_rate))
                .unwrap_or_default();
            tracing::info!(
                frame = self.frames,
                dominant_hz,
                loudest_band = loudest,
                "spectrum"
            );
            tracing::debug!(?levels, "band levels");
        }
        Ok(())
    }

    fn should_close(&self) -> bool {
        self.closed || self.max_frames.is_some_and(|max| self.frames >= max)
    }

    fn cleanup(&mut self) {
        tracing::debug!(frames = self.frames, "trace visualizer closed");
        self.smoother.reset();
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_decays_towards_new_values() {
        let mut smoother = SpectrumSmoother::new(0.5);
        assert_eq!(smoother.apply(&[2.0, 4.0]), &[1.0, 2.0]);
        assert_eq!(smoother.apply(&[2.0, 4.0]), &[1.5, 3.0]);
        assert_eq!(smoother.apply(&[0.0]), &[0.0]);
    }

    #[test]
    fn band_levels_average_groups() {
        let values = [1.0, 3.0, 5.0, 7.0, 9.0, 11.0];
        assert_eq!(band_levels(&values, 3), vec![2.0, 6.0, 10.0]);
        assert_eq!(band_levels(&values, 10).len(), 6);
        assert!(band_levels(&[], 4).is_empty());
    }

    #[test]
    fn frame_limit_closes_visualizer() {
        let config = RenderConfig {
            log_every: 1,
            ..Default::default()
        };
        let mut visualizer = TraceVisualizer::new(&config, 44_100).with_frame_limit(2);
        let spectrum = MagnitudeSpectrum::new(vec![0.0, 1.0, 0.5, 0.0]);

        assert!(!visualizer.should_close());
        visualizer.render(&spectrum).unwrap();
        visualizer.render(&spectrum).unwrap();
        assert!(visualizer.should_close());
        assert_eq!(visualizer.frames(), 2);
    }
}
