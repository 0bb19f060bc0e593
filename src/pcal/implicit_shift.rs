/*
 * Copyright 2024-2026 The swspec developers
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! Nonzero-offset PCal extraction without a runtime rotator

use num_complex::Complex32;
use num_traits::Zero;

use crate::dft::ComplexDft;
use crate::settings::gcd;

/// Extractor for offset combs whose offset period is a multiple of the
/// spacing period
///
/// Instead of counter-rotating the input, the signal is folded over the
/// offset repeat length `N_bins = fs / gcd(offset, fs)`; after the DFT the
/// tones sit at `floor(N_bins*offset/fs) + k*floor(N_bins*spacing/fs)`.
/// Runtime cost equals the trivial extractor.
pub struct ImplicitShiftExtractor {
    fs: f64,
    spacing_hz: f64,
    offset_hz: f64,
    n_bins: usize,
    n_tones: usize,
    /// Real fold accumulator, `2 * n_bins`
    pcal_real: Vec<f32>,
    /// Finalised complex result, `n_bins`
    pcal_complex: Vec<Complex32>,
    dft: ComplexDft,
    pcal_index: usize,
    sample_count: u64,
    finalized: bool,
}

impl ImplicitShiftExtractor {
    /// Creates an extractor for an offset comb with aligned periods
    pub fn new(bandwidth_hz: f64, spacing_hz: f64, offset_hz: f64) -> Self {
        let fs = 2.0 * bandwidth_hz;
        let n_bins = ((fs as u64) / gcd(offset_hz.abs() as u64, fs as u64)) as usize;
        let n_tones = ((bandwidth_hz - offset_hz) / spacing_hz) as usize + 1;
        debug!(
            "ImplicitShiftExtractor: {} tones, {} bins",
            n_tones, n_bins
        );
        ImplicitShiftExtractor {
            fs,
            spacing_hz,
            offset_hz,
            n_bins,
            n_tones,
            pcal_real: vec![0.0; 2 * n_bins],
            pcal_complex: vec![Complex32::zero(); n_bins],
            dft: ComplexDft::new(n_bins),
            pcal_index: 0,
            sample_count: 0,
            finalized: false,
        }
    }

    /// Number of complex tone values produced
    pub fn tone_count(&self) -> usize {
        self.n_tones
    }

    /// Resets the accumulators and the finalised flag
    pub fn clear(&mut self) {
        self.sample_count = 0;
        self.finalized = false;
        for value in self.pcal_real.iter_mut() {
            *value = 0.0;
        }
        for value in self.pcal_complex.iter_mut() {
            *value = Complex32::zero();
        }
    }

    /// Re-seats the fold position after a gap in the sample stream
    pub fn adjust_sample_offset(&mut self, sample_offset: u64) {
        self.pcal_index = (sample_offset % self.n_bins as u64) as usize;
    }

    /// Folds a segment into the accumulator; false once finalised
    pub fn extract_and_integrate(&mut self, samples: &[f32]) -> bool {
        if self.finalized {
            warn!("ImplicitShiftExtractor::extract_and_integrate on finalized result");
            return false;
        }

        let n_bins = self.n_bins;
        let tail = samples.len() % n_bins;
        let end = samples.len() - tail;

        for block in samples[..end].chunks_exact(n_bins) {
            let dst = &mut self.pcal_real[self.pcal_index..self.pcal_index + n_bins];
            for (acc, &value) in dst.iter_mut().zip(block.iter()) {
                *acc += value;
            }
        }

        if tail != 0 {
            let dst = &mut self.pcal_real[self.pcal_index..self.pcal_index + tail];
            for (acc, &value) in dst.iter_mut().zip(samples[end..].iter()) {
                *acc += value;
            }
            self.pcal_index = (self.pcal_index + tail) % n_bins;
        }

        self.sample_count += samples.len() as u64;
        true
    }

    /// Finalises if needed and copies the tone bins into `out`
    pub fn get_final_pcal(&mut self, out: &mut [Complex32]) -> u64 {
        if !self.finalized {
            self.finalized = true;
            for i in 0..self.n_bins {
                let upper = self.pcal_real[self.n_bins + i];
                self.pcal_real[i] += upper;
            }
            for (bin, &value) in self
                .pcal_complex
                .iter_mut()
                .zip(self.pcal_real[..self.n_bins].iter())
            {
                *bin = Complex32::new(value, 0.0);
            }
            self.dft.process(&mut self.pcal_complex);
        }

        // The offset moves the comb off the k*step grid by a fixed number
        // of bins; pick the shifted bins
        let step = (self.n_bins as f64 * self.spacing_hz / self.fs) as usize;
        let offset_bins = (self.n_bins as f64 * self.offset_hz / self.fs) as usize;
        for (tone, value) in out.iter_mut().enumerate().take(self.n_tones) {
            let idx = offset_bins + tone * step;
            if idx >= self.n_bins {
                break;
            }
            *value = self.pcal_complex[idx];
        }
        self.sample_count
    }
}
