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

//! Nonzero-offset PCal extraction with an explicit complex rotator

use num_complex::Complex32;
use num_traits::Zero;

use crate::dft::ComplexDft;
use crate::settings::gcd;

/// Extractor for the general offset comb
///
/// The tones sit `offset` Hz away from the `k*spacing` grid, so every
/// rotator-length segment of input is first multiplied by the precomputed
/// oscillator `e^(i*2*pi*(-offset/fs)*n)` and then folded into the
/// `N_bins = fs / gcd(spacing, fs)` accumulator. `N_bins` does not
/// necessarily divide the rotator length; tails are handled on both levels
/// and both indices advance modulo their own period.
pub struct ShiftingExtractor {
    fs: f64,
    spacing_hz: f64,
    n_bins: usize,
    n_tones: usize,
    rotator_len: usize,
    /// Oscillator table, `2 * rotator_len` so any in-period start offset
    /// can be applied with one contiguous slice
    rotator: Vec<Complex32>,
    /// Rotated-segment scratch, `rotator_len`
    rotated: Vec<Complex32>,
    /// Complex fold accumulator, `2 * n_bins`
    pcal_complex: Vec<Complex32>,
    dft: ComplexDft,
    pcal_index: usize,
    rotator_index: usize,
    sample_count: u64,
    finalized: bool,
}

impl ShiftingExtractor {
    /// Creates an extractor for a general offset comb
    pub fn new(bandwidth_hz: f64, spacing_hz: f64, offset_hz: f64) -> Self {
        let fs = 2.0 * bandwidth_hz;
        let n_bins = ((fs as u64) / gcd(spacing_hz.abs() as u64, fs as u64)) as usize;
        let n_tones = ((bandwidth_hz - offset_hz) / spacing_hz) as usize + 1;
        let rotator_len = ((fs as u64) / gcd(offset_hz.abs() as u64, fs as u64)) as usize;

        let dphi = 2.0 * std::f64::consts::PI * (-offset_hz / fs);
        let rotator = (0..2 * rotator_len)
            .map(|n| {
                let arg = dphi * n as f64;
                Complex32::new(arg.cos() as f32, arg.sin() as f32)
            })
            .collect();

        debug!(
            "ShiftingExtractor: {} tones, {} bins, rotator period {}",
            n_tones, n_bins, rotator_len
        );
        ShiftingExtractor {
            fs,
            spacing_hz,
            n_bins,
            n_tones,
            rotator_len,
            rotator,
            rotated: vec![Complex32::zero(); rotator_len],
            pcal_complex: vec![Complex32::zero(); 2 * n_bins],
            dft: ComplexDft::new(n_bins),
            pcal_index: 0,
            rotator_index: 0,
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
        for value in self.pcal_complex.iter_mut() {
            *value = Complex32::zero();
        }
        for value in self.rotated.iter_mut() {
            *value = Complex32::zero();
        }
    }

    /// Re-seats the rotator phase and the fold position after a gap in the
    /// sample stream
    pub fn adjust_sample_offset(&mut self, sample_offset: u64) {
        self.rotator_index = (sample_offset % self.rotator_len as u64) as usize;
        self.pcal_index = (sample_offset % self.n_bins as u64) as usize;
    }

    /// Rotates and folds a segment into the accumulator; false once
    /// finalised
    pub fn extract_and_integrate(&mut self, samples: &[f32]) -> bool {
        if self.finalized {
            return false;
        }

        let n_bins = self.n_bins;
        let mut pos = 0;
        while pos < samples.len() {
            let chunk = self.rotator_len.min(samples.len() - pos);

            // shift the comb back onto the k*spacing grid
            for (j, value) in self.rotated[..chunk].iter_mut().enumerate() {
                *value = self.rotator[self.rotator_index + j] * samples[pos + j];
            }

            // fold: full periods leave the fold position alone, the tail
            // advances it
            let tail = chunk % n_bins;
            let end = chunk - tail;
            for block in self.rotated[..end].chunks_exact(n_bins) {
                let dst = &mut self.pcal_complex[self.pcal_index..self.pcal_index + n_bins];
                for (acc, &value) in dst.iter_mut().zip(block.iter()) {
                    *acc += value;
                }
            }
            if tail != 0 {
                let dst = &mut self.pcal_complex[self.pcal_index..self.pcal_index + tail];
                for (acc, &value) in dst.iter_mut().zip(self.rotated[end..chunk].iter()) {
                    *acc += value;
                }
                self.pcal_index = (self.pcal_index + tail) % n_bins;
            }

            self.rotator_index = (self.rotator_index + chunk) % self.rotator_len;
            pos += chunk;
        }

        self.sample_count += samples.len() as u64;
        true
    }

    /// Finalises if needed and copies the tone bins into `out`
    pub fn get_final_pcal(&mut self, out: &mut [Complex32]) -> u64 {
        if !self.finalized {
            self.finalized = true;
            for i in 0..self.n_bins {
                let upper = self.pcal_complex[self.n_bins + i];
                self.pcal_complex[i] += upper;
            }
            self.dft.process(&mut self.pcal_complex[..self.n_bins]);
        }

        // Tones sit at integer multiples of the spacing in bin units
        let step = (self.n_bins as f64 * self.spacing_hz / self.fs) as usize;
        for (tone, value) in out.iter_mut().enumerate().take(self.n_tones) {
            let idx = tone * step;
            if idx >= self.n_bins {
                break;
            }
            *value = self.pcal_complex[idx];
        }
        self.sample_count
    }
}
