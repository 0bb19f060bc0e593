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

//!
//! Multi-tone phase calibration extraction
//!
//! A PCal comb places tones at `offset + k * spacing` across the baseband.
//! With a comb spacing of say 1 MHz and a sampling rate of 32 MHz, the comb
//! repeats every 32 samples, so extraction reduces to folding the signal
//! into a short accumulator and running a tiny DFT over the integrated
//! result. Three implementations cover the number-theoretic cases of the
//! (sampling frequency, offset, spacing) triple; the selection is made by
//! [`PcalExtractor::for_comb`].
//!
//! Accumulation is resumable: segments separated by gaps can be integrated
//! into one result by calling [`PcalExtractor::adjust_sample_offset`]
//! between segments.
//!

mod implicit_shift;
mod shifting;
mod trivial;

pub use self::implicit_shift::ImplicitShiftExtractor;
pub use self::shifting::ShiftingExtractor;
pub use self::trivial::TrivialExtractor;

use num_complex::Complex32;
use num_traits::Zero;

use crate::dft::ComplexDft;
use crate::settings::gcd;

/// A multi-tone phase calibration extractor
///
/// The contract shared by all variants:
/// - `extract_and_integrate` accumulates a signal segment and returns false
///   once the result has been finalised;
/// - `get_final_pcal` finalises (idempotently), copies the tone vector and
///   returns the integrated sample count;
/// - `clear` resets the accumulators and the finalised flag between
///   integration boundaries.
pub enum PcalExtractor {
    /// Comb aligned with DC (`offset == 0`)
    Trivial(TrivialExtractor),
    /// Nonzero offset absorbed into the bin picking after the DFT
    ImplicitShift(ImplicitShiftExtractor),
    /// Nonzero offset counter-rotated with a complex oscillator
    Shifting(ShiftingExtractor),
}

impl PcalExtractor {
    /// Selects the extractor for a comb by the number-theoretic properties
    /// of the sampling frequency `2 * bandwidth_hz`, the tone spacing and
    /// the comb offset
    pub fn for_comb(bandwidth_hz: f64, spacing_hz: f64, offset_hz: f64) -> PcalExtractor {
        if offset_hz == 0.0 {
            return PcalExtractor::Trivial(TrivialExtractor::new(bandwidth_hz, spacing_hz));
        }
        let fs = (2.0 * bandwidth_hz) as u64;
        let n_offset = fs / gcd(offset_hz as u64, fs);
        let n_spacing = fs / gcd(spacing_hz as u64, fs);
        if n_offset % n_spacing == 0 {
            PcalExtractor::ImplicitShift(ImplicitShiftExtractor::new(
                bandwidth_hz,
                spacing_hz,
                offset_hz,
            ))
        } else {
            PcalExtractor::Shifting(ShiftingExtractor::new(bandwidth_hz, spacing_hz, offset_hz))
        }
    }

    /// Accumulates a segment of real samples; false once finalised
    pub fn extract_and_integrate(&mut self, samples: &[f32]) -> bool {
        match self {
            PcalExtractor::Trivial(e) => e.extract_and_integrate(samples),
            PcalExtractor::ImplicitShift(e) => e.extract_and_integrate(samples),
            PcalExtractor::Shifting(e) => e.extract_and_integrate(samples),
        }
    }

    /// Re-seats the internal bin and rotator indices after a gap or seek in
    /// the sample stream; call before the next `extract_and_integrate`
    pub fn adjust_sample_offset(&mut self, sample_offset: u64) {
        match self {
            PcalExtractor::Trivial(e) => e.adjust_sample_offset(sample_offset),
            PcalExtractor::ImplicitShift(e) => e.adjust_sample_offset(sample_offset),
            PcalExtractor::Shifting(e) => e.adjust_sample_offset(sample_offset),
        }
    }

    /// Finalises if needed, copies the tone vector into `out` and returns
    /// the number of samples integrated since the last `clear`
    pub fn get_final_pcal(&mut self, out: &mut [Complex32]) -> u64 {
        match self {
            PcalExtractor::Trivial(e) => e.get_final_pcal(out),
            PcalExtractor::ImplicitShift(e) => e.get_final_pcal(out),
            PcalExtractor::Shifting(e) => e.get_final_pcal(out),
        }
    }

    /// Resets all accumulators and the finalised flag
    pub fn clear(&mut self) {
        match self {
            PcalExtractor::Trivial(e) => e.clear(),
            PcalExtractor::ImplicitShift(e) => e.clear(),
            PcalExtractor::Shifting(e) => e.clear(),
        }
    }

    /// Number of complex tone values this extractor produces
    pub fn tone_count(&self) -> usize {
        match self {
            PcalExtractor::Trivial(e) => e.tone_count(),
            PcalExtractor::ImplicitShift(e) => e.tone_count(),
            PcalExtractor::Shifting(e) => e.tone_count(),
        }
    }
}

/// Direct-sum reference extraction, for validation only
///
/// Rotates and bins every sample individually, then transforms. Slow, but
/// structurally independent of the fast implementations; the fast variants
/// must agree with it on the tone bins to within DFT round-off.
pub fn extract_and_integrate_reference(
    data: &[f32],
    bandwidth_hz: f64,
    spacing_hz: f64,
    offset_hz: f64,
    sample_offset: u64,
    out: &mut [Complex32],
) {
    let fs = 2.0 * bandwidth_hz;
    let n_tones = if offset_hz == 0.0 {
        (bandwidth_hz / spacing_hz) as usize
    } else {
        ((bandwidth_hz - offset_hz) / spacing_hz) as usize + 1
    };
    let n_bins = 2 * n_tones;
    let max_tone_period = if offset_hz == 0.0 {
        1
    } else {
        (fs as u64) / gcd(offset_hz as u64, fs as u64)
    };
    let dphi = 2.0 * std::f64::consts::PI * (-offset_hz / fs);

    let mut folded = vec![Complex32::zero(); n_bins];
    for (n, &value) in data.iter().enumerate() {
        let position = sample_offset + n as u64;
        let bin = (position % n_bins as u64) as usize;
        let phi = dphi * ((position % max_tone_period) as f64);
        folded[bin] += Complex32::new(
            (phi.cos() * f64::from(value)) as f32,
            (phi.sin() * f64::from(value)) as f32,
        );
    }

    let mut dft = ComplexDft::new(n_bins);
    dft.process(&mut folded);
    out[..n_tones].copy_from_slice(&folded[..n_tones]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selection() {
        // offset 0 is always trivial
        assert!(matches!(
            PcalExtractor::for_comb(16e6, 1e6, 0.0),
            PcalExtractor::Trivial(_)
        ));
        // fs=32 MHz, offset 510 kHz: N_o = 3200, N_p = 32, 32 | 3200
        assert!(matches!(
            PcalExtractor::for_comb(16e6, 1e6, 510e3),
            PcalExtractor::ImplicitShift(_)
        ));
        // fs=30 MHz, offset 7.5 MHz: N_o = 4, N_p = 6, 6 does not divide 4
        assert!(matches!(
            PcalExtractor::for_comb(15e6, 5e6, 7.5e6),
            PcalExtractor::Shifting(_)
        ));
    }

    #[test]
    fn test_tone_counts() {
        assert_eq!(PcalExtractor::for_comb(8e6, 1e6, 0.0).tone_count(), 8);
        assert_eq!(PcalExtractor::for_comb(16e6, 1e6, 510e3).tone_count(), 16);
        assert_eq!(PcalExtractor::for_comb(15e6, 5e6, 7.5e6).tone_count(), 2);
    }

    #[test]
    fn test_cleared_extractor_yields_zero() {
        let mut extractor = PcalExtractor::for_comb(8e6, 1e6, 0.0);
        let samples = vec![1.0f32; 4096];
        assert!(extractor.extract_and_integrate(&samples));
        extractor.clear();
        let mut out = vec![Complex32::new(9.0, 9.0); extractor.tone_count()];
        let count = extractor.get_final_pcal(&mut out);
        assert_eq!(count, 0);
        assert!(out.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn test_finalised_refuses_more_data() {
        let mut extractor = PcalExtractor::for_comb(8e6, 1e6, 0.0);
        let samples = vec![0.5f32; 1024];
        assert!(extractor.extract_and_integrate(&samples));
        let mut out = vec![Complex32::zero(); extractor.tone_count()];
        let count = extractor.get_final_pcal(&mut out);
        assert_eq!(count, 1024);
        assert!(!extractor.extract_and_integrate(&samples));
        // repeated finalisation is idempotent
        let mut again = vec![Complex32::zero(); extractor.tone_count()];
        assert_eq!(extractor.get_final_pcal(&mut again), 1024);
        assert_eq!(out, again);
        // clear re-arms extraction
        extractor.clear();
        assert!(extractor.extract_and_integrate(&samples));
    }
}
