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
//! Forward DFT plans used by the spectrum cores and the PCal extractors
//!
//! Plans and scratch space are created once at construction; the hot path
//! does not allocate.
//!

use std::sync::Arc;

use num_complex::Complex32;
use num_traits::Zero;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};

/// A forward real-to-complex DFT producing the packed single-sideband layout
///
/// The packed layout stores the DC term in the real part of bin 0 and the
/// real-valued Nyquist term in the imaginary part of bin 0. Bins
/// `1..points/2` hold the usual complex amplitudes and the final slot of the
/// output is left at zero.
pub struct RealDft {
    plan: Arc<dyn RealToComplex<f32>>,
    natural: Vec<Complex32>,
    scratch: Vec<Complex32>,
    points: usize,
}

impl RealDft {
    /// Plans a forward transform of the given length
    pub fn new(points: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(points);
        let natural = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        RealDft {
            plan,
            natural,
            scratch,
            points,
        }
    }

    /// Returns the single-sideband output length, `points/2 + 1`
    pub fn ssb_points(&self) -> usize {
        self.points / 2 + 1
    }

    /// Transforms `input` (modified in place) into the packed layout
    ///
    /// `output` must hold `ssb_points()` values.
    pub fn process_packed(&mut self, input: &mut [f32], output: &mut [Complex32]) {
        assert_eq!(input.len(), self.points);
        assert_eq!(output.len(), self.ssb_points());
        self.plan
            .process_with_scratch(input, &mut self.natural, &mut self.scratch)
            .expect("real DFT failed");

        let nyquist_bin = self.ssb_points() - 1;
        output[0] = Complex32::new(self.natural[0].re, self.natural[nyquist_bin].re);
        output[1..nyquist_bin].copy_from_slice(&self.natural[1..nyquist_bin]);
        output[nyquist_bin] = Complex32::zero();
    }
}

/// A forward complex DFT of arbitrary length with 1/N scaling
///
/// The PCal tone bins expect the forward-normalized convention.
pub struct ComplexDft {
    plan: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
    scale: f32,
}

impl ComplexDft {
    /// Plans a forward transform of the given length
    pub fn new(points: usize) -> Self {
        let mut planner = FftPlanner::new();
        let plan = planner.plan_fft_forward(points);
        let scratch = vec![Complex32::zero(); plan.get_inplace_scratch_len()];
        ComplexDft {
            plan,
            scratch,
            scale: 1.0 / points as f32,
        }
    }

    /// Transforms `data` in place and applies the 1/N scale
    pub fn process(&mut self, data: &mut [Complex32]) {
        self.plan.process_with_scratch(data, &mut self.scratch);
        for value in data.iter_mut() {
            *value *= self.scale;
        }
    }
}
