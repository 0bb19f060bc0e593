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

//! DFT window functions

use std::f64::consts::PI;
use std::str::FromStr;

/// A window function applied to each DFT input block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunction {
    /// Rectangular (no windowing)
    None,
    /// Centred cosine
    Cosine,
    /// Centred cosine squared
    Cosine2,
    /// Hamming
    Hamming,
    /// Hann
    Hann,
    /// Blackman
    Blackman,
}

impl FromStr for WindowFunction {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(WindowFunction::None),
            "cosine" => Ok(WindowFunction::Cosine),
            "cosine2" => Ok(WindowFunction::Cosine2),
            "hamming" => Ok(WindowFunction::Hamming),
            "hann" => Ok(WindowFunction::Hann),
            "blackman" => Ok(WindowFunction::Blackman),
            _ => Err("expected None, Cosine, Cosine2, Hamming, Hann or Blackman"),
        }
    }
}

impl WindowFunction {
    /// Precomputes the window table for the given DFT length
    pub fn generate(self, points: usize) -> Vec<f32> {
        let n = points as f64;
        (0..points)
            .map(|i| {
                let x = i as f64;
                let value = match self {
                    WindowFunction::None => 1.0,
                    WindowFunction::Cosine => (PI * (x - 0.5 * n + 0.5) / n).cos(),
                    WindowFunction::Cosine2 => {
                        let w = (PI * (x - 0.5 * n + 0.5) / n).cos();
                        w * w
                    }
                    WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * x / n).cos(),
                    WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * x / n).cos()),
                    WindowFunction::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x / n).cos() + 0.08 * (4.0 * PI * x / n).cos()
                    }
                };
                value as f32
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangular() {
        let table = WindowFunction::None.generate(64);
        assert!(table.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_cosine2_is_square_of_cosine() {
        let cosine = WindowFunction::Cosine.generate(128);
        let cosine2 = WindowFunction::Cosine2.generate(128);
        for (w, w2) in cosine.iter().zip(cosine2.iter()) {
            assert!((w * w - w2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_symmetry() {
        for &wf in &[
            WindowFunction::Cosine,
            WindowFunction::Cosine2,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ] {
            let table = wf.generate(256);
            // The centred cosine family is exactly symmetric, the periodic
            // forms are symmetric about sample N/2
            for i in 1..128 {
                let (a, b) = match wf {
                    WindowFunction::Cosine | WindowFunction::Cosine2 => {
                        (table[i], table[255 - i])
                    }
                    _ => (table[i], table[256 - i]),
                };
                assert!((a - b).abs() < 1e-5, "{:?} asymmetric at {}", wf, i);
            }
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "cosine2".parse::<WindowFunction>().unwrap(),
            WindowFunction::Cosine2
        );
        assert_eq!(
            "Blackman".parse::<WindowFunction>().unwrap(),
            WindowFunction::Blackman
        );
        assert!("welch".parse::<WindowFunction>().is_err());
    }
}
