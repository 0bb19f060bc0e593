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

//! End-to-end dispatcher runs over in-memory sources and sinks

extern crate num_complex;
extern crate swspec;

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use num_complex::Complex32;
use swspec::buffer::Buffer;
use swspec::config::{InputFormat, SpectrometerConfig};
use swspec::settings::Settings;
use swspec::sink::DataSink;
use swspec::source::DataSource;
use swspec::window::WindowFunction;
use swspec::Dispatcher;

/// A source backed by a byte vector
struct VecSource {
    data: Vec<u8>,
    position: usize,
    got_eof: bool,
}

impl VecSource {
    fn new(data: Vec<u8>) -> VecSource {
        VecSource {
            data,
            position: 0,
            got_eof: false,
        }
    }
}

impl DataSource for VecSource {
    fn read(&mut self, buf: &mut Buffer) -> usize {
        let wanted = buf.allocated();
        let available = self.data.len() - self.position;
        let count = wanted.min(available);
        buf.bytes_mut()[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        if count < wanted {
            self.got_eof = true;
        }
        buf.set_length(count);
        count
    }

    fn eof(&self) -> bool {
        self.got_eof
    }

    fn close(&mut self) {}
}

/// A sink that records everything it is given
#[derive(Clone, Default)]
struct Capture {
    reals: Arc<Mutex<Vec<f32>>>,
    complexes: Arc<Mutex<Vec<Complex32>>>,
}

impl Capture {
    fn reals(&self) -> Vec<f32> {
        self.reals.lock().unwrap().clone()
    }
    fn complexes(&self) -> Vec<Complex32> {
        self.complexes.lock().unwrap().clone()
    }
}

struct CaptureSink(Capture);

impl DataSink for CaptureSink {
    fn write_real(&mut self, bins: &[f32]) -> usize {
        self.0.reals.lock().unwrap().extend_from_slice(bins);
        bins.len() * 4
    }
    fn write_complex(&mut self, bins: &[Complex32]) -> usize {
        self.0.complexes.lock().unwrap().extend_from_slice(bins);
        bins.len() * 8
    }
    fn close(&mut self) {}
}

/// 8-bit signed samples of an amplitude-scaled cosine
fn cosine_bytes(amplitude: f64, cycles_per_fft: usize, fft_points: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|n| {
            let phase = 2.0 * PI * cycles_per_fft as f64 * n as f64 / fft_points as f64;
            (amplitude * phase.cos()).round() as i8 as u8
        })
        .collect()
}

/// DC-only input: all power lands in bin 0 with the exact normalisation
/// `fft_points^2`
#[test]
fn test_dc_input_single_spectrum() {
    let config = SpectrometerConfig {
        fft_points: 1024,
        integ_seconds: 1.0,
        samplingfreq: 10_240.0,
        fft_overlap_factor: 1,
        window: WindowFunction::None,
        bits_per_sample: 8,
        source_channels: 1,
        max_rawbuf_bytes: 16_384,
        ..SpectrometerConfig::default()
    };
    let settings = Arc::new(Settings::derive(&config, 1).unwrap());
    assert_eq!(settings.spectra_per_buffer, 1);

    let capture = Capture::default();
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&settings),
        vec![Box::new(VecSource::new(vec![1u8; 10_240]))],
        vec![Box::new(CaptureSink(capture.clone()))],
        Vec::new(),
        None,
    )
    .unwrap();
    let report = dispatcher.run();

    assert_eq!(report.spectra, 1);
    let spectrum = capture.reals();
    assert_eq!(spectrum.len(), settings.fft_ssb_points);
    assert!((spectrum[0] - 1_048_576.0).abs() < 1.0);
    for (bin, value) in spectrum.iter().enumerate().skip(1) {
        assert!(value.abs() < 1e-2, "bin {} holds {}", bin, value);
    }
}

/// A pure tone at bin 100 with the default Cosine2 window peaks exactly
/// there, with the sidelobes well down
#[test]
fn test_single_tone_peak_position() {
    let fft_points = 1024;
    let config = SpectrometerConfig {
        fft_points,
        integ_seconds: 1.0,
        samplingfreq: 10_240.0,
        fft_overlap_factor: 2,
        window: WindowFunction::Cosine2,
        bits_per_sample: 8,
        source_channels: 1,
        max_rawbuf_bytes: 16_384,
        ..SpectrometerConfig::default()
    };
    let settings = Arc::new(Settings::derive(&config, 1).unwrap());

    let capture = Capture::default();
    let data = cosine_bytes(100.0, 100, fft_points, 10_240);
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&settings),
        vec![Box::new(VecSource::new(data))],
        vec![Box::new(CaptureSink(capture.clone()))],
        Vec::new(),
        None,
    )
    .unwrap();
    let report = dispatcher.run();
    assert_eq!(report.spectra, 1);

    let spectrum = capture.reals();
    let peak_bin = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap()
        .0;
    assert_eq!(peak_bin, 100);
    // Hann-squared main lobe spans a few bins; beyond it the response is
    // orders of magnitude down
    let peak = spectrum[100];
    for (bin, value) in spectrum.iter().enumerate() {
        if (bin as i64 - 100).abs() > 4 && bin != 0 {
            assert!(
                value / peak < 1e-3,
                "sidelobe at bin {} is {} of peak",
                bin,
                value / peak
            );
        }
    }
}

/// Two identical streams: the cross spectrum equals the auto spectrum with
/// zero phase
#[test]
fn test_xpol_identical_streams() {
    let config = SpectrometerConfig {
        fft_points: 256,
        integ_seconds: 1.0,
        samplingfreq: 1_024.0,
        fft_overlap_factor: 2,
        bits_per_sample: 2,
        source_channels: 4,
        source_format: InputFormat::Mark5B,
        source_format_str: "Mark5B".to_string(),
        use_channel_file1: 2,
        use_channel_file2: 2,
        calc_xpol: true,
        max_rawbuf_bytes: 1_100,
        ..SpectrometerConfig::default()
    };
    let settings = Arc::new(Settings::derive(&config, 2).unwrap());
    assert_eq!(settings.num_xpols, 1);
    assert_eq!(settings.spectra_per_buffer, 1);

    // deterministic pseudo-random 2-bit packed data, replicated per stream
    let data: Vec<u8> = (0..1024u32).map(|n| (n.wrapping_mul(31).wrapping_add(7) % 251) as u8).collect();

    let auto1 = Capture::default();
    let auto2 = Capture::default();
    let xpol = Capture::default();
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&settings),
        vec![
            Box::new(VecSource::new(data.clone())),
            Box::new(VecSource::new(data)),
        ],
        vec![
            Box::new(CaptureSink(auto1.clone())),
            Box::new(CaptureSink(auto2.clone())),
            Box::new(CaptureSink(xpol.clone())),
        ],
        Vec::new(),
        None,
    )
    .unwrap();
    let report = dispatcher.run();
    assert_eq!(report.spectra, 1);

    let auto_spectrum = auto1.reals();
    let cross_spectrum = xpol.complexes();
    assert_eq!(auto_spectrum, auto2.reals());
    assert_eq!(auto_spectrum.len(), settings.fft_ssb_points);
    assert_eq!(cross_spectrum.len(), settings.fft_ssb_points);

    for (bin, (auto, cross)) in auto_spectrum
        .iter()
        .zip(cross_spectrum.iter())
        .enumerate()
    {
        assert!(
            (cross.re - auto).abs() <= 1e-3 * auto.abs().max(1.0),
            "bin {}: cross {} auto {}",
            bin,
            cross.re,
            auto
        );
        assert!(
            cross.im.abs() <= 1e-3 * auto.abs().max(1.0),
            "bin {}: nonzero cross phase, im {}",
            bin,
            cross.im
        );
    }
}

/// Spectrum-splitting regime: four core runs assemble one spectrum, and the
/// output count scales linearly with the input
#[test]
fn test_splitting_regime_counts() {
    let config = SpectrometerConfig {
        fft_points: 4_096,
        integ_seconds: 1.0,
        samplingfreq: 32_768.0,
        fft_overlap_factor: 1,
        window: WindowFunction::None,
        bits_per_sample: 8,
        source_channels: 1,
        max_rawbuf_bytes: 8_448,
        ..SpectrometerConfig::default()
    };
    let settings = Arc::new(Settings::derive(&config, 1).unwrap());
    assert_eq!(settings.buffers_per_spectrum, 4);
    assert_eq!(settings.spectra_per_buffer, 0);
    assert_eq!(settings.rawbuf_size, 8_192);

    for &(buffers, expected_spectra) in &[(4usize, 1usize), (8, 2)] {
        let capture = Capture::default();
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&settings),
            vec![Box::new(VecSource::new(vec![
                1u8;
                buffers * settings.rawbuf_size
            ]))],
            vec![Box::new(CaptureSink(capture.clone()))],
            Vec::new(),
            None,
        )
        .unwrap();
        let report = dispatcher.run();
        assert_eq!(report.spectra, expected_spectra, "{} buffers", buffers);
        assert_eq!(
            capture.reals().len(),
            expected_spectra * settings.fft_ssb_points
        );
        // DC input: the assembled spectrum sums the four partial averages
        let spectrum = capture.reals();
        assert!((spectrum[0] - 4.0 * 4096.0 * 4096.0).abs() < 64.0);
    }
}

/// Several complete spectra from one core run, spread over two workers, stay
/// in time order and identical for a stationary input
#[test]
fn test_multicore_packing_order() {
    let config = SpectrometerConfig {
        num_cores: 2,
        fft_points: 1024,
        integ_seconds: 1.0,
        samplingfreq: 10_240.0,
        fft_overlap_factor: 1,
        window: WindowFunction::None,
        bits_per_sample: 8,
        source_channels: 1,
        max_rawbuf_bytes: 2 * 16_384,
        ..SpectrometerConfig::default()
    };
    let settings = Arc::new(Settings::derive(&config, 1).unwrap());
    assert_eq!(settings.spectra_per_buffer, 1);

    let capture = Capture::default();
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&settings),
        vec![Box::new(VecSource::new(vec![1u8; 4 * 10_240]))],
        vec![Box::new(CaptureSink(capture.clone()))],
        Vec::new(),
        None,
    )
    .unwrap();
    let report = dispatcher.run();

    assert_eq!(report.spectra, 4);
    let all = capture.reals();
    assert_eq!(all.len(), 4 * settings.fft_ssb_points);
    let first = &all[..settings.fft_ssb_points];
    for spectrum in all.chunks_exact(settings.fft_ssb_points).skip(1) {
        assert_eq!(spectrum, first);
    }
}

/// PCal vectors flow through the worker into the PCal sink: a single tone
/// on the comb grid dominates its tone bin
#[test]
fn test_pipeline_pcal_extraction() {
    let config = SpectrometerConfig {
        fft_points: 1024,
        integ_seconds: 1.0,
        samplingfreq: 16_384.0,
        fft_overlap_factor: 1,
        window: WindowFunction::None,
        bits_per_sample: 8,
        source_channels: 1,
        extract_pcal: true,
        pcal_spacing_hz: 512.0,
        pcal_offset_hz: 0.0,
        max_rawbuf_bytes: 32_768,
        ..SpectrometerConfig::default()
    };
    let settings = Arc::new(Settings::derive(&config, 1).unwrap());
    assert!(settings.extract_pcal);
    assert_eq!(settings.pcal_tonebins, 16);

    // a cosine at 1024 Hz = tone bin 2 of the 512 Hz comb; 64 cycles over
    // the 1024-point DFT keeps it on both grids
    let data = cosine_bytes(100.0, 64, 1024, 16_384);
    let spectrum_sink = Capture::default();
    let pcal_sink = Capture::default();
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&settings),
        vec![Box::new(VecSource::new(data))],
        vec![Box::new(CaptureSink(spectrum_sink.clone()))],
        vec![Box::new(CaptureSink(pcal_sink.clone()))],
        None,
    )
    .unwrap();
    let report = dispatcher.run();
    assert_eq!(report.spectra, 1);

    let tones = pcal_sink.complexes();
    assert_eq!(tones.len(), settings.pcal_tonebins);
    let driven = tones[2].norm();
    assert!(driven > 1.0, "driven tone too weak: {}", driven);
    for (bin, tone) in tones.iter().enumerate() {
        if bin != 2 {
            assert!(
                tone.norm() < 0.05 * driven,
                "tone {} magnitude {} vs driven {}",
                bin,
                tone.norm(),
                driven
            );
        }
    }
}
