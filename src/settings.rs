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
//! Derived run parameters
//!
//! [`Settings::derive`] turns the user configuration into every byte count
//! and scheduling parameter the pipeline needs, and selects the buffering
//! regime: either several raw buffers are combined into one integrated
//! spectrum (spectrum-splitting) or one raw buffer yields several complete
//! spectra (spectrum-packing). Exactly one of `buffers_per_spectrum` and
//! `spectra_per_buffer` is nonzero.
//!

use crate::config::{InputFormat, SinkFormat, SpectrometerConfig};
use crate::error::Error;
use crate::window::WindowFunction;
use crate::Result;

/// Greatest common divisor
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// All run parameters, immutable after startup
#[derive(Debug, Clone)]
pub struct Settings {
    /// Worker core count
    pub num_cores: usize,
    /// Number of input streams, 1 or 2
    pub num_sources: usize,
    /// Number of cross-polarization pairs, 0 or 1
    pub num_xpols: usize,
    /// Number of spectrum sinks: one auto sink per source plus the xpol sink
    pub num_sinks: usize,

    /// DFT length
    pub fft_points: usize,
    /// Single-sideband points including Nyquist, `fft_points/2 + 1`
    pub fft_ssb_points: usize,
    /// Overlap denominator
    pub fft_overlap_factor: usize,
    /// Fresh samples shifted in per overlapped DFT
    pub fft_overlap_points: usize,
    /// Non-overlapped DFTs summed into one integrated spectrum
    pub averaged_ffts: usize,
    /// Non-overlapped DFTs a core does in one run
    pub core_averaged_ffts: usize,
    /// Overlapped DFTs a core does for one full or partial spectrum
    pub core_overlapped_ffts: usize,

    /// Sampling frequency in Hz
    pub samplingfreq: f64,
    /// Integration window in seconds
    pub integ_seconds: f64,
    /// Window function
    pub window: WindowFunction,

    /// Bits per sample
    pub bits_per_sample: usize,
    /// Channels multiplexed in each source
    pub source_channels: usize,
    /// True when channel 0 occupies the least significant bits
    pub channel_order_increasing: bool,
    /// 0-based channel selected per source
    pub use_channel: [usize; 2],

    /// Input bytes consumed per single-channel sample
    pub rawbytes_per_channelsample: f64,
    /// Raw bytes holding one full DFT window of samples
    pub raw_fullfft_bytes: usize,
    /// Raw bytes holding the fresh part of one overlapped DFT
    pub raw_overlap_bytes: usize,
    /// Bytes of one real single-sideband spectrum
    pub fft_bytes_ssb: usize,
    /// Bytes of one complex single-sideband cross spectrum
    pub fft_bytes_xpol: usize,

    /// Raw buffer bytes handed to each core per run
    pub rawbuf_size: usize,
    /// Complete spectra produced by one core run (packing regime, else 0)
    pub spectra_per_buffer: usize,
    /// Core runs combined into one spectrum (splitting regime, else 0)
    pub buffers_per_spectrum: usize,

    /// Extract the phase calibration vector
    pub extract_pcal: bool,
    /// PCal comb offset in Hz
    pub pcal_offset_hz: f64,
    /// PCal comb spacing in Hz
    pub pcal_spacing_hz: f64,
    /// Complex tone values per extracted PCal vector
    pub pcal_tonebins: usize,
    /// Input-sample period of the PCal comb signal
    pub pcal_rotator_len: usize,
    /// PCal signal periods per DFT window
    pub pcal_pulses_per_fft: usize,
    /// Bytes of one PCal result vector
    pub pcal_result_bytes: usize,

    /// Input format
    pub source_format: InputFormat,
    /// Input format exactly as configured
    pub source_format_str: String,
    /// Output encoding
    pub sink_format: SinkFormat,
    /// Seconds to skip from the first integer second
    pub seconds_to_skip: usize,

    /// Expanded output basename for input 1
    pub basefilename1: String,
    /// Expanded output basename for input 2
    pub basefilename2: String,
}

impl Settings {
    /// Derives all run parameters from the configuration and the number of
    /// input files given on the command line
    pub fn derive(config: &SpectrometerConfig, num_inputs: usize) -> Result<Settings> {
        if num_inputs == 0 || num_inputs > 2 {
            return Err(Error::ConfigInvalid(format!(
                "expected 1 or 2 input files, got {}",
                num_inputs
            )));
        }
        if config.num_cores < 1 {
            return Err(Error::ConfigInvalid("NumCPUCores must be >= 1".to_string()));
        }
        if config.fft_points < 2 || config.fft_points % 2 != 0 {
            return Err(Error::ConfigInvalid(format!(
                "FFTpoints {} must be even and >= 2",
                config.fft_points
            )));
        }
        if config.fft_overlap_factor < 1 {
            return Err(Error::ConfigInvalid(
                "FFToverlapFactor must be >= 1".to_string(),
            ));
        }
        if config.use_channel_file1 < 1 || config.use_channel_file1 > config.source_channels {
            return Err(Error::ConfigInvalid(format!(
                "UseFile1Channel setting {} is an invalid channel number",
                config.use_channel_file1
            )));
        }
        if config.use_channel_file2 < 1 || config.use_channel_file2 > config.source_channels {
            return Err(Error::ConfigInvalid(format!(
                "UseFile2Channel setting {} is an invalid channel number",
                config.use_channel_file2
            )));
        }
        if config.source_format == InputFormat::Maxim {
            return Err(Error::FormatUnsupported(
                "Maxim input has no unpacking method".to_string(),
            ));
        }

        let mut calc_xpol = config.calc_xpol;
        if calc_xpol && num_inputs != 2 {
            warn!(
                "only one of two input files provided, disabling cross-pol spectrum calculation"
            );
            calc_xpol = false;
        }

        let fft_points = config.fft_points;
        let averaged_ffts =
            (config.samplingfreq * config.integ_seconds / fft_points as f64) as usize;
        if averaged_ffts < 1 {
            return Err(Error::ConfigInvalid(format!(
                "integration time {}s holds less than one {}-point DFT",
                config.integ_seconds, fft_points
            )));
        }

        let rawbytes_per_channelsample =
            (config.bits_per_sample * config.source_channels) as f64 / 8.0;
        let raw_fullfft_bytes = (fft_points as f64 * rawbytes_per_channelsample) as usize;
        let fft_overlap_points = fft_points / config.fft_overlap_factor;
        let raw_overlap_bytes =
            (fft_overlap_points as f64 * rawbytes_per_channelsample) as usize;
        if raw_fullfft_bytes == 0 || raw_overlap_bytes == 0 {
            return Err(Error::ConfigInvalid(
                "DFT window shorter than one raw byte".to_string(),
            ));
        }

        // Even split of the buffer budget across CPU cores
        let max_rawbuf_size = config.max_rawbuf_bytes / config.num_cores;

        // Regime selection: either several buffers make one spectrum or one
        // buffer holds several spectra. The chosen buffer size never exceeds
        // the per-core budget.
        let spectrum_bytes = raw_fullfft_bytes * averaged_ffts;
        let mut rawbuf_size;
        let spectra_per_buffer;
        let buffers_per_spectrum;
        let core_averaged_ffts;
        if spectrum_bytes > max_rawbuf_size {
            if raw_fullfft_bytes > max_rawbuf_size {
                return Err(Error::ConfigInvalid(format!(
                    "a single {}-point DFT window ({} bytes) exceeds the per-core buffer budget of {} bytes",
                    fft_points, raw_fullfft_bytes, max_rawbuf_size
                )));
            }
            // spectrum input too big: start with one DFT per buffer and keep
            // doubling while the doubled buffer still fits
            let mut buffers = averaged_ffts;
            let mut ffts_per_buffer = 1;
            rawbuf_size = raw_fullfft_bytes;
            while rawbuf_size * 2 <= max_rawbuf_size && buffers % 2 == 0 {
                rawbuf_size *= 2;
                buffers /= 2;
                ffts_per_buffer *= 2;
            }
            spectra_per_buffer = 0;
            buffers_per_spectrum = buffers;
            core_averaged_ffts = ffts_per_buffer;
        } else {
            // one full spectrum fits: try to fit even more spectra
            let mut spectra = 1;
            rawbuf_size = spectrum_bytes;
            while rawbuf_size * 2 <= max_rawbuf_size {
                rawbuf_size *= 2;
                spectra *= 2;
            }
            spectra_per_buffer = spectra;
            buffers_per_spectrum = 0;
            core_averaged_ffts = averaged_ffts;
        }

        let core_overlapped_ffts =
            config.fft_overlap_factor * core_averaged_ffts - (config.fft_overlap_factor - 1);

        let fft_ssb_points = fft_points / 2 + 1;
        let fft_bytes_ssb = fft_ssb_points * size_of::<f32>();
        let fft_bytes_xpol = 2 * fft_bytes_ssb;

        // PCal geometry; the comb must repeat an integer number of times in
        // one DFT window so that per-window extraction stays phase-coherent
        let mut extract_pcal = config.extract_pcal;
        let mut pcal_tonebins = 0;
        let mut pcal_rotator_len = 0;
        let mut pcal_pulses_per_fft = 0;
        if extract_pcal {
            let fs = config.samplingfreq as u64;
            let bandwidth = config.samplingfreq / 2.0;
            let spacing = config.pcal_spacing_hz as u64;
            let offset = config.pcal_offset_hz as u64;
            if fs == 0 || spacing == 0 {
                return Err(Error::ConfigInvalid(
                    "PCal extraction needs nonzero sampling frequency and spacing".to_string(),
                ));
            }
            pcal_tonebins = if offset == 0 {
                (bandwidth / config.pcal_spacing_hz) as usize
            } else {
                ((bandwidth - config.pcal_offset_hz) / config.pcal_spacing_hz) as usize + 1
            };
            pcal_rotator_len = if offset == 0 {
                (fs / gcd(spacing, fs)) as usize
            } else {
                (fs / gcd(offset, fs)) as usize
            };
            if fft_points % pcal_rotator_len != 0 {
                warn!(
                    "disabling PCal extraction because {}-length vectors did not fit evenly into {} DFT points",
                    pcal_rotator_len, fft_points
                );
                extract_pcal = false;
                pcal_tonebins = 0;
                pcal_rotator_len = 0;
            } else {
                pcal_pulses_per_fft = fft_points / pcal_rotator_len;
            }
        }
        let pcal_result_bytes = pcal_tonebins * 2 * size_of::<f32>();

        let num_xpols = if calc_xpol { 1 } else { 0 };

        Ok(Settings {
            num_cores: config.num_cores,
            num_sources: num_inputs,
            num_xpols,
            num_sinks: num_inputs + num_xpols,
            fft_points,
            fft_ssb_points,
            fft_overlap_factor: config.fft_overlap_factor,
            fft_overlap_points,
            averaged_ffts,
            core_averaged_ffts,
            core_overlapped_ffts,
            samplingfreq: config.samplingfreq,
            integ_seconds: config.integ_seconds,
            window: config.window,
            bits_per_sample: config.bits_per_sample,
            source_channels: config.source_channels,
            channel_order_increasing: config.channel_order_increasing,
            use_channel: [
                config.use_channel_file1 - 1,
                config.use_channel_file2 - 1,
            ],
            rawbytes_per_channelsample,
            raw_fullfft_bytes,
            raw_overlap_bytes,
            fft_bytes_ssb,
            fft_bytes_xpol,
            rawbuf_size,
            spectra_per_buffer,
            buffers_per_spectrum,
            extract_pcal,
            pcal_offset_hz: config.pcal_offset_hz,
            pcal_spacing_hz: config.pcal_spacing_hz,
            pcal_tonebins,
            pcal_rotator_len,
            pcal_pulses_per_fft,
            pcal_result_bytes,
            source_format: config.source_format,
            source_format_str: config.source_format_str.clone(),
            sink_format: config.sink_format,
            seconds_to_skip: config.seconds_to_skip,
            basefilename1: config.expand_basename(1),
            basefilename2: config.expand_basename(2),
        })
    }

    /// Logs the run summary in the original spectrometer's shape
    pub fn log_summary(&self) {
        info!(
            "Core setup   : {} parallel processing thread(s)",
            self.num_cores
        );
        info!(
            "File format  : {} bits/sample, {} channels, selected channel {} of input 1, channel {} of input 2",
            self.bits_per_sample,
            self.source_channels,
            self.use_channel[0] + 1,
            self.use_channel[1] + 1
        );
        info!(
            "Analog info  : {} kHz bandwidth, {} kHz sampling rate, dt={:e}",
            0.5 * self.samplingfreq / 1e3,
            self.samplingfreq / 1e3,
            1.0 / self.samplingfreq
        );
        info!(
            "DFT info     : {} points, {} Hz resolution, {}-fold averaging ({}s), {:.0}% overlap",
            self.fft_points,
            self.samplingfreq / self.fft_points as f64,
            self.averaged_ffts,
            (self.averaged_ffts * self.fft_points) as f64 / self.samplingfreq,
            100.0 * (1.0 - 1.0 / self.fft_overlap_factor as f64)
        );
        if self.extract_pcal {
            info!(
                "PCal extract : on, {} Hz offset, {} tone bins, period {}, {} pulses per DFT",
                self.pcal_offset_hz,
                self.pcal_tonebins,
                self.pcal_rotator_len,
                self.pcal_pulses_per_fft
            );
        } else {
            info!("PCal extract : off");
        }
        info!(
            "Cross-pol    : {}",
            if self.num_xpols > 0 { "on" } else { "off" }
        );
        info!(
            "Raw buffers  : {:.1} kB per source",
            self.rawbuf_size as f64 / 1024.0
        );
        if self.buffers_per_spectrum > 0 {
            info!(
                "Buffer use   : 1 averaged spectrum consumes {} core runs",
                self.buffers_per_spectrum
            );
        }
        if self.spectra_per_buffer > 0 {
            info!(
                "Buffer use   : 1 core run gives {} averaged spectra",
                self.spectra_per_buffer
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SpectrometerConfig {
        SpectrometerConfig {
            fft_points: 1024,
            integ_seconds: 1.0,
            fft_overlap_factor: 1,
            samplingfreq: 10240.0,
            bits_per_sample: 8,
            source_channels: 1,
            ..SpectrometerConfig::default()
        }
    }

    #[test]
    fn test_packing_regime() {
        let mut config = base_config();
        // one spectrum is 10240 bytes; budget fits exactly two
        config.max_rawbuf_bytes = 2 * 10240 + 100;
        let settings = Settings::derive(&config, 1).unwrap();
        assert_eq!(settings.averaged_ffts, 10);
        assert_eq!(settings.spectra_per_buffer, 2);
        assert_eq!(settings.buffers_per_spectrum, 0);
        assert_eq!(settings.rawbuf_size, 2 * 10240);
        assert_eq!(settings.core_averaged_ffts, 10);
        assert_eq!(settings.core_overlapped_ffts, 10);
    }

    #[test]
    fn test_splitting_regime() {
        // fft_points=65536, averaged_ffts=64, budget sized for 4 runs per
        // spectrum
        let config = SpectrometerConfig {
            fft_points: 65536,
            integ_seconds: 1.0,
            samplingfreq: 65536.0 * 64.0,
            fft_overlap_factor: 1,
            bits_per_sample: 8,
            source_channels: 1,
            max_rawbuf_bytes: 65536 * 16 + 4096,
            ..SpectrometerConfig::default()
        };
        let settings = Settings::derive(&config, 1).unwrap();
        assert_eq!(settings.averaged_ffts, 64);
        assert_eq!(settings.spectra_per_buffer, 0);
        assert_eq!(settings.buffers_per_spectrum, 4);
        assert_eq!(settings.core_averaged_ffts, 16);
        assert!(settings.rawbuf_size <= config.max_rawbuf_bytes);
    }

    #[test]
    fn test_exactly_one_regime_counter() {
        for budget in &[20_000usize, 40_000, 100_000, 1_000_000] {
            let mut config = base_config();
            config.max_rawbuf_bytes = *budget;
            let settings = Settings::derive(&config, 1).unwrap();
            assert_eq!(settings.spectra_per_buffer * settings.buffers_per_spectrum, 0);
            assert!(settings.spectra_per_buffer + settings.buffers_per_spectrum >= 1);
            assert!(settings.rawbuf_size <= *budget);
        }
    }

    #[test]
    fn test_overlap_window_counts() {
        let mut config = base_config();
        config.fft_overlap_factor = 2;
        config.max_rawbuf_bytes = 1 << 20;
        let settings = Settings::derive(&config, 1).unwrap();
        assert_eq!(settings.fft_overlap_points, 512);
        // F*avg - (F-1) overlapped windows per spectrum
        assert_eq!(settings.core_overlapped_ffts, 2 * 10 - 1);
    }

    #[test]
    fn test_single_window_too_large_rejected() {
        let mut config = base_config();
        config.max_rawbuf_bytes = 512;
        assert!(matches!(
            Settings::derive(&config, 1),
            Err(Error::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_pcal_geometry() {
        let config = SpectrometerConfig {
            fft_points: 3200,
            integ_seconds: 1.0,
            samplingfreq: 32e6,
            fft_overlap_factor: 1,
            extract_pcal: true,
            pcal_offset_hz: 10e3,
            pcal_spacing_hz: 1e6,
            max_rawbuf_bytes: 1 << 24,
            ..SpectrometerConfig::default()
        };
        let settings = Settings::derive(&config, 1).unwrap();
        assert!(settings.extract_pcal);
        // fs/gcd(10 kHz, 32 MHz) = 3200
        assert_eq!(settings.pcal_rotator_len, 3200);
        assert_eq!(settings.pcal_pulses_per_fft, 1);
        assert_eq!(settings.pcal_tonebins, 16);
    }

    #[test]
    fn test_pcal_disabled_when_period_does_not_fit() {
        let config = SpectrometerConfig {
            fft_points: 1024,
            integ_seconds: 1.0,
            samplingfreq: 32e6,
            fft_overlap_factor: 1,
            extract_pcal: true,
            pcal_offset_hz: 10e3,
            pcal_spacing_hz: 1e6,
            max_rawbuf_bytes: 1 << 24,
            ..SpectrometerConfig::default()
        };
        let settings = Settings::derive(&config, 1).unwrap();
        assert!(!settings.extract_pcal);
        assert_eq!(settings.pcal_tonebins, 0);
    }

    #[test]
    fn test_xpol_needs_two_inputs() {
        let mut config = base_config();
        config.calc_xpol = true;
        config.max_rawbuf_bytes = 1 << 20;
        let one = Settings::derive(&config, 1).unwrap();
        assert_eq!(one.num_xpols, 0);
        let two = Settings::derive(&config, 2).unwrap();
        assert_eq!(two.num_xpols, 1);
        assert_eq!(two.num_sinks, 3);
    }

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(32_000_000, 510_000), 10_000);
        assert_eq!(gcd(16_000_000, 1_000_000), 1_000_000);
        assert_eq!(gcd(7, 3), 1);
    }
}
