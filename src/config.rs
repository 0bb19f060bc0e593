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
//! Run configuration from the `[Spectrometer]` section of an INI file
//!

use std::path::Path;
use std::str::FromStr;

use ini::Ini;

use crate::error::Error;
use crate::window::WindowFunction;
use crate::Result;

/// Recognised input data formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Headerless signed samples
    RawSigned,
    /// Headerless unsigned samples
    RawUnsigned,
    /// Mark5B disk frames, 16-byte headers plus 10000-byte payloads
    Mark5B,
    /// iBOB UDP captures, 4-byte sequence headers plus 4096-byte payloads
    IBob,
    /// VDIF frames
    Vdif,
    /// VLBA data-replacement recording, decoded externally
    Vlba,
    /// MkIV data-replacement recording, decoded externally
    MkIv,
    /// Mk5B data-replacement recording, decoded externally
    Mk5bRepl,
    /// Recognised but unsupported
    Maxim,
}

impl InputFormat {
    /// Parses a format name: case-insensitive, with prefix matching for the
    /// VLBA/MkIV/Mk5B family whose names carry a trailing mode string
    /// (for example `MKIV1_4-512-8-2`).
    pub fn parse(s: &str) -> Option<InputFormat> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "rawsigned" => return Some(InputFormat::RawSigned),
            "rawunsigned" => return Some(InputFormat::RawUnsigned),
            "mark5b" => return Some(InputFormat::Mark5B),
            "ibob" => return Some(InputFormat::IBob),
            "vdif" => return Some(InputFormat::Vdif),
            "maxim" => return Some(InputFormat::Maxim),
            _ => {}
        }
        if lower.starts_with("vlba") {
            Some(InputFormat::Vlba)
        } else if lower.starts_with("mkiv") {
            Some(InputFormat::MkIv)
        } else if lower.starts_with("mk5b") {
            Some(InputFormat::Mk5bRepl)
        } else {
            None
        }
    }

    /// Returns true for formats whose frames carry separate headers that the
    /// source strips before the bytes reach the unpacker
    pub fn uses_frames(self) -> bool {
        matches!(
            self,
            InputFormat::Mark5B | InputFormat::Vdif | InputFormat::IBob
        )
    }

    /// Returns true for formats where header bits replace sample bits and an
    /// external decoder reconstructs the stream
    pub fn is_data_replacement(self) -> bool {
        matches!(
            self,
            InputFormat::Vlba | InputFormat::MkIv | InputFormat::Mk5bRepl
        )
    }
}

/// Output encoding of the spectrum sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// Little-endian float32 words
    Binary,
    /// One bin per text line
    Ascii,
}

impl FromStr for SinkFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(SinkFormat::Binary),
            "ascii" => Ok(SinkFormat::Ascii),
            _ => Err("expected Binary or ASCII"),
        }
    }
}

/// Default per-source raw buffer ceiling when MaxSourceBufferMB is absent
const DEFAULT_MAX_RAWBUF_BYTES: usize = 16 * 1024 * 1024;

/// User-level run configuration, immutable after startup
///
/// Field defaults follow the original spectrometer; only `BaseFilename1` has
/// no default.
#[derive(Debug, Clone)]
pub struct SpectrometerConfig {
    /// Worker core count
    pub num_cores: usize,
    /// Per-core raw buffer byte ceiling (already halved for double buffering
    /// when configured through MaxSourceBufferMB)
    pub max_rawbuf_bytes: usize,
    /// DFT length
    pub fft_points: usize,
    /// Integration window in seconds
    pub integ_seconds: f64,
    /// Overlap denominator: 1 = no overlap, 2 = 50%
    pub fft_overlap_factor: usize,
    /// Window function
    pub window: WindowFunction,
    /// Sampling frequency in Hz (twice the configured bandwidth)
    pub samplingfreq: f64,
    /// PCal comb offset from the n*spacing grid, Hz
    pub pcal_offset_hz: f64,
    /// PCal comb spacing, Hz
    pub pcal_spacing_hz: f64,
    /// Bits per sample in the raw input
    pub bits_per_sample: usize,
    /// True when channel 0 occupies the least significant bits
    pub channel_order_increasing: bool,
    /// Channels multiplexed in each source
    pub source_channels: usize,
    /// 1-based channel selected from input file 1
    pub use_channel_file1: usize,
    /// 1-based channel selected from input file 2
    pub use_channel_file2: usize,
    /// Seconds to skip from the first integer second
    pub seconds_to_skip: usize,
    /// Extract the multi-tone phase calibration vector
    pub extract_pcal: bool,
    /// Compute the cross-polarization spectrum
    pub calc_xpol: bool,
    /// Costas loop flag, parsed but not built
    pub costas_loop: bool,
    /// Live plotting flag, parsed but served by external sinks only
    pub plot_progress: bool,
    /// Input format
    pub source_format: InputFormat,
    /// Input format exactly as configured, kept for the external decoder
    pub source_format_str: String,
    /// Output encoding
    pub sink_format: SinkFormat,
    /// Output basename pattern for input 1, with placeholders
    pub basefilename1_pattern: String,
    /// Output basename pattern for input 2, with placeholders
    pub basefilename2_pattern: String,
}

impl Default for SpectrometerConfig {
    fn default() -> Self {
        SpectrometerConfig {
            num_cores: 1,
            max_rawbuf_bytes: DEFAULT_MAX_RAWBUF_BYTES,
            fft_points: 320_000,
            integ_seconds: 20.0,
            fft_overlap_factor: 2,
            window: WindowFunction::Cosine2,
            samplingfreq: 16e6,
            pcal_offset_hz: 10e3,
            pcal_spacing_hz: 1e6,
            bits_per_sample: 8,
            channel_order_increasing: false,
            source_channels: 1,
            use_channel_file1: 1,
            use_channel_file2: 1,
            seconds_to_skip: 0,
            extract_pcal: false,
            calc_xpol: false,
            costas_loop: false,
            plot_progress: false,
            source_format: InputFormat::RawSigned,
            source_format_str: "RawSigned".to_string(),
            sink_format: SinkFormat::Binary,
            basefilename1_pattern:
                "ProjDate_StationID_Instrument_ScanNo_%fftpoints%_%integrtime%_%channel%"
                    .to_string(),
            basefilename2_pattern: String::new(),
        }
    }
}

impl SpectrometerConfig {
    /// Loads the `[Spectrometer]` section of an INI file
    pub fn from_ini<P: AsRef<Path>>(path: P) -> Result<Self> {
        let ini = Ini::load_from_file(path.as_ref())
            .map_err(|e| Error::ConfigInvalid(format!("INI not readable: {}", e)))?;
        let section = ini.section(Some("Spectrometer")).ok_or_else(|| {
            Error::ConfigInvalid("missing [Spectrometer] section".to_string())
        })?;

        let mut config = SpectrometerConfig::default();

        if let Some(value) = section.get("NumCPUCores") {
            config.num_cores = parse_key("NumCPUCores", value)?;
        }
        if let Some(value) = section.get("MaxSourceBufferMB") {
            let megabytes: usize = parse_key("MaxSourceBufferMB", value)?;
            // halved: each source is double-buffered
            config.max_rawbuf_bytes = megabytes * 1024 * 1024 / 2;
        }
        if let Some(value) = section.get("FFTpoints") {
            config.fft_points = parse_key("FFTpoints", value)?;
        }
        if let Some(value) = section.get("FFTIntegrationTimeSec") {
            config.integ_seconds = parse_key("FFTIntegrationTimeSec", value)?;
        }
        if let Some(value) = section.get("FFToverlapFactor") {
            config.fft_overlap_factor = parse_key("FFToverlapFactor", value)?;
        }
        if let Some(value) = section.get("WindowType") {
            config.window = value.parse().unwrap_or_else(|_| {
                warn!(
                    "Window function '{}' not supported, will use Cosine2 instead",
                    value
                );
                WindowFunction::Cosine2
            });
        }
        if let Some(value) = section.get("BandwidthHz") {
            let bandwidth: f64 = parse_key("BandwidthHz", value)?;
            config.samplingfreq = 2.0 * bandwidth;
        }
        if let Some(value) = section.get("PCalOffsetHz") {
            config.pcal_offset_hz = parse_key("PCalOffsetHz", value)?;
        }
        if let Some(value) = section.get("PCalHarmonicsHz") {
            config.pcal_spacing_hz = parse_key("PCalHarmonicsHz", value)?;
        }
        if let Some(value) = section.get("SourceFormat") {
            config.source_format = InputFormat::parse(value).ok_or_else(|| {
                Error::ConfigInvalid(format!("unknown SourceFormat '{}'", value))
            })?;
            config.source_format_str = value.to_string();
        }
        if let Some(value) = section.get("SourceSkipSeconds") {
            config.seconds_to_skip = parse_key("SourceSkipSeconds", value)?;
        }
        if let Some(value) = section.get("BitsPerSample") {
            config.bits_per_sample = parse_key("BitsPerSample", value)?;
        }
        if let Some(value) = section.get("ChannelOrderIncreasing") {
            config.channel_order_increasing = parse_bool("ChannelOrderIncreasing", value)?;
        }
        if let Some(value) = section.get("SourceChannels") {
            config.source_channels = parse_key("SourceChannels", value)?;
        }
        if let Some(value) = section.get("UseFile1Channel") {
            config.use_channel_file1 = parse_key("UseFile1Channel", value)?;
        }
        if let Some(value) = section.get("UseFile2Channel") {
            config.use_channel_file2 = parse_key("UseFile2Channel", value)?;
        }
        if let Some(value) = section.get("ExtractPCal") {
            config.extract_pcal = parse_bool("ExtractPCal", value)?;
        }
        if let Some(value) = section.get("DoCrossPolarization") {
            config.calc_xpol = parse_bool("DoCrossPolarization", value)?;
        }
        if let Some(value) = section.get("DoCostasLoop") {
            config.costas_loop = parse_bool("DoCostasLoop", value)?;
        }
        if let Some(value) = section.get("PlotProgress") {
            config.plot_progress = parse_bool("PlotProgress", value)?;
        }
        if let Some(value) = section.get("SinkFormat") {
            config.sink_format = value
                .parse()
                .map_err(|e| Error::ConfigInvalid(format!("SinkFormat: {}", e)))?;
        }
        match section.get("BaseFilename1") {
            Some(value) => config.basefilename1_pattern = value.to_string(),
            None => {
                return Err(Error::ConfigInvalid(
                    "BaseFilename1 setting is missing from the INI file".to_string(),
                ))
            }
        }
        match section.get("BaseFilename2") {
            Some(value) => config.basefilename2_pattern = value.to_string(),
            None => {
                warn!("No BaseFilename2 specified in INI, will use 'BaseFilename1_file2'");
                config.basefilename2_pattern =
                    format!("{}_file2", config.basefilename1_pattern);
            }
        }

        Ok(config)
    }

    /// Expands a basename pattern for the given input file number (1 or 2)
    ///
    /// `%fftpoints%`, `%integrtime%` and `%channel%` are substituted and
    /// spaces become underscores.
    pub fn expand_basename(&self, file_nr: usize) -> String {
        let pattern = if file_nr == 1 {
            &self.basefilename1_pattern
        } else {
            &self.basefilename2_pattern
        };
        let channel = if file_nr == 1 {
            self.use_channel_file1
        } else {
            self.use_channel_file2
        };
        pattern
            .replace(' ', "_")
            .replace("%fftpoints%", &self.fft_points.to_string())
            .replace("%integrtime%", &(self.integ_seconds as u64).to_string())
            .replace("%channel%", &channel.to_string())
    }
}

/// Parses one INI value, naming the key in the error
fn parse_key<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        Error::ConfigInvalid(format!("key {} has unusable value '{}': {}", key, value, e))
    })
}

/// Parses yes/no/true/false, case-insensitively
fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(Error::ConfigInvalid(format!(
            "key {} should be yes/no or true/false, got '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_parse() {
        assert_eq!(InputFormat::parse("rawsigned"), Some(InputFormat::RawSigned));
        assert_eq!(InputFormat::parse("Mark5B"), Some(InputFormat::Mark5B));
        assert_eq!(InputFormat::parse("MKIV1_4-512-8-2"), Some(InputFormat::MkIv));
        assert_eq!(InputFormat::parse("VLBA1_2-256-4-2"), Some(InputFormat::Vlba));
        assert_eq!(InputFormat::parse("Mk5B-512-8-2"), Some(InputFormat::Mk5bRepl));
        assert_eq!(InputFormat::parse("maxim"), Some(InputFormat::Maxim));
        assert_eq!(InputFormat::parse("what"), None);
    }

    #[test]
    fn test_basename_expansion() {
        let config = SpectrometerConfig {
            fft_points: 1024,
            integ_seconds: 20.0,
            use_channel_file1: 3,
            basefilename1_pattern: "Obs 01_%fftpoints%_%integrtime%_%channel%".to_string(),
            ..SpectrometerConfig::default()
        };
        assert_eq!(config.expand_basename(1), "Obs_01_1024_20_3");
    }

    #[test]
    fn test_ini_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[Spectrometer]\n\
             NumCPUCores = 2\n\
             FFTpoints = 1024\n\
             FFTIntegrationTimeSec = 1\n\
             FFToverlapFactor = 1\n\
             WindowType = Hann\n\
             BandwidthHz = 8000000\n\
             SourceFormat = Mark5B\n\
             BitsPerSample = 2\n\
             SourceChannels = 4\n\
             ExtractPCal = yes\n\
             SinkFormat = ASCII\n\
             BaseFilename1 = test_%fftpoints%"
        )
        .unwrap();

        let config = SpectrometerConfig::from_ini(file.path()).unwrap();
        assert_eq!(config.num_cores, 2);
        assert_eq!(config.fft_points, 1024);
        assert_eq!(config.window, WindowFunction::Hann);
        assert_eq!(config.samplingfreq, 16e6);
        assert_eq!(config.source_format, InputFormat::Mark5B);
        assert!(config.extract_pcal);
        assert_eq!(config.sink_format, SinkFormat::Ascii);
        assert_eq!(config.basefilename2_pattern, "test_%fftpoints%_file2");
    }

    #[test]
    fn test_missing_basename_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[Spectrometer]\nFFTpoints = 512").unwrap();
        assert!(matches!(
            SpectrometerConfig::from_ini(file.path()),
            Err(Error::ConfigInvalid(_))
        ));
    }
}
