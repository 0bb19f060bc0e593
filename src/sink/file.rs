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
//! Binary and ASCII spectrum files
//!

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use num_complex::Complex32;

use crate::config::SinkFormat;
use crate::error::Error;
use crate::sink::DataSink;
use crate::Result;

/// A file sink writing either little-endian float32 words or one bin per
/// text line
pub struct FileSink {
    writer: BufWriter<File>,
    format: SinkFormat,
    uri: String,
}

impl FileSink {
    /// Creates (truncating) the output file
    pub fn create<P: AsRef<Path>>(path: P, format: SinkFormat) -> Result<FileSink> {
        let uri = path.as_ref().display().to_string();
        let file = File::create(path.as_ref()).map_err(|e| {
            error!("could not open output file {}: {}", uri, e);
            Error::Io(e)
        })?;
        Ok(FileSink {
            writer: BufWriter::new(file),
            format,
            uri,
        })
    }

    fn write_real_inner(&mut self, bins: &[f32]) -> std::io::Result<usize> {
        match self.format {
            SinkFormat::Binary => {
                for &value in bins {
                    self.writer.write_f32::<LittleEndian>(value)?;
                }
            }
            SinkFormat::Ascii => {
                writeln!(self.writer, "// FFT bins 0..{} + Nyquist", bins.len() - 1)?;
                for &value in bins {
                    writeln!(self.writer, "{:.12e}", value)?;
                }
            }
        }
        self.writer.flush()?;
        Ok(bins.len() * size_of::<f32>())
    }

    fn write_complex_inner(&mut self, bins: &[Complex32]) -> std::io::Result<usize> {
        match self.format {
            SinkFormat::Binary => {
                for value in bins {
                    self.writer.write_f32::<LittleEndian>(value.re)?;
                    self.writer.write_f32::<LittleEndian>(value.im)?;
                }
            }
            SinkFormat::Ascii => {
                writeln!(self.writer, "// complex points = {}", bins.len())?;
                for value in bins {
                    writeln!(self.writer, "{:.12e}\t{:.12e}", value.re, value.im)?;
                }
            }
        }
        self.writer.flush()?;
        Ok(bins.len() * 2 * size_of::<f32>())
    }
}

impl DataSink for FileSink {
    fn write_real(&mut self, bins: &[f32]) -> usize {
        if bins.is_empty() {
            return 0;
        }
        match self.write_real_inner(bins) {
            Ok(written) => written,
            Err(e) => {
                error!("Write I/O error on {}: {}", self.uri, e);
                0
            }
        }
    }

    fn write_complex(&mut self, bins: &[Complex32]) -> usize {
        if bins.is_empty() {
            return 0;
        }
        match self.write_complex_inner(bins) {
            Ok(written) => written,
            Err(e) => {
                error!("Write I/O error on {}: {}", self.uri, e);
                0
            }
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("could not flush {}: {}", self.uri, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_binary_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.bin");
        {
            let mut sink = FileSink::create(&path, SinkFormat::Binary).unwrap();
            let written = sink.write_real(&[1.0, -2.5]);
            assert_eq!(written, 8);
            sink.close();
        }
        let mut bytes = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-2.5f32).to_le_bytes());
    }

    #[test]
    fn test_binary_complex_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xpol.bin");
        {
            let mut sink = FileSink::create(&path, SinkFormat::Binary).unwrap();
            let written = sink.write_complex(&[Complex32::new(0.5, -0.25)]);
            assert_eq!(written, 8);
            sink.close();
        }
        let mut bytes = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(&bytes[0..4], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-0.25f32).to_le_bytes());
    }

    #[test]
    fn test_ascii_one_bin_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.txt");
        {
            let mut sink = FileSink::create(&path, SinkFormat::Ascii).unwrap();
            sink.write_real(&[1.0, 2.0, 3.0]);
            sink.close();
        }
        let mut text = String::new();
        File::open(&path).unwrap().read_to_string(&mut text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("//"));
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("1.0"));
    }
}
