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
//! Raw sample sources
//!

mod file;

pub use self::file::FileSource;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::buffer::Buffer;

/// A streamed producer of raw sample bytes
///
/// `read` fills up to `buf.allocated()` bytes, sets the buffer length and
/// returns the byte count. I/O problems are logged and surface as short
/// reads; end of data is sticky.
pub trait DataSource: Send {
    /// Fills the buffer with new data, returning the bytes read
    fn read(&mut self, buf: &mut Buffer) -> usize;

    /// True once the source has delivered its last byte
    fn eof(&self) -> bool;

    /// Releases the underlying resource
    fn close(&mut self);
}

/// Start-timing diagnostics written next to the data products
///
/// Holds the first-header timestamps in a two-line format: a `//` comment
/// describing the fields, then `mjd second ns`.
pub struct TimingLog {
    writer: Option<BufWriter<File>>,
}

impl TimingLog {
    /// Creates the log file, degrading to a no-op sink when the file cannot
    /// be created
    pub fn create<P: AsRef<Path>>(path: P) -> TimingLog {
        match File::create(path.as_ref()) {
            Ok(file) => TimingLog {
                writer: Some(BufWriter::new(file)),
            },
            Err(e) => {
                error!(
                    "could not create timing log {}: {}",
                    path.as_ref().display(),
                    e
                );
                TimingLog { writer: None }
            }
        }
    }

    /// A log that discards everything
    pub fn sink() -> TimingLog {
        TimingLog { writer: None }
    }

    /// Writes a `//`-prefixed description line
    pub fn comment(&mut self, text: &str) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writeln!(writer, "// {}", text) {
                error!("timing log write failed: {}", e);
            }
        }
    }

    /// Writes an `mjd second ns` timestamp line
    pub fn timestamp(&mut self, mjd: i32, second: i32, ns: f64) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writeln!(writer, "{} {} {}", mjd, second, ns) {
                error!("timing log write failed: {}", e);
            }
        }
    }
}

impl Drop for TimingLog {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}
