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
//! Spectrum output sinks
//!
//! Write errors are logged per call and never abort the run; a failed write
//! reports zero bytes.
//!

mod file;
mod tee;

pub use self::file::FileSink;
pub use self::tee::TeeSink;

use num_complex::Complex32;

/// A consumer of finished spectra
pub trait DataSink: Send {
    /// Writes a vector of real bins, returning the bytes written
    fn write_real(&mut self, bins: &[f32]) -> usize;

    /// Writes a vector of complex bins, returning the bytes written
    fn write_complex(&mut self, bins: &[Complex32]) -> usize;

    /// Flushes and releases the sink
    fn close(&mut self);
}

/// Suffix of the integrated spectrum output file
pub const SUFFIX_SPECTRUM: &str = "_swspec.bin";
/// Suffix of the cross-polarization spectrum output file
pub const SUFFIX_XPOL: &str = "_xpol_swspec.bin";
/// Suffix of the PCal tone vector output file
pub const SUFFIX_PCAL: &str = "_pcal.bin";
/// Suffix of the run log
pub const SUFFIX_RUNLOG: &str = "_runlog.txt";
/// Suffix of the start-timing diagnostics
pub const SUFFIX_TIMING: &str = "_starttiming.txt";
