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
//! Spectrometer error kinds
//!

use std::fmt;
use std::io;

/// An error from spectrometer setup or processing
///
/// Setup-phase errors abort before any worker starts. Runtime errors are
/// logged and counted by the component that observed them; only decode
/// errors from the external stream decoder terminate the input early.
#[derive(Debug)]
pub enum Error {
    /// A configuration file key is missing or has an unusable value
    ConfigInvalid(String),
    /// An input data resource could not be opened
    SourceOpenFailed(String),
    /// No unpacker matches the configured format/bits/channels combination
    FormatUnsupported(String),
    /// The external stream decoder refused the data
    Decode(String),
    /// An underlying I/O operation failed
    Io(io::Error),
    /// A read returned fewer bytes than requested (counted toward EOF)
    ShortRead {
        /// Bytes requested from the source
        requested: usize,
        /// Bytes actually delivered
        got: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigInvalid(what) => write!(f, "invalid configuration: {}", what),
            Error::SourceOpenFailed(uri) => write!(f, "could not open input '{}'", uri),
            Error::FormatUnsupported(what) => write!(f, "unsupported source format: {}", what),
            Error::Decode(what) => write!(f, "stream decoder error: {}", what),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::ShortRead { requested, got } => {
                write!(f, "short read: {} of {} bytes", got, requested)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
