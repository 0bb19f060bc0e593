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
//! This library computes integrated power spectra, cross-polarization spectra
//! and multi-tone phase calibration vectors from wideband radio-astronomy
//! baseband recordings in various raw and framed VLBI formats.
//!

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    nonstandard_style,
    rust_2018_idioms
)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

// Public modules
pub mod buffer;
pub mod config;
pub mod decoder;
pub mod dft;
pub mod dispatcher;
pub mod pcal;
pub mod settings;
pub mod sink;
pub mod source;
pub mod unpack;
pub mod window;
pub mod worker;

// Private modules
mod error;

pub use crate::config::SpectrometerConfig;
pub use crate::dispatcher::Dispatcher;
pub use crate::error::Error;
pub use crate::settings::Settings;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
