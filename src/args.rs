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

//! Command-line arguments (used only in the spectrometer binary)

use std::path::PathBuf;

use clap::{crate_version, App, Arg};
use simplelog::LevelFilter;

#[derive(Debug)]
pub struct Args {
    /// Path to the INI file with run settings
    pub ini_path: PathBuf,
    /// Input data files, one or two
    pub inputs: Vec<String>,
    /// Terminal log level
    pub log_level: LevelFilter,
}

impl Args {
    pub fn get() -> Self {
        let matches = App::new("swspec")
            .version(crate_version!())
            .about(
                "Software spectrometer for wideband VLBI baseband recordings.\n\
                 Computes time-integrated power spectra, optional cross-polarization\n\
                 spectra and optional phase calibration tone vectors.\n\
                 If the INI file enables cross-polarization, provide <infile2> as well.",
            )
            .arg(
                Arg::with_name("inifile")
                    .required(true)
                    .value_name("inifile")
                    .help("File and path to an INI file with run settings"),
            )
            .arg(
                Arg::with_name("infile1")
                    .required(true)
                    .value_name("infile1")
                    .help("Input data resource for channel 1 data"),
            )
            .arg(
                Arg::with_name("infile2")
                    .value_name("infile2")
                    .help("Input data resource for channel 2 data (optional)"),
            )
            .arg(
                Arg::with_name("log_level")
                    .long("log-level")
                    .takes_value(true)
                    .default_value("INFO")
                    .possible_values(&["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
                    .help("The level of logging to enable"),
            )
            .get_matches();

        let mut inputs = vec![matches.value_of("infile1").unwrap().to_string()];
        if let Some(second) = matches.value_of("infile2") {
            inputs.push(second.to_string());
        }

        Args {
            ini_path: PathBuf::from(matches.value_of_os("inifile").unwrap()),
            inputs,
            log_level: matches.value_of("log_level").unwrap().parse().unwrap(),
        }
    }
}
