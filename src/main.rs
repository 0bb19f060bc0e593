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
//! This binary computes integrated spectra from baseband recordings,
//! configured by an INI file: `swspec <inifile> <infile1> [<infile2>]`
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
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod args;

use std::fs::File;
use std::process;
use std::sync::Arc;

use simplelog::{
    CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};

use swspec::config::SpectrometerConfig;
use swspec::settings::Settings;
use swspec::sink::{
    DataSink, FileSink, SUFFIX_PCAL, SUFFIX_RUNLOG, SUFFIX_SPECTRUM, SUFFIX_TIMING, SUFFIX_XPOL,
};
use swspec::source::{DataSource, FileSource, TimingLog};
use swspec::Dispatcher;

use crate::args::Args;

fn run() -> swspec::Result<()> {
    let args = Args::get();

    let config = SpectrometerConfig::from_ini(&args.ini_path)?;

    // everything below logs to stderr and to the run log file
    init_logging(
        &format!("{}{}", config.expand_basename(1), SUFFIX_RUNLOG),
        args.log_level,
    );

    let settings = Arc::new(Settings::derive(&config, args.inputs.len())?);

    info!("Config file  : {}", args.ini_path.display());
    for (nr, input) in args.inputs.iter().enumerate() {
        info!("Input file {} : {}", nr + 1, input);
    }
    settings.log_summary();
    if config.plot_progress {
        info!("PlotProgress requested: live plotting is served by external sinks, writing files only");
    }
    if config.costas_loop {
        info!("DoCostasLoop requested: the Costas loop path is not built");
    }

    // input sources, with the first-header timestamps recorded
    let mut timing = TimingLog::create(format!("{}{}", settings.basefilename1, SUFFIX_TIMING));
    let mut sources: Vec<Box<dyn DataSource>> = Vec::new();
    for input in args.inputs.iter() {
        let source = FileSource::open(input, &settings, &mut timing, None)?;
        sources.push(Box::new(source));
    }

    // spectrum sinks: one per source, then the cross-pol sink
    let mut sinks: Vec<Box<dyn DataSink>> = Vec::new();
    for source_nr in 0..settings.num_sources {
        let basename = if source_nr == 0 {
            &settings.basefilename1
        } else {
            &settings.basefilename2
        };
        sinks.push(Box::new(FileSink::create(
            format!("{}{}", basename, SUFFIX_SPECTRUM),
            settings.sink_format,
        )?));
    }
    if settings.num_xpols > 0 {
        sinks.push(Box::new(FileSink::create(
            format!("{}{}", settings.basefilename1, SUFFIX_XPOL),
            settings.sink_format,
        )?));
    }
    let mut pcal_sinks: Vec<Box<dyn DataSink>> = Vec::new();
    if settings.extract_pcal {
        for source_nr in 0..settings.num_sources {
            let basename = if source_nr == 0 {
                &settings.basefilename1
            } else {
                &settings.basefilename2
            };
            pcal_sinks.push(Box::new(FileSink::create(
                format!("{}{}", basename, SUFFIX_PCAL),
                settings.sink_format,
            )?));
        }
    }

    let mut dispatcher = Dispatcher::new(settings, sources, sinks, pcal_sinks, None)?;
    let report = dispatcher.run();
    info!(
        "wrote {} integrated spectra in {:.3}s",
        report.spectra,
        report.run_time.as_secs_f64()
    );

    Ok(())
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(e) => {
            // also reaches the run log when logging is already up
            error!("{}", e);
            eprintln!("{}", e);
            process::exit(-1);
        }
    }
}

/// Sets up a terminal logger plus the run log file
fn init_logging(runlog_path: &str, level: LevelFilter) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(level, Config::default(), TerminalMode::Mixed));
    match File::create(runlog_path) {
        Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Info, Config::default(), file)),
        Err(e) => eprintln!("Failed to create run log {}: {}", runlog_path, e),
    }
    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Failed to set up logger: {}", e);
    }
}
