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
//! Spectrum worker cores
//!
//! Each worker owns one OS thread that turns raw sample buffers into
//! integrated spectra: unpack, optional PCal accumulation, windowing, packed
//! real DFT, power-spectrum accumulation with separate DC/Nyquist handling
//! and cross-polarization products. The dispatcher hands a worker one raw
//! buffer per source with `run()` and collects the finished output with
//! `join()`; buffer ownership moves over the request/response channel pair,
//! so a worker has exclusive use of its buffers for the whole computation.
//!

use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use num_complex::Complex32;

use crate::buffer::{Buffer, ComplexBuffer, FloatBuffer};
use crate::dft::RealDft;
use crate::pcal::PcalExtractor;
use crate::settings::Settings;
use crate::unpack::SampleUnpacker;

use std::sync::Arc;

/// One run's worth of buffers, handed to a worker
pub struct WorkAssignment {
    /// Raw input, one buffer per source
    pub raw: Vec<Buffer>,
    /// Integrated auto spectra, one buffer per source
    pub auto_out: Vec<FloatBuffer>,
    /// Integrated cross spectra, one buffer per pair
    pub xpol_out: Vec<ComplexBuffer>,
    /// PCal tone vectors, one buffer per source (empty when disabled)
    pub pcal_out: Vec<ComplexBuffer>,
}

/// A completed run: the same buffers, plus the completed spectrum count
pub struct WorkerResult {
    /// Raw input buffers, returned for refilling
    pub raw: Vec<Buffer>,
    /// Auto spectra with lengths set to the written element counts
    pub auto_out: Vec<FloatBuffer>,
    /// Cross spectra with lengths set to the written element counts
    pub xpol_out: Vec<ComplexBuffer>,
    /// PCal vectors with lengths set to the written element counts
    pub pcal_out: Vec<ComplexBuffer>,
    /// Number of full or partial integrated spectra in the output buffers
    pub spectra_completed: usize,
    /// True when the external decoder refused data during this run; the
    /// dispatcher treats this as end of input
    pub decode_failed: bool,
}

enum Command {
    Process(Box<WorkAssignment>),
    Exit,
}

/// A spectrum core running on its own thread
pub struct Worker {
    rank: usize,
    commands: Sender<Command>,
    results: Receiver<WorkerResult>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Starts the worker thread with its per-source unpackers
    pub fn spawn(rank: usize, settings: Arc<Settings>, unpackers: Vec<SampleUnpacker>) -> Worker {
        let (command_tx, command_rx) = bounded::<Command>(1);
        let (result_tx, result_rx) = bounded::<WorkerResult>(1);
        let thread = std::thread::Builder::new()
            .name(format!("core {}", rank))
            .spawn(move || {
                let mut core = Core::new(rank, settings, unpackers);
                while let Ok(command) = command_rx.recv() {
                    match command {
                        Command::Process(work) => {
                            let result = core.process(*work);
                            if result_tx.send(result).is_err() {
                                break;
                            }
                        }
                        Command::Exit => break,
                    }
                }
                info!(
                    "core {} completed: {:.3}s total internal calculation time, {} FFTs",
                    core.rank, core.total_runtime, core.total_ffts
                );
            })
            .expect("Failed to spawn worker thread");
        Worker {
            rank,
            commands: command_tx,
            results: result_rx,
            thread: Some(thread),
        }
    }

    /// This worker's core index
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Hands a buffer set to the worker and starts the computation
    pub fn run(&self, work: WorkAssignment) {
        self.commands
            .send(Command::Process(Box::new(work)))
            .expect("worker thread is gone");
    }

    /// Waits for the computation to complete and takes back the buffers
    pub fn join(&self) -> WorkerResult {
        self.results.recv().expect("worker thread is gone")
    }

    /// Stops the worker thread and reclaims it
    pub fn finalize(mut self) {
        let _ = self.commands.send(Command::Exit);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Thread-side state of one worker
struct Core {
    rank: usize,
    settings: Arc<Settings>,
    unpackers: Vec<SampleUnpacker>,
    /// Precomputed window function table
    window: Vec<f32>,
    dft: RealDft,
    /// Unpacked real samples of the current DFT window
    unpacked: Vec<f32>,
    /// Packed DFT results, one vector per source
    fft_reim: Vec<Vec<Complex32>>,
    /// PCal extractors, one per source when enabled
    pcal: Vec<PcalExtractor>,
    /// Source index pairs for the cross spectra, upper triangular
    xpol_pairs: Vec<(usize, usize)>,
    total_ffts: u64,
    total_runtime: f64,
}

impl Core {
    fn new(rank: usize, settings: Arc<Settings>, unpackers: Vec<SampleUnpacker>) -> Core {
        let fft_points = settings.fft_points;
        let ssb = settings.fft_ssb_points;
        let window = settings.window.generate(fft_points);
        let fft_reim = (0..settings.num_sources)
            .map(|_| vec![Complex32::new(0.0, 0.0); ssb])
            .collect();
        let pcal = if settings.extract_pcal {
            (0..settings.num_sources)
                .map(|_| {
                    PcalExtractor::for_comb(
                        settings.samplingfreq / 2.0,
                        settings.pcal_spacing_hz,
                        settings.pcal_offset_hz,
                    )
                })
                .collect()
        } else {
            Vec::new()
        };

        // all source pairs ignoring permutations; only (0,1) is exercised
        // with two sources
        let mut xpol_pairs = Vec::new();
        for i in 0..settings.num_sources {
            for j in (i + 1)..settings.num_sources {
                xpol_pairs.push((i, j));
            }
        }
        xpol_pairs.truncate(settings.num_xpols);

        Core {
            rank,
            unpackers,
            window,
            dft: RealDft::new(fft_points),
            unpacked: vec![0.0; fft_points],
            fft_reim,
            pcal,
            xpol_pairs,
            total_ffts: 0,
            total_runtime: 0.0,
            settings,
        }
    }

    /// One run: integrates as many spectra as the raw buffers allow
    fn process(&mut self, mut work: WorkAssignment) -> WorkerResult {
        let settings = Arc::clone(&self.settings);
        let nsrc = settings.num_sources;
        let ssb = settings.fft_ssb_points;
        let fft_points = settings.fft_points;
        let fullfft_bytes = settings.raw_fullfft_bytes;
        let overlap_bytes = settings.raw_overlap_bytes;
        let tones = settings.pcal_tonebins;

        // stale results from the previous pass
        for buf in work.auto_out.iter_mut() {
            buf.reset();
        }
        for buf in work.xpol_out.iter_mut() {
            buf.reset();
        }
        for buf in work.pcal_out.iter_mut() {
            buf.reset();
        }

        let started = Instant::now();

        let mut src_pos = vec![0usize; nsrc];
        let mut min_raw_remaining = work
            .raw
            .iter()
            .map(|buffer| buffer.length())
            .min()
            .unwrap_or(0);

        let mut windows = 0usize;
        let mut spectra = 0usize;
        let mut decode_failed = false;

        'integration: while min_raw_remaining >= fullfft_bytes {
            for rs in 0..nsrc {
                let channel = settings.use_channel[rs];
                self.unpackers[rs].extract_samples(
                    &work.raw[rs].bytes()[src_pos[rs]..],
                    &mut self.unpacked,
                    fft_points,
                    channel,
                );
                if self.unpackers[rs].decode_failed() {
                    decode_failed = true;
                    break 'integration;
                }

                // advance the data but keep some overlap
                src_pos[rs] += overlap_bytes;

                // detect phase calibration tones on non-overlapped input
                if settings.extract_pcal && windows % settings.fft_overlap_factor == 0 {
                    self.pcal[rs].extract_and_integrate(&self.unpacked);
                }

                for (value, &w) in self.unpacked.iter_mut().zip(self.window.iter()) {
                    *value *= w;
                }
                self.dft.process_packed(&mut self.unpacked, &mut self.fft_reim[rs]);
                self.total_ffts += 1;

                // autocorrelate; DC and Nyquist travel packed in bin 0 and
                // are accumulated separately
                let spectrum = &mut work.auto_out[rs].data_mut()[spectra * ssb..(spectra + 1) * ssb];
                let dc = self.fft_reim[rs][0].re;
                let nyquist = self.fft_reim[rs][0].im;
                let acc_dc = spectrum[0] + dc * dc;
                let acc_nyquist = spectrum[ssb - 1] + nyquist * nyquist;
                for (bin, value) in spectrum.iter_mut().take(ssb - 1).enumerate() {
                    *value += self.fft_reim[rs][bin].norm_sqr();
                }
                spectrum[0] = acc_dc;
                spectrum[ssb - 1] = acc_nyquist;
            }

            min_raw_remaining -= overlap_bytes;

            // accumulate the cross spectrum of every source pair
            for (x, &(src_i, src_j)) in self.xpol_pairs.iter().enumerate() {
                let cross = &mut work.xpol_out[x].data_mut()[spectra * ssb..(spectra + 1) * ssb];
                let dc_i = self.fft_reim[src_i][0].re;
                let nyquist_i = self.fft_reim[src_i][0].im;
                let dc_j = self.fft_reim[src_j][0].re;
                let nyquist_j = self.fft_reim[src_j][0].im;
                let acc_dc = cross[0].re + dc_i * dc_j;
                let acc_nyquist = cross[ssb - 1].re + nyquist_i * nyquist_j;

                for bin in 1..ssb - 1 {
                    cross[bin] += self.fft_reim[src_i][bin] * self.fft_reim[src_j][bin].conj();
                }
                cross[0] = Complex32::new(acc_dc, 0.0);
                cross[ssb - 1] = Complex32::new(acc_nyquist, 0.0);
            }

            windows += 1;

            // enough overlapped DFTs integrated: store the results
            if windows == settings.core_overlapped_ffts {
                let scale = 1.0 / settings.core_overlapped_ffts as f32;
                for rs in 0..nsrc {
                    for value in
                        work.auto_out[rs].data_mut()[spectra * ssb..(spectra + 1) * ssb].iter_mut()
                    {
                        *value *= scale;
                    }
                }
                for x in 0..self.xpol_pairs.len() {
                    for value in
                        work.xpol_out[x].data_mut()[spectra * ssb..(spectra + 1) * ssb].iter_mut()
                    {
                        *value *= scale;
                    }
                }
                if settings.extract_pcal {
                    for rs in 0..nsrc {
                        let out =
                            &mut work.pcal_out[rs].data_mut()[spectra * tones..(spectra + 1) * tones];
                        self.pcal[rs].get_final_pcal(out);
                        self.pcal[rs].clear();
                    }
                }

                spectra += 1;
                windows = 0;

                // hop over the overlap remainder between non-overlapping
                // integration blocks
                for position in src_pos.iter_mut() {
                    *position += fullfft_bytes - overlap_bytes;
                }
                min_raw_remaining =
                    min_raw_remaining.saturating_sub(fullfft_bytes - overlap_bytes);
            }
        }

        // a trailing partial integration cannot be normalised; drop it
        if windows > 0 {
            debug!(
                "core {}: {} overlapped DFTs of an incomplete integration discarded at end of data",
                self.rank, windows
            );
            for extractor in self.pcal.iter_mut() {
                extractor.clear();
            }
        }

        for buffer in work.auto_out.iter_mut() {
            buffer.set_length(spectra * ssb);
        }
        for buffer in work.xpol_out.iter_mut() {
            buffer.set_length(spectra * ssb);
        }
        for buffer in work.pcal_out.iter_mut() {
            buffer.set_length(spectra * tones);
        }

        self.total_runtime += started.elapsed().as_secs_f64();

        WorkerResult {
            raw: work.raw,
            auto_out: work.auto_out,
            xpol_out: work.xpol_out,
            pcal_out: work.pcal_out,
            spectra_completed: spectra,
            decode_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectrometerConfig;

    fn dc_settings() -> Arc<Settings> {
        let config = SpectrometerConfig {
            fft_points: 1024,
            integ_seconds: 1.0,
            samplingfreq: 10240.0,
            fft_overlap_factor: 1,
            window: crate::window::WindowFunction::None,
            bits_per_sample: 8,
            source_channels: 1,
            max_rawbuf_bytes: 16384,
            ..SpectrometerConfig::default()
        };
        Arc::new(Settings::derive(&config, 1).unwrap())
    }

    fn assignment(settings: &Settings, fill: u8) -> WorkAssignment {
        let mut raw = Buffer::new(settings.rawbuf_size);
        for byte in raw.bytes_mut().iter_mut() {
            *byte = fill;
        }
        raw.set_length(settings.rawbuf_size);
        WorkAssignment {
            raw: vec![raw],
            auto_out: vec![FloatBuffer::new(
                settings.spectra_per_buffer.max(1) * settings.fft_ssb_points,
            )],
            xpol_out: Vec::new(),
            pcal_out: Vec::new(),
        }
    }

    #[test]
    fn test_dc_input_concentrates_in_bin_zero() {
        let settings = dc_settings();
        assert_eq!(settings.spectra_per_buffer, 1);
        let unpacker =
            SampleUnpacker::for_config(&settings, settings.use_channel[0], None).unwrap();
        let worker = Worker::spawn(0, Arc::clone(&settings), vec![unpacker]);

        worker.run(assignment(&settings, 1));
        let result = worker.join();
        worker.finalize();

        assert_eq!(result.spectra_completed, 1);
        let spectrum = &result.auto_out[0].data()[..settings.fft_ssb_points];
        // 10 averaged DFTs of a constant 1.0: bin 0 holds 1024^2
        assert!((spectrum[0] - 1024.0 * 1024.0).abs() < 1.0);
        for value in spectrum.iter().skip(1) {
            assert!(value.abs() < 1e-2);
        }
    }

    #[test]
    fn test_empty_buffer_produces_nothing() {
        let settings = dc_settings();
        let unpacker =
            SampleUnpacker::for_config(&settings, settings.use_channel[0], None).unwrap();
        let worker = Worker::spawn(0, Arc::clone(&settings), vec![unpacker]);

        let mut work = assignment(&settings, 0);
        work.raw[0].set_length(0);
        worker.run(work);
        let result = worker.join();
        worker.finalize();

        assert_eq!(result.spectra_completed, 0);
        assert_eq!(result.auto_out[0].length(), 0);
    }
}
