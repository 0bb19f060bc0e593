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
//! The pipeline driver
//!
//! The dispatcher owns the sources, sinks and all buffers. Every pass it
//! hands each core a filled raw buffer set, refills the other half of the
//! double buffers while the cores compute, then collects results in core
//! order. Depending on the buffering regime a result is either a complete
//! group of spectra written straight to the sinks, or a partial spectrum
//! added into the combiner until `buffers_per_spectrum` parts have arrived.
//!

use std::time::{Duration, Instant};

use std::sync::Arc;

use crate::buffer::{Buffer, ComplexBuffer, FloatBuffer};
use crate::decoder::StreamDecoder;
use crate::settings::Settings;
use crate::sink::DataSink;
use crate::source::DataSource;
use crate::unpack::SampleUnpacker;
use crate::worker::{WorkAssignment, Worker, WorkerResult};
use crate::Result;

/// Builds a fresh external stream decoder for one unpacker
pub type DecoderFactory = Box<dyn Fn() -> Result<Box<dyn StreamDecoder>> + Send + Sync>;

/// Information about a completed dispatcher run
#[derive(Debug)]
pub struct Report {
    /// Integrated spectra written to the sinks
    pub spectra: usize,
    /// Wall-clock processing time
    pub run_time: Duration,
}

/// Output buffer set of one core
struct CoreOutputs {
    auto_out: Vec<FloatBuffer>,
    xpol_out: Vec<ComplexBuffer>,
    pcal_out: Vec<ComplexBuffer>,
}

/// Drives all workers and routes results to the sinks
pub struct Dispatcher {
    settings: Arc<Settings>,
    workers: Vec<Worker>,
    sources: Vec<Box<dyn DataSource>>,
    /// Auto sinks per source followed by the cross-pol sink
    sinks: Vec<Box<dyn DataSink>>,
    pcal_sinks: Vec<Box<dyn DataSink>>,

    /// Per-core raw buffer sets ready to dispatch
    current: Vec<Vec<Buffer>>,
    /// Per-core raw buffer sets refilled while the cores compute
    next: Vec<Vec<Buffer>>,
    /// Per-core output buffers, with the workers only during a pass
    outputs: Vec<Option<CoreOutputs>>,

    /// Combiner accumulators for the splitting regime
    combined_auto: Vec<FloatBuffer>,
    combined_xpol: Vec<ComplexBuffer>,
    combined_pcal: Vec<ComplexBuffer>,
    num_combined: usize,
}

impl Dispatcher {
    /// Allocates all buffers, spawns the workers and prefills the first
    /// half of every double buffer
    ///
    /// `decoder_factory` supplies external stream decoders for
    /// data-replacement formats; one decoder is created per (core, source).
    pub fn new(
        settings: Arc<Settings>,
        mut sources: Vec<Box<dyn DataSource>>,
        sinks: Vec<Box<dyn DataSink>>,
        pcal_sinks: Vec<Box<dyn DataSink>>,
        decoder_factory: Option<&DecoderFactory>,
    ) -> Result<Dispatcher> {
        let num_cores = settings.num_cores;
        let num_sources = settings.num_sources;
        assert_eq!(sources.len(), num_sources, "one source per input");

        // raw double buffers: two per (core, source), prefill half 0
        debug!("dispatcher buffer prefill");
        let mut current = Vec::with_capacity(num_cores);
        let mut next = Vec::with_capacity(num_cores);
        for _ in 0..num_cores {
            let mut half0 = Vec::with_capacity(num_sources);
            let mut half1 = Vec::with_capacity(num_sources);
            for source in sources.iter_mut() {
                let mut buffer = Buffer::new(settings.rawbuf_size);
                source.read(&mut buffer);
                half0.push(buffer);
                half1.push(Buffer::new(settings.rawbuf_size));
            }
            current.push(half0);
            next.push(half1);
        }

        // per-core output buffers and the workers themselves
        let spectra_capacity = settings.spectra_per_buffer.max(1);
        let mut workers = Vec::with_capacity(num_cores);
        let mut outputs = Vec::with_capacity(num_cores);
        for core in 0..num_cores {
            let mut unpackers = Vec::with_capacity(num_sources);
            for source_nr in 0..num_sources {
                let decoder = match decoder_factory {
                    Some(factory) => Some(factory()?),
                    None => None,
                };
                unpackers.push(SampleUnpacker::for_config(
                    &settings,
                    settings.use_channel[source_nr],
                    decoder,
                )?);
            }
            workers.push(Worker::spawn(core, Arc::clone(&settings), unpackers));
            outputs.push(Some(CoreOutputs {
                auto_out: (0..num_sources)
                    .map(|_| FloatBuffer::new(spectra_capacity * settings.fft_ssb_points))
                    .collect(),
                xpol_out: (0..settings.num_xpols)
                    .map(|_| ComplexBuffer::new(spectra_capacity * settings.fft_ssb_points))
                    .collect(),
                pcal_out: if settings.extract_pcal {
                    (0..num_sources)
                        .map(|_| ComplexBuffer::new(spectra_capacity * settings.pcal_tonebins))
                        .collect()
                } else {
                    Vec::new()
                },
            }));
        }

        // combiner buffers for assembling sub-spectra
        let combined_auto = (0..num_sources)
            .map(|_| FloatBuffer::new(settings.fft_ssb_points))
            .collect();
        let combined_xpol = (0..settings.num_xpols)
            .map(|_| ComplexBuffer::new(settings.fft_ssb_points))
            .collect();
        let combined_pcal = (0..num_sources)
            .map(|_| ComplexBuffer::new(settings.pcal_tonebins))
            .collect();

        Ok(Dispatcher {
            settings,
            workers,
            sources,
            sinks,
            pcal_sinks,
            current,
            next,
            outputs,
            combined_auto,
            combined_xpol,
            combined_pcal,
            num_combined: 0,
        })
    }

    /// Processes all input until every source is exhausted, then shuts the
    /// workers and sinks down
    pub fn run(&mut self) -> Report {
        let started = Instant::now();
        let mut total_spectra = 0usize;
        let mut total_spectra_prev = 0usize;
        let mut pass_started = Instant::now();
        let mut got_eof = false;

        info!("dispatcher processing all input chunks");
        loop {
            // start background processing of the current buffers
            for core in 0..self.workers.len() {
                let raw = std::mem::take(&mut self.current[core]);
                let outputs = self.outputs[core].take().expect("outputs in flight");
                self.workers[core].run(WorkAssignment {
                    raw,
                    auto_out: outputs.auto_out,
                    xpol_out: outputs.xpol_out,
                    pcal_out: outputs.pcal_out,
                });
            }

            // overlap compute with input: refill the other buffer half
            for core in 0..self.next.len() {
                for (source, buffer) in self.sources.iter_mut().zip(self.next[core].iter_mut()) {
                    source.read(buffer);
                }
            }

            // collect in core order and write results on the go
            let mut wrote_some = false;
            for core in 0..self.workers.len() {
                let result = self.workers[core].join();
                if result.decode_failed {
                    // garbage would follow; treat the input as exhausted
                    error!("stream decoder failure, stopping after this pass");
                    got_eof = true;
                }
                let produced = self.consume_result(core, result, &mut total_spectra);
                wrote_some = wrote_some || produced;
            }

            if wrote_some {
                let pass_time = pass_started.elapsed().as_secs_f64().max(1e-9);
                let new_spectra = total_spectra - total_spectra_prev;
                info!(
                    "dispatcher: wrote {} new spectra, {} in total, rate {:.2}x realtime",
                    new_spectra,
                    total_spectra,
                    new_spectra as f64 * self.settings.integ_seconds / pass_time
                );
                total_spectra_prev = total_spectra;
                pass_started = Instant::now();
            }

            // continue with the buffers filled during this pass
            std::mem::swap(&mut self.current, &mut self.next);

            // a source at EOF still owes us its refilled remainder; stop
            // once the refill came back empty
            for (source_nr, source) in self.sources.iter().enumerate() {
                if source.eof() && self.current[0][source_nr].length() == 0 {
                    got_eof = true;
                }
            }
            if got_eof {
                break;
            }
        }

        self.finalize();

        let run_time = started.elapsed();
        info!(
            "dispatcher completed, {} spectra, time delta {:.3}s",
            total_spectra,
            run_time.as_secs_f64()
        );
        Report {
            spectra: total_spectra,
            run_time,
        }
    }

    /// Routes one worker result to the sinks or the combiner; returns true
    /// if anything reached a sink
    fn consume_result(
        &mut self,
        core: usize,
        result: WorkerResult,
        total_spectra: &mut usize,
    ) -> bool {
        let settings = Arc::clone(&self.settings);
        let ssb = settings.fft_ssb_points;
        let mut wrote = false;

        if settings.buffers_per_spectrum > 1 {
            // sub-spectrum from this core: assemble into the common spectrum
            if result.spectra_completed > 0 {
                for (combined, partial) in
                    self.combined_auto.iter_mut().zip(result.auto_out.iter())
                {
                    for (acc, &value) in combined
                        .data_mut()
                        .iter_mut()
                        .zip(partial.data()[..ssb].iter())
                    {
                        *acc += value;
                    }
                }
                for (combined, partial) in
                    self.combined_xpol.iter_mut().zip(result.xpol_out.iter())
                {
                    for (acc, &value) in combined
                        .data_mut()
                        .iter_mut()
                        .zip(partial.data()[..ssb].iter())
                    {
                        *acc += value;
                    }
                }
                if settings.extract_pcal {
                    for (combined, partial) in
                        self.combined_pcal.iter_mut().zip(result.pcal_out.iter())
                    {
                        for (acc, &value) in combined
                            .data_mut()
                            .iter_mut()
                            .zip(partial.data()[..settings.pcal_tonebins].iter())
                        {
                            *acc += value;
                        }
                    }
                }
                self.num_combined += 1;

                // write the completed assembled spectrum
                if self.num_combined == settings.buffers_per_spectrum {
                    for (sink, combined) in
                        self.sinks.iter_mut().zip(self.combined_auto.iter_mut())
                    {
                        sink.write_real(combined.data());
                        combined.reset();
                    }
                    for (x, combined) in self.combined_xpol.iter_mut().enumerate() {
                        self.sinks[settings.num_sources + x].write_complex(combined.data());
                        combined.reset();
                    }
                    if settings.extract_pcal {
                        for (sink, combined) in
                            self.pcal_sinks.iter_mut().zip(self.combined_pcal.iter_mut())
                        {
                            sink.write_complex(combined.data());
                            combined.reset();
                        }
                    }
                    *total_spectra += 1;
                    self.num_combined = 0;
                    wrote = true;
                }
            }
        } else {
            // one or more full spectra from this core: write them out
            for (sink, buffer) in self.sinks.iter_mut().zip(result.auto_out.iter()) {
                sink.write_real(&buffer.data()[..buffer.length()]);
            }
            for (x, buffer) in result.xpol_out.iter().enumerate() {
                self.sinks[settings.num_sources + x]
                    .write_complex(&buffer.data()[..buffer.length()]);
            }
            if settings.extract_pcal {
                for (sink, buffer) in self.pcal_sinks.iter_mut().zip(result.pcal_out.iter()) {
                    sink.write_complex(&buffer.data()[..buffer.length()]);
                }
            }
            *total_spectra += result.spectra_completed;
            wrote = result.spectra_completed > 0;
        }

        // take the buffers back for the next pass
        self.current[core] = result.raw;
        self.outputs[core] = Some(CoreOutputs {
            auto_out: result.auto_out,
            xpol_out: result.xpol_out,
            pcal_out: result.pcal_out,
        });
        wrote
    }

    /// Stops the workers and closes all sinks
    fn finalize(&mut self) {
        for worker in self.workers.drain(..) {
            worker.finalize();
        }
        for source in self.sources.iter_mut() {
            source.close();
        }
        for sink in self.sinks.iter_mut() {
            sink.close();
        }
        for sink in self.pcal_sinks.iter_mut() {
            sink.close();
        }
    }
}
