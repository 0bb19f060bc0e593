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

//! A sink that fans every write out to several child sinks

use num_complex::Complex32;

use crate::sink::DataSink;

/// Duplicates writes to all attached sinks
///
/// Writes report the maximum of the children's return values, so one failed
/// child does not hide the data that the others accepted.
#[derive(Default)]
pub struct TeeSink {
    sinks: Vec<Box<dyn DataSink>>,
}

impl TeeSink {
    /// Creates an empty tee
    pub fn new() -> TeeSink {
        TeeSink { sinks: Vec::new() }
    }

    /// Attaches a child sink
    pub fn add_sink(&mut self, sink: Box<dyn DataSink>) {
        self.sinks.push(sink);
    }
}

impl DataSink for TeeSink {
    fn write_real(&mut self, bins: &[f32]) -> usize {
        self.sinks
            .iter_mut()
            .map(|sink| sink.write_real(bins))
            .max()
            .unwrap_or(0)
    }

    fn write_complex(&mut self, bins: &[Complex32]) -> usize {
        self.sinks
            .iter_mut()
            .map(|sink| sink.write_complex(bins))
            .max()
            .unwrap_or(0)
    }

    fn close(&mut self) {
        for sink in self.sinks.iter_mut() {
            sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        bins: Arc<Mutex<Vec<f32>>>,
        report: usize,
    }

    impl DataSink for RecordingSink {
        fn write_real(&mut self, bins: &[f32]) -> usize {
            self.bins.lock().unwrap().extend_from_slice(bins);
            self.report
        }
        fn write_complex(&mut self, _bins: &[Complex32]) -> usize {
            self.report
        }
        fn close(&mut self) {}
    }

    #[test]
    fn test_fan_out_and_max_return() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let mut tee = TeeSink::new();
        tee.add_sink(Box::new(RecordingSink {
            bins: Arc::clone(&first),
            report: 8,
        }));
        tee.add_sink(Box::new(RecordingSink {
            bins: Arc::clone(&second),
            report: 0,
        }));

        let written = tee.write_real(&[1.0, 2.0]);
        assert_eq!(written, 8);
        assert_eq!(first.lock().unwrap().as_slice(), &[1.0, 2.0]);
        assert_eq!(second.lock().unwrap().as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_empty_tee() {
        let mut tee = TeeSink::new();
        assert_eq!(tee.write_real(&[1.0]), 0);
    }
}
