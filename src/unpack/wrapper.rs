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
//! Data-replacement unpacking through the external stream decoder
//!
//! The decoder unpacks every channel at once and writes zeros wherever the
//! original bitstream held header bits. The wrapper chunks requests below
//! the decoder's internal size ceiling, copies out the selected channel and,
//! for MkIV and Mk5B recordings, replaces the zeroed header gaps with random
//! +-3.3359 values so the spectra see noise instead of periodic zeros.
//!

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::InputFormat;
use crate::decoder::StreamDecoder;

/// Largest sample level of the 2-bit encoding, used for the random fill
const GAP_FILL_MAGNITUDE: f32 = 3.3359;

/// Header bits recur every 160 header samples per 20000 payload samples at
/// fanout 1; the gap scan scales this by the observed header run length
const FRAME_SAMPLES_PER_HEADER_UNIT: usize = 20000;
const HEADER_SAMPLES_UNIT: usize = 160;

/// External-decoder wrapper for VLBA, MkIV and Mk5B recordings
pub struct DecoderUnpacker {
    decoder: Box<dyn StreamDecoder>,
    format: InputFormat,
    /// Per-channel scratch, decoder output for all channels
    allchannels: Vec<Vec<f32>>,
    /// Upper bound for one decoder call, in samples
    chunk_limit: usize,
    /// Raw bytes consumed per multi-channel sample time
    bytes_per_sample: f64,
    rng: StdRng,
    /// Sticky flag raised when the decoder refuses data
    failed: bool,
}

impl DecoderUnpacker {
    /// Prepares the wrapper and its per-channel scratch buffers
    pub fn new(
        decoder: Box<dyn StreamDecoder>,
        format: InputFormat,
        format_str: &str,
        fft_points: usize,
        bits_per_sample: usize,
    ) -> Self {
        let channels = decoder.channels().max(1);
        let payload_offset = decoder.payload_offset();
        let payload_bytes = if payload_offset > 0 {
            decoder.frame_bytes() - payload_offset as usize
        } else {
            decoder.frame_bytes()
        };

        // The decoder cannot take requests at or above 2^18 samples; the
        // chunk sizes below stay under that for all known modes
        let chunk_limit = match format {
            InputFormat::Vlba => 2 * payload_bytes,
            InputFormat::MkIv => payload_bytes * mkiv_fanout(format_str),
            _ => payload_bytes,
        }
        .max(decoder.sample_granularity());

        debug!(
            "DecoderUnpacker: {} channels, {} bytes/frame, chunk limit {} samples",
            channels,
            decoder.frame_bytes(),
            chunk_limit
        );

        DecoderUnpacker {
            format,
            allchannels: (0..channels).map(|_| vec![0.0f32; fft_points]).collect(),
            chunk_limit,
            bytes_per_sample: (bits_per_sample * channels) as f64 / 8.0,
            rng: StdRng::from_entropy(),
            failed: false,
            decoder,
        }
    }

    /// True once the decoder has refused data; the stream cannot be trusted
    /// past this point
    pub fn decode_failed(&self) -> bool {
        self.failed
    }

    /// Unpacks `count` samples of `channel`; header gaps are refilled with
    /// random sample levels for MkIV and Mk5B
    pub fn extract_samples(
        &mut self,
        src: &[u8],
        dst: &mut [f32],
        count: usize,
        channel: usize,
    ) -> usize {
        let channels = self.allchannels.len();
        if channel >= channels {
            warn!(
                "source has only {} channels but settings request channel {}",
                channels,
                channel + 1
            );
        }
        let channel = channel % channels;

        let granularity = self.decoder.sample_granularity().max(1);
        let count = count - count % granularity;

        // The decoder has a hard internal request ceiling; loop in chunks
        let mut done = 0usize;
        let mut src_byte = 0usize;
        while done < count {
            let to_unpack = self.chunk_limit.min(count - done);
            match self
                .decoder
                .unpack(&src[src_byte..], &mut self.allchannels, to_unpack)
            {
                Ok(_) => {}
                Err(e) => {
                    error!("stream decoder refused {} samples: {}", to_unpack, e);
                    self.failed = true;
                    return done;
                }
            }
            dst[done..done + to_unpack].copy_from_slice(&self.allchannels[channel][..to_unpack]);
            src_byte += (to_unpack as f64 * self.bytes_per_sample) as usize;
            done += to_unpack;
        }

        // VLBA replaces no data, the others need their header gaps hidden
        if matches!(self.format, InputFormat::MkIv | InputFormat::Mk5bRepl) {
            self.randomize_header_gaps(&mut dst[..count]);
        }
        count
    }

    /// Finds the zero run the decoder left at the first header position and
    /// fills every recurrence with random +-3.3359 values
    ///
    /// The first zero run gives the fanned-out header length; headers repeat
    /// every 20000 * (headersamples / 160) samples.
    fn randomize_header_gaps(&mut self, dst: &mut [f32]) {
        let count = dst.len();

        let header_offset = match dst.iter().position(|&v| v == 0.0) {
            Some(at) => at,
            None => return,
        };
        let mut header_samples = 0usize;
        while header_offset + header_samples < count && dst[header_offset + header_samples] == 0.0
        {
            header_samples += 1;
        }
        let frame_samples =
            FRAME_SAMPLES_PER_HEADER_UNIT * (header_samples / HEADER_SAMPLES_UNIT);
        if frame_samples == 0 {
            return;
        }

        for n in header_offset..count {
            if (n - header_offset) % frame_samples < header_samples {
                let sign = if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
                dst[n] = GAP_FILL_MAGNITUDE * sign;
            }
        }
    }
}

/// Reads the fanout digit from a MkIV mode string such as `MKIV1_4-512-8-2`
fn mkiv_fanout(format_str: &str) -> usize {
    format_str
        .chars()
        .nth(6)
        .and_then(|c| c.to_digit(10))
        .map(|d| d as usize)
        .unwrap_or(1)
        .max(1)
}
