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
//! Interface to the external VLBI stream decoder
//!
//! Data-replacement recordings (VLBA, MkIV, Mk5B) interleave header bits with
//! sample bits at a regular stride. Decoding them is delegated to an external
//! decoder library behind the [`StreamDecoder`] trait; this crate ships the
//! trait and the unpacking/alignment logic built on top of it, but no decoder
//! implementation. Configurations that need one fail with
//! `FormatUnsupported` unless a decoder is injected through the library API.
//!

use crate::Result;

/// Frame timestamp as reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTime {
    /// Modified Julian Day
    pub mjd: i32,
    /// Second of day
    pub second: i32,
    /// Nanoseconds past the second
    pub ns: f64,
}

/// The external non-replacement VLBI format decoder
///
/// Implementations unpack all channels of a recording at once into
/// caller-provided per-channel float buffers. Decoders have a documented
/// internal request ceiling slightly below 2^18 samples; callers must chunk
/// larger requests (see the decoder-backed unpacker). This is an invariant
/// to preserve for compatibility, not a defect to fix.
pub trait StreamDecoder: Send {
    /// Number of channels in the stream
    fn channels(&self) -> usize;

    /// Total frame length in bytes, headers included
    fn frame_bytes(&self) -> usize;

    /// Offset of the payload within a frame; may be negative for formats
    /// whose payload begins before the nominal frame boundary
    fn payload_offset(&self) -> i64;

    /// Byte offset of the first complete frame in the stream
    fn frame_offset(&self) -> u64;

    /// Duration of one frame in nanoseconds
    fn frame_ns(&self) -> f64;

    /// Smallest sample count the decoder can unpack
    fn sample_granularity(&self) -> usize;

    /// Timestamp of the first sample the decoder is positioned at
    fn sample_time(&self) -> SampleTime;

    /// Unpacks `count` samples of every channel from `src` into
    /// `channels_out`, one buffer per channel, each at least `count` long.
    ///
    /// Positions that held replaced header bits are written as zero.
    fn unpack(&mut self, src: &[u8], channels_out: &mut [Vec<f32>], count: usize) -> Result<usize>;
}
