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
//! Raw-byte to float sample decoders
//!
//! One unpacker instance serves one (source, channel) pair; lookup tables
//! are built at construction for the selected channel. Requested sample
//! counts are rounded down to the unpacker's granularity.
//!

mod mk5b;
mod raw;
mod twobit;
mod wrapper;

pub use self::mk5b::Mk5bUnpacker;
pub use self::raw::{SignedUnpacker, UnsignedUnpacker};
pub use self::twobit::{TwoBitSingleChannelUnpacker, TwoBitUnpacker};
pub use self::wrapper::DecoderUnpacker;

use crate::config::InputFormat;
use crate::decoder::StreamDecoder;
use crate::error::Error;
use crate::settings::Settings;
use crate::Result;

/// Sample magnitudes of the 2-bit sign/magnitude encoding, in the reversed
/// {magnitude, sign} bit order: 00, 01, 10, 11
pub(crate) const TWO_BIT_LEVELS: [f32; 4] = [1.0, -1.0, 3.3359, -3.3359];

/// A format/bits/channels-selected sample decoder
pub enum SampleUnpacker {
    /// Linear signed 8/16-bit samples
    Signed(SignedUnpacker),
    /// Linear unsigned 8/16-bit samples, bias-shifted
    Unsigned(UnsignedUnpacker),
    /// 2-bit multi-channel raw data
    TwoBit(TwoBitUnpacker),
    /// 2-bit single-channel raw data
    TwoBitSingle(TwoBitSingleChannelUnpacker),
    /// Mark5B payload data, headers already stripped by the source
    Mk5b(Mk5bUnpacker),
    /// External-decoder wrapper for data-replacement recordings
    Decoder(DecoderUnpacker),
}

impl SampleUnpacker {
    /// Selects and builds the unpacker for the configured format, sample
    /// geometry and channel (first matching variant wins)
    ///
    /// Data-replacement formats need an external [`StreamDecoder`]; without
    /// one the configuration is rejected.
    pub fn for_config(
        settings: &Settings,
        channel: usize,
        decoder: Option<Box<dyn StreamDecoder>>,
    ) -> Result<SampleUnpacker> {
        let bits = settings.bits_per_sample;
        let channels = settings.source_channels;
        match settings.source_format {
            InputFormat::RawSigned => {
                if bits == 2 && channels == 1 {
                    Ok(SampleUnpacker::TwoBitSingle(TwoBitSingleChannelUnpacker::new()))
                } else if bits == 2 && channels % 4 == 0 {
                    Ok(SampleUnpacker::TwoBit(TwoBitUnpacker::new(
                        channels,
                        channel,
                        settings.channel_order_increasing,
                    )))
                } else if bits == 8 || bits == 16 {
                    Ok(SampleUnpacker::Signed(SignedUnpacker::new(bits, channels)))
                } else {
                    Err(unsupported(settings))
                }
            }
            InputFormat::RawUnsigned => {
                if bits == 2 && channels == 1 {
                    Ok(SampleUnpacker::TwoBitSingle(TwoBitSingleChannelUnpacker::new()))
                } else if bits == 2 && channels % 4 == 0 {
                    Ok(SampleUnpacker::TwoBit(TwoBitUnpacker::new(
                        channels,
                        channel,
                        settings.channel_order_increasing,
                    )))
                } else if bits == 8 || bits == 16 {
                    Ok(SampleUnpacker::Unsigned(UnsignedUnpacker::new(bits, channels)))
                } else {
                    Err(unsupported(settings))
                }
            }
            InputFormat::Mark5B => {
                if bits == 2 && matches!(channels, 2 | 4 | 8 | 16) {
                    Ok(SampleUnpacker::Mk5b(Mk5bUnpacker::new(channels, channel)))
                } else {
                    Err(unsupported(settings))
                }
            }
            InputFormat::IBob => {
                if bits == 8 || bits == 16 {
                    Ok(SampleUnpacker::Signed(SignedUnpacker::new(bits, channels)))
                } else {
                    Err(unsupported(settings))
                }
            }
            InputFormat::Vlba | InputFormat::MkIv | InputFormat::Mk5bRepl => {
                if (bits == 1 || bits == 2) && channels % 2 == 0 {
                    match decoder {
                        Some(decoder) => Ok(SampleUnpacker::Decoder(DecoderUnpacker::new(
                            decoder,
                            settings.source_format,
                            &settings.source_format_str,
                            settings.fft_points,
                            settings.bits_per_sample,
                        ))),
                        None => Err(Error::FormatUnsupported(format!(
                            "format '{}' needs an external stream decoder",
                            settings.source_format_str
                        ))),
                    }
                } else {
                    Err(unsupported(settings))
                }
            }
            InputFormat::Vdif | InputFormat::Maxim => Err(unsupported(settings)),
        }
    }

    /// True once the external decoder has refused data; always false for
    /// the table-driven unpackers
    pub fn decode_failed(&self) -> bool {
        match self {
            SampleUnpacker::Decoder(u) => u.decode_failed(),
            _ => false,
        }
    }

    /// Converts raw bytes into real float samples for one channel
    ///
    /// Returns the number of samples unpacked, `count` rounded down to the
    /// unpacker's granularity.
    pub fn extract_samples(
        &mut self,
        src: &[u8],
        dst: &mut [f32],
        count: usize,
        channel: usize,
    ) -> usize {
        match self {
            SampleUnpacker::Signed(u) => u.extract_samples(src, dst, count, channel),
            SampleUnpacker::Unsigned(u) => u.extract_samples(src, dst, count, channel),
            SampleUnpacker::TwoBit(u) => u.extract_samples(src, dst, count, channel),
            SampleUnpacker::TwoBitSingle(u) => u.extract_samples(src, dst, count, channel),
            SampleUnpacker::Mk5b(u) => u.extract_samples(src, dst, count, channel),
            SampleUnpacker::Decoder(u) => u.extract_samples(src, dst, count, channel),
        }
    }
}

fn unsupported(settings: &Settings) -> Error {
    Error::FormatUnsupported(format!(
        "encoding '{}' with {}-channel {}-bit samples does not have any unpacking method",
        settings.source_format_str, settings.source_channels, settings.bits_per_sample
    ))
}
