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
//! 2-bit raw data decoding through 256-entry lookup tables
//!
//! Sample values follow the reversed {magnitude, sign} bit mapping:
//! 00 -> +1.0, 01 -> -1.0, 10 -> +3.3359, 11 -> -3.3359.
//!

use super::TWO_BIT_LEVELS;

/// Multi-channel 2-bit data where all channels of one sample time share a
/// byte group
///
/// With the default MSB-first ordering channels 0..3 sit at bit positions
/// 6, 4, 2, 0; the increasing order puts channel 0 in the least significant
/// bits instead.
pub struct TwoBitUnpacker {
    lut: [f32; 256],
    byte_offset: usize,
    step: usize,
    channel: usize,
}

impl TwoBitUnpacker {
    /// Builds the lookup table for one channel of a multiple-of-4 channel
    /// group
    pub fn new(channels: usize, channel: usize, order_increasing: bool) -> Self {
        debug_assert!(channels % 4 == 0);
        let shift = if order_increasing {
            2 * (channel % 4)
        } else {
            6 - 2 * (channel % 4)
        };
        let mut lut = [0.0f32; 256];
        for (byte, entry) in lut.iter_mut().enumerate() {
            *entry = TWO_BIT_LEVELS[(byte >> shift) & 3];
        }

        let step = channels / 4;
        let byte_offset = if order_increasing {
            channel / 4
        } else {
            (step - 1) - channel / 4
        };
        TwoBitUnpacker {
            lut,
            byte_offset,
            step,
            channel,
        }
    }

    /// Unpacks `count` samples, rounded down to 8
    pub fn extract_samples(
        &self,
        src: &[u8],
        dst: &mut [f32],
        count: usize,
        channel: usize,
    ) -> usize {
        debug_assert_eq!(channel, self.channel);
        let count = count - count % 8;
        for (sample, out) in dst.iter_mut().enumerate().take(count) {
            *out = self.lut[src[self.byte_offset + sample * self.step] as usize];
        }
        count
    }
}

/// Single-channel 2-bit data, four samples per byte, oldest sample in the
/// most significant bits
pub struct TwoBitSingleChannelUnpacker {
    lut: [[f32; 4]; 256],
}

impl TwoBitSingleChannelUnpacker {
    /// Builds the per-byte sample quadruplet table
    pub fn new() -> Self {
        let mut lut = [[0.0f32; 4]; 256];
        for (byte, quad) in lut.iter_mut().enumerate() {
            for (sample_nr, value) in quad.iter_mut().enumerate() {
                *value = TWO_BIT_LEVELS[(byte >> ((3 - sample_nr) * 2)) & 3];
            }
        }
        TwoBitSingleChannelUnpacker { lut }
    }

    /// Unpacks `count` samples, rounded down to 4
    pub fn extract_samples(
        &self,
        src: &[u8],
        dst: &mut [f32],
        count: usize,
        _channel: usize,
    ) -> usize {
        let count = count - count % 4;
        for (byte_nr, chunk) in dst.chunks_exact_mut(4).enumerate().take(count / 4) {
            chunk.copy_from_slice(&self.lut[src[byte_nr] as usize]);
        }
        count
    }
}

impl Default for TwoBitSingleChannelUnpacker {
    fn default() -> Self {
        Self::new()
    }
}
