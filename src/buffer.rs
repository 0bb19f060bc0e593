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
//! Byte and sample buffers with an (allocated, length) cursor
//!
//! Writers set the length, readers honour it. Resetting zeroes the contents
//! but leaves the length untouched.
//!

use num_complex::Complex32;
use num_traits::Zero;

/// Alignment unit for raw sample buffers
#[repr(C, align(128))]
#[derive(Clone, Copy)]
struct AlignedChunk([u8; 128]);

/// A contiguous byte region aligned to 128 bytes
///
/// `allocated` is the immutable capacity, `length` the count of currently
/// valid bytes.
pub struct Buffer {
    chunks: Vec<AlignedChunk>,
    allocated: usize,
    length: usize,
}

impl Buffer {
    /// Allocates a zeroed buffer of the requested capacity
    pub fn new(bytes: usize) -> Self {
        let chunk_count = (bytes + 127) / 128;
        Buffer {
            chunks: vec![AlignedChunk([0u8; 128]); chunk_count],
            allocated: bytes,
            length: 0,
        }
    }

    /// Returns the capacity in bytes
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Returns the number of valid bytes
    pub fn length(&self) -> usize {
        self.length
    }

    /// Sets the number of valid bytes, cropping to the capacity
    pub fn set_length(&mut self, length: usize) {
        if length <= self.allocated {
            self.length = length;
        } else {
            warn!(
                "Buffer::set_length() cropping {} to allocated length {}",
                length, self.allocated
            );
            self.length = self.allocated;
        }
    }

    /// Returns the full capacity as a byte slice
    pub fn bytes(&self) -> &[u8] {
        // The chunk vector is contiguous and AlignedChunk is plain bytes
        unsafe { std::slice::from_raw_parts(self.chunks.as_ptr() as *const u8, self.allocated) }
    }

    /// Returns the full capacity as a mutable byte slice
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.chunks.as_mut_ptr() as *mut u8, self.allocated)
        }
    }

    /// Zeroes the contents without changing the length
    pub fn reset(&mut self) {
        for chunk in self.chunks.iter_mut() {
            chunk.0 = [0u8; 128];
        }
    }
}

/// A real-valued output accumulator with an (allocated, length) cursor,
/// counted in f32 elements
pub struct FloatBuffer {
    data: Vec<f32>,
    length: usize,
}

impl FloatBuffer {
    /// Allocates a zeroed accumulator of the requested element capacity
    pub fn new(elements: usize) -> Self {
        FloatBuffer {
            data: vec![0.0; elements],
            length: 0,
        }
    }

    /// Returns the capacity in elements
    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of valid elements
    pub fn length(&self) -> usize {
        self.length
    }

    /// Sets the number of valid elements, cropping to the capacity
    pub fn set_length(&mut self, length: usize) {
        self.length = length.min(self.data.len());
    }

    /// Returns the full capacity as a slice
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the full capacity as a mutable slice
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Zeroes the contents without changing the length
    pub fn reset(&mut self) {
        for value in self.data.iter_mut() {
            *value = 0.0;
        }
    }
}

/// A complex-valued output accumulator with an (allocated, length) cursor,
/// counted in complex elements
pub struct ComplexBuffer {
    data: Vec<Complex32>,
    length: usize,
}

impl ComplexBuffer {
    /// Allocates a zeroed accumulator of the requested element capacity
    pub fn new(elements: usize) -> Self {
        ComplexBuffer {
            data: vec![Complex32::zero(); elements],
            length: 0,
        }
    }

    /// Returns the capacity in elements
    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of valid elements
    pub fn length(&self) -> usize {
        self.length
    }

    /// Sets the number of valid elements, cropping to the capacity
    pub fn set_length(&mut self, length: usize) {
        self.length = length.min(self.data.len());
    }

    /// Returns the full capacity as a slice
    pub fn data(&self) -> &[Complex32] {
        &self.data
    }

    /// Returns the full capacity as a mutable slice
    pub fn data_mut(&mut self) -> &mut [Complex32] {
        &mut self.data
    }

    /// Zeroes the contents without changing the length
    pub fn reset(&mut self) {
        for value in self.data.iter_mut() {
            *value = Complex32::zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        for &size in &[1usize, 100, 128, 4096, 10_000] {
            let buffer = Buffer::new(size);
            assert_eq!(buffer.bytes().as_ptr() as usize % 128, 0);
            assert_eq!(buffer.allocated(), size);
            assert_eq!(buffer.length(), 0);
        }
    }

    #[test]
    fn test_length_crop() {
        let mut buffer = Buffer::new(100);
        buffer.set_length(64);
        assert_eq!(buffer.length(), 64);
        buffer.set_length(200);
        assert_eq!(buffer.length(), 100);
    }

    #[test]
    fn test_reset_keeps_length() {
        let mut buffer = Buffer::new(16);
        buffer.bytes_mut()[3] = 0xAB;
        buffer.set_length(8);
        buffer.reset();
        assert_eq!(buffer.bytes()[3], 0);
        assert_eq!(buffer.length(), 8);
    }

    #[test]
    fn test_float_buffer_cursor() {
        let mut out = FloatBuffer::new(8);
        out.data_mut()[0] = 2.5;
        out.set_length(4);
        out.reset();
        assert_eq!(out.data()[0], 0.0);
        assert_eq!(out.length(), 4);
        assert_eq!(out.allocated(), 8);
    }
}
