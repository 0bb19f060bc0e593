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
//! File-backed raw sample source
//!
//! Framed formats (Mark5B, VDIF, iBOB) interleave fixed-size headers with
//! payload bytes; headers are decoded for their timestamps and stripped
//! before the bytes reach the caller. Data-replacement formats (VLBA, MkIV,
//! Mk5B) are delivered untouched, but opening them aligns the stream to the
//! first integer second using the external decoder's timestamps.
//!

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::buffer::Buffer;
use crate::config::InputFormat;
use crate::decoder::StreamDecoder;
use crate::error::Error;
use crate::settings::Settings;
use crate::source::{DataSource, TimingLog};
use crate::Result;

/// Mark5B disk frame sync word
const MARK5B_SYNC: u32 = 0xABAD_DEED;
/// Origin of the truncated Mark5B MJD field
const MARK5B_MJD_ORIGIN: i32 = 56000;

/// A file source for all supported input formats
pub struct FileSource {
    file: File,
    uri: String,
    format: InputFormat,
    /// True for formats whose headers are stripped while reading
    uses_frames: bool,
    header_len: u64,
    payload_len: u64,
    /// File offset of the first frame header; frame boundaries are located
    /// modulo the frame size relative to this
    first_header_offset: u64,
    /// Current absolute file offset
    position: u64,
    got_eof: bool,
}

impl FileSource {
    /// Opens a file, locates the first header and applies the configured
    /// seconds skip
    ///
    /// Data-replacement formats need the external `decoder` for timestamp
    /// extraction and integer-second alignment.
    pub fn open(
        uri: &str,
        settings: &Settings,
        timing: &mut TimingLog,
        decoder: Option<Box<dyn StreamDecoder>>,
    ) -> Result<FileSource> {
        let format = settings.source_format;
        let (uses_frames, header_len, payload_len) = match format {
            // header and payload sizes are fixed by the recording formats
            InputFormat::Mark5B => (true, 16, 10_000),
            InputFormat::Vdif => (true, 16, 8_000),
            InputFormat::IBob => (true, 4, 4_096),
            _ => (false, 0, 1),
        };
        if uses_frames {
            info!(
                "FileSource   : processing framed data with {}-byte headers and {}-byte payloads",
                header_len, payload_len
            );
        } else {
            info!("FileSource   : processing unframed or data-replacement data format");
        }

        let file = File::open(uri).map_err(|e| {
            error!("could not open input file {}: {}", uri, e);
            Error::SourceOpenFailed(uri.to_string())
        })?;

        let mut source = FileSource {
            file,
            uri: uri.to_string(),
            format,
            uses_frames,
            header_len,
            payload_len,
            first_header_offset: 0,
            position: 0,
            got_eof: false,
        };

        if format.is_data_replacement() {
            let decoder = decoder.ok_or_else(|| {
                Error::FormatUnsupported(format!(
                    "format '{}' needs an external stream decoder",
                    settings.source_format_str
                ))
            })?;
            source.align_replacement_stream(&*decoder, settings.seconds_to_skip, timing)?;
        } else {
            source.locate_first_header(timing)?;
            if settings.seconds_to_skip > 0 {
                source.skip_seconds(settings)?;
            }
        }

        Ok(source)
    }

    /// Parses the first header of a framed file, or records that the format
    /// has no timestamps
    fn locate_first_header(&mut self, timing: &mut TimingLog) -> Result<()> {
        // recording tools start framed captures on a frame boundary
        self.first_header_offset = 0;

        match self.format {
            InputFormat::Mark5B => {
                let mut header = [0u8; 16];
                self.file.read_exact(&mut header).map_err(|e| {
                    error!("could not read the first Mark5B header: {}", e);
                    Error::SourceOpenFailed(self.uri.clone())
                })?;
                self.file.seek(SeekFrom::Start(0))?;

                let (mjd, second) = parse_mark5b_timecode(&header);
                check_mark5b_sync(&header, 0);
                info!(
                    "Mark5B       : starting at {} MJD {} sec + 0 ns",
                    mjd, second
                );
                timing.comment("Mark5B start time <MJD sec ns>");
                timing.timestamp(mjd, second, 0.0);
            }
            _ => {
                timing.comment("No timestamps extracted from input data");
            }
        }
        Ok(())
    }

    /// Computes the whole-frame seek for the configured skip on framed and
    /// raw inputs
    fn skip_seconds(&mut self, settings: &Settings) -> Result<()> {
        let sample_bytes = (settings.bits_per_sample as f64
            * settings.source_channels as f64
            * settings.samplingfreq
            * settings.seconds_to_skip as f64
            / 8.0) as u64;
        let (frames, seek_pos) = if self.uses_frames {
            let frames = (sample_bytes + self.payload_len - 1) / self.payload_len;
            (
                frames,
                self.first_header_offset + frames * (self.header_len + self.payload_len),
            )
        } else {
            (0, self.first_header_offset + sample_bytes)
        };
        info!(
            "Skipping {} sample-seconds: {} sample bytes corresponds to {} frames, seeking to offset {}",
            settings.seconds_to_skip, sample_bytes, frames, seek_pos
        );
        self.file.seek(SeekFrom::Start(seek_pos))?;
        self.position = seek_pos;
        // frame boundaries are now found relative to this offset
        self.first_header_offset = seek_pos;
        Ok(())
    }

    /// Aligns a data-replacement stream to the next integer second plus the
    /// configured skip, using the decoder's frame geometry
    fn align_replacement_stream(
        &mut self,
        decoder: &dyn StreamDecoder,
        seconds_to_skip: usize,
        timing: &mut TimingLog,
    ) -> Result<()> {
        let time = decoder.sample_time();
        let mut offset = 0u64;
        if time.ns > 0.0 || seconds_to_skip > 0 {
            if time.ns > 0.0 {
                info!(
                    "First frame not at an integer second. Re-opening first integer second and skipping additional {}s.",
                    seconds_to_skip
                );
            }
            let ns_to_go = if time.ns == 0.0 { 0.0 } else { 1e9 - time.ns };
            let ns_to_skip = seconds_to_skip as f64 * 1e9;
            let frame_count = ((ns_to_go + ns_to_skip) / decoder.frame_ns()).ceil() as u64;
            offset = decoder.frame_bytes() as u64 * frame_count + decoder.frame_offset();
            if decoder.payload_offset() < 0 {
                // back up a little so the decoder resynchronizes on a frame
                offset = offset.saturating_sub(decoder.payload_offset().unsigned_abs());
            }
            info!(
                "FileSource: new offset after skipping additional {}s is {}",
                seconds_to_skip, offset
            );
            self.file.seek(SeekFrom::Start(offset))?;
        }
        self.position = offset;
        self.first_header_offset = offset;

        info!(
            "VLBA/MkIV    : starting at {} MJD {} sec + {} ns",
            time.mjd, time.second, time.ns
        );
        timing.comment("VLBA/MkIV start time <MJD sec ns>");
        timing.timestamp(time.mjd, time.second, time.ns);
        Ok(())
    }

    /// Consumes one frame header at the current position, decoding what it
    /// carries
    fn consume_header(&mut self) {
        let mut header = [0u8; 16];
        let header_len = self.header_len as usize;
        if let Err(e) = self.file.read_exact(&mut header[..header_len]) {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                error!("header read I/O error: {}", e);
            }
            self.got_eof = true;
            return;
        }
        self.position += self.header_len;

        match self.format {
            InputFormat::Mark5B => {
                check_mark5b_sync(&header, self.position - self.header_len);
            }
            InputFormat::IBob => {
                // 4-byte packet sequence number, network byte order
                let sequence = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
                if sequence == 1 {
                    debug!("iBOB frame sequence restarted");
                }
            }
            _ => {}
        }
    }

    /// Streams payload bytes, consuming a header whenever the position
    /// reaches a frame boundary
    fn read_framed(&mut self, buf: &mut Buffer) -> usize {
        let frame_size = self.header_len + self.payload_len;
        let wanted = buf.allocated();
        let mut filled = 0usize;

        while filled < wanted && !self.got_eof {
            let in_frame = (self.position - self.first_header_offset) % frame_size;
            if in_frame == 0 {
                self.consume_header();
                continue;
            }

            // grab everything up to the next header boundary
            let until_header = (frame_size - in_frame) as usize;
            let want = until_header.min(wanted - filled);
            match self.file.read(&mut buf.bytes_mut()[filled..filled + want]) {
                Ok(0) => self.got_eof = true,
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                Err(e) => {
                    error!("Read I/O error: {}", e);
                    self.got_eof = true;
                }
            }
        }
        filled
    }

    /// Reads raw bytes with no framing
    fn read_plain(&mut self, buf: &mut Buffer) -> usize {
        let wanted = buf.allocated();
        let mut filled = 0usize;
        while filled < wanted && !self.got_eof {
            match self.file.read(&mut buf.bytes_mut()[filled..]) {
                Ok(0) => self.got_eof = true,
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                Err(e) => {
                    error!("Read I/O error: {}", e);
                    self.got_eof = true;
                }
            }
        }
        if filled != wanted && !self.got_eof {
            warn!("Read {} bytes instead of {}", filled, wanted);
        }
        filled
    }
}

impl DataSource for FileSource {
    fn read(&mut self, buf: &mut Buffer) -> usize {
        let read = if self.uses_frames {
            self.read_framed(buf)
        } else {
            self.read_plain(buf)
        };
        buf.set_length(read);
        read
    }

    fn eof(&self) -> bool {
        self.got_eof
    }

    fn close(&mut self) {
        debug!("closing input file {}", self.uri);
    }
}

/// Warns when a Mark5B header does not start with the sync word
fn check_mark5b_sync(header: &[u8; 16], offset: u64) {
    let sync = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if sync != MARK5B_SYNC {
        warn!(
            "Mark5B: incorrect header at file offset {:#x}, sync {:#010x}",
            offset, sync
        );
    }
}

/// Decodes the BCD VLBA time code of a Mark5B header into (MJD, second)
fn parse_mark5b_timecode(header: &[u8; 16]) -> (i32, i32) {
    let b = |i: usize| i32::from(header[i]);
    let mjd = MARK5B_MJD_ORIGIN + (b(11) >> 4) * 100 + (b(11) & 0x0F) * 10 + (b(10) >> 4);
    let second = (b(10) & 0x0F) * 10_000
        + (b(9) >> 4) * 1000
        + (b(9) & 0x0F) * 100
        + (b(8) >> 4) * 10
        + (b(8) & 0x0F);
    (mjd, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectrometerConfig;
    use std::io::Write;

    fn mark5b_header(frame_nr: u16, mjd_bcd: u8, sec_bcd: u32) -> [u8; 16] {
        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(&MARK5B_SYNC.to_le_bytes());
        header[4..6].copy_from_slice(&frame_nr.to_le_bytes());
        // BCD time code: byte 11 = centi-MJD, bytes 8..10 = seconds
        header[11] = mjd_bcd;
        header[10] = ((sec_bcd >> 16) & 0xFF) as u8;
        header[9] = ((sec_bcd >> 8) & 0xFF) as u8;
        header[8] = (sec_bcd & 0xFF) as u8;
        header
    }

    fn framed_settings() -> Settings {
        let config = SpectrometerConfig {
            fft_points: 256,
            integ_seconds: 1.0,
            samplingfreq: 2560.0,
            fft_overlap_factor: 1,
            source_format: InputFormat::Mark5B,
            source_format_str: "Mark5B".to_string(),
            bits_per_sample: 2,
            source_channels: 4,
            max_rawbuf_bytes: 1 << 20,
            ..SpectrometerConfig::default()
        };
        Settings::derive(&config, 1).unwrap()
    }

    #[test]
    fn test_timecode_parse() {
        // BCD fields: MJD digits 8,9,0 -> 56000 + 890; seconds 12345
        let mut header = mark5b_header(0, 0x89, 0);
        header[10] = 0x01;
        header[9] = 0x23;
        header[8] = 0x45;
        let (mjd, second) = parse_mark5b_timecode(&header);
        assert_eq!(mjd, 56890);
        assert_eq!(second, 12345);
    }

    #[test]
    fn test_framed_read_strips_headers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // two frames with recognisable payload patterns
        for frame in 0u8..2 {
            file.write_all(&mark5b_header(u16::from(frame), 0x01, 0)).unwrap();
            file.write_all(&vec![0xA0 + frame; 10_000]).unwrap();
        }
        file.flush().unwrap();

        let settings = framed_settings();
        let mut timing = TimingLog::sink();
        let mut source =
            FileSource::open(file.path().to_str().unwrap(), &settings, &mut timing, None).unwrap();

        let mut buf = Buffer::new(15_000);
        let read = source.read(&mut buf);
        assert_eq!(read, 15_000);
        assert!(buf.bytes()[..10_000].iter().all(|&b| b == 0xA0));
        assert!(buf.bytes()[10_000..15_000].iter().all(|&b| b == 0xA1));
        assert!(!source.eof());

        // the rest of frame 2, then EOF
        let mut rest = Buffer::new(10_000);
        let read = source.read(&mut rest);
        assert_eq!(read, 5_000);
        assert!(rest.bytes()[..5_000].iter().all(|&b| b == 0xA1));
        assert!(source.eof());
    }

    #[test]
    fn test_missing_file_fails_open() {
        let settings = framed_settings();
        let mut timing = TimingLog::sink();
        assert!(matches!(
            FileSource::open("/nonexistent/path.m5b", &settings, &mut timing, None),
            Err(Error::SourceOpenFailed(_))
        ));
    }
}
