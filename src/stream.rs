// stream.rs — streaming (raw) audio ingest: per-source rolling buffers,
// resampling to the device-native format

use log::debug;
use thiserror::Error;

use crate::device::{DeviceFormat, SampleView};

/// Fixed byte capacity of each source's rolling buffer.
pub const MAX_RAW_CACHE: usize = 32 * 1024;

/// Simultaneous streaming sources (every client plus one local source).
pub const MAX_RAW_SOURCES: usize = 33;

/// Buffered backlog past this many seconds of native audio is sacrificed.
pub const RAW_BACKLOG_LIMIT_SECS: i64 = 2;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no free audio streams")]
    NoFreeSlots,
    #[error("stream cache overflow: need {needed} bytes, cap {cap}")]
    CacheOverflow { needed: usize, cap: usize },
}

// ============================================================
// Resampling
// ============================================================

fn read_sample(input: &[u8], frame: usize, ch: u32, in_channels: u32, in_width: u32) -> i32 {
    let idx = (frame * in_channels as usize + ch as usize) * in_width as usize;
    if in_width == 1 {
        // unsigned 8-bit, center 128
        match input.get(idx) {
            Some(&b) => ((b as i32) - 128) << 8,
            None => 0,
        }
    } else if idx + 1 < input.len() {
        i16::from_le_bytes([input[idx], input[idx + 1]]) as i32
    } else {
        0
    }
}

fn mapped_sample(
    input: &[u8],
    frame: usize,
    out_ch: u32,
    in_channels: u32,
    in_width: u32,
    out_channels: u32,
) -> i32 {
    if out_channels == 1 && in_channels == 2 {
        let l = read_sample(input, frame, 0, in_channels, in_width);
        let r = read_sample(input, frame, 1, in_channels, in_width);
        (l + r) / 2
    } else {
        let src_ch = out_ch.min(in_channels - 1);
        read_sample(input, frame, src_ch, in_channels, in_width)
    }
}

fn write_sample(out: &mut Vec<u8>, value: i32, out_width: u32) {
    let v = value.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    if out_width == 1 {
        out.push(((v >> 8) + 128) as u8);
    } else {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Converts `out_samples` frames from the input block's rate/width/channel
/// layout to the output layout, appending to `out`. `linear` selects linear
/// interpolation over point sampling.
#[allow(clippy::too_many_arguments)]
pub fn resample_stream(
    input: &[u8],
    in_rate: u32,
    in_width: u32,
    in_channels: u32,
    in_samples: usize,
    out: &mut Vec<u8>,
    out_rate: u32,
    out_width: u32,
    out_channels: u32,
    out_samples: usize,
    linear: bool,
) {
    if in_samples == 0 || in_rate == 0 {
        return;
    }
    let last = in_samples - 1;
    let step = in_rate as f64 / out_rate as f64;

    for i in 0..out_samples {
        let srcpos = i as f64 * step;
        let src = (srcpos as usize).min(last);
        for ch in 0..out_channels {
            let value = if linear {
                let frac = srcpos - srcpos.floor();
                let s0 = mapped_sample(input, src, ch, in_channels, in_width, out_channels);
                let s1 = mapped_sample(
                    input,
                    (src + 1).min(last),
                    ch,
                    in_channels,
                    in_width,
                    out_channels,
                );
                (s0 as f64 + (s1 - s0) as f64 * frac) as i32
            } else {
                mapped_sample(input, src, ch, in_channels, in_width, out_channels)
            };
            write_sample(out, value, out_width);
        }
    }
}

// ============================================================
// Rolling buffer
// ============================================================

/// Byte buffer with the two operations stream splicing needs: drop consumed
/// frames from the front and append freshly resampled ones at the back.
#[derive(Default)]
pub struct StreamBuffer {
    data: Vec<u8>,
}

impl StreamBuffer {
    /// Keeps `keep` bytes starting at offset `from`, shifted to the start.
    pub fn retain(&mut self, from: usize, keep: usize) {
        let from = from.min(self.data.len());
        let end = (from + keep).min(self.data.len());
        self.data.copy_within(from..end, 0);
        self.data.truncate(end - from);
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Releases the backing memory, not just the logical length.
    pub fn free(&mut self) {
        self.data = Vec::new();
    }
}

// ============================================================
// Stream bank
// ============================================================

/// What a splice did to the buffered backlog, used to retime the bound
/// channel afterwards.
#[derive(Debug, Clone, Copy)]
pub struct SpliceOutcome {
    /// Frames dropped from the front (already played by the channel).
    pub prepad_consumed: i64,
    /// Frames appended from this push.
    pub appended: i64,
}

#[derive(Default)]
struct StreamSlot {
    inuse: bool,
    id: i32,
    /// Native format the buffered data is stored in.
    speed: u32,
    width: u32,
    channels: u32,
    /// Input layout of the previous push, for discontinuity detection.
    in_width: u32,
    in_channels: u32,
    /// Valid frames in `buf`.
    total_length: i64,
    /// Cleared when the stream is closed so the painter stops reading it.
    live: bool,
    buf: StreamBuffer,
}

impl StreamSlot {
    fn frame_bytes(&self) -> usize {
        (self.channels * self.width) as usize
    }
}

/// Fixed table of streaming sources keyed by caller-supplied ids. The bank
/// owns every buffer; channels only carry a slot index while a stream is
/// audible.
pub struct StreamBank {
    slots: [StreamSlot; MAX_RAW_SOURCES],
}

impl Default for StreamBank {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBank {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| StreamSlot::default()),
        }
    }

    /// Reuses the in-use slot with a matching id, else claims the first
    /// free slot.
    pub fn find_or_claim(&mut self, sourceid: i32) -> Result<usize, StreamError> {
        let mut free = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.inuse {
                if free.is_none() {
                    free = Some(i);
                }
                continue;
            }
            if slot.id == sourceid {
                return Ok(i);
            }
        }
        free.ok_or(StreamError::NoFreeSlots)
    }

    pub fn is_inuse(&self, idx: usize) -> bool {
        self.slots[idx].inuse
    }

    pub fn total_length(&self, idx: usize) -> i64 {
        self.slots[idx].total_length
    }

    pub fn buffer_bytes(&self, idx: usize) -> usize {
        self.slots[idx].buf.len()
    }

    /// Claims the slot for a new source with an empty native-format buffer.
    /// `in_channels`/`in_width` record the first push's input layout so the
    /// first block is not misread as a format change.
    pub fn init_slot(
        &mut self,
        idx: usize,
        sourceid: i32,
        native: DeviceFormat,
        in_channels: u32,
        in_width: u32,
    ) {
        let slot = &mut self.slots[idx];
        *slot = StreamSlot {
            inuse: true,
            id: sourceid,
            speed: native.speed,
            width: native.width,
            channels: native.channels,
            in_width,
            in_channels,
            total_length: 0,
            live: true,
            buf: StreamBuffer::default(),
        };
    }

    /// A mid-stream change of the input layout is a discontinuity: the
    /// buffered tail is discarded, not an error. Rate changes resample.
    pub fn note_input_format(&mut self, idx: usize, in_channels: u32, in_width: u32) {
        let slot = &mut self.slots[idx];
        if slot.in_channels != in_channels || slot.in_width != in_width {
            slot.in_channels = in_channels;
            slot.in_width = in_width;
            slot.total_length = 0;
            slot.buf.retain(0, 0);
            debug!("raw stream {} input format changed, restarting", slot.id);
        }
    }

    /// Splices one pushed block into the slot's buffer: retains the unread
    /// prepad, sacrifices backlog past the latency ceiling, resamples the
    /// block to native format and appends it. `prepad` is the bound
    /// channel's read position, or None when nothing references the stream.
    pub fn splice(
        &mut self,
        idx: usize,
        input: &[u8],
        rate: u32,
        samples: u32,
        in_channels: u32,
        in_width: u32,
        prepad: Option<i64>,
        linear: bool,
    ) -> Result<SpliceOutcome, StreamError> {
        let slot = &mut self.slots[idx];

        let (prepadl, spare) = match prepad {
            None => (0, 0),
            Some(pos) => {
                let prepadl = pos.max(0);
                let mut spare = (slot.total_length - prepadl).max(0);
                if spare > slot.speed as i64 * RAW_BACKLOG_LIMIT_SECS {
                    debug!("sacrificed raw sound stream {}", slot.id);
                    spare = 0; // too far out, sacrifice it all
                }
                (prepadl, spare)
            }
        };

        let outsamples = (samples as f64 / (rate as f64 / slot.speed as f64)) as i64;

        let fb = slot.frame_bytes();
        let needed = (spare + outsamples) as usize * fb;
        if needed >= MAX_RAW_CACHE {
            return Err(StreamError::CacheOverflow {
                needed,
                cap: MAX_RAW_CACHE,
            });
        }

        slot.buf.retain(prepadl as usize * fb, spare as usize * fb);
        resample_stream(
            input,
            rate,
            in_width,
            in_channels,
            samples as usize,
            &mut slot.buf.data,
            slot.speed,
            slot.width,
            slot.channels,
            outsamples as usize,
            linear,
        );
        slot.total_length = spare + outsamples;

        Ok(SpliceOutcome {
            prepad_consumed: prepadl,
            appended: outsamples,
        })
    }

    /// Stops the stream and frees its buffer. The caller detaches any
    /// channel still referencing the slot.
    pub fn clear_slot(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        slot.live = false;
        slot.buf.free();
        *slot = StreamSlot::default();
    }

    pub fn clear_all(&mut self) {
        for i in 0..MAX_RAW_SOURCES {
            self.clear_slot(i);
        }
    }

    /// PCM view for the painter; None once the stream is closed.
    pub fn sample_view(&self, idx: usize) -> Option<SampleView<'_>> {
        let slot = self.slots.get(idx)?;
        if !slot.inuse || !slot.live {
            return None;
        }
        Some(SampleView {
            data: slot.buf.as_slice(),
            speed: slot.speed,
            width: slot.width,
            channels: slot.channels,
            total_length: slot.total_length,
            loopstart: -1,
        })
    }
}
