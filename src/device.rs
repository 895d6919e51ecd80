// device.rs — collaborator contracts: playback hardware, world queries,
// and the sample-painting inner loop

use crate::channel::Channel;
use crate::math::Vec3;
use crate::sound::{SfxRegistry, SoundHandle};
use crate::stream::StreamBank;
use crate::NUM_AMBIENTS;

/// Native format of the playback device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    /// Sample rate in Hz.
    pub speed: u32,
    /// Bytes per sample (1 = unsigned 8-bit, 2 = signed 16-bit).
    pub width: u32,
    /// Output channel count (1 = mono, 2 = stereo).
    pub channels: u32,
}

/// The hardware playback ring buffer. The core only writes; submission and
/// device synchronization live behind this trait.
pub trait SoundDevice {
    fn format(&self) -> DeviceFormat;

    /// Ring buffer capacity in sample frames.
    fn frame_capacity(&self) -> u32;

    /// Current play position in samples, modulo the buffer length.
    /// Must be monotonic between wraps.
    fn playback_position(&mut self) -> u32;

    /// Zero-fill the buffer with the given bias byte.
    fn clear(&mut self, bias: u8);

    fn begin_painting(&mut self) {}
    fn submit(&mut self) {}
}

/// World-geometry collaborator for ambient sound levels.
pub trait AmbientWorld {
    /// Per-slot ambient intensities (0..255) at the listener position, or
    /// None when the position is outside any resolvable region.
    fn ambient_levels(&self, origin: &Vec3) -> Option<[u8; NUM_AMBIENTS]>;
}

/// Read-only view of one sound's PCM, uniform across registered assets and
/// live stream buffers.
pub struct SampleView<'a> {
    pub data: &'a [u8],
    pub speed: u32,
    pub width: u32,
    pub channels: u32,
    /// Valid sample frames in `data`.
    pub total_length: i64,
    /// Loop point, or -1 for one-shot data (streams are always -1).
    pub loopstart: i64,
}

/// Everything the external mixing step needs for one paint call.
pub struct MixView<'a> {
    /// All populated channels, ambient range first.
    pub channels: &'a mut [Channel],
    pub sounds: &'a SfxRegistry,
    pub streams: &'a StreamBank,
    /// Absolute sample position already mixed; painting covers
    /// `[paintedtime, endtime)`.
    pub paintedtime: i64,
    /// Master gain the painter applies on top of channel volumes.
    pub volume: f32,
}

impl<'a> MixView<'a> {
    pub fn resolve(&self, handle: SoundHandle) -> Option<SampleView<'_>> {
        match handle {
            SoundHandle::Sfx(idx) => self.sounds.cache(idx).map(|sc| SampleView {
                data: &sc.data,
                speed: sc.speed,
                width: sc.width,
                channels: sc.channels,
                total_length: sc.total_length as i64,
                loopstart: sc.loopstart as i64,
            }),
            SoundHandle::Stream(idx) => self.streams.sample_view(idx),
        }
    }
}

/// The final sample-mixing inner loop. Implementations sum channel volumes
/// into the device buffer over `[view.paintedtime, endtime)` and may advance
/// each channel's `pos` and `end` (loop restarts included); the core clears
/// ended one-shot channels afterwards.
pub trait ChannelPainter {
    fn paint(&mut self, view: &mut MixView<'_>, endtime: i64);
}
