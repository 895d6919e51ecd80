// softdma — software sound mixing core: channel allocation, stereo
// spatialization, ambient crossfades, sample-clock tracking and raw
// streaming over a pluggable playback device.
//
// The crate owns everything between "play this sound" and the painted
// sample window handed to the device: what to play, where it sits in the
// stereo field, and how far ahead of the hardware play position to mix.
// The inner per-sample paint loop and the device itself stay behind the
// `ChannelPainter` and `SoundDevice` traits.

pub mod channel;
pub mod clock;
pub mod device;
pub mod dma;
pub mod math;
pub mod params;
pub mod shared;
pub mod sound;
pub mod stream;

pub use channel::{
    spatialize, Channel, ChannelPool, Listener, AMBIENT_SKY, AMBIENT_WATER, MAX_CHANNELS,
    MAX_DYNAMIC_CHANNELS, NUM_AMBIENTS, SELF_SOUND, SOUND_NOMINAL_CLIP_DIST, STATIC_BASE,
};
pub use clock::{SampleClock, PAINT_CLOCK_LIMIT};
pub use device::{AmbientWorld, ChannelPainter, DeviceFormat, MixView, SampleView, SoundDevice};
pub use dma::SoundCore;
pub use math::{Vec3, VEC3_ORIGIN};
pub use params::SoundParams;
pub use shared::SoundShared;
pub use sound::{SfxCache, SfxRegistry, SoundHandle, SoundLoader};
pub use stream::{StreamBank, StreamError, MAX_RAW_CACHE, MAX_RAW_SOURCES};
