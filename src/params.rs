// params.rs — runtime-tunable mixer settings
//
// The console/cvar layer lives outside this crate; whatever owns it pushes
// new values into this struct between frames.

/// Tunable mixer parameters. Field defaults match the classic sound cvars.
#[derive(Debug, Clone)]
pub struct SoundParams {
    /// Master volume for entity-triggered sounds, 0.0..=1.0.
    pub volume: f32,
    /// Volume applied to streaming (raw) audio channels, 0.0..=1.0.
    pub raw_volume: f32,
    /// Scales world-reported ambient intensities. 0 silences all ambients.
    pub ambient_level: f32,
    /// Ambient volume slew rate in volume units (0..255) per second.
    pub ambient_fade: f32,
    /// Seconds of audio to render ahead of the hardware play position.
    pub mixahead: f32,
    /// Load sound data at registration time instead of first play.
    pub precache: bool,
    /// Disables the between-frames extra mix pass.
    pub no_extra_update: bool,
    /// Use linear interpolation instead of point sampling for stream ingest.
    pub linear_resample_stream: bool,
    /// Log the number of audible channels whenever it changes.
    pub show: bool,
}

impl Default for SoundParams {
    fn default() -> Self {
        Self {
            volume: 0.7,
            raw_volume: 1.0,
            ambient_level: 0.3,
            ambient_fade: 100.0,
            mixahead: 0.1,
            precache: true,
            no_extra_update: false,
            linear_resample_stream: false,
            show: false,
        }
    }
}
