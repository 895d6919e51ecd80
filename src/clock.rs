// clock.rs — wrap-safe absolute sample clock derived from the device
// play position

/// When `paintedtime` crosses this, the clock re-epochs to keep well clear
/// of 32-bit sample arithmetic in the paint path.
pub const PAINT_CLOCK_LIMIT: i64 = 0x4000_0000;

/// Tracks `soundtime` (hardware-derived absolute sample position) and
/// `paintedtime` (absolute position already mixed). Invariant:
/// `paintedtime >= soundtime` after every frame update, and neither
/// regresses except across an explicit re-epoch or full stop.
#[derive(Debug, Default)]
pub struct SampleClock {
    /// Completed trips through the device ring buffer.
    buffers: i64,
    old_samplepos: u32,
    pub soundtime: i64,
    pub paintedtime: i64,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a raw device play position into the absolute sample counter.
    /// Must be called at most once per mix cycle, on the single audio
    /// update path. Returns true when the accumulated time crossed
    /// PAINT_CLOCK_LIMIT and the clock re-epoched; the caller must then
    /// stop and clear all channels.
    pub fn advance(&mut self, samplepos: u32, frame_capacity: u32, device_channels: u32) -> bool {
        let mut reepoch = false;

        if samplepos < self.old_samplepos {
            self.buffers += 1; // buffer wrapped

            if self.paintedtime > PAINT_CLOCK_LIMIT {
                // chop things off to avoid overflowing sample arithmetic
                self.buffers = 0;
                self.paintedtime = frame_capacity as i64;
                reepoch = true;
            }
        }

        self.old_samplepos = samplepos;
        self.soundtime =
            self.buffers * frame_capacity as i64 + (samplepos / device_channels) as i64;
        reepoch
    }

    /// Full stop: both counters return to zero. Only valid while no
    /// channel holds a position derived from the old epoch.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: u32 = 4096; // frames
    const CHANS: u32 = 2;

    #[test]
    fn soundtime_tracks_raw_position() {
        let mut clock = SampleClock::new();
        assert!(!clock.advance(512, CAP, CHANS));
        assert_eq!(clock.soundtime, 256);
        assert!(!clock.advance(2048, CAP, CHANS));
        assert_eq!(clock.soundtime, 1024);
    }

    #[test]
    fn single_wrap_keeps_time_strictly_increasing() {
        let mut clock = SampleClock::new();
        let positions = [1000u32, 3000, 6000, 8000, 500, 2500];
        let mut last = -1i64;
        for pos in positions {
            assert!(!clock.advance(pos, CAP, CHANS));
            assert!(clock.soundtime > last);
            last = clock.soundtime;
        }
        // one wrap happened: 500/2 + one full buffer
        assert_eq!(clock.soundtime, CAP as i64 + 1250);
    }

    #[test]
    fn reepoch_fires_only_past_paint_limit() {
        let mut clock = SampleClock::new();
        clock.advance(4000, CAP, CHANS);
        clock.paintedtime = PAINT_CLOCK_LIMIT + 1;

        let reepoch = clock.advance(100, CAP, CHANS);
        assert!(reepoch);
        assert_eq!(clock.paintedtime, CAP as i64);
        assert_eq!(clock.soundtime, 50); // wrap counter rebased to zero
    }

    #[test]
    fn wrap_below_limit_does_not_reepoch() {
        let mut clock = SampleClock::new();
        clock.advance(4000, CAP, CHANS);
        clock.paintedtime = 10_000;
        assert!(!clock.advance(100, CAP, CHANS));
        assert_eq!(clock.paintedtime, 10_000);
    }
}
