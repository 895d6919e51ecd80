// channel.rs — mixing channel slots: allocation, eviction, spatialization

use log::warn;

use crate::math::{dot_product, vector_normalize, vector_subtract, Vec3};
use crate::sound::SoundHandle;

/// Ambient slots always occupy the front of the channel array.
pub const NUM_AMBIENTS: usize = 4;
pub const AMBIENT_WATER: usize = 0;
pub const AMBIENT_SKY: usize = 1;

/// Contended, evictable slots for entity-triggered sounds.
pub const MAX_DYNAMIC_CHANNELS: usize = 8;

/// Total slots; everything past the dynamic range holds static sounds.
pub const MAX_CHANNELS: usize = 128;

/// First static slot, and the value `total_channels` resets to.
pub const STATIC_BASE: usize = NUM_AMBIENTS + MAX_DYNAMIC_CHANNELS;

/// Distance at which a sound with attenuation 1 fades to silence.
pub const SOUND_NOMINAL_CLIP_DIST: f32 = 1000.0;

/// Sentinel entity id for unattached sources that always play at full
/// volume with no 3D attenuation (local UI sounds, streaming audio).
pub const SELF_SOUND: i32 = i32::MAX;

/// One audible sound instance.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub sfx: Option<SoundHandle>,
    /// Owning entity, or SELF_SOUND.
    pub entnum: i32,
    /// Entity sub-channel; 0 never preempts, -1 matches any on override.
    pub entchannel: i32,
    pub origin: Vec3,
    /// Attenuation divided by the nominal clip distance.
    pub dist_mult: f32,
    /// 0..=255 master volume before spatialization.
    pub master_vol: i32,
    pub leftvol: i32,
    pub rightvol: i32,
    /// Fractional read position in sample frames.
    pub pos: f64,
    /// Absolute sample time at which this channel finishes.
    pub end: i64,
}

/// Listener pose and identity, refreshed once per frame.
#[derive(Debug, Clone, Default)]
pub struct Listener {
    /// The listener's own entity id; its sounds bypass spatialization and
    /// are protected from eviction.
    pub entnum: i32,
    pub origin: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

/// Computes left/right volumes from listener/source geometry.
pub fn spatialize(ch: &mut Channel, listener: &Listener, output_channels: u32) {
    // anything coming from the view entity is always full volume
    if ch.entnum == listener.entnum || ch.entnum == SELF_SOUND {
        ch.leftvol = ch.master_vol;
        ch.rightvol = ch.master_vol;
        return;
    }

    let mut source_vec = vector_subtract(&ch.origin, &listener.origin);
    let dist = vector_normalize(&mut source_vec) * ch.dist_mult;
    let dot = dot_product(&listener.right, &source_vec);

    let (rscale, lscale) = if output_channels == 1 {
        (1.0, 1.0)
    } else {
        (1.0 + dot, 1.0 - dot)
    };

    let scale = (1.0 - dist) * rscale;
    ch.rightvol = ((ch.master_vol as f32 * scale) as i32).max(0);

    let scale = (1.0 - dist) * lscale;
    ch.leftvol = ((ch.master_vol as f32 * scale) as i32).max(0);
}

/// Fixed pool of channel slots: `[0, NUM_AMBIENTS)` ambient,
/// `[NUM_AMBIENTS, STATIC_BASE)` dynamic, `[STATIC_BASE, total_channels)`
/// static. `total_channels` is the high-water mark of populated static slots.
pub struct ChannelPool {
    channels: [Channel; MAX_CHANNELS],
    pub total_channels: usize,
}

impl Default for ChannelPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPool {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| Channel::default()),
            total_channels: STATIC_BASE,
        }
    }

    pub fn get(&self, idx: usize) -> &Channel {
        &self.channels[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Channel {
        &mut self.channels[idx]
    }

    /// All populated slots, ambient range first.
    pub fn active(&self) -> &[Channel] {
        &self.channels[..self.total_channels]
    }

    pub fn active_mut(&mut self) -> &mut [Channel] {
        &mut self.channels[..self.total_channels]
    }

    /// Picks a dynamic channel for a new sound. An existing channel on the
    /// same entity and sub-channel is always reused (entchannel -1 matches
    /// any; 0 never overrides). Otherwise the unprotected channel with the
    /// least remaining playtime is evicted. Returns None when every
    /// candidate is a protected listener sound.
    pub fn pick(
        &mut self,
        entnum: i32,
        entchannel: i32,
        listener_entnum: i32,
        paintedtime: i64,
    ) -> Option<usize> {
        let mut first_to_die: Option<usize> = None;
        let mut life_left = i64::MAX;

        for ch_idx in NUM_AMBIENTS..STATIC_BASE {
            let ch = &self.channels[ch_idx];

            if entchannel != 0
                && ch.entnum == entnum
                && (ch.entchannel == entchannel || entchannel == -1)
            {
                // always override a sound from the same emitter slot
                first_to_die = Some(ch_idx);
                break;
            }

            // don't let other entities' sounds evict the listener's own
            if ch.entnum == listener_entnum && entnum != listener_entnum && ch.sfx.is_some() {
                continue;
            }

            if ch.end - paintedtime < life_left {
                life_left = ch.end - paintedtime;
                first_to_die = Some(ch_idx);
            }
        }

        let idx = first_to_die?;
        self.channels[idx].sfx = None;
        Some(idx)
    }

    /// Silences the dynamic channel owned by (entnum, entchannel), if any.
    pub fn stop(&mut self, entnum: i32, entchannel: i32) {
        for ch in &mut self.channels[NUM_AMBIENTS..STATIC_BASE] {
            if ch.entnum == entnum && ch.entchannel == entchannel {
                ch.end = 0;
                ch.sfx = None;
                return;
            }
        }
    }

    /// Silences everything and drops all static slots.
    pub fn stop_all(&mut self) {
        for ch in &mut self.channels {
            *ch = Channel::default();
        }
        self.total_channels = STATIC_BASE;
    }

    /// Reserves the next static slot. Fails with a log when the static
    /// range is exhausted.
    pub fn alloc_static(&mut self) -> Option<usize> {
        if self.total_channels == MAX_CHANNELS {
            warn!("total_channels == MAX_CHANNELS");
            return None;
        }
        let idx = self.total_channels;
        self.total_channels += 1;
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener_at_origin() -> Listener {
        Listener {
            entnum: 1,
            origin: [0.0, 0.0, 0.0],
            forward: [1.0, 0.0, 0.0],
            right: [0.0, -1.0, 0.0],
            up: [0.0, 0.0, 1.0],
        }
    }

    // ========== spatialize ==========

    #[test]
    fn spatialize_source_at_listener_is_full_volume() {
        let listener = listener_at_origin();
        let mut ch = Channel {
            entnum: 50,
            master_vol: 200,
            dist_mult: 0.0,
            origin: [0.0, 0.0, 0.0],
            ..Channel::default()
        };
        spatialize(&mut ch, &listener, 2);
        assert_eq!(ch.leftvol, 200);
        assert_eq!(ch.rightvol, 200);
    }

    #[test]
    fn spatialize_listener_own_sound_bypasses_attenuation() {
        let listener = listener_at_origin();
        let mut ch = Channel {
            entnum: 1,
            master_vol: 255,
            dist_mult: 1.0 / SOUND_NOMINAL_CLIP_DIST,
            origin: [5000.0, 0.0, 0.0],
            ..Channel::default()
        };
        spatialize(&mut ch, &listener, 2);
        assert_eq!((ch.leftvol, ch.rightvol), (255, 255));
    }

    #[test]
    fn spatialize_self_sound_sentinel_bypasses_attenuation() {
        let listener = listener_at_origin();
        let mut ch = Channel {
            entnum: SELF_SOUND,
            master_vol: 99,
            origin: [5000.0, 0.0, 0.0],
            dist_mult: 1.0,
            ..Channel::default()
        };
        spatialize(&mut ch, &listener, 2);
        assert_eq!((ch.leftvol, ch.rightvol), (99, 99));
    }

    #[test]
    fn spatialize_beyond_clip_distance_is_silent() {
        let listener = listener_at_origin();
        let mut ch = Channel {
            entnum: 50,
            master_vol: 255,
            dist_mult: 1.0 / SOUND_NOMINAL_CLIP_DIST,
            origin: [2000.0, 0.0, 0.0],
            ..Channel::default()
        };
        spatialize(&mut ch, &listener, 2);
        assert_eq!((ch.leftvol, ch.rightvol), (0, 0));
    }

    #[test]
    fn spatialize_pans_toward_source_side() {
        let listener = listener_at_origin();
        // source on the listener's right (right = -Y, so source at -Y)
        let mut ch = Channel {
            entnum: 50,
            master_vol: 255,
            dist_mult: 0.5 / SOUND_NOMINAL_CLIP_DIST,
            origin: [0.0, -100.0, 0.0],
            ..Channel::default()
        };
        spatialize(&mut ch, &listener, 2);
        assert!(ch.rightvol > ch.leftvol);
        assert!(ch.leftvol >= 0);
    }

    #[test]
    fn spatialize_mono_output_ignores_pan() {
        let listener = listener_at_origin();
        let mut ch = Channel {
            entnum: 50,
            master_vol: 200,
            dist_mult: 0.5 / SOUND_NOMINAL_CLIP_DIST,
            origin: [0.0, -100.0, 0.0],
            ..Channel::default()
        };
        spatialize(&mut ch, &listener, 1);
        assert_eq!(ch.leftvol, ch.rightvol);
    }

    #[test]
    fn spatialize_is_idempotent() {
        let listener = listener_at_origin();
        let mut ch = Channel {
            entnum: 50,
            master_vol: 180,
            dist_mult: 1.0 / SOUND_NOMINAL_CLIP_DIST,
            origin: [300.0, 150.0, -40.0],
            ..Channel::default()
        };
        spatialize(&mut ch, &listener, 2);
        let first = (ch.leftvol, ch.rightvol);
        spatialize(&mut ch, &listener, 2);
        assert_eq!(first, (ch.leftvol, ch.rightvol));
    }

    // ========== pick ==========

    #[test]
    fn pick_reuses_same_entity_and_subchannel() {
        let mut pool = ChannelPool::new();
        let idx = pool.pick(7, 2, 1, 0).unwrap();
        pool.get_mut(idx).sfx = Some(SoundHandle::Sfx(0));
        pool.get_mut(idx).entnum = 7;
        pool.get_mut(idx).entchannel = 2;
        pool.get_mut(idx).end = 100_000;

        let again = pool.pick(7, 2, 1, 0).unwrap();
        assert_eq!(again, idx);
        assert!(pool.get(again).sfx.is_none());
    }

    #[test]
    fn pick_wildcard_subchannel_matches_any() {
        let mut pool = ChannelPool::new();
        let idx = NUM_AMBIENTS;
        pool.get_mut(idx).sfx = Some(SoundHandle::Sfx(0));
        pool.get_mut(idx).entnum = 7;
        pool.get_mut(idx).entchannel = 3;
        pool.get_mut(idx).end = 100_000;

        assert_eq!(pool.pick(7, -1, 1, 0), Some(idx));
    }

    #[test]
    fn pick_evicts_soonest_to_finish() {
        let mut pool = ChannelPool::new();
        for (i, end) in (NUM_AMBIENTS..STATIC_BASE).zip([500i64, 90, 800, 200, 950, 700, 400, 600])
        {
            let ch = pool.get_mut(i);
            ch.sfx = Some(SoundHandle::Sfx(0));
            ch.entnum = 100 + i as i32;
            ch.entchannel = 1;
            ch.end = end;
        }
        // entchannel 0 never overrides, so eviction has to pick min end
        let idx = pool.pick(999, 0, 1, 0).unwrap();
        assert_eq!(idx, NUM_AMBIENTS + 1);
    }

    #[test]
    fn pick_protects_listener_sounds_from_others() {
        let mut pool = ChannelPool::new();
        let listener = 1;
        for i in NUM_AMBIENTS..STATIC_BASE {
            let ch = pool.get_mut(i);
            ch.sfx = Some(SoundHandle::Sfx(0));
            ch.entnum = listener;
            ch.entchannel = 1;
            ch.end = 100;
        }
        // leave one non-listener channel as the only legal victim
        let victim = STATIC_BASE - 1;
        pool.get_mut(victim).entnum = 42;
        pool.get_mut(victim).end = 1_000_000;

        assert_eq!(pool.pick(99, 0, listener, 0), Some(victim));
    }

    #[test]
    fn pick_fails_when_all_candidates_protected() {
        let mut pool = ChannelPool::new();
        let listener = 1;
        for i in NUM_AMBIENTS..STATIC_BASE {
            let ch = pool.get_mut(i);
            ch.sfx = Some(SoundHandle::Sfx(0));
            ch.entnum = listener;
            ch.entchannel = 1;
            ch.end = 100;
        }
        assert_eq!(pool.pick(99, 0, listener, 0), None);
    }

    #[test]
    fn pick_lets_listener_replace_own_sound() {
        let mut pool = ChannelPool::new();
        let listener = 1;
        for i in NUM_AMBIENTS..STATIC_BASE {
            let ch = pool.get_mut(i);
            ch.sfx = Some(SoundHandle::Sfx(0));
            ch.entnum = listener;
            ch.entchannel = 1;
            ch.end = 100 + i as i64;
        }
        // the listener's own new sound is not blocked by the protection rule
        assert_eq!(pool.pick(listener, 0, listener, 0), Some(NUM_AMBIENTS));
    }

    // ========== stop / static ==========

    #[test]
    fn stop_silences_exact_owner_match_only() {
        let mut pool = ChannelPool::new();
        let a = NUM_AMBIENTS;
        let b = NUM_AMBIENTS + 1;
        for (i, sub) in [(a, 1), (b, 2)] {
            let ch = pool.get_mut(i);
            ch.sfx = Some(SoundHandle::Sfx(0));
            ch.entnum = 7;
            ch.entchannel = sub;
            ch.end = 500;
        }
        pool.stop(7, 1);
        assert!(pool.get(a).sfx.is_none());
        assert_eq!(pool.get(a).end, 0);
        assert!(pool.get(b).sfx.is_some());
    }

    #[test]
    fn stop_all_resets_high_water_mark_and_clears_sounds() {
        let mut pool = ChannelPool::new();
        for _ in 0..5 {
            let idx = pool.alloc_static().unwrap();
            pool.get_mut(idx).sfx = Some(SoundHandle::Sfx(3));
        }
        pool.get_mut(NUM_AMBIENTS).sfx = Some(SoundHandle::Sfx(1));
        pool.stop_all();

        assert_eq!(pool.total_channels, STATIC_BASE);
        assert!(pool.active().iter().all(|ch| ch.sfx.is_none()));
    }

    #[test]
    fn alloc_static_fails_when_range_exhausted() {
        let mut pool = ChannelPool::new();
        for _ in STATIC_BASE..MAX_CHANNELS {
            assert!(pool.alloc_static().is_some());
        }
        assert!(pool.alloc_static().is_none());
        assert_eq!(pool.total_channels, MAX_CHANNELS);
    }
}
