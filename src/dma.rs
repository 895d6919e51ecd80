// dma.rs — sound system dispatch: channel starts/stops, per-frame
// spatialization and combining, clock-driven mixing, raw stream binding

use log::{debug, info, warn};
use rand::Rng;

use crate::channel::{
    spatialize, Channel, ChannelPool, Listener, NUM_AMBIENTS, SELF_SOUND,
    SOUND_NOMINAL_CLIP_DIST, STATIC_BASE,
};
use crate::clock::SampleClock;
use crate::device::{AmbientWorld, ChannelPainter, DeviceFormat, MixView, SoundDevice};
use crate::math::Vec3;
use crate::params::SoundParams;
use crate::sound::{SfxRegistry, SoundHandle, SoundLoader};
use crate::stream::StreamBank;

/// Ambient targets below this (out of 255) snap to silence.
const AMBIENT_CUTOFF: i32 = 8;

/// The mixing core. All mutation happens on the single audio-update path;
/// wrap in [`crate::shared::SoundShared`] when stream pushes arrive from
/// another context.
pub struct SoundCore {
    started: bool,
    pub params: SoundParams,
    format: DeviceFormat,
    frame_capacity: u32,
    listener: Listener,
    channels: ChannelPool,
    clock: SampleClock,
    sfx: SfxRegistry,
    streams: StreamBank,
    ambient_sfx: [Option<SoundHandle>; NUM_AMBIENTS],
    /// Set by the first update; gates the extra mix pass.
    sound_spatialized: bool,
    printed_total: usize,
}

impl SoundCore {
    pub fn new(params: SoundParams) -> Self {
        Self {
            started: false,
            params,
            format: DeviceFormat {
                speed: 0,
                width: 0,
                channels: 0,
            },
            frame_capacity: 0,
            listener: Listener::default(),
            channels: ChannelPool::new(),
            clock: SampleClock::new(),
            sfx: SfxRegistry::new(),
            streams: StreamBank::new(),
            ambient_sfx: [None; NUM_AMBIENTS],
            sound_spatialized: false,
            printed_total: 0,
        }
    }

    /// Captures the device's native format and clears all playback state.
    /// Until this runs, every public operation is a no-op.
    pub fn startup(&mut self, device: &mut dyn SoundDevice) {
        info!("sound initialization");
        self.format = device.format();
        self.frame_capacity = device.frame_capacity();
        self.streams.clear_all();
        self.clock.reset();
        self.sound_spatialized = false;
        self.started = true;
        self.stop_all_sounds(device, true);
        info!(
            "{} Hz, {} bit, {} channel(s), {} frames",
            self.format.speed,
            self.format.width * 8,
            self.format.channels,
            self.frame_capacity
        );
    }

    pub fn shutdown(&mut self, device: &mut dyn SoundDevice) {
        if !self.started {
            return;
        }
        self.stop_all_sounds(device, true);
        self.streams.clear_all();
        self.sfx.clear();
        self.ambient_sfx = [None; NUM_AMBIENTS];
        self.sound_spatialized = false;
        self.started = false;
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// The listener's own entity id, used by eviction protection and the
    /// full-volume spatialization bypass.
    pub fn set_listener_entity(&mut self, entnum: i32) {
        self.listener.entnum = entnum;
    }

    /// Binds an ambient slot to a (looped) registered sound. Slots past
    /// the ambient range are ignored with a warning.
    pub fn set_ambient_sound(&mut self, slot: usize, sfx: Option<SoundHandle>) {
        if slot >= NUM_AMBIENTS {
            warn!("set_ambient_sound: no ambient slot {}", slot);
            return;
        }
        self.ambient_sfx[slot] = sfx;
    }

    pub fn paintedtime(&self) -> i64 {
        self.clock.paintedtime
    }

    // ============================================================
    // Registration
    // ============================================================

    /// Finds or creates the registry entry for `name`, loading its data
    /// now when precaching is on.
    pub fn register_sound(&mut self, name: &str, loader: SoundLoader) -> Option<SoundHandle> {
        if !self.started {
            return None;
        }
        let idx = self.sfx.find_name(name, true)?;
        if self.params.precache {
            self.sfx.ensure_loaded(idx, loader);
        }
        Some(SoundHandle::Sfx(idx))
    }

    fn resolve_length(&mut self, handle: SoundHandle, loader: SoundLoader) -> Option<i64> {
        match handle {
            SoundHandle::Sfx(idx) => {
                if !self.sfx.ensure_loaded(idx, loader) {
                    return None;
                }
                self.sfx.cache(idx).map(|sc| sc.total_length as i64)
            }
            SoundHandle::Stream(idx) => {
                if !self.streams.is_inuse(idx) {
                    return None;
                }
                Some(self.streams.total_length(idx))
            }
        }
    }

    fn loopstart_of(&self, handle: SoundHandle) -> i64 {
        match handle {
            SoundHandle::Sfx(idx) => self
                .sfx
                .cache(idx)
                .map(|sc| sc.loopstart as i64)
                .unwrap_or(-1),
            SoundHandle::Stream(_) => -1,
        }
    }

    // ============================================================
    // Starting and stopping sounds
    // ============================================================

    /// Starts a sound on a dynamic channel. `fvol` is 0.0..=1.0; an
    /// attenuation of 0 is audible at any distance. Failure to find a
    /// channel or load data drops the sound silently.
    #[allow(clippy::too_many_arguments)]
    pub fn start_sound(
        &mut self,
        entnum: i32,
        entchannel: i32,
        handle: SoundHandle,
        origin: &Vec3,
        fvol: f32,
        attenuation: f32,
        loader: SoundLoader,
    ) {
        if !self.started {
            return;
        }

        let target = match self.channels.pick(
            entnum,
            entchannel,
            self.listener.entnum,
            self.clock.paintedtime,
        ) {
            Some(idx) => idx,
            None => return,
        };

        {
            let ch = self.channels.get_mut(target);
            *ch = Channel {
                origin: *origin,
                dist_mult: attenuation / SOUND_NOMINAL_CLIP_DIST,
                master_vol: (fvol * 255.0) as i32,
                entnum,
                entchannel,
                ..Channel::default()
            };
        }
        let listener = self.listener.clone();
        spatialize(self.channels.get_mut(target), &listener, self.format.channels);

        {
            let ch = self.channels.get(target);
            if ch.leftvol == 0 && ch.rightvol == 0 {
                return; // not audible at all
            }
        }

        let total_length = match self.resolve_length(handle, loader) {
            Some(len) => len,
            None => return, // couldn't load the sound's data
        };

        {
            let ch = self.channels.get_mut(target);
            ch.sfx = Some(handle);
            ch.pos = 0.0;
            ch.end = self.clock.paintedtime + total_length;
        }

        // if an identical sound has also been started this frame, offset
        // the position a bit so coincident starts don't just get louder
        let max_skip = (0.1 * self.format.speed as f32) as i64;
        let duplicate = (NUM_AMBIENTS..STATIC_BASE).any(|i| {
            i != target
                && self.channels.get(i).sfx == Some(handle)
                && self.channels.get(i).pos == 0.0
        });
        if duplicate && max_skip > 0 {
            let mut skip = rand::thread_rng().gen_range(0..max_skip);
            if skip >= total_length {
                skip = total_length - 1;
            }
            let ch = self.channels.get_mut(target);
            ch.pos += skip as f64;
            ch.end -= skip;
        }
    }

    /// Registers and starts a UI/local sound at full volume, unattenuated.
    pub fn local_sound(&mut self, name: &str, loader: SoundLoader) {
        self.local_sound_with_vol(name, 1.0, loader);
    }

    /// `local_sound` with an explicit volume, clamped to 0.0..=1.0.
    pub fn local_sound_with_vol(&mut self, name: &str, volume: f32, loader: SoundLoader) {
        if !self.started {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let handle = match self.register_sound(name, loader) {
            Some(h) => h,
            None => {
                warn!("local_sound: can't cache {}", name);
                return;
            }
        };
        let origin = self.listener.origin;
        self.start_sound(self.listener.entnum, -1, handle, &origin, volume, 0.0, loader);
    }

    /// Silences the dynamic channel owned by (entnum, entchannel).
    pub fn stop_sound(&mut self, entnum: i32, entchannel: i32) {
        if !self.started {
            return;
        }
        self.channels.stop(entnum, entchannel);
    }

    /// Silences every channel and drops all statics. With `clear` the
    /// hardware buffer is zero-filled as well.
    pub fn stop_all_sounds(&mut self, device: &mut dyn SoundDevice, clear: bool) {
        if !self.started {
            return;
        }
        self.channels.stop_all();
        if clear {
            self.clear_buffer(device);
        }
    }

    fn clear_buffer(&mut self, device: &mut dyn SoundDevice) {
        // 8-bit device formats are unsigned, so silence is the midpoint
        let bias = if self.format.width == 1 { 0x80 } else { 0 };
        device.clear(bias);
    }

    /// Places a looping world sound on the next static slot. Volume is
    /// 0.0..=1.0. Statics are never stopped individually, only by
    /// stop_all_sounds.
    pub fn static_sound(
        &mut self,
        handle: SoundHandle,
        origin: &Vec3,
        vol: f32,
        attenuation: f32,
        loader: SoundLoader,
    ) {
        if !self.started {
            return;
        }
        let target = match self.channels.alloc_static() {
            Some(idx) => idx,
            None => return,
        };

        let total_length = match self.resolve_length(handle, loader) {
            Some(len) => len,
            None => return,
        };
        if self.loopstart_of(handle) == -1 {
            if let SoundHandle::Sfx(idx) = handle {
                warn!(
                    "sound {} not looped",
                    self.sfx.name(idx).unwrap_or("<unknown>")
                );
            }
            return;
        }

        {
            let ch = self.channels.get_mut(target);
            ch.sfx = Some(handle);
            ch.origin = *origin;
            ch.master_vol = (vol * 255.0) as i32;
            ch.dist_mult = (attenuation / 64.0) / SOUND_NOMINAL_CLIP_DIST;
            ch.end = self.clock.paintedtime + total_length;
        }
        let listener = self.listener.clone();
        spatialize(self.channels.get_mut(target), &listener, self.format.channels);
    }

    // ============================================================
    // Per-frame update
    // ============================================================

    /// Smoothly crossfades the always-resident ambient channels toward the
    /// world-reported intensities. Outside any resolvable region, or with
    /// the ambient level zeroed, all ambients go silent.
    fn update_ambient_sounds(&mut self, world: &dyn AmbientWorld, frametime: f32) {
        let levels = world.ambient_levels(&self.listener.origin);
        let levels = match levels {
            Some(l) if self.params.ambient_level > 0.0 => l,
            _ => {
                for slot in 0..NUM_AMBIENTS {
                    self.channels.get_mut(slot).sfx = None;
                }
                return;
            }
        };

        let step = (frametime * self.params.ambient_fade).round() as i32;
        for slot in 0..NUM_AMBIENTS {
            let sfx = self.ambient_sfx[slot];
            let mut vol = (self.params.ambient_level * levels[slot] as f32) as i32;
            if vol < AMBIENT_CUTOFF {
                vol = 0;
            }

            let ch = self.channels.get_mut(slot);
            ch.sfx = sfx;

            // don't adjust volume too fast
            if ch.master_vol < vol {
                ch.master_vol = (ch.master_vol + step).min(vol);
            } else if ch.master_vol > vol {
                ch.master_vol = (ch.master_vol - step).max(vol);
            }

            // ambient sound carries no stereo direction
            ch.leftvol = ch.master_vol;
            ch.rightvol = ch.master_vol;
        }
    }

    /// Called once each frame with the listener pose: refreshes ambients,
    /// respatializes every active channel, combines duplicate static
    /// sounds, then mixes ahead of the play position.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        origin: &Vec3,
        forward: &Vec3,
        right: &Vec3,
        up: &Vec3,
        frametime: f32,
        device: &mut dyn SoundDevice,
        world: &dyn AmbientWorld,
        painter: &mut dyn ChannelPainter,
    ) {
        if !self.started {
            return;
        }

        self.listener.origin = *origin;
        self.listener.forward = *forward;
        self.listener.right = *right;
        self.listener.up = *up;

        self.update_ambient_sounds(world, frametime);

        // update spatialization for static and dynamic sounds, folding
        // duplicate static sfx into one channel so a row of identical
        // torches doesn't cost a mix per instance
        let listener = self.listener.clone();
        let mut combine: Option<usize> = None;
        for i in NUM_AMBIENTS..self.channels.total_channels {
            let sfx = match self.channels.get(i).sfx {
                Some(s) => s,
                None => continue,
            };
            spatialize(self.channels.get_mut(i), &listener, self.format.channels);

            let (lv, rv) = {
                let ch = self.channels.get(i);
                (ch.leftvol, ch.rightvol)
            };
            if lv == 0 && rv == 0 {
                continue;
            }
            if i < STATIC_BASE {
                continue;
            }

            // see if the running combine target already carries this sfx
            if let Some(c) = combine {
                if self.channels.get(c).sfx == Some(sfx) {
                    self.fold_channel(i, c, lv, rv);
                    continue;
                }
            }
            // otherwise search earlier statics for one
            match (STATIC_BASE..i).find(|&j| self.channels.get(j).sfx == Some(sfx)) {
                Some(j) => {
                    combine = Some(j);
                    self.fold_channel(i, j, lv, rv);
                }
                None => combine = Some(i),
            }
        }

        self.sound_spatialized = true;

        if self.params.show {
            let total = self
                .channels
                .active()
                .iter()
                .filter(|ch| ch.sfx.is_some() && (ch.leftvol > 0 || ch.rightvol > 0))
                .count();
            if total != self.printed_total {
                debug!("{} sound(s) playing", total);
                self.printed_total = total;
            }
        }

        self.mix(device, painter);
    }

    fn fold_channel(&mut self, from: usize, into: usize, lv: i32, rv: i32) {
        {
            let target = self.channels.get_mut(into);
            target.leftvol += lv;
            target.rightvol += rv;
        }
        let src = self.channels.get_mut(from);
        src.leftvol = 0;
        src.rightvol = 0;
    }

    /// Extra mix pass between frames to shrink output latency. No-op when
    /// disabled or before the first spatialization pass.
    pub fn extra_update(&mut self, device: &mut dyn SoundDevice, painter: &mut dyn ChannelPainter) {
        if !self.started {
            return;
        }
        if self.params.no_extra_update || !self.sound_spatialized {
            return; // don't pollute timings
        }
        self.mix(device, painter);
    }

    fn mix(&mut self, device: &mut dyn SoundDevice, painter: &mut dyn ChannelPainter) {
        let samplepos = device.playback_position();
        let reepoch = self
            .clock
            .advance(samplepos, self.frame_capacity, self.format.channels);
        if reepoch {
            // rare, deliberate full reset to dodge sample-count overflow
            info!("sample clock re-epoch, stopping all sounds");
            self.channels.stop_all();
            self.clear_buffer(device);
        }

        // check that we haven't overshot
        if self.clock.paintedtime < self.clock.soundtime {
            debug!("paint clock trailing device, clamping");
            self.clock.paintedtime = self.clock.soundtime;
        }

        // mix ahead of the current play position, bounded by the buffer
        let mut endtime =
            self.clock.soundtime + (self.params.mixahead * self.format.speed as f32) as i64;
        endtime = endtime.min(self.clock.soundtime + self.frame_capacity as i64);

        if endtime > self.clock.paintedtime {
            device.begin_painting();
            {
                let mut view = MixView {
                    channels: self.channels.active_mut(),
                    sounds: &self.sfx,
                    streams: &self.streams,
                    paintedtime: self.clock.paintedtime,
                    volume: self.params.volume,
                };
                painter.paint(&mut view, endtime);
            }
            device.submit();
            self.clock.paintedtime = endtime;
        }

        // one-shot channels whose end time passed are done; looped sounds
        // are the painter's business
        let painted = self.clock.paintedtime;
        for i in 0..self.channels.total_channels {
            let handle = match self.channels.get(i).sfx {
                Some(h) => h,
                None => continue,
            };
            if self.channels.get(i).end <= painted && self.loopstart_of(handle) == -1 {
                *self.channels.get_mut(i) = Channel::default();
            }
        }
    }

    // ============================================================
    // Streaming (raw) audio
    // ============================================================

    /// Accepts one block of externally produced audio for `sourceid`,
    /// resampled to the device format and spliced into the source's rolling
    /// buffer. A `None` payload closes the source. Useful when there is
    /// one producer and the sound plays with no attenuation.
    pub fn raw_audio(
        &mut self,
        sourceid: i32,
        data: Option<&[u8]>,
        rate: u32,
        samples: u32,
        channelsnum: u32,
        width: u32,
    ) {
        if !self.started {
            return;
        }

        let idx = match self.streams.find_or_claim(sourceid) {
            Ok(idx) => idx,
            Err(err) => {
                debug!("raw audio source {}: {}", sourceid, err);
                return;
            }
        };

        // an empty payload means this slot was told to shut up
        let block = match data {
            Some(block) => block,
            None => {
                self.clear_stream(idx);
                return;
            }
        };
        if samples == 0 || rate == 0 || channelsnum == 0 || width == 0 {
            return;
        }

        if !self.streams.is_inuse(idx) {
            self.streams
                .init_slot(idx, sourceid, self.format, channelsnum, width);
        } else {
            self.streams.note_input_format(idx, channelsnum, width);
        }

        // the prepad is whatever a bound channel hasn't played yet; with no
        // bound channel the backlog is unplayable and gets dropped
        let handle = SoundHandle::Stream(idx);
        let bound = (0..self.channels.total_channels)
            .find(|&i| self.channels.get(i).sfx == Some(handle));
        let prepad = bound.map(|i| self.channels.get(i).pos as i64);

        let outcome = match self.streams.splice(
            idx,
            block,
            rate,
            samples,
            channelsnum,
            width,
            prepad,
            self.params.linear_resample_stream,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!("raw audio source {}: {}", sourceid, err);
                self.clear_stream(idx);
                return;
            }
        };

        match bound {
            Some(i) => {
                // retime the playing channel over the spliced buffer
                let total_length = self.streams.total_length(idx);
                let paintedtime = self.clock.paintedtime;
                let raw_vol = (self.params.raw_volume * 255.0) as i32;
                let ch = self.channels.get_mut(i);
                ch.pos -= outcome.prepad_consumed as f64;
                ch.end += outcome.appended;
                ch.master_vol = raw_vol;
                if ch.end < paintedtime {
                    // fell behind entirely; restart at the buffer head
                    ch.pos = 0.0;
                    ch.end = paintedtime + total_length;
                }
            }
            None => {
                // nothing was playing this stream, start it fresh
                let origin = self.listener.origin;
                let raw_volume = self.params.raw_volume;
                self.start_sound(SELF_SOUND, 0, handle, &origin, raw_volume, 0.0, &|_| None);
            }
        }
    }

    /// Detaches and frees one streaming source.
    fn clear_stream(&mut self, idx: usize) {
        let handle = SoundHandle::Stream(idx);
        for ch in self.channels.active_mut() {
            if ch.sfx == Some(handle) {
                ch.sfx = None;
                ch.end = 0;
            }
        }
        self.streams.clear_slot(idx);
    }

    /// Drops every streaming source (startup/shutdown path).
    pub fn raw_clear(&mut self) {
        for idx in 0..crate::stream::MAX_RAW_SOURCES {
            self.clear_stream(idx);
        }
    }

    // Test/diagnostic accessors.

    pub fn channel(&self, idx: usize) -> &Channel {
        self.channels.get(idx)
    }

    pub fn total_channels(&self) -> usize {
        self.channels.total_channels
    }

    pub fn streams(&self) -> &StreamBank {
        &self.streams
    }
}
