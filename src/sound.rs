// sound.rs — sound effect registry and cached sample data

use log::warn;

/// Upper bound on distinct sounds referenced during one level.
pub const MAX_SOUNDS: usize = 256;

/// During registration it is possible to reference more sounds than can be
/// live at once, so the registry holds twice the gameplay bound.
pub const MAX_SFX: usize = MAX_SOUNDS * 2;

/// Maximum length of a sound name.
pub const MAX_QPATH: usize = 64;

/// Decode callback supplied by the asset layer. Returns device-native PCM
/// for the named sound, or None when the sound cannot be loaded.
pub type SoundLoader<'a> = &'a dyn Fn(&str) -> Option<SfxCache>;

/// Identity of a sound a channel can play: either a registered asset or a
/// live streaming source's rolling buffer. Channels store this tag, so the
/// mixing logic never special-cases streams beyond lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundHandle {
    /// Index into the sfx registry.
    Sfx(usize),
    /// Index into the streaming source bank.
    Stream(usize),
}

/// Decoded PCM for one sound, in a known format.
#[derive(Clone)]
pub struct SfxCache {
    /// Valid sample frames in `data`.
    pub total_length: u32,
    /// Sample index the sound loops back to, or -1 for one-shot sounds.
    pub loopstart: i32,
    /// Sample rate in Hz.
    pub speed: u32,
    /// Bytes per sample (1 or 2).
    pub width: u32,
    /// Interleaved channel count.
    pub channels: u32,
    pub data: Vec<u8>,
}

impl Default for SfxCache {
    fn default() -> Self {
        Self {
            total_length: 0,
            loopstart: -1,
            speed: 0,
            width: 0,
            channels: 0,
            data: Vec::new(),
        }
    }
}

/// A named sound with a lazily populated cache.
#[derive(Clone, Default)]
pub struct Sfx {
    pub name: String,
    pub cache: Option<SfxCache>,
}

/// Flat, append-only sound table deduplicated by name. Lookups are linear;
/// insertion is rare and never on the per-mix-frame path.
#[derive(Default)]
pub struct SfxRegistry {
    known: Vec<Sfx>,
}

impl SfxRegistry {
    pub fn new() -> Self {
        Self {
            known: Vec::with_capacity(MAX_SFX),
        }
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Finds a sound by name, creating an entry when `create` is set.
    /// Over-long names are dropped with a warning; exceeding the registry
    /// capacity is a static-sizing violation and panics.
    pub fn find_name(&mut self, name: &str, create: bool) -> Option<usize> {
        if name.is_empty() {
            panic!("SfxRegistry::find_name: empty name");
        }
        if name.len() >= MAX_QPATH {
            warn!("sound name too long ({})", name);
            return None;
        }

        for (i, sfx) in self.known.iter().enumerate() {
            if sfx.name == name {
                return Some(i);
            }
        }

        if !create {
            return None;
        }
        if self.known.len() == MAX_SFX {
            panic!("SfxRegistry::find_name: out of sfx slots");
        }

        self.known.push(Sfx {
            name: name.to_string(),
            cache: None,
        });
        Some(self.known.len() - 1)
    }

    /// Loads the sound's PCM through `loader` if it isn't resident yet.
    /// Returns whether a cache is available afterwards.
    pub fn ensure_loaded(&mut self, idx: usize, loader: SoundLoader) -> bool {
        let sfx = &mut self.known[idx];
        if sfx.cache.is_none() {
            sfx.cache = loader(&sfx.name);
            if sfx.cache.is_none() {
                warn!("couldn't load sound {}", sfx.name);
            }
        }
        sfx.cache.is_some()
    }

    pub fn cache(&self, idx: usize) -> Option<&SfxCache> {
        self.known.get(idx).and_then(|sfx| sfx.cache.as_ref())
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.known.get(idx).map(|sfx| sfx.name.as_str())
    }

    /// Drops every entry and its cached data.
    pub fn clear(&mut self) {
        self.known.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beep(frames: u32) -> SfxCache {
        SfxCache {
            total_length: frames,
            loopstart: -1,
            speed: 11025,
            width: 2,
            channels: 1,
            data: vec![0; (frames * 2) as usize],
        }
    }

    #[test]
    fn find_name_dedupes_by_name() {
        let mut reg = SfxRegistry::new();
        let a = reg.find_name("sound/beep.wav", true).unwrap();
        let b = reg.find_name("sound/beep.wav", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn find_name_without_create_misses() {
        let mut reg = SfxRegistry::new();
        assert_eq!(reg.find_name("sound/none.wav", false), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn over_long_name_is_dropped() {
        let mut reg = SfxRegistry::new();
        let long = "x".repeat(MAX_QPATH);
        assert_eq!(reg.find_name(&long, true), None);
    }

    #[test]
    #[should_panic]
    fn empty_name_panics() {
        let mut reg = SfxRegistry::new();
        reg.find_name("", true);
    }

    #[test]
    fn ensure_loaded_populates_cache_once() {
        let mut reg = SfxRegistry::new();
        let idx = reg.find_name("sound/beep.wav", true).unwrap();
        assert!(reg.cache(idx).is_none());

        assert!(reg.ensure_loaded(idx, &|_| Some(beep(64))));
        assert_eq!(reg.cache(idx).unwrap().total_length, 64);

        // second load must not replace the resident cache
        assert!(reg.ensure_loaded(idx, &|_| Some(beep(999))));
        assert_eq!(reg.cache(idx).unwrap().total_length, 64);
    }

    #[test]
    fn ensure_loaded_reports_missing_data() {
        let mut reg = SfxRegistry::new();
        let idx = reg.find_name("sound/missing.wav", true).unwrap();
        assert!(!reg.ensure_loaded(idx, &|_| None));
        assert!(reg.cache(idx).is_none());
    }
}
