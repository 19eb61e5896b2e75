//! Platform feature queries
//!
//! Some multimedia APIs only work on devices that declare the matching
//! feature key. Callers check [`Features::is_supported`] before touching them.

/// Source of platform feature flags
pub trait SystemInfo {
    /// Look up a boolean feature key; `None` when the platform does not know it
    fn try_get_bool(&self, key: &str) -> Option<bool>;
}

/// Known feature keys
pub struct Features;

impl Features {
    /// Custom audio effect processing
    pub const AUDIO_EFFECT: &'static str = "http://tizen.org/feature/multimedia.custom_audio_effect";
    /// Raw video frame access
    pub const RAW_VIDEO: &'static str = "http://tizen.org/feature/multimedia.raw_video";

    pub const ALL: [&'static str; 2] = [Self::AUDIO_EFFECT, Self::RAW_VIDEO];

    /// Unknown keys read as unsupported
    pub fn is_supported(info: &dyn SystemInfo, key: &str) -> bool {
        let supported = info.try_get_bool(key).unwrap_or(false);
        tracing::trace!(key, supported, "feature query");
        supported
    }
}
