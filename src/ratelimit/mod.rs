//! Rate limiting logic and state management.

mod entry;
mod key;
mod limiter;
mod presets;

pub use entry::RateLimitEntry;
pub use key::{LimitKey, KEY_SEPARATOR};
pub use limiter::{now_millis, RateLimitResult, RateLimiter, DEFAULT_CLEANUP_INTERVAL_MS};
pub use presets::{
    get_rate_limit_preset, PresetName, PresetOverride, PresetTable, RateLimitPreset,
    DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS,
};
