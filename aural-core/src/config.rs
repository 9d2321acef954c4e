//! Configuration descriptors for aural

use crate::math::Vec3;
use std::time::Duration;

/// Configuration descriptor for an [`AudioWorld`](crate::world::AudioWorld).
#[derive(Debug, Clone)]
pub struct WorldDesc {
    /// Sample rate all sounds and listeners run at. Readers are expected
    /// to deliver frames at this rate already.
    pub sample_rate: u32,
    /// World up direction, used for stereo panning.
    pub up: Vec3,
}

impl Default for WorldDesc {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            up: Vec3::Y,
        }
    }
}

/// Configuration descriptor for an [`AudioPulser`](crate::pulser::AudioPulser).
#[derive(Debug, Clone)]
pub struct PulserDesc {
    /// Smallest slice of audio the worker generates in one tick. Wall
    /// clock time shorter than this is carried over to the next tick.
    pub minimum_latency: Duration,
    /// Elapsed time at or above this triggers a resync: everything older
    /// than the last `minimum_latency` is discarded instead of generated.
    pub resync_threshold: Duration,
}

impl Default for PulserDesc {
    fn default() -> Self {
        Self {
            minimum_latency: Duration::from_millis(10),
            resync_threshold: Duration::from_millis(50),
        }
    }
}
