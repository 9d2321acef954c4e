use crate::error::{AuralError, Result};
use crate::math::{Pose, Vec3};
use crate::mixer;
use crate::queue::AudioQueue;
use std::sync::{Arc, Mutex};

/// Mutable state of one listener, copied into the pass snapshot each
/// `generate` so the lock is never held while mixing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ListenerState {
    /// Volume as a precomputed perceptual multiplier.
    pub volume: f32,
    pub channel_count: u16,
    pub spatial_enabled: bool,
    pub position: Vec3,
    /// Facing direction; identity faces -Z.
    pub direction: Vec3,
}

/// An output endpoint of an [`AudioWorld`](crate::world::AudioWorld): a
/// virtual microphone with a volume, a channel layout and a position in
/// space, feeding its own [`AudioQueue`].
///
/// Listeners are independent of the world until bound for a pass (the
/// pulser rebinds its registered listeners before every tick), so one
/// listener can be created up front and attached or detached freely.
pub struct Listener {
    state: Mutex<ListenerState>,
    queue: Arc<AudioQueue>,
}

impl Listener {
    /// Creates a listener producing interleaved output with
    /// `channel_count` channels.
    ///
    /// # Errors
    ///
    /// Configuration error unless `channel_count` is 1 (mono) or 2
    /// (stereo panning).
    pub fn new(channel_count: u16) -> Result<Self> {
        if channel_count != 1 && channel_count != 2 {
            return Err(AuralError::Config(format!(
                "listener channel count must be 1 or 2, got {channel_count}"
            )));
        }
        Ok(Self {
            state: Mutex::new(ListenerState {
                volume: 1.0,
                channel_count,
                spatial_enabled: false,
                position: Vec3::ZERO,
                direction: Vec3::NEG_Z,
            }),
            queue: Arc::new(AudioQueue::new()),
        })
    }

    /// The queue this listener's mixed output lands in.
    pub fn queue(&self) -> Arc<AudioQueue> {
        Arc::clone(&self.queue)
    }

    pub fn channel_count(&self) -> u16 {
        self.state.lock().unwrap().channel_count
    }

    /// Sets the volume from a linear `[0, 1]` control value (stored
    /// internally as the perceptual multiplier). Values below zero clamp
    /// to silence.
    pub fn set_volume(&self, volume: f32) {
        self.state.lock().unwrap().volume = mixer::volume_multiplier(volume.max(0.0));
    }

    /// Current volume as the stored perceptual multiplier.
    pub fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }

    /// Spatialization applies to a sound only when both the sound and
    /// the receiving listener have it enabled.
    pub fn enable_spatialization(&self) {
        self.state.lock().unwrap().spatial_enabled = true;
    }

    pub fn disable_spatialization(&self) {
        self.state.lock().unwrap().spatial_enabled = false;
    }

    pub fn move_to(&self, position: Vec3) {
        self.state.lock().unwrap().position = position;
    }

    pub fn move_by(&self, delta: Vec3) {
        self.state.lock().unwrap().position += delta;
    }

    /// Sets the facing direction used for stereo panning. Zero-length
    /// directions degrade to centered panning.
    pub fn set_direction(&self, direction: Vec3) {
        self.state.lock().unwrap().direction = direction;
    }

    /// Sets position and facing direction from a pose in one lock.
    pub fn set_pose(&self, pose: &Pose) {
        let mut state = self.state.lock().unwrap();
        state.position = pose.position;
        state.direction = pose.forward();
    }

    pub fn position(&self) -> Vec3 {
        self.state.lock().unwrap().position
    }

    pub fn direction(&self) -> Vec3 {
        self.state.lock().unwrap().direction
    }

    pub(crate) fn pass_state(&self) -> ListenerState {
        *self.state.lock().unwrap()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Listener")
            .field("channel_count", &state.channel_count)
            .field("volume", &state.volume)
            .field("spatial_enabled", &state.spatial_enabled)
            .finish()
    }
}
