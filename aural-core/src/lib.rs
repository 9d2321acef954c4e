//! # Aural
//!
//! A real-time audio mixing and spatialization core for Rust.
//!
//! Aural provides a world-driven API where application threads own and
//! update sounds and listeners, while a paced worker thread mixes,
//! fades and spatializes audio into per-listener queues that an output
//! callback drains at its own real-time cadence.
//!
//! ## Quick Start
//!
//! ```no_run
//! use aural_core::*;
//! use std::sync::Arc;
//!
//! // Create the audio world
//! let world = Arc::new(AudioWorld::new(44100)?);
//!
//! // A one-second 440 Hz test tone
//! let samples: Vec<f32> = (0..44100)
//!     .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44100.0).sin() * 0.5)
//!     .collect();
//! let data = AudioData::from_interleaved(samples, 44100, 1)?;
//!
//! // Create a sound and position it in space
//! let sound = world.add_sound(Box::new(data.reader()))?;
//! sound.enable_spatialization();
//! sound.move_to(Vec3::new(5.0, 0.0, 0.0));
//! sound.start()?;
//!
//! // A stereo listener at the origin, fed by the pacing worker
//! let listener = Arc::new(Listener::new(2)?);
//! listener.enable_spatialization();
//!
//! let pulser = AudioPulser::new(Arc::clone(&world))?;
//! let _binding = pulser.bind(&listener);
//! pulser.start()?;
//!
//! // The output callback drains the listener's queue at its own pace
//! let queue = listener.queue();
//! let mut buffer = vec![0.0f32; 441 * 2];
//! queue.drain(&mut buffer);
//!
//! // Poll for events
//! for event in world.event_receiver().try_iter() {
//!     match event {
//!         AudioEvent::SoundEnded { handle } => {
//!             println!("sound ended: {handle}");
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok::<(), AuralError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`AudioWorld`]**: owns all sound state and runs the mixing passes
//! - **[`Sound`]**: handle for one playable sound: transport, volume,
//!   loop points, spatialization pose
//! - **[`Listener`]**: a virtual microphone with its own volume, channel
//!   layout and output queue
//! - **[`AudioPulser`]**: worker thread pacing `generate`/`discard`
//!   against wall-clock time
//! - **[`AudioQueue`]**: the blocking handoff buffer between the mixing
//!   thread and the output callback
//! - **[`SoundReader`]**: trait the core consumes samples through;
//!   decoding lives behind it
//! - **[`AudioEvent`]**: notifications for ended, looped and aborted
//!   sounds
//!
//! ## Architecture
//!
//! Aural uses a three-layer threading model:
//!
//! 1. **Application threads**: create sounds and listeners, drive
//!    transport state under per-object mutexes
//! 2. **Pulser worker**: measures elapsed wall time, snapshots sound
//!    state, mixes into listener queues; falls back to discarding after
//!    a stall instead of generating a stale backlog
//! 3. **Output callback**: drains listener queues; blocking on underrun
//!    is the backpressure contract, never corrupted memory
//!
//! No lock is held across another object's lock acquisition, and pass
//! snapshots are value copies, so lock hold times stay O(1) per object.
//!
//! ## Features
//!
//! - Transport state machine with pause/resume and frame-accurate
//!   fade-in/fade-out
//! - Perceptual volume law shared by static volume and fade envelopes
//! - Distance attenuation and stereo panning for mono sources
//! - Loop points with modular wrap-around
//! - Stall recovery by discarding backlog beyond a resync threshold
//! - Generational sound handles; slots are reclaimed lazily at pass
//!   boundaries
//! - Event-driven playback notifications over a lock-free channel

pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod listener;
pub mod math;
pub mod mixer;
pub mod pulser;
pub mod queue;
pub mod reader;
pub mod sound;
pub mod spatial;
pub mod world;

pub use config::{PulserDesc, WorldDesc};
pub use data::{AudioData, MemoryReader};
pub use error::AuralError;
pub use events::AudioEvent;
pub use listener::Listener;
pub use math::{Pose, Quat, Vec3};
pub use pulser::{AudioPulser, Clock, ListenerBinding, PulserState, SteadyClock};
pub use queue::{AudioQueue, QueueWriter};
pub use reader::{SoundInfo, SoundReader};
pub use sound::{Sound, Status};
pub use world::{AudioWorld, SoundHandle};
