use crate::config::WorldDesc;
use crate::error::{AuralError, Result};
use crate::events::AudioEvent;
use crate::listener::Listener;
use crate::math::Vec3;
use crate::mixer;
use crate::reader::SoundReader;
use crate::sound::{Sound, SoundCell, SoundState, Status};
use crate::spatial;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use std::sync::{Arc, Mutex};

/// Lightweight, type-safe handle identifying a sound slot in the world.
///
/// Carries the slot index plus the slot's generation at allocation time,
/// so a handle kept across the sound's removal can never address whatever
/// sound is allocated into the recycled slot later.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SoundHandle {
    index: u32,
    generation: u32,
}

impl SoundHandle {
    pub(crate) fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl std::fmt::Display for SoundHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoundHandle({}, {})", self.index, self.generation)
    }
}

struct SoundSlot {
    generation: u32,
    cell: Option<Arc<Mutex<SoundCell>>>,
}

/// Per-sound pass snapshot: the state as of pass start plus the frames
/// read for this pass, processed without any lock held.
struct SoundSnapshot {
    state: SoundState,
    samples: Vec<f32>,
}

/// Registry and scratch storage guarded by the world mutex. The mutex is
/// held only for slot bookkeeping and buffer-pool handoff, never while a
/// sound or listener lock is taken.
struct WorldInner {
    slots: Vec<SoundSlot>,
    free: Vec<u32>,
    up: Vec3,
    /// Recycled sample buffers for pass snapshots.
    sample_pool: Vec<Vec<f32>>,
    /// Recycled snapshot list, drained empty between passes.
    snapshots: Vec<SoundSnapshot>,
    /// Read-through buffer for discarding non-seekable readers.
    scratch: Vec<f32>,
}

/// Owner of all sound state and the mixing passes over it.
///
/// `AudioWorld` is the central object of aural. Application threads create
/// sounds through it and drive them via their [`Sound`] handles; a pacing
/// thread (normally an [`AudioPulser`](crate::pulser::AudioPulser)) calls
/// [`generate`](AudioWorld::generate) to mix frames into listener queues,
/// or [`discard`](AudioWorld::discard) to skip them after a stall.
///
/// # Architecture
///
/// - **Application threads**: mutate sound and listener state under their
///   private mutexes.
/// - **Mixing thread**: snapshots sound state and samples under each
///   sound's mutex briefly, then fades, spatializes and mixes lock-free,
///   publishing into each bound listener's queue.
/// - **Output thread** (external): drains listener queues, blocking on
///   underrun.
pub struct AudioWorld {
    desc: WorldDesc,
    inner: std::sync::Mutex<WorldInner>,
    event_sender: Sender<AudioEvent>,
    event_receiver: Receiver<AudioEvent>,
}

impl AudioWorld {
    /// Creates a world running at `sample_rate`, with default settings
    /// otherwise.
    pub fn new(sample_rate: u32) -> Result<Self> {
        Self::with_desc(WorldDesc {
            sample_rate,
            ..WorldDesc::default()
        })
    }

    pub fn with_desc(desc: WorldDesc) -> Result<Self> {
        if desc.sample_rate == 0 {
            return Err(AuralError::Config(
                "world sample rate must be non-zero".to_string(),
            ));
        }
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        Ok(Self {
            inner: std::sync::Mutex::new(WorldInner {
                slots: Vec::new(),
                free: Vec::new(),
                up: desc.up,
                sample_pool: Vec::new(),
                snapshots: Vec::new(),
                scratch: Vec::new(),
            }),
            desc,
            event_sender,
            event_receiver,
        })
    }

    /// Returns the sample rate of the audio world.
    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    /// Sets the world up direction used by the stereo pan law.
    pub fn set_up(&self, up: Vec3) {
        self.inner.lock().unwrap().up = up;
    }

    pub fn up(&self) -> Vec3 {
        self.inner.lock().unwrap().up
    }

    /// Creates a sound backed by `reader` and registers it in the world.
    ///
    /// The sound starts out Stopped. The returned handle is the only way
    /// to control it; dropping the handle marks the sound Freed and its
    /// slot is reclaimed at the end of the next pass.
    ///
    /// # Errors
    ///
    /// Configuration error if `reader` reports zero channels.
    pub fn add_sound(&self, reader: Box<dyn SoundReader>) -> Result<Sound> {
        if reader.info().channel_count == 0 {
            return Err(AuralError::Config(
                "sound reader must report at least one channel".to_string(),
            ));
        }
        let cell = Arc::new(Mutex::new(SoundCell::new(reader)));
        let mut inner = self.inner.lock().unwrap();
        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                inner.slots.push(SoundSlot {
                    generation: 0,
                    cell: None,
                });
                (inner.slots.len() - 1) as u32
            }
        };
        let slot = &mut inner.slots[index as usize];
        slot.cell = Some(Arc::clone(&cell));
        let handle = SoundHandle::from_parts(index, slot.generation);
        drop(inner);
        Ok(Sound::new(handle, cell))
    }

    /// Whether `handle` still addresses a live sound (not yet reclaimed).
    pub fn contains_sound(&self, handle: SoundHandle) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.cell.is_some())
    }

    /// Number of sound slots currently occupied (including sounds whose
    /// handle was dropped but which have not been reclaimed yet).
    pub fn sound_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.slots.iter().filter(|slot| slot.cell.is_some()).count()
    }

    /// A clone of the receiving end of the event channel. Events are
    /// emitted by [`generate`](AudioWorld::generate) /
    /// [`discard`](AudioWorld::discard) and by the pulser worker;
    /// consuming them is optional.
    pub fn event_receiver(&self) -> Receiver<AudioEvent> {
        self.event_receiver.clone()
    }

    pub(crate) fn send_event(&self, event: AudioEvent) {
        // The receiver half lives on the world itself, so send cannot
        // fail with disconnection.
        let _ = self.event_sender.send(event);
    }

    /// Advances every active sound by `frames` frames without producing
    /// output: loop points wrap, fades elapse, end-of-stream ends sounds.
    /// Used to collapse the backlog after a scheduling stall instead of
    /// generating stale audio nobody would hear in time.
    pub fn discard(&self, frames: usize) {
        if frames == 0 {
            return;
        }
        let (cells, mut pass) = self.begin_pass();
        debug!("discarding {frames} frames across {} sounds", cells.len());
        let mut events = Vec::new();
        let mut freed = Vec::new();

        for (handle, cell) in &cells {
            let mut cell = cell.lock().unwrap();
            cell.state.channel_count = cell.reader.info().channel_count;
            let before = cell.state.status;
            if before == Status::Freed {
                freed.push(*handle);
                continue;
            }
            if !before.is_active() {
                continue;
            }
            let looped = cell.advance_silent(frames, &mut pass.scratch);
            let after = cell.state.status;
            drop(cell);
            record_events(&mut events, *handle, before, after, looped);
        }

        self.end_pass(pass, freed);
        for event in events {
            self.send_event(event);
        }
    }

    /// Produces `frames` frames of mixed audio for every listener in
    /// `listeners`, publishing each listener's interleaved output into
    /// its queue. With no listeners bound this behaves as
    /// [`discard`](AudioWorld::discard), since there is nowhere to
    /// deliver samples.
    ///
    /// Per pass, for each active sound: read the next frames (wrapping
    /// loop points), apply the fade envelope, then for each listener
    /// spatialize (mono sounds with spatialization enabled on both ends),
    /// scale by both volumes, accumulate and soft-limit.
    pub fn generate(&self, frames: usize, listeners: &[Arc<Listener>]) {
        if frames == 0 {
            return;
        }
        if listeners.is_empty() {
            self.discard(frames);
            return;
        }

        let (cells, mut pass) = self.begin_pass();
        let mut events = Vec::new();
        let mut freed = Vec::new();

        // Snapshot state and samples per sound, each under its own lock
        // only long enough to read this pass's frames.
        for (handle, cell) in &cells {
            let mut cell = cell.lock().unwrap();
            let info = cell.reader.info();
            cell.state.channel_count = info.channel_count;
            let before = cell.state.status;
            if before == Status::Freed {
                freed.push(*handle);
                continue;
            }
            if !before.is_active() {
                continue;
            }
            // Vetted at registration, but info is re-polled every pass.
            if info.channel_count == 0 {
                warn!("sound reader reports zero channels, aborting sound");
                cell.state.status = Status::Aborted;
                drop(cell);
                record_events(&mut events, *handle, before, Status::Aborted, false);
                continue;
            }
            let state = cell.state;
            let mut samples = pass.sample_pool.pop().unwrap_or_default();
            samples.clear();
            samples.resize(info.samples_for(frames), 0.0);
            let looped = cell.snapshot_into(&mut samples, frames);
            let after = cell.state.status;
            drop(cell);
            record_events(&mut events, *handle, before, after, looped);
            pass.snapshots.push(SoundSnapshot { state, samples });
        }

        debug!(
            "mixing {frames} frames: {} active sounds into {} listeners",
            pass.snapshots.len(),
            listeners.len()
        );

        // Lock-free from here: fade envelopes in place, then mix into
        // each listener.
        for snapshot in &mut pass.snapshots {
            apply_fade_envelope(&mut snapshot.samples, &snapshot.state);
        }

        for listener in listeners {
            let listener_state = listener.pass_state();
            let queue = listener.queue();
            let out_channels = listener_state.channel_count as usize;
            let mut writer = queue.begin(frames * out_channels);

            for snapshot in &pass.snapshots {
                let gain = snapshot.state.volume * listener_state.volume;
                let sound = &snapshot.state.spatialization;
                let spatialized = sound.enabled
                    && listener_state.spatial_enabled
                    && snapshot.state.channel_count == 1;

                if spatialized {
                    let to_sound = if sound.relative {
                        sound.position
                    } else {
                        sound.position - listener_state.position
                    };
                    let factor = spatial::distance_factor(
                        sound.minimum_distance,
                        sound.attenuation,
                        to_sound.length(),
                    );
                    if out_channels == 2 {
                        let angle =
                            spatial::pan_angle(pass.up, to_sound, listener_state.direction);
                        let (left, right) = spatial::pan_gains(angle);
                        mixer::accumulate_mono_to_stereo(
                            &mut writer,
                            &snapshot.samples,
                            gain * factor * left,
                            gain * factor * right,
                        );
                    } else {
                        mixer::accumulate(&mut writer, &snapshot.samples, gain * factor);
                    }
                } else {
                    mixer::accumulate_adjusted(
                        &mut writer,
                        listener_state.channel_count,
                        &snapshot.samples,
                        snapshot.state.channel_count,
                        gain,
                    );
                }
            }

            mixer::finalize_mix(&mut writer, pass.snapshots.len());
            writer.end();
        }

        self.end_pass(pass, freed);
        for event in events {
            self.send_event(event);
        }
    }

    /// Collects the live cells and takes the pooled pass storage, all
    /// under one short world-lock hold.
    fn begin_pass(&self) -> (Vec<(SoundHandle, Arc<Mutex<SoundCell>>)>, PassStorage) {
        let mut inner = self.inner.lock().unwrap();
        let cells = inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let cell = slot.cell.as_ref()?;
                let handle = SoundHandle::from_parts(index as u32, slot.generation);
                Some((handle, Arc::clone(cell)))
            })
            .collect();
        let pass = PassStorage {
            up: inner.up,
            sample_pool: std::mem::take(&mut inner.sample_pool),
            snapshots: std::mem::take(&mut inner.snapshots),
            scratch: std::mem::take(&mut inner.scratch),
        };
        (cells, pass)
    }

    /// Returns the pooled storage and reclaims slots freed this pass.
    fn end_pass(&self, mut pass: PassStorage, freed: Vec<SoundHandle>) {
        let mut inner = self.inner.lock().unwrap();
        for snapshot in pass.snapshots.drain(..) {
            pass.sample_pool.push(snapshot.samples);
        }
        inner.sample_pool = pass.sample_pool;
        inner.snapshots = pass.snapshots;
        inner.scratch = pass.scratch;
        for handle in freed {
            let slot = &mut inner.slots[handle.index as usize];
            if slot.generation == handle.generation && slot.cell.is_some() {
                slot.cell = None;
                slot.generation += 1;
                inner.free.push(handle.index);
            }
        }
    }
}

/// Pass-local storage borrowed from the world for the duration of one
/// `generate`/`discard` call.
struct PassStorage {
    up: Vec3,
    sample_pool: Vec<Vec<f32>>,
    snapshots: Vec<SoundSnapshot>,
    scratch: Vec<f32>,
}

fn record_events(
    events: &mut Vec<AudioEvent>,
    handle: SoundHandle,
    before: Status,
    after: Status,
    looped: bool,
) {
    if looped {
        events.push(AudioEvent::SoundLooped { handle });
    }
    if after == Status::Ended && before != Status::Ended {
        events.push(AudioEvent::SoundEnded { handle });
    }
    if after == Status::Aborted && before != Status::Aborted {
        events.push(AudioEvent::SoundAborted { handle });
    }
}

/// Scales each frame by the fade envelope, walking the fade forward from
/// its pass-start progress. The envelope gain runs through the same
/// perceptual multiplier as static volume.
fn apply_fade_envelope(samples: &mut [f32], state: &SoundState) {
    let Some(fade) = state.fade else {
        return;
    };
    let fading_in = match state.status {
        Status::FadingIn => true,
        Status::FadingOut => false,
        _ => return,
    };
    let channels = state.channel_count as usize;
    for (frame_index, frame) in samples.chunks_exact_mut(channels).enumerate() {
        let progress = fade.progress_at(frame_index as u64);
        let fraction = if fading_in { progress } else { 1.0 - progress };
        let gain = mixer::volume_multiplier(fraction);
        for sample in frame {
            *sample *= gain;
        }
    }
}
