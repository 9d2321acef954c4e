use crate::config::PulserDesc;
use crate::error::{AuralError, Result};
use crate::events::AudioEvent;
use crate::listener::Listener;
use crate::world::AudioWorld;
use log::{debug, error};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Source of monotonic time for the pacing loop. Injectable so the
/// scheduling arithmetic can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default clock reading the system monotonic clock.
#[derive(Debug, Default)]
pub struct SteadyClock;

impl Clock for SteadyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Lifecycle state of the pulser worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulserState {
    Stopped,
    Running,
    /// A stop was requested; the worker finishes its current tick.
    Stopping,
    /// The worker panicked mid-tick and parked itself. `stop` resets to
    /// Stopped.
    Aborted,
}

struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(u64, Arc<Listener>)>,
}

struct PulserShared {
    state: Mutex<PulserState>,
    /// Wakes the worker out of its pacing sleep on a stop request.
    wake: Condvar,
    /// Durable listener registry, guarded by the pulser's own mutex,
    /// never the world's.
    listeners: Mutex<ListenerRegistry>,
}

/// Keeps a listener registered with an [`AudioPulser`]. Dropping the
/// binding unregisters the listener on every exit path, so the world
/// never mixes into a queue whose owner has let go of it.
pub struct ListenerBinding {
    shared: Arc<PulserShared>,
    id: u64,
}

impl Drop for ListenerBinding {
    fn drop(&mut self) {
        let mut registry = self.shared.listeners.lock().unwrap();
        registry.entries.retain(|(id, _)| *id != self.id);
    }
}

/// One tick's worth of scheduling, decided purely from the accumulated
/// wall-clock backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickPlan {
    /// Not enough time has accumulated; sleep for at most the remainder.
    Sleep(Duration),
    /// Generate every whole frame the backlog covers.
    Generate { frames: usize, consumed: Duration },
    /// The backlog crossed the resync threshold: discard all but the
    /// newest minimum-latency period, then generate that one period.
    Resync {
        discard_frames: usize,
        generate_frames: usize,
        consumed: Duration,
    },
}

impl TickPlan {
    fn consumed(&self) -> Duration {
        match self {
            TickPlan::Sleep(_) => Duration::ZERO,
            TickPlan::Generate { consumed, .. } | TickPlan::Resync { consumed, .. } => *consumed,
        }
    }
}

fn frames_in(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_nanos() * sample_rate as u128 / 1_000_000_000) as usize
}

fn duration_of(frames: usize, sample_rate: u32) -> Duration {
    Duration::from_nanos(frames as u64 * 1_000_000_000 / sample_rate as u64)
}

/// Decides what the worker should do with `elapsed` of unprocessed wall
/// time. Consumed time is floor-aligned to whole frames, so fractional
/// frames carry over instead of drifting.
fn plan_tick(elapsed: Duration, desc: &PulserDesc, sample_rate: u32) -> TickPlan {
    if elapsed >= desc.resync_threshold {
        let periods = (elapsed.as_nanos() / desc.minimum_latency.as_nanos()) as u64;
        let period_frames = frames_in(desc.minimum_latency, sample_rate);
        TickPlan::Resync {
            discard_frames: period_frames * (periods - 1) as usize,
            generate_frames: period_frames,
            consumed: desc.minimum_latency.saturating_mul(periods as u32),
        }
    } else if elapsed >= desc.minimum_latency {
        let frames = frames_in(elapsed, sample_rate);
        TickPlan::Generate {
            frames,
            consumed: duration_of(frames, sample_rate),
        }
    } else {
        TickPlan::Sleep(desc.minimum_latency - elapsed)
    }
}

/// Dedicated worker pacing [`AudioWorld::generate`] /
/// [`AudioWorld::discard`] against wall-clock time.
///
/// Every tick the worker measures how much real time has passed, asks the
/// pure scheduling function what to do, snapshots the registered
/// listeners and runs the pass. Short gaps accumulate until at least
/// `minimum_latency` of audio is due; a stall at or beyond
/// `resync_threshold` is collapsed by discarding the stale backlog
/// instead of generating audio nobody would hear in time.
pub struct AudioPulser {
    desc: PulserDesc,
    world: Arc<AudioWorld>,
    clock: Arc<dyn Clock>,
    shared: Arc<PulserShared>,
    worker: std::sync::Mutex<Option<thread::JoinHandle<()>>>,
}

impl AudioPulser {
    /// Creates a pulser for `world` with the default 10 ms minimum
    /// latency and 50 ms resync threshold.
    pub fn new(world: Arc<AudioWorld>) -> Result<Self> {
        Self::with_desc(world, PulserDesc::default())
    }

    pub fn with_desc(world: Arc<AudioWorld>, desc: PulserDesc) -> Result<Self> {
        Self::with_clock(world, desc, Arc::new(SteadyClock))
    }

    /// # Errors
    ///
    /// Configuration errors if `minimum_latency` is not shorter than
    /// `resync_threshold`, or covers less than one frame at the world's
    /// sample rate.
    pub fn with_clock(
        world: Arc<AudioWorld>,
        desc: PulserDesc,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if desc.minimum_latency >= desc.resync_threshold {
            return Err(AuralError::Config(format!(
                "minimum latency {:?} must be shorter than the resync threshold {:?}",
                desc.minimum_latency, desc.resync_threshold
            )));
        }
        if frames_in(desc.minimum_latency, world.sample_rate()) == 0 {
            return Err(AuralError::Config(format!(
                "minimum latency {:?} covers no whole frame at {} Hz",
                desc.minimum_latency,
                world.sample_rate()
            )));
        }
        Ok(Self {
            desc,
            world,
            clock,
            shared: Arc::new(PulserShared {
                state: Mutex::new(PulserState::Stopped),
                wake: Condvar::new(),
                listeners: Mutex::new(ListenerRegistry {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
            worker: std::sync::Mutex::new(None),
        })
    }

    pub fn state(&self) -> PulserState {
        *self.shared.state.lock().unwrap()
    }

    /// Registers `listener` to receive mixed output from every generating
    /// tick. The listener stays registered until the returned binding is
    /// dropped.
    pub fn bind(&self, listener: &Arc<Listener>) -> ListenerBinding {
        let mut registry = self.shared.listeners.lock().unwrap();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::clone(listener)));
        ListenerBinding {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Spawns the worker thread. Calling `start` on a pulser that is
    /// already running is a no-op.
    ///
    /// # Errors
    ///
    /// A configuration error while the pulser is stopping or aborted
    /// (call [`stop`](AudioPulser::stop) first), or the I/O error from a
    /// failed thread spawn.
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        match *state {
            PulserState::Running => return Ok(()),
            PulserState::Stopped => {}
            other => {
                return Err(AuralError::Config(format!(
                    "pulser cannot start while {other:?}"
                )));
            }
        }
        *state = PulserState::Running;
        drop(state);

        // The time anchor is recorded here, not in the worker, so wall
        // time between this call and the worker's first tick is counted.
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            world: Arc::clone(&self.world),
            clock: Arc::clone(&self.clock),
            desc: self.desc.clone(),
            anchor: self.clock.now(),
        };
        let handle = match thread::Builder::new()
            .name("audio-pulser".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                *self.shared.state.lock().unwrap() = PulserState::Stopped;
                return Err(e.into());
            }
        };
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Requests the worker to stop and blocks until it has exited; the
    /// tick in flight completes first. A no-op when already stopped;
    /// from Aborted this joins the dead worker and resets to Stopped so
    /// the pulser can be started again.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            match *state {
                PulserState::Stopped => return,
                PulserState::Running => *state = PulserState::Stopping,
                PulserState::Stopping | PulserState::Aborted => {}
            }
        }
        self.shared.wake.notify_all();

        let mut worker = self.worker.lock().unwrap();
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }
        *self.shared.state.lock().unwrap() = PulserState::Stopped;
    }
}

impl Drop for AudioPulser {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioPulser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPulser")
            .field("state", &self.state())
            .field("desc", &self.desc)
            .finish()
    }
}

struct Worker {
    shared: Arc<PulserShared>,
    world: Arc<AudioWorld>,
    clock: Arc<dyn Clock>,
    desc: PulserDesc,
    anchor: Instant,
}

impl Worker {
    fn run(self) {
        debug!("audio pulser worker started");
        let mut last = self.anchor;
        let mut elapsed = Duration::ZERO;
        let mut listeners: Vec<Arc<Listener>> = Vec::new();

        loop {
            if *self.shared.state.lock().unwrap() != PulserState::Running {
                break;
            }

            let now = self.clock.now();
            elapsed += now.saturating_duration_since(last);
            last = now;

            let plan = plan_tick(elapsed, &self.desc, self.world.sample_rate());
            if let TickPlan::Sleep(wait) = plan {
                let state = self.shared.state.lock().unwrap();
                if *state == PulserState::Running {
                    let _ = self.shared.wake.wait_timeout(state, wait).unwrap();
                }
                continue;
            }

            // Contain panics from reader implementations so a poisoned
            // tick parks the worker instead of silently killing it.
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| self.run_plan(plan, &mut listeners)));
            match outcome {
                Ok(()) => elapsed = elapsed.saturating_sub(plan.consumed()),
                Err(_) => {
                    error!("audio pulser worker panicked mid-tick, aborting");
                    *self.shared.state.lock().unwrap() = PulserState::Aborted;
                    self.world.send_event(AudioEvent::PulserAborted);
                    break;
                }
            }
        }
        debug!("audio pulser worker exiting");
    }

    fn run_plan(&self, plan: TickPlan, listeners: &mut Vec<Arc<Listener>>) {
        match plan {
            TickPlan::Sleep(_) => {}
            TickPlan::Generate { frames, .. } => {
                self.collect_listeners(listeners);
                self.world.generate(frames, listeners);
            }
            TickPlan::Resync {
                discard_frames,
                generate_frames,
                ..
            } => {
                debug!("resync: discarding {discard_frames} frames of backlog");
                self.world.discard(discard_frames);
                self.collect_listeners(listeners);
                self.world.generate(generate_frames, listeners);
            }
        }
    }

    /// Snapshots the registered listeners under the pulser's mutex,
    /// released before the world is touched.
    fn collect_listeners(&self, listeners: &mut Vec<Arc<Listener>>) {
        listeners.clear();
        let registry = self.shared.listeners.lock().unwrap();
        listeners.extend(registry.entries.iter().map(|(_, listener)| Arc::clone(listener)));
    }
}
