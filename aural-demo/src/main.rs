use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use aural_core::config::{PulserDesc, WorldDesc};
use aural_core::{
    AudioData, AudioEvent, AudioPulser, AudioQueue, AudioWorld, Listener, Sound, Vec3,
};

const SAMPLE_RATE: u32 = 44100;
const BLOCK_FRAMES: usize = 441;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    log::info!("=== Looped playback with pause, resume, and fades ===");
    looped_playback()?;

    log::info!("=== Spatial orbit around a stereo listener ===");
    spatial_orbit()?;

    log::info!("demo finished");
    Ok(())
}

/// Synthesizes a mono sine tone as in-memory audio data.
fn tone(frequency: f32, seconds: f32, amplitude: f32) -> Result<AudioData> {
    let frame_count = (SAMPLE_RATE as f32 * seconds) as usize;
    let samples: Vec<f32> = (0..frame_count)
        .map(|i| (TAU * frequency * i as f32 / SAMPLE_RATE as f32).sin() * amplitude)
        .collect();
    let data = AudioData::from_interleaved(samples, SAMPLE_RATE, 1)?;
    Ok(data)
}

/// Stands in for an audio device callback: pulls blocks from the queue at
/// a steady cadence and reports a peak level twice a second.
fn spawn_sink(
    queue: Arc<AudioQueue>,
    channel_count: u16,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut block = vec![0.0f32; BLOCK_FRAMES * channel_count as usize];
        let mut peak = 0.0f32;
        let mut blocks = 0u32;
        while running.load(Ordering::Relaxed) {
            let got = queue.drain_n(&mut block);
            for sample in &block[..got] {
                peak = peak.max(sample.abs());
            }
            blocks += 1;
            if blocks % 50 == 0 {
                log::info!("sink peak over the last half second: {peak:.3}");
                peak = 0.0;
            }
            thread::sleep(Duration::from_millis(10));
        }
        queue.discard_all();
    })
}

/// Drains pending world events, logging loops and returning once `sound`
/// has ended. Gives up after five seconds.
fn wait_for_end(world: &AudioWorld, sound: &Sound) -> Result<()> {
    let events = world.event_receiver();
    loop {
        match events.recv_timeout(Duration::from_secs(5))? {
            AudioEvent::SoundEnded { handle } if handle == sound.handle() => {
                log::info!("sound {handle} ended");
                return Ok(());
            }
            event => log::info!("audio event: {event:?}"),
        }
    }
}

fn looped_playback() -> Result<()> {
    let world = Arc::new(AudioWorld::new(SAMPLE_RATE)?);

    log::info!("synthesizing a one-second 440 Hz tone");
    let data = tone(440.0, 1.0, 0.5)?;
    let sound = world.add_sound(Box::new(data.reader()))?;
    sound.set_loop_points(0, data.frame_count())?;
    sound.set_volume(0.8);

    let listener = Arc::new(Listener::new(2)?);
    let pulser = AudioPulser::new(Arc::clone(&world))?;
    let _binding = pulser.bind(&listener);

    let running = Arc::new(AtomicBool::new(true));
    let sink = spawn_sink(
        listener.queue(),
        listener.channel_count(),
        Arc::clone(&running),
    );

    pulser.start()?;
    log::info!("fading in over a quarter second");
    sound.fade_in(SAMPLE_RATE as u64 / 4)?;
    thread::sleep(Duration::from_secs(2));

    log::info!("pausing; the sink should fall silent");
    sound.pause()?;
    thread::sleep(Duration::from_millis(600));

    log::info!("resuming from frame {}", sound.playback_position());
    sound.resume()?;
    thread::sleep(Duration::from_secs(1));

    log::info!("fading out");
    sound.fade_out(SAMPLE_RATE as u64 / 4)?;
    wait_for_end(&world, &sound)?;

    pulser.stop();
    running.store(false, Ordering::Relaxed);
    sink.join().expect("sink thread panicked");
    Ok(())
}

fn spatial_orbit() -> Result<()> {
    let world = Arc::new(AudioWorld::with_desc(WorldDesc {
        sample_rate: SAMPLE_RATE,
        ..Default::default()
    })?);

    log::info!("synthesizing a mono 220 Hz tone for the orbiting source");
    let data = tone(220.0, 1.0, 0.5)?;
    let sound = world.add_sound(Box::new(data.reader()))?;
    sound.set_loop_points(0, data.frame_count())?;
    sound.enable_spatialization();
    sound.set_minimum_distance(1.0)?;
    sound.set_attenuation(1.0)?;
    sound.move_to(Vec3::new(0.0, 0.0, -2.0));

    // Listener at the origin with the default facing (negative Z), so the
    // sound starts directly ahead.
    let listener = Arc::new(Listener::new(2)?);
    listener.enable_spatialization();
    let pulser = AudioPulser::with_desc(Arc::clone(&world), PulserDesc::default())?;
    let _binding = pulser.bind(&listener);

    let running = Arc::new(AtomicBool::new(true));
    let sink = spawn_sink(
        listener.queue(),
        listener.channel_count(),
        Arc::clone(&running),
    );

    pulser.start()?;
    sound.start()?;

    log::info!("orbiting the source around the listener over four seconds");
    let steps = 80;
    for step in 0..steps {
        let angle = step as f32 / steps as f32 * TAU;
        let position = Vec3::new(2.0 * angle.sin(), 0.0, -2.0 * angle.cos());
        sound.move_to(position);
        if step % 20 == 0 {
            log::info!("source at {position:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }

    log::info!("fading out");
    sound.fade_out(SAMPLE_RATE as u64 / 4)?;
    wait_for_end(&world, &sound)?;

    pulser.stop();
    running.store(false, Ordering::Relaxed);
    sink.join().expect("sink thread panicked");
    Ok(())
}
