use crate::error::{AuralError, Result};
use crate::math::Vec3;
use crate::mixer;
use crate::reader::{SoundInfo, SoundReader};
use crate::spatial::Spatialization;
use crate::world::SoundHandle;
use log::warn;
use std::sync::{Arc, Mutex};

/// Sentinel for `loop_end` meaning the sound does not loop.
pub(crate) const NO_LOOP: u64 = u64::MAX;

/// Upper bound on frames per reader call when discarding a backlog.
const DISCARD_CHUNK_FRAMES: usize = 4096;

/// Playback status of a sound.
///
/// `Ended` and `Aborted` are terminal for the mixing pass (the sound no
/// longer contributes) but not for the transport API: `start` and
/// `fade_in` restart from either. `Freed` marks a sound whose handle was
/// dropped; the world reclaims its slot at the next pass boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Stopped,
    Playing,
    Paused,
    FadingIn,
    FadingOut,
    Ended,
    Aborted,
    Freed,
}

impl Status {
    /// Whether a sound in this status advances during a mixing pass.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Playing | Status::FadingIn | Status::FadingOut)
    }
}

/// Bookkeeping for an in-flight fade. Direction lives in the status
/// (`FadingIn`/`FadingOut`); this only tracks progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fade {
    pub total_frames: u64,
    pub elapsed_frames: u64,
}

impl Fade {
    /// Fade progress at `offset` frames past the current position,
    /// clamped to `[0, 1]`. A zero-length fade is complete immediately.
    pub fn progress_at(&self, offset: u64) -> f32 {
        if self.total_frames == 0 {
            return 1.0;
        }
        ((self.elapsed_frames + offset) as f32 / self.total_frames as f32).min(1.0)
    }
}

/// Mutable playback state of one sound. Copied wholesale into the pass
/// snapshot each `generate`, so everything here is `Copy`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SoundState {
    pub status: Status,
    /// Status to restore on `resume` (one of Playing/FadingIn/FadingOut).
    pub pause_initial_status: Status,
    /// Volume as a precomputed perceptual multiplier, not the raw control
    /// value.
    pub volume: f32,
    /// Cached from the reader at construction and refreshed every pass.
    pub channel_count: u16,
    pub loop_begin: u64,
    pub loop_end: u64,
    pub fade: Option<Fade>,
    pub spatialization: Spatialization,
}

impl SoundState {
    fn new(channel_count: u16) -> Self {
        Self {
            status: Status::Stopped,
            pause_initial_status: Status::Playing,
            volume: 1.0,
            channel_count,
            loop_begin: 0,
            loop_end: NO_LOOP,
            fade: None,
            spatialization: Spatialization::default(),
        }
    }
}

/// State plus reader, guarded together by the sound's private mutex. All
/// transport operations and all per-pass advancement run against this
/// cell with the lock held.
pub(crate) struct SoundCell {
    pub state: SoundState,
    pub reader: Box<dyn SoundReader>,
}

impl SoundCell {
    pub fn new(reader: Box<dyn SoundReader>) -> Self {
        let channel_count = reader.info().channel_count;
        Self {
            state: SoundState::new(channel_count),
            reader,
        }
    }

    fn rewind(&mut self) -> Result<()> {
        if self.reader.tell() == 0 {
            return Ok(());
        }
        if let Err(e) = self.reader.seek(0) {
            self.state.status = Status::Aborted;
            return Err(e);
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state.status {
            Status::Stopped | Status::Ended | Status::Aborted => {}
            status => {
                return Err(AuralError::InvalidTransition {
                    operation: "start",
                    status,
                });
            }
        }
        self.rewind()?;
        self.state.fade = None;
        self.state.status = Status::Playing;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.state.status = Status::Stopped;
        self.state.fade = None;
    }

    pub fn pause(&mut self) -> Result<()> {
        if !self.state.status.is_active() {
            return Err(AuralError::InvalidTransition {
                operation: "pause",
                status: self.state.status,
            });
        }
        self.state.pause_initial_status = self.state.status;
        self.state.status = Status::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state.status != Status::Paused {
            return Err(AuralError::InvalidTransition {
                operation: "resume",
                status: self.state.status,
            });
        }
        self.state.status = self.state.pause_initial_status;
        Ok(())
    }

    pub fn fade_in(&mut self, frames: u64) -> Result<()> {
        match self.state.status {
            Status::Stopped | Status::Ended | Status::Aborted => self.rewind()?,
            Status::Paused => {}
            status => {
                return Err(AuralError::InvalidTransition {
                    operation: "fade_in",
                    status,
                });
            }
        }
        self.state.fade = Some(Fade {
            total_frames: frames,
            elapsed_frames: 0,
        });
        self.state.status = Status::FadingIn;
        Ok(())
    }

    pub fn fade_out(&mut self, frames: u64) -> Result<()> {
        if self.state.status != Status::Playing {
            return Err(AuralError::InvalidTransition {
                operation: "fade_out",
                status: self.state.status,
            });
        }
        self.state.fade = Some(Fade {
            total_frames: frames,
            elapsed_frames: 0,
        });
        self.state.status = Status::FadingOut;
        Ok(())
    }

    pub fn seek(&mut self, frame: u64) -> Result<()> {
        if let Err(e) = self.reader.seek(frame) {
            self.state.status = Status::Aborted;
            return Err(e);
        }
        Ok(())
    }

    pub fn set_loop_points(&mut self, begin: u64, end: u64) -> Result<()> {
        let info = self.reader.info();
        if !info.seekable {
            return Err(AuralError::Config(
                "loop points require a seekable reader".to_string(),
            ));
        }
        if begin >= end {
            return Err(AuralError::Config(format!(
                "loop begin {begin} is not before loop end {end}"
            )));
        }
        if end > info.frame_count {
            return Err(AuralError::Config(format!(
                "loop end {end} is past the stream length {}",
                info.frame_count
            )));
        }
        self.state.loop_begin = begin;
        self.state.loop_end = end;
        Ok(())
    }

    pub fn clear_loop_points(&mut self) {
        self.state.loop_begin = 0;
        self.state.loop_end = NO_LOOP;
    }

    pub fn change_reader(
        &mut self,
        new_reader: Box<dyn SoundReader>,
    ) -> Result<Box<dyn SoundReader>> {
        let info = new_reader.info();
        if info.channel_count == 0 {
            return Err(AuralError::Config(
                "sound reader must report at least one channel".to_string(),
            ));
        }
        self.state.status = Status::Stopped;
        self.state.fade = None;
        let old = std::mem::replace(&mut self.reader, new_reader);
        self.state.channel_count = info.channel_count;
        // Loop points were validated against the old reader.
        if self.state.loop_end != NO_LOOP
            && (!info.seekable || self.state.loop_end > info.frame_count)
        {
            self.clear_loop_points();
        }
        Ok(old)
    }

    /// Advances fade bookkeeping by one pass worth of frames and resolves
    /// a completed fade: fade-out ends the sound, fade-in lands on
    /// Playing.
    fn advance_fade(&mut self, frames: u64) {
        let Some(fade) = &mut self.state.fade else {
            return;
        };
        if !matches!(self.state.status, Status::FadingIn | Status::FadingOut) {
            return;
        }
        fade.elapsed_frames = fade.elapsed_frames.saturating_add(frames);
        if fade.elapsed_frames >= fade.total_frames {
            self.state.status = match self.state.status {
                Status::FadingOut => Status::Ended,
                _ => Status::Playing,
            };
            self.state.fade = None;
        }
    }

    /// Reads the next `frames` frames into `buf` (interleaved at this
    /// sound's channel count), honoring loop points, and advances fade
    /// bookkeeping. The tail past an end-of-stream is zeroed. Returns
    /// true if playback wrapped through the loop point.
    ///
    /// Faults from the reader abort the sound; whatever was read before
    /// the fault still plays out this pass.
    pub fn snapshot_into(&mut self, buf: &mut [f32], frames: usize) -> bool {
        let channels = self.state.channel_count as usize;
        let mut produced = 0;
        let mut looped = false;

        while produced < frames {
            let position = self.reader.tell();
            let want = frames - produced;
            // A position moved past the loop region plays out linearly.
            let in_loop = self.state.loop_end != NO_LOOP && position < self.state.loop_end;
            let span = if in_loop {
                want.min((self.state.loop_end - position) as usize)
            } else {
                want
            };

            let out = &mut buf[produced * channels..(produced + span) * channels];
            let got = match self.reader.read(out, span) {
                Ok(got) => got,
                Err(e) => {
                    warn!("sound reader failed mid-pass, aborting sound: {e}");
                    self.state.status = Status::Aborted;
                    buf[produced * channels..].fill(0.0);
                    return looped;
                }
            };
            produced += got;

            if got < span {
                // End of stream. With loop points set this means the
                // stream came up shorter than its info claimed; either
                // way the sound is done.
                self.state.status = Status::Ended;
                buf[produced * channels..].fill(0.0);
                return looped;
            }

            if in_loop && self.reader.tell() >= self.state.loop_end {
                if let Err(e) = self.reader.seek(self.state.loop_begin) {
                    warn!("loop seek failed, aborting sound: {e}");
                    self.state.status = Status::Aborted;
                    buf[produced * channels..].fill(0.0);
                    return looped;
                }
                looped = true;
            }
        }

        self.advance_fade(frames as u64);
        looped
    }

    /// Advances the reader by `frames` frames without keeping samples:
    /// seeks when possible, otherwise reads into `scratch` in bounded
    /// chunks and throws the data away. Loop and fade bookkeeping match
    /// [`snapshot_into`]. Returns true if playback wrapped through the
    /// loop point.
    pub fn advance_silent(&mut self, frames: usize, scratch: &mut Vec<f32>) -> bool {
        let info = self.reader.info();
        let mut looped = false;

        if !info.seekable {
            // Non-seekable readers cannot loop (set_loop_points refuses),
            // so a read-and-discard in bounded chunks is enough.
            let mut remaining = frames;
            while remaining > 0 {
                let step = remaining.min(DISCARD_CHUNK_FRAMES);
                scratch.clear();
                scratch.resize(info.samples_for(step), 0.0);
                match self.reader.read(scratch, step) {
                    Ok(got) if got < step => {
                        self.state.status = Status::Ended;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("sound reader failed during discard, aborting sound: {e}");
                        self.state.status = Status::Aborted;
                        return false;
                    }
                }
                remaining -= step;
            }
            self.advance_fade(frames as u64);
            return false;
        }

        let position = self.reader.tell();
        let frames_u64 = frames as u64;
        let target = if self.state.loop_end != NO_LOOP && position < self.state.loop_end {
            if position + frames_u64 >= self.state.loop_end {
                let span = self.state.loop_end - self.state.loop_begin;
                let past = position + frames_u64 - self.state.loop_end;
                looped = true;
                self.state.loop_begin + past % span
            } else {
                position + frames_u64
            }
        } else {
            // No loop, or the position was moved past the loop region:
            // play out linearly and end at the stream boundary.
            let target = position.saturating_add(frames_u64);
            if target > info.frame_count {
                self.state.status = Status::Ended;
                info.frame_count
            } else {
                target
            }
        };

        if let Err(e) = self.reader.seek(target) {
            warn!("seek failed during discard, aborting sound: {e}");
            self.state.status = Status::Aborted;
            return false;
        }
        self.advance_fade(frames_u64);
        looped
    }
}

/// Handle to one logical playable sound inside an
/// [`AudioWorld`](crate::world::AudioWorld).
///
/// The handle is the only way to reach the sound's state; every operation
/// takes the sound's private mutex for its body and releases it before
/// returning, so handles are freely usable from any thread. Dropping the
/// handle marks the sound `Freed`; the world reclaims it at the next pass
/// boundary.
pub struct Sound {
    handle: SoundHandle,
    cell: Arc<Mutex<SoundCell>>,
}

impl Sound {
    pub(crate) fn new(handle: SoundHandle, cell: Arc<Mutex<SoundCell>>) -> Self {
        Self { handle, cell }
    }

    /// The world-registry handle, used to correlate
    /// [`AudioEvent`](crate::events::AudioEvent)s with this sound.
    pub fn handle(&self) -> SoundHandle {
        self.handle
    }

    /// Rewinds to frame 0 and begins playback.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the sound is Stopped, Ended or Aborted;
    /// a reader error if the rewind fails (the sound aborts).
    pub fn start(&self) -> Result<()> {
        self.cell.lock().unwrap().start()
    }

    /// Stops playback unconditionally. The reader position is left where
    /// it was.
    pub fn stop(&self) {
        self.cell.lock().unwrap().stop();
    }

    /// # Errors
    ///
    /// `InvalidTransition` unless the sound is Playing, FadingIn or
    /// FadingOut.
    pub fn pause(&self) -> Result<()> {
        self.cell.lock().unwrap().pause()
    }

    /// Restores the status remembered by [`pause`](Sound::pause).
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the sound is Paused.
    pub fn resume(&self) -> Result<()> {
        self.cell.lock().unwrap().resume()
    }

    /// Starts playback ramping up from silence over `frames` frames.
    /// Rewinds to frame 0 first unless resuming from Paused.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the sound is Stopped, Ended, Aborted or
    /// Paused.
    pub fn fade_in(&self, frames: u64) -> Result<()> {
        self.cell.lock().unwrap().fade_in(frames)
    }

    /// Ramps the playing sound down to silence over `frames` frames,
    /// after which it is Ended.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the sound is Playing.
    pub fn fade_out(&self, frames: u64) -> Result<()> {
        self.cell.lock().unwrap().fade_out(frames)
    }

    /// Repositions playback to `frame`. Aborts the sound if the reader
    /// refuses the seek.
    pub fn seek(&self, frame: u64) -> Result<()> {
        self.cell.lock().unwrap().seek(frame)
    }

    /// Restricts playback to `[begin, end)`; reaching `end` wraps back to
    /// `begin`.
    ///
    /// # Errors
    ///
    /// Configuration errors if the reader is not seekable, the range is
    /// empty, or `end` is past the stream length.
    pub fn set_loop_points(&self, begin: u64, end: u64) -> Result<()> {
        self.cell.lock().unwrap().set_loop_points(begin, end)
    }

    /// Removes loop points; playback runs to the end of the stream.
    pub fn clear_loop_points(&self) {
        self.cell.lock().unwrap().clear_loop_points();
    }

    /// Sets the volume from a linear `[0, 1]` control value (stored
    /// internally as the perceptual multiplier). Values below zero clamp
    /// to silence.
    pub fn set_volume(&self, volume: f32) {
        self.cell.lock().unwrap().state.volume = mixer::volume_multiplier(volume.max(0.0));
    }

    pub fn set_minimum_distance(&self, minimum_distance: f32) -> Result<()> {
        if minimum_distance.is_nan() || minimum_distance <= 0.0 {
            return Err(AuralError::Config(format!(
                "minimum distance must be positive, got {minimum_distance}"
            )));
        }
        self.cell.lock().unwrap().state.spatialization.minimum_distance = minimum_distance;
        Ok(())
    }

    pub fn set_attenuation(&self, attenuation: f32) -> Result<()> {
        if attenuation.is_nan() || attenuation < 0.0 {
            return Err(AuralError::Config(format!(
                "attenuation must be non-negative, got {attenuation}"
            )));
        }
        self.cell.lock().unwrap().state.spatialization.attenuation = attenuation;
        Ok(())
    }

    pub fn enable_spatialization(&self) {
        self.cell.lock().unwrap().state.spatialization.enabled = true;
    }

    pub fn disable_spatialization(&self) {
        self.cell.lock().unwrap().state.spatialization.enabled = false;
    }

    /// Interprets the sound's position as an offset from the listener.
    pub fn relative_spatialization(&self) {
        self.cell.lock().unwrap().state.spatialization.relative = true;
    }

    /// Interprets the sound's position as an absolute world position.
    pub fn absolute_spatialization(&self) {
        self.cell.lock().unwrap().state.spatialization.relative = false;
    }

    pub fn move_to(&self, position: Vec3) {
        self.cell.lock().unwrap().state.spatialization.position = position;
    }

    pub fn move_by(&self, delta: Vec3) {
        self.cell.lock().unwrap().state.spatialization.position += delta;
    }

    /// Swaps the decoding backend, forcing the sound to Stopped, and
    /// returns the previous reader. Loop points carry over only if the
    /// new reader can honor them (seekable, loop end within the stream);
    /// otherwise they are cleared.
    ///
    /// # Errors
    ///
    /// Configuration error if `new_reader` reports zero channels; the
    /// sound keeps its current reader.
    pub fn change_reader(&self, new_reader: Box<dyn SoundReader>) -> Result<Box<dyn SoundReader>> {
        self.cell.lock().unwrap().change_reader(new_reader)
    }

    pub fn status(&self) -> Status {
        self.cell.lock().unwrap().state.status
    }

    /// Current volume as the stored perceptual multiplier.
    pub fn volume(&self) -> f32 {
        self.cell.lock().unwrap().state.volume
    }

    pub fn position(&self) -> Vec3 {
        self.cell.lock().unwrap().state.spatialization.position
    }

    /// Current reader position in frames.
    pub fn playback_position(&self) -> u64 {
        self.cell.lock().unwrap().reader.tell()
    }

    pub fn info(&self) -> SoundInfo {
        self.cell.lock().unwrap().reader.info()
    }
}

impl Drop for Sound {
    fn drop(&mut self) {
        self.cell.lock().unwrap().state.status = Status::Freed;
    }
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("handle", &self.handle)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AudioData;

    fn test_cell(frames: usize) -> SoundCell {
        let data = AudioData::from_interleaved(vec![1.0; frames], 44100, 1).unwrap();
        SoundCell::new(Box::new(data.reader()))
    }

    fn cell_with_status(status: Status) -> SoundCell {
        let mut cell = test_cell(1000);
        cell.state.status = status;
        cell
    }

    /// Non-seekable mono reader serving `content_frames` of silence,
    /// recording the frame count of every read request.
    struct StreamingReader {
        content_frames: u64,
        position: u64,
        requests: Arc<Mutex<Vec<usize>>>,
    }

    impl StreamingReader {
        fn new(content_frames: u64) -> (Self, Arc<Mutex<Vec<usize>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let reader = Self {
                content_frames,
                position: 0,
                requests: Arc::clone(&requests),
            };
            (reader, requests)
        }
    }

    impl SoundReader for StreamingReader {
        fn info(&self) -> SoundInfo {
            SoundInfo {
                frame_count: self.content_frames,
                sample_rate: 44100,
                channel_count: 1,
                seekable: false,
            }
        }

        fn read(&mut self, _output: &mut [f32], frames: usize) -> Result<usize> {
            self.requests.lock().unwrap().push(frames);
            let got = (frames as u64).min(self.content_frames - self.position) as usize;
            self.position += got as u64;
            Ok(got)
        }

        fn seek(&mut self, _frame: u64) -> Result<()> {
            Err(AuralError::Reader("stream is not seekable".to_string()))
        }

        fn tell(&self) -> u64 {
            self.position
        }
    }

    struct ZeroChannelReader;

    impl SoundReader for ZeroChannelReader {
        fn info(&self) -> SoundInfo {
            SoundInfo {
                frame_count: 1000,
                sample_rate: 44100,
                channel_count: 0,
                seekable: true,
            }
        }

        fn read(&mut self, _output: &mut [f32], _frames: usize) -> Result<usize> {
            Ok(0)
        }

        fn seek(&mut self, _frame: u64) -> Result<()> {
            Ok(())
        }

        fn tell(&self) -> u64 {
            0
        }
    }

    const ALL_STATUSES: [Status; 8] = [
        Status::Stopped,
        Status::Playing,
        Status::Paused,
        Status::FadingIn,
        Status::FadingOut,
        Status::Ended,
        Status::Aborted,
        Status::Freed,
    ];

    #[test]
    fn transition_grid_matches_the_documented_table() {
        for status in ALL_STATUSES {
            let start_ok = matches!(status, Status::Stopped | Status::Ended | Status::Aborted);
            assert_eq!(
                cell_with_status(status).start().is_ok(),
                start_ok,
                "start from {status:?}"
            );

            let pause_ok = status.is_active();
            assert_eq!(
                cell_with_status(status).pause().is_ok(),
                pause_ok,
                "pause from {status:?}"
            );

            let resume_ok = status == Status::Paused;
            assert_eq!(
                cell_with_status(status).resume().is_ok(),
                resume_ok,
                "resume from {status:?}"
            );

            let fade_in_ok = matches!(
                status,
                Status::Stopped | Status::Ended | Status::Aborted | Status::Paused
            );
            assert_eq!(
                cell_with_status(status).fade_in(100).is_ok(),
                fade_in_ok,
                "fade_in from {status:?}"
            );

            let fade_out_ok = status == Status::Playing;
            assert_eq!(
                cell_with_status(status).fade_out(100).is_ok(),
                fade_out_ok,
                "fade_out from {status:?}"
            );

            // stop is unconditional.
            let mut cell = cell_with_status(status);
            cell.stop();
            assert_eq!(cell.state.status, Status::Stopped);
        }
    }

    #[test]
    fn rejected_transitions_report_operation_and_status() {
        let mut cell = cell_with_status(Status::Stopped);
        match cell.fade_out(10) {
            Err(AuralError::InvalidTransition { operation, status }) => {
                assert_eq!(operation, "fade_out");
                assert_eq!(status, Status::Stopped);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn start_rewinds_and_resets_fades() {
        let mut cell = test_cell(1000);
        cell.reader.seek(500).unwrap();
        cell.state.status = Status::Ended;
        cell.state.fade = Some(Fade {
            total_frames: 10,
            elapsed_frames: 5,
        });

        cell.start().unwrap();
        assert_eq!(cell.state.status, Status::Playing);
        assert_eq!(cell.reader.tell(), 0);
        assert!(cell.state.fade.is_none());
    }

    #[test]
    fn stop_leaves_the_reader_position() {
        let mut cell = test_cell(1000);
        cell.start().unwrap();
        cell.reader.seek(123).unwrap();
        cell.stop();
        assert_eq!(cell.state.status, Status::Stopped);
        assert_eq!(cell.reader.tell(), 123);
    }

    #[test]
    fn pause_remembers_and_resume_restores() {
        let mut cell = cell_with_status(Status::FadingOut);
        cell.pause().unwrap();
        assert_eq!(cell.state.status, Status::Paused);
        cell.resume().unwrap();
        assert_eq!(cell.state.status, Status::FadingOut);
    }

    #[test]
    fn fade_in_from_paused_keeps_position() {
        let mut cell = test_cell(1000);
        cell.start().unwrap();
        cell.reader.seek(400).unwrap();
        cell.pause().unwrap();

        cell.fade_in(50).unwrap();
        assert_eq!(cell.state.status, Status::FadingIn);
        assert_eq!(cell.reader.tell(), 400);

        // From Stopped the same call rewinds.
        let mut cell = test_cell(1000);
        cell.reader.seek(400).unwrap();
        cell.fade_in(50).unwrap();
        assert_eq!(cell.reader.tell(), 0);
    }

    #[test]
    fn loop_points_validate_bounds() {
        let mut cell = test_cell(1000);
        assert!(cell.set_loop_points(100, 200).is_ok());
        assert!(cell.set_loop_points(200, 200).is_err());
        assert!(cell.set_loop_points(300, 200).is_err());
        assert!(cell.set_loop_points(900, 1001).is_err());
        assert!(cell.set_loop_points(900, 1000).is_ok());

        cell.clear_loop_points();
        assert_eq!(cell.state.loop_begin, 0);
        assert_eq!(cell.state.loop_end, NO_LOOP);
    }

    #[test]
    fn change_reader_forces_stopped_and_returns_old() {
        let mut cell = test_cell(1000);
        cell.start().unwrap();

        let stereo = AudioData::from_interleaved(vec![0.0; 200], 44100, 2).unwrap();
        let old = cell.change_reader(Box::new(stereo.reader())).unwrap();
        assert_eq!(cell.state.status, Status::Stopped);
        assert_eq!(cell.state.channel_count, 2);
        assert_eq!(old.info().frame_count, 1000);
    }

    #[test]
    fn change_reader_drops_loop_points_the_new_reader_cannot_honor() {
        let mut cell = test_cell(1000);
        cell.set_loop_points(100, 200).unwrap();

        // Seekable and long enough: the loop survives the swap.
        let long = AudioData::from_interleaved(vec![0.0; 500], 44100, 1).unwrap();
        cell.change_reader(Box::new(long.reader())).unwrap();
        assert_eq!(cell.state.loop_begin, 100);
        assert_eq!(cell.state.loop_end, 200);

        // Shorter than the loop end: cleared.
        let short = AudioData::from_interleaved(vec![0.0; 150], 44100, 1).unwrap();
        cell.change_reader(Box::new(short.reader())).unwrap();
        assert_eq!(cell.state.loop_begin, 0);
        assert_eq!(cell.state.loop_end, NO_LOOP);

        // Not seekable: cleared as well.
        let mut cell = test_cell(1000);
        cell.set_loop_points(100, 200).unwrap();
        let (streaming, _requests) = StreamingReader::new(1000);
        cell.change_reader(Box::new(streaming)).unwrap();
        assert_eq!(cell.state.loop_end, NO_LOOP);
    }

    #[test]
    fn change_reader_rejects_a_zero_channel_reader() {
        let mut cell = test_cell(1000);
        cell.start().unwrap();

        let result = cell.change_reader(Box::new(ZeroChannelReader));
        assert!(matches!(result, Err(AuralError::Config(_))));

        // The swap did not happen.
        assert_eq!(cell.state.status, Status::Playing);
        assert_eq!(cell.state.channel_count, 1);
        assert_eq!(cell.reader.info().frame_count, 1000);
    }

    #[test]
    fn loop_wrap_lands_on_the_wrapped_position() {
        // From 180 with loop [100, 200), advancing 150 frames covers 20
        // to the loop point and wraps the remaining 130 to land on 130.
        let mut cell = test_cell(1000);
        cell.set_loop_points(100, 200).unwrap();
        cell.start().unwrap();
        cell.reader.seek(180).unwrap();

        let mut scratch = Vec::new();
        let looped = cell.advance_silent(150, &mut scratch);
        assert!(looped);
        assert_eq!(cell.reader.tell(), 130);
    }

    #[test]
    fn snapshot_wraps_loops_like_advance() {
        let mut cell = test_cell(1000);
        cell.set_loop_points(100, 200).unwrap();
        cell.start().unwrap();
        cell.reader.seek(180).unwrap();

        let mut buf = vec![0.0; 150];
        let looped = cell.snapshot_into(&mut buf, 150);
        assert!(looped);
        assert_eq!(cell.reader.tell(), 130);
        assert!(buf.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn position_past_the_loop_region_plays_out_linearly() {
        let mut cell = test_cell(1000);
        cell.set_loop_points(100, 200).unwrap();
        cell.start().unwrap();
        cell.reader.seek(250).unwrap();

        let mut buf = vec![0.0; 100];
        let looped = cell.snapshot_into(&mut buf, 100);
        assert!(!looped);
        assert_eq!(cell.reader.tell(), 350);

        let mut scratch = Vec::new();
        let looped = cell.advance_silent(100, &mut scratch);
        assert!(!looped);
        assert_eq!(cell.reader.tell(), 450);
    }

    #[test]
    fn snapshot_past_the_end_zeroes_the_tail_and_ends() {
        let data = AudioData::from_interleaved(vec![1.0; 10], 44100, 1).unwrap();
        let mut cell = SoundCell::new(Box::new(data.reader()));
        cell.start().unwrap();

        let mut buf = vec![0.5; 16];
        cell.snapshot_into(&mut buf, 16);
        assert_eq!(cell.state.status, Status::Ended);
        assert_eq!(&buf[..10], &[1.0; 10]);
        assert_eq!(&buf[10..], &[0.0; 6]);
    }

    #[test]
    fn discard_past_the_end_ends_the_sound() {
        let mut cell = test_cell(100);
        cell.start().unwrap();
        let mut scratch = Vec::new();

        // Exactly consuming the stream leaves it Playing; the next
        // advance trips the end.
        cell.advance_silent(100, &mut scratch);
        assert_eq!(cell.state.status, Status::Playing);
        assert_eq!(cell.reader.tell(), 100);

        cell.advance_silent(1, &mut scratch);
        assert_eq!(cell.state.status, Status::Ended);
    }

    #[test]
    fn discard_services_long_backlogs_in_bounded_reads() {
        let (reader, requests) = StreamingReader::new(u64::MAX);
        let mut cell = SoundCell::new(Box::new(reader));
        cell.start().unwrap();
        let mut scratch = Vec::new();

        cell.advance_silent(1_000_000, &mut scratch);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1_000_000usize.div_ceil(DISCARD_CHUNK_FRAMES));
        assert!(requests.iter().all(|&r| r <= DISCARD_CHUNK_FRAMES));
        assert_eq!(requests.iter().sum::<usize>(), 1_000_000);
        assert!(scratch.len() <= DISCARD_CHUNK_FRAMES);
        assert_eq!(cell.reader.tell(), 1_000_000);
        assert_eq!(cell.state.status, Status::Playing);
    }

    #[test]
    fn discard_past_a_streaming_end_stops_reading() {
        let (reader, requests) = StreamingReader::new(5000);
        let mut cell = SoundCell::new(Box::new(reader));
        cell.start().unwrap();
        let mut scratch = Vec::new();

        cell.advance_silent(1_000_000, &mut scratch);

        assert_eq!(cell.state.status, Status::Ended);
        assert_eq!(cell.reader.tell(), 5000);
        // One full chunk, then the short read that trips end-of-stream.
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn fade_out_completion_ends_during_advance() {
        let mut cell = test_cell(1000);
        cell.start().unwrap();
        cell.fade_out(100).unwrap();
        let mut scratch = Vec::new();

        cell.advance_silent(60, &mut scratch);
        assert_eq!(cell.state.status, Status::FadingOut);
        cell.advance_silent(60, &mut scratch);
        assert_eq!(cell.state.status, Status::Ended);
    }

    #[test]
    fn fade_in_completion_lands_on_playing() {
        let mut cell = test_cell(1000);
        cell.fade_in(100).unwrap();
        let mut scratch = Vec::new();

        cell.advance_silent(100, &mut scratch);
        assert_eq!(cell.state.status, Status::Playing);
        assert!(cell.state.fade.is_none());
    }
}
