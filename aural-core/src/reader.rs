use crate::error::Result;

/// Static facts about the stream behind a [`SoundReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundInfo {
    /// Total length of the stream in frames.
    pub frame_count: u64,
    /// Native sample rate in Hz. Sounds are assumed to be pre-matched to
    /// the world's sample rate; the core performs no resampling.
    pub sample_rate: u32,
    /// Interleaved channels per frame (1 = mono, eligible for
    /// spatialization).
    pub channel_count: u16,
    /// Whether [`SoundReader::seek`] is supported.
    pub seekable: bool,
}

impl SoundInfo {
    /// Samples per frame times `frames`, i.e. the required output slice
    /// length for a read of `frames` frames.
    pub fn samples_for(&self, frames: usize) -> usize {
        frames * self.channel_count as usize
    }
}

/// Decoding backend a sound pulls interleaved samples from.
///
/// This is the boundary between the mixing core and the world of audio
/// files and codecs: WAVE/OGG/FLAC parsing, streaming from disk, or
/// procedural synthesis all live behind this trait. The core itself only
/// ships the fully-decoded [`MemoryReader`](crate::data::MemoryReader).
///
/// A reader is owned exclusively by the sound that wraps it and is only
/// ever called with that sound's mutex held, so implementations need
/// `Send` but not `Sync`.
pub trait SoundReader: Send {
    /// Returns the stream description. Called once per mixing pass; should
    /// be cheap.
    fn info(&self) -> SoundInfo;

    /// Reads up to `frames` frames of interleaved samples into `output`
    /// and returns the number of frames actually written.
    ///
    /// `output` holds at least `frames * channel_count` samples. A return
    /// value smaller than `frames` means the stream has ended; the caller
    /// zeroes whatever it did not receive. Returning an error aborts the
    /// owning sound without disturbing the rest of the mix.
    fn read(&mut self, output: &mut [f32], frames: usize) -> Result<usize>;

    /// Repositions the stream to `frame`.
    ///
    /// Only meaningful when `info().seekable` is true; non-seekable
    /// readers return an error.
    fn seek(&mut self, frame: u64) -> Result<()>;

    /// Returns the current stream position in frames.
    fn tell(&self) -> u64;
}
