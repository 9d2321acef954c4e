use crate::error::{AuralError, Result};
use crate::mixer;
use crate::reader::{SoundInfo, SoundReader};
use std::sync::Arc;
use std::time::Duration;

/// Fully-decoded audio with reference-counted sharing.
///
/// Samples are stored in interleaved format: all channels of one frame are
/// adjacent, `[L0, R0, L1, R1, ...]` for stereo, so the buffer length is
/// always `frame_count * channel_count`. Interleaved is what both hardware
/// APIs and the mixing pass consume, so no conversion happens on the hot
/// path.
///
/// Decoding files into an `AudioData` is the job of code outside this
/// crate; anything that can produce an interleaved `Vec<f32>` can be
/// played back through [`MemoryReader`].
#[derive(Debug, Clone)]
pub struct AudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
struct AudioDataInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channel_count: u16,
    frame_count: u64,
}

impl AudioData {
    /// Wraps an interleaved sample buffer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `channel_count` is zero or the
    /// buffer length is not a whole number of frames.
    pub fn from_interleaved(
        samples: Vec<f32>,
        sample_rate: u32,
        channel_count: u16,
    ) -> Result<Self> {
        if channel_count == 0 {
            return Err(AuralError::Config(
                "audio data needs at least one channel".to_string(),
            ));
        }
        if samples.len() % channel_count as usize != 0 {
            return Err(AuralError::Config(format!(
                "sample buffer length {} is not a multiple of {} channels",
                samples.len(),
                channel_count
            )));
        }
        let frame_count = (samples.len() / channel_count as usize) as u64;
        Ok(Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channel_count,
                frame_count,
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.inner.channel_count
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.inner.frame_count as f64 / self.inner.sample_rate as f64)
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Downmixes to a mono copy using the same amplitude-preserving law
    /// the mixing pass applies, so a pre-mixed mono asset sounds the same
    /// as a stereo asset downmixed at mix time.
    pub fn to_mono(&self) -> Self {
        if self.inner.channel_count == 1 {
            return self.clone();
        }
        let channels = self.inner.channel_count as usize;
        let mono: Vec<f32> = self
            .inner
            .samples
            .chunks_exact(channels)
            .map(|frame| mixer::downmix_frame(frame))
            .collect();
        Self {
            inner: Arc::new(AudioDataInner {
                frame_count: mono.len() as u64,
                samples: mono,
                sample_rate: self.inner.sample_rate,
                channel_count: 1,
            }),
        }
    }

    /// Returns a fresh seekable reader over this data, positioned at
    /// frame 0.
    pub fn reader(&self) -> MemoryReader {
        MemoryReader::new(self.clone())
    }
}

/// Seekable [`SoundReader`] over a shared [`AudioData`] buffer.
///
/// Cloning the underlying data is cheap, so many sounds can play the same
/// asset concurrently, each with its own reader position.
#[derive(Debug)]
pub struct MemoryReader {
    data: AudioData,
    position: u64,
}

impl MemoryReader {
    pub fn new(data: AudioData) -> Self {
        Self { data, position: 0 }
    }
}

impl SoundReader for MemoryReader {
    fn info(&self) -> SoundInfo {
        SoundInfo {
            frame_count: self.data.frame_count(),
            sample_rate: self.data.sample_rate(),
            channel_count: self.data.channel_count(),
            seekable: true,
        }
    }

    fn read(&mut self, output: &mut [f32], frames: usize) -> Result<usize> {
        let channels = self.data.channel_count() as usize;
        let remaining = self.data.frame_count().saturating_sub(self.position) as usize;
        let frames = frames.min(remaining);
        let start = self.position as usize * channels;
        let end = start + frames * channels;
        output[..frames * channels].copy_from_slice(&self.data.samples()[start..end]);
        self.position += frames as u64;
        Ok(frames)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        if frame > self.data.frame_count() {
            return Err(AuralError::Reader(format!(
                "seek to frame {} past end of data ({} frames)",
                frame,
                self.data.frame_count()
            )));
        }
        self.position = frame;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: u16) -> AudioData {
        let samples: Vec<f32> = (0..frames * channels as usize)
            .map(|i| i as f32)
            .collect();
        AudioData::from_interleaved(samples, 44100, channels).unwrap()
    }

    #[test]
    fn rejects_zero_channels() {
        assert!(AudioData::from_interleaved(vec![0.0; 4], 44100, 0).is_err());
    }

    #[test]
    fn rejects_ragged_buffer() {
        assert!(AudioData::from_interleaved(vec![0.0; 5], 44100, 2).is_err());
    }

    #[test]
    fn frame_count_counts_frames_not_samples() {
        let data = ramp(10, 2);
        assert_eq!(data.frame_count(), 10);
        assert_eq!(data.samples().len(), 20);
    }

    #[test]
    fn reader_reads_sequentially() {
        let data = ramp(6, 2);
        let mut reader = data.reader();
        let mut out = [0.0f32; 8];

        assert_eq!(reader.read(&mut out, 4).unwrap(), 4);
        assert_eq!(out[..4], [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(reader.tell(), 4);

        // Second read hits the end and comes back short.
        assert_eq!(reader.read(&mut out, 4).unwrap(), 2);
        assert_eq!(out[..4], [8.0, 9.0, 10.0, 11.0]);
        assert_eq!(reader.tell(), 6);
        assert_eq!(reader.read(&mut out, 4).unwrap(), 0);
    }

    #[test]
    fn reader_seeks_within_bounds() {
        let data = ramp(6, 1);
        let mut reader = data.reader();
        reader.seek(5).unwrap();
        assert_eq!(reader.tell(), 5);
        reader.seek(6).unwrap();
        assert!(reader.seek(7).is_err());
    }

    #[test]
    fn to_mono_halves_sample_count() {
        let data = ramp(4, 2);
        let mono = data.to_mono();
        assert_eq!(mono.channel_count(), 1);
        assert_eq!(mono.frame_count(), 4);
        assert_eq!(mono.samples().len(), 4);
    }
}
