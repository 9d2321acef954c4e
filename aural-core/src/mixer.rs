//! Pure mixing math shared by the world's mixing pass: the perceptual
//! volume law, the amplitude-preserving N-way mixing law, and channel
//! adjustment helpers. Everything here operates on flat interleaved `f32`
//! buffers and carries no state.

/// Maps a linear `[0, 1]` volume control to a perceived-loudness
/// multiplier: `0` stays silent, otherwise `sqrt(10^(3v) / 1000)`.
///
/// The same curve shapes fade envelopes, with the fade fraction as the
/// argument, so a half-elapsed fade-out sits at the same perceived level
/// as a sound whose volume control is at 0.5.
pub fn volume_multiplier(volume: f32) -> f32 {
    if volume == 0.0 {
        0.0
    } else {
        (10f32.powf(3.0 * volume) / 1000.0).sqrt()
    }
}

/// Compresses a summed-then-averaged sample toward ±1.
///
/// `value` is the average of `count` contributing samples; the output is
/// `sign(value) * (1 - (1 - |value|)^count)`. For a single contributor
/// this is the identity, so solo playback is bit-exact. Linear summation
/// would clip for in-phase sources and exaggerate cancellation for
/// out-of-phase ones; this law keeps the result inside `[-1, 1]` while
/// preserving the energy of loud passages.
pub fn soft_mix(value: f32, count: usize) -> f32 {
    let value = value.clamp(-1.0, 1.0);
    if value == 0.0 {
        return 0.0;
    }
    value.signum() * (1.0 - (1.0 - value.abs()).powi(count as i32))
}

/// Collapses one interleaved frame to a single mono sample through
/// [`soft_mix`], treating each channel as a contributor. Deliberately not
/// a plain average: two correlated channels downmix louder than either
/// alone, matching how the mixing pass combines independent sounds.
pub fn downmix_frame(frame: &[f32]) -> f32 {
    debug_assert!(!frame.is_empty());
    if frame.len() == 1 {
        return frame[0];
    }
    let average = frame.iter().sum::<f32>() / frame.len() as f32;
    soft_mix(average, frame.len())
}

/// Adds `src` into `dst` sample-by-sample at `gain`. Both buffers share
/// the same channel layout.
pub fn accumulate(dst: &mut [f32], src: &[f32], gain: f32) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s * gain;
    }
}

/// Adds a mono `src` into an interleaved stereo `dst` with independent
/// per-channel gains. Equal gains duplicate the signal; the spatializer
/// passes its pan gains here.
pub fn accumulate_mono_to_stereo(dst: &mut [f32], src: &[f32], left_gain: f32, right_gain: f32) {
    for (frame, s) in dst.chunks_exact_mut(2).zip(src) {
        frame[0] += s * left_gain;
        frame[1] += s * right_gain;
    }
}

/// Adds `src` with `src_channels` into `dst` with `dst_channels` at
/// `gain`, adjusting the channel layout on the way:
///
/// - matching layouts add directly,
/// - mono widens by duplication,
/// - everything else collapses each frame through [`downmix_frame`]
///   first, then widens if the destination is not mono.
pub fn accumulate_adjusted(
    dst: &mut [f32],
    dst_channels: u16,
    src: &[f32],
    src_channels: u16,
    gain: f32,
) {
    let dst_channels = dst_channels as usize;
    let src_channels = src_channels as usize;
    if src_channels == dst_channels {
        accumulate(dst, src, gain);
    } else if src_channels == 1 && dst_channels == 2 {
        accumulate_mono_to_stereo(dst, src, gain, gain);
    } else {
        for (out_frame, in_frame) in dst
            .chunks_exact_mut(dst_channels)
            .zip(src.chunks_exact(src_channels))
        {
            let mono = downmix_frame(in_frame) * gain;
            for d in out_frame {
                *d += mono;
            }
        }
    }
}

/// Applies [`soft_mix`] in place over a span that accumulated `count`
/// contributions: each slot is averaged, then compressed. A span with no
/// contributors is left untouched (it is already silence).
pub fn finalize_mix(dst: &mut [f32], count: usize) {
    if count == 0 {
        return;
    }
    let scale = 1.0 / count as f32;
    for sample in dst {
        *sample = soft_mix(*sample * scale, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_law_endpoints() {
        assert_eq!(volume_multiplier(0.0), 0.0);
        assert!((volume_multiplier(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn volume_law_monotonic() {
        let mut previous = volume_multiplier(0.0);
        for step in 1..=100 {
            let current = volume_multiplier(step as f32 / 100.0);
            assert!(
                current > previous,
                "law not increasing at v={}",
                step as f32 / 100.0
            );
            previous = current;
        }
    }

    #[test]
    fn soft_mix_is_identity_for_one_contributor() {
        for value in [-1.0, -0.5, -0.125, 0.0, 0.25, 0.99, 1.0] {
            assert_eq!(soft_mix(value, 1), value);
        }
    }

    #[test]
    fn soft_mix_stays_in_bounds() {
        for count in 1..=8 {
            for step in -20..=20 {
                let value = step as f32 / 20.0;
                let mixed = soft_mix(value, count);
                assert!((-1.0..=1.0).contains(&mixed), "out of bounds: {mixed}");
                if value != 0.0 {
                    assert_eq!(mixed.signum(), value.signum());
                }
            }
        }
    }

    #[test]
    fn soft_mix_louder_than_average_for_in_phase() {
        // Two equal in-phase contributors average to 0.5; the law pushes
        // the combination above that instead of halving the energy.
        let mixed = soft_mix(0.5, 2);
        assert!((mixed - 0.75).abs() < 1e-6);
    }

    #[test]
    fn downmix_is_not_naive_average() {
        let frame = [0.5, 0.5];
        assert!(downmix_frame(&frame) > 0.5);
        assert_eq!(downmix_frame(&[0.25]), 0.25);
    }

    #[test]
    fn accumulate_adjusted_widens_mono() {
        let src = [1.0, -1.0];
        let mut dst = [0.0; 4];
        accumulate_adjusted(&mut dst, 2, &src, 1, 0.5);
        assert_eq!(dst, [0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn accumulate_adjusted_narrows_stereo() {
        let src = [0.5, 0.5, -0.5, -0.5];
        let mut dst = [0.0; 2];
        accumulate_adjusted(&mut dst, 1, &src, 2, 1.0);
        assert!((dst[0] - 0.75).abs() < 1e-6);
        assert!((dst[1] + 0.75).abs() < 1e-6);
    }

    #[test]
    fn finalize_mix_averages_then_compresses() {
        // Two contributors each wrote 0.5: slot holds 1.0, average is
        // 0.5, compressed result is 0.75.
        let mut dst = [1.0, 0.0];
        finalize_mix(&mut dst, 2);
        assert!((dst[0] - 0.75).abs() < 1e-6);
        assert_eq!(dst[1], 0.0);
        let mut untouched = [0.125];
        finalize_mix(&mut untouched, 0);
        assert_eq!(untouched[0], 0.125);
    }
}
