//! Spatialization parameters and the closed-form distance/pan laws used
//! by the mixing pass. Only mono sounds are spatialized; stereo material
//! goes through plain channel adjustment instead.

use crate::math::Vec3;

/// Per-sound spatialization parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spatialization {
    /// Whether this sound participates in spatialization at all. Both the
    /// sound and the listener must enable it for the spatial path to run.
    pub enabled: bool,
    /// When true, `position` is an offset from the listener instead of an
    /// absolute world position.
    pub relative: bool,
    /// Distance inside which no attenuation is applied. Must be positive.
    pub minimum_distance: f32,
    /// Attenuation rate beyond `minimum_distance`; 0 disables distance
    /// falloff entirely.
    pub attenuation: f32,
    pub position: Vec3,
}

impl Default for Spatialization {
    fn default() -> Self {
        Self {
            enabled: false,
            relative: false,
            minimum_distance: 1.0,
            attenuation: 1.0,
            position: Vec3::ZERO,
        }
    }
}

/// Distance attenuation: unity inside `minimum_distance`, then
/// `minimum / (minimum + attenuation * (distance - minimum))`.
pub fn distance_factor(minimum_distance: f32, attenuation: f32, distance: f32) -> f32 {
    let distance = distance.max(minimum_distance);
    minimum_distance / (minimum_distance + attenuation * (distance - minimum_distance))
}

/// Signed angle between the listener's facing direction and the direction
/// toward the sound, measured around `up`. Negative is to the listener's
/// right for a right-handed basis. Neither direction needs to be
/// normalized; a degenerate (zero) direction resolves to 0, i.e.
/// centered.
pub fn pan_angle(up: Vec3, to_sound: Vec3, listener_direction: Vec3) -> f32 {
    up.dot(to_sound.cross(listener_direction))
        .atan2(to_sound.dot(listener_direction))
}

/// Left/right gains for a pan angle: `(±sin(angle) + 2) / 4`. A centered
/// source lands at 0.5/0.5 and a fully sided one at 0.25/0.75, so the
/// opposite channel never goes fully silent.
pub fn pan_gains(angle: f32) -> (f32, f32) {
    let s = angle.sin();
    ((s + 2.0) / 4.0, (-s + 2.0) / 4.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_is_unity_inside_minimum_distance() {
        assert_eq!(distance_factor(1.0, 1.0, 0.0), 1.0);
        assert_eq!(distance_factor(1.0, 1.0, 1.0), 1.0);
        assert_eq!(distance_factor(2.0, 5.0, 0.5), 1.0);
    }

    #[test]
    fn factor_follows_the_distance_law() {
        assert!((distance_factor(1.0, 1.0, 10.0) - 0.1).abs() < 1e-6);
        assert!((distance_factor(1.0, 2.0, 2.0) - (1.0 / 3.0)).abs() < 1e-6);
        // Zero attenuation means no falloff at any distance.
        assert_eq!(distance_factor(1.0, 0.0, 1000.0), 1.0);
    }

    #[test]
    fn centered_source_pans_equally() {
        let angle = pan_angle(Vec3::Y, Vec3::Z, Vec3::Z);
        let (left, right) = pan_gains(angle);
        assert_eq!((left, right), (0.5, 0.5));
    }

    #[test]
    fn sided_sources_pan_to_quarter_and_three_quarters() {
        // Listener faces +Z with +Y up; +X is to its right.
        let angle = pan_angle(Vec3::Y, Vec3::X, Vec3::Z);
        let (left, right) = pan_gains(angle);
        assert!((left - 0.25).abs() < 1e-6);
        assert!((right - 0.75).abs() < 1e-6);

        let angle = pan_angle(Vec3::Y, -Vec3::X, Vec3::Z);
        let (left, right) = pan_gains(angle);
        assert!((left - 0.75).abs() < 1e-6);
        assert!((right - 0.25).abs() < 1e-6);
    }

    #[test]
    fn pan_gains_always_sum_to_one() {
        for step in -8..=8 {
            let angle = step as f32 * std::f32::consts::FRAC_PI_8;
            let (left, right) = pan_gains(angle);
            assert!((left + right - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn degenerate_direction_is_centered() {
        let angle = pan_angle(Vec3::Y, Vec3::ZERO, Vec3::Z);
        assert_eq!(angle, 0.0);
        assert_eq!(pan_gains(angle), (0.5, 0.5));
    }
}
