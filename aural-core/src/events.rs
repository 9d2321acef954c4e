//! Event types for aural

use crate::world::SoundHandle;

/// Notifications emitted by the mixing pass and the pulser worker,
/// delivered through [`AudioWorld::event_receiver`](crate::world::AudioWorld::event_receiver).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEvent {
    /// The sound reached the end of its stream (or finished a fade-out).
    SoundEnded { handle: SoundHandle },
    /// Playback wrapped from the loop end back to the loop begin.
    SoundLooped { handle: SoundHandle },
    /// The sound's reader faulted and the sound was taken out of the mix.
    SoundAborted { handle: SoundHandle },
    /// The pulser worker panicked and stopped pacing.
    PulserAborted,
}

impl AudioEvent {
    /// The sound this event concerns, if any.
    pub fn handle(&self) -> Option<SoundHandle> {
        match self {
            Self::SoundEnded { handle }
            | Self::SoundLooped { handle }
            | Self::SoundAborted { handle } => Some(*handle),
            Self::PulserAborted => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::SoundAborted { .. } | Self::PulserAborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SoundHandle;

    #[test]
    fn handle_and_error_classification() {
        let handle = SoundHandle::from_parts(3, 1);
        assert_eq!(AudioEvent::SoundEnded { handle }.handle(), Some(handle));
        assert_eq!(AudioEvent::SoundLooped { handle }.handle(), Some(handle));
        assert_eq!(AudioEvent::PulserAborted.handle(), None);

        assert!(!AudioEvent::SoundEnded { handle }.is_error());
        assert!(!AudioEvent::SoundLooped { handle }.is_error());
        assert!(AudioEvent::SoundAborted { handle }.is_error());
        assert!(AudioEvent::PulserAborted.is_error());
    }
}
