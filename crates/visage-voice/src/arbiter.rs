//! Audio device arbiter.
//!
//! The microphone and the speaker never run at the same time: every capture
//! or playback goes through a guarded acquisition that enforces Idle state
//! and a settle delay after the previous release. Windows audio stacks in
//! particular misbehave on back-to-back mic/speaker handoffs without it.

use crate::errors::*;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default settle time between a release and the next acquisition.
pub const DEFAULT_TRANSITION_DELAY: Duration = Duration::from_millis(500);

/// Who currently holds the audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Idle,
    Recording,
    Playing,
}

impl AudioState {
    fn as_str(self) -> &'static str {
        match self {
            AudioState::Idle => "idle",
            AudioState::Recording => "recording",
            AudioState::Playing => "playing",
        }
    }
}

/// State machine owning exclusive access to the audio hardware.
#[derive(Debug)]
pub struct AudioDeviceArbiter {
    state: AudioState,
    transition_delay: Duration,
    last_release: Option<Instant>,
}

impl AudioDeviceArbiter {
    pub fn new(transition_delay: Duration) -> Self {
        Self {
            state: AudioState::Idle,
            transition_delay,
            last_release: None,
        }
    }

    pub fn state(&self) -> AudioState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == AudioState::Idle
    }

    /// Acquire the device for microphone capture.
    pub fn acquire_for_recording(&mut self) -> Result<DeviceGuard<'_>> {
        self.acquire(AudioState::Recording)
    }

    /// Acquire the device for speaker playback.
    pub fn acquire_for_playback(&mut self) -> Result<DeviceGuard<'_>> {
        self.acquire(AudioState::Playing)
    }

    fn acquire(&mut self, target: AudioState) -> Result<DeviceGuard<'_>> {
        if self.state != AudioState::Idle {
            return Err(VoiceError::Busy {
                state: self.state.as_str(),
            });
        }

        self.wait_for_settle();
        trace!(from = self.state.as_str(), to = target.as_str(), "Audio transition");
        self.state = target;
        Ok(DeviceGuard { arbiter: self })
    }

    /// Sleep out the remainder of the settle window, if any.
    fn wait_for_settle(&self) {
        if let Some(released) = self.last_release {
            let elapsed = released.elapsed();
            if elapsed < self.transition_delay {
                let remaining = self.transition_delay - elapsed;
                debug!(remaining_ms = remaining.as_millis() as u64, "Waiting for audio settle");
                std::thread::sleep(remaining);
            }
        }
    }

    fn release(&mut self) {
        trace!(from = self.state.as_str(), "Audio release");
        self.state = AudioState::Idle;
        self.last_release = Some(Instant::now());
    }
}

impl Default for AudioDeviceArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSITION_DELAY)
    }
}

/// RAII guard; dropping it returns the device to Idle and stamps the
/// release time.
#[derive(Debug)]
pub struct DeviceGuard<'a> {
    arbiter: &'a mut AudioDeviceArbiter,
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        self.arbiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_cycle() {
        let mut arbiter = AudioDeviceArbiter::new(Duration::ZERO);
        assert!(arbiter.is_idle());

        {
            let _guard = arbiter.acquire_for_recording().unwrap();
        }
        assert!(arbiter.is_idle());

        {
            let _guard = arbiter.acquire_for_playback().unwrap();
        }
        assert!(arbiter.is_idle());
    }

    #[test]
    fn test_state_while_held() {
        let mut arbiter = AudioDeviceArbiter::new(Duration::ZERO);
        let guard = arbiter.acquire_for_recording().unwrap();
        assert_eq!(guard.arbiter.state(), AudioState::Recording);
    }

    #[test]
    fn test_settle_delay_enforced() {
        let delay = Duration::from_millis(60);
        let mut arbiter = AudioDeviceArbiter::new(delay);

        {
            let _guard = arbiter.acquire_for_recording().unwrap();
        }
        let released_at = Instant::now();
        {
            let _guard = arbiter.acquire_for_playback().unwrap();
        }
        assert!(
            released_at.elapsed() >= delay,
            "second acquisition must wait out the settle delay"
        );
    }

    #[test]
    fn test_no_delay_on_first_acquisition() {
        let mut arbiter = AudioDeviceArbiter::new(Duration::from_secs(5));
        let start = Instant::now();
        let _guard = arbiter.acquire_for_recording().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
