// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::error::Error;

/// An operation performed on the mock device, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    PlayFrom(PathBuf, Duration),
    Pause,
    Resume,
    Stop,
}

/// A mock device. Doesn't actually play anything; records the operation
/// sequence so tests can assert ordering invariants.
#[derive(Clone)]
pub struct Device {
    name: String,
    is_playing: Arc<AtomicBool>,
    is_paused: Arc<AtomicBool>,
    fail_play: Arc<AtomicBool>,
    ops: Arc<Mutex<Vec<Op>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            is_playing: Arc::new(AtomicBool::new(false)),
            is_paused: Arc::new(AtomicBool::new(false)),
            fail_play: Arc::new(AtomicBool::new(false)),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns true if the device is currently playing.
    #[cfg(test)]
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    /// Returns true if the device is currently paused.
    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::Relaxed)
    }

    /// When set, play_from fails with a device error.
    #[cfg(test)]
    pub fn set_fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::Relaxed);
    }

    /// The operations recorded so far.
    #[cfg(test)]
    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().clone()
    }

    /// Clears the recorded operations.
    #[cfg(test)]
    pub fn reset_ops(&self) {
        self.ops.lock().clear();
    }

    /// The number of play_from calls recorded so far.
    #[cfg(test)]
    pub fn play_count(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, Op::PlayFrom(..)))
            .count()
    }
}

impl super::Device for Device {
    fn play_from(&self, path: &Path, start: Duration) -> Result<(), Error> {
        if self.fail_play.load(Ordering::Relaxed) {
            return Err(Error::Device("mock play failure".to_string()));
        }

        info!(
            device = self.name,
            track = %path.display(),
            start = ?start,
            "Playing track (mock)."
        );

        self.ops
            .lock()
            .push(Op::PlayFrom(path.to_path_buf(), start));
        self.is_playing.store(true, Ordering::Relaxed);
        self.is_paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&self) {
        self.ops.lock().push(Op::Pause);
        self.is_paused.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.ops.lock().push(Op::Resume);
        self.is_paused.store(false, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.ops.lock().push(Op::Stop);
        self.is_playing.store(false, Ordering::Relaxed);
        self.is_paused.store(false, Ordering::Relaxed);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
