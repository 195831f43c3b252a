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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, Barrier,
    },
};

use tokio::sync::mpsc::Sender;
use tracing::info;

/// A mock pad device. Button presses are injected by tests.
#[derive(Clone)]
pub struct Device {
    name: String,
    barrier: Arc<Barrier>,
    closed: Arc<AtomicBool>,
    button: Arc<AtomicU8>,
}

impl Device {
    /// Gets the given mock pad device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            barrier: Arc::new(Barrier::new(2)),
            closed: Arc::new(AtomicBool::new(false)),
            button: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Presses the given button.
    #[cfg(test)]
    pub fn press(&self, button: u8) {
        self.button.store(button, Ordering::Relaxed);
        // Wait until the watcher goes to deliver the press.
        self.barrier.wait();
        // Wait until the watcher has delivered it.
        self.barrier.wait();
    }

    /// Shuts the watcher down.
    #[cfg(test)]
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.barrier.wait();
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_buttons(&self, sender: Sender<u8>) -> Result<(), Box<dyn Error>> {
        info!(device = self.name, "Watching pad buttons (mock).");

        let barrier = self.barrier.clone();
        let closed = self.closed.clone();
        let button = self.button.clone();
        tokio::task::spawn_blocking(move || loop {
            barrier.wait();
            if closed.load(Ordering::Relaxed) {
                return;
            }
            sender
                .blocking_send(button.load(Ordering::Relaxed))
                .expect("error sending button press");
            barrier.wait();
        });

        Ok(())
    }

    fn stop_watch(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
