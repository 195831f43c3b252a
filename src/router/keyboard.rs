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
use std::io;
use std::sync::Arc;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use crate::bindings::HotkeyBindings;

use super::{Event, TriggerSource};

const PAUSE: &str = "pause";
const STOP: &str = "stop";

/// A driver that triggers scenes from the keyboard. Bound key combinations
/// resolve through the hotkey table; "pause" and "stop" are built in.
pub struct Driver {
    bindings: Arc<HotkeyBindings>,
}

impl Driver {
    pub fn new(bindings: HotkeyBindings) -> Driver {
        Driver {
            bindings: Arc::new(bindings),
        }
    }

    fn monitor_io<R, W>(
        bindings: &HotkeyBindings,
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<(), io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "Key ({}, {}, or a bound hotkey): ", PAUSE, STOP)?;
        writer.flush()?;
        let mut input: String = String::default();
        reader.read_line(&mut input)?;

        match input.trim() {
            "" => Ok(()),
            key if key.eq_ignore_ascii_case(PAUSE) => events_tx
                .blocking_send(Event::Pause)
                .map_err(io::Error::other),
            key if key.eq_ignore_ascii_case(STOP) => events_tx
                .blocking_send(Event::Stop)
                .map_err(io::Error::other),
            key => match bindings.resolve(key) {
                Some((mapping, scene)) => events_tx
                    .blocking_send(Event::Trigger {
                        source: TriggerSource::Hotkey,
                        mapping,
                        scene,
                    })
                    .map_err(io::Error::other),
                None => {
                    warn!(key, "No scene bound to key.");
                    Ok(())
                }
            },
        }
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let bindings = self.bindings.clone();
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");
            if bindings.is_empty() {
                warn!("No hotkeys bound; only pause and stop will work.");
            }

            loop {
                Self::monitor_io(&bindings, &events_tx, io::stdin().lock(), io::stdout())?;
            }
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use super::*;

    fn get_event(bindings: &HotkeyBindings, input: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(input.as_bytes());
        let writer_bytes: Vec<u8> = vec![0; 255];
        let writer = BufWriter::new(writer_bytes);
        Driver::monitor_io(bindings, &sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut bindings = HotkeyBindings::load(&dir.path().join("hotkeys.json"));
        bindings
            .set("ambient", "Tavern", "Ctrl+1")
            .expect("failed to bind hotkey");

        assert_eq!(Some(Event::Pause), get_event(&bindings, PAUSE)?);
        assert_eq!(Some(Event::Stop), get_event(&bindings, STOP)?);
        assert_eq!(
            Some(Event::Trigger {
                source: TriggerSource::Hotkey,
                mapping: "ambient".to_string(),
                scene: "Tavern".to_string(),
            }),
            get_event(&bindings, "Ctrl+1")?
        );
        assert_eq!(None, get_event(&bindings, "Ctrl+9")?);
        assert_eq!(None, get_event(&bindings, "")?);
        Ok(())
    }
}
