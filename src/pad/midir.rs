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
use std::{error::Error, fmt, mem, sync::Mutex};

use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use midly::{live::LiveEvent, MidiMessage};
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, span, Level};

/// A MIDI-backed macro-pad. Note-on events become button presses; the key
/// number is the logical button index.
pub struct Device {
    name: String,
    input_port: MidiInputPort,
    connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_buttons(&self, sender: Sender<u8>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "watch buttons (midir)");
        let _enter = span.enter();

        let mut connection = self.connection.lock().expect("unable to get lock");
        if connection.is_some() {
            return Err("Already watching buttons.".into());
        }

        info!(device = self.name, "Watching pad buttons.");

        let input = MidiInput::new("sceneboard pad input")?;
        *connection = Some(input.connect(
            &self.input_port,
            "sceneboard pad watcher",
            move |_, raw_event, _| {
                let event = match LiveEvent::parse(raw_event) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(err = %e, "Ignoring unparseable pad event.");
                        return;
                    }
                };

                // Note-on with zero velocity is a release, not a press.
                if let LiveEvent::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } = event
                {
                    if u8::from(vel) == 0 {
                        return;
                    }
                    if let Err(e) = sender.blocking_send(u8::from(key)) {
                        error!(err = %e, "Error sending pad button press.");
                    }
                }
            },
            (),
        )?);

        Ok(())
    }

    fn stop_watch(&self) {
        // Explicitly drop the connection.
        let connection = self.connection.lock().expect("error getting mutex").take();
        mem::drop(connection);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (MIDI pad)", self.name)
    }
}

/// Lists midir pad devices and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
    Ok(list_midir_devices()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

/// Lists midir input devices.
fn list_midir_devices() -> Result<Vec<Device>, Box<dyn Error>> {
    let input = MidiInput::new("sceneboard pad listing")?;

    let mut devices: Vec<Device> = Vec::new();
    for port in input.ports() {
        devices.push(Device {
            name: input.port_name(&port)?,
            input_port: port,
            connection: Mutex::new(None),
        });
    }

    devices.sort_by_key(|device| device.name.clone());
    Ok(devices)
}

/// Gets the given midir pad device.
pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
    let mut matches = list_midir_devices()?
        .into_iter()
        .filter(|device| device.name.contains(name))
        .collect::<Vec<Device>>();

    if matches.is_empty() {
        return Err(format!("no pad device found with name {}", name).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many pad devices that match ({}), use a less ambiguous device name",
            matches
                .iter()
                .map(|device| device.name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        )
        .into());
    }

    // We've verified that there's only one element in the vector, so this should be safe.
    Ok(matches.swap_remove(0))
}
