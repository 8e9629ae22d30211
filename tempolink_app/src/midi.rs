/// MIDI clock output over the host's MIDI ports.
use log::{info, warn};
use midi_types::MidiMessage;
use midir::{MidiOutput, MidiOutputConnection};
use tempolink_engine::midi::{encode, MidiError, MidiOut};

const CLIENT_NAME: &str = "tempolink";

/// Connected output port, or nothing if no port matched. Sending without a port succeeds
/// silently so the analog outputs keep running.
pub struct MidirOut {
    connection: Option<MidiOutputConnection>,
}

pub fn port_matches(port_name: &str, wanted: Option<&str>) -> bool {
    match wanted {
        Some(wanted) => port_name.contains(wanted),
        None => true,
    }
}

impl MidirOut {
    pub fn disconnected() -> MidirOut {
        MidirOut { connection: None }
    }

    /// Connect to the first port whose name contains `wanted`, or the first port at all.
    pub fn connect(wanted: Option<&str>) -> MidirOut {
        let output = match MidiOutput::new(CLIENT_NAME) {
            Ok(output) => output,
            Err(error) => {
                warn!("[midi] no MIDI backend: {}", error);
                return MidirOut::disconnected();
            }
        };
        let port = output.ports().into_iter().find(|port| {
            output
                .port_name(port)
                .map(|name| port_matches(&name, wanted))
                .unwrap_or(false)
        });
        let Some(port) = port else {
            warn!("[midi] no output port matching {:?}, MIDI clock disabled", wanted);
            return MidirOut::disconnected();
        };
        let name = output.port_name(&port).unwrap_or_default();
        match output.connect(&port, CLIENT_NAME) {
            Ok(connection) => {
                info!("[midi] sending clock to {}", name);
                MidirOut {
                    connection: Some(connection),
                }
            }
            Err(error) => {
                warn!("[midi] could not open {}: {}", name, error);
                MidirOut::disconnected()
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

impl MidiOut for MidirOut {
    fn send(&mut self, message: &MidiMessage) -> Result<(), MidiError> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        let bytes = encode(message)?;
        connection
            .send(&bytes)
            .map_err(|error| MidiError::Send(error.to_string()))
    }
}

impl Drop for MidirOut {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_matches_should_use_substring_or_accept_any() {
        assert!(port_matches("USB MIDI Interface:0", Some("USB")));
        assert!(!port_matches("Midi Through", Some("USB")));
        assert!(port_matches("Midi Through", None));
    }

    #[test]
    fn disconnected_output_should_swallow_messages() {
        let mut out = MidirOut::disconnected();
        assert!(!out.is_connected());
        assert_eq!(Ok(()), out.send(&MidiMessage::TimingClock));
    }
}
