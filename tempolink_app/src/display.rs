/// Four-character display rendered to the log. Segment font rendering is left to real hardware.
use log::{debug, info};
use tempolink_engine::hw::{HardwareError, SegmentDisplay};

#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    last: String,
}

impl ConsoleDisplay {
    pub fn new() -> ConsoleDisplay {
        ConsoleDisplay::default()
    }
}

/// Put the decimal points back after the characters they belong to.
pub fn with_dots(text: &str, dots: u8) -> String {
    let mut rendered = String::with_capacity(text.len() * 2);
    for (index, c) in text.chars().enumerate() {
        rendered.push(c);
        if index < 8 && dots & 1 << index != 0 {
            rendered.push('.');
        }
    }
    rendered
}

impl SegmentDisplay for ConsoleDisplay {
    fn write_text(&mut self, text: &str, dots: u8) -> Result<(), HardwareError> {
        let rendered = with_dots(text, dots);
        if rendered != self.last {
            info!("[display] [{}]", rendered);
            self.last = rendered;
        }
        Ok(())
    }

    fn write_segments(&mut self, segments: &[u16]) -> Result<(), HardwareError> {
        debug!("[display] segments {:04x?}", segments);
        self.last.clear();
        Ok(())
    }
}
