// Simulated drive for `--mock`: answers frequency queries and follows
// run/stop/speed frames the way a spindle ramps up and down.

use hyvfd::codec;
use hyvfd_test_harness::MockTransport;

/// Fraction of the remaining distance to the target covered per query.
const RAMP_STEP: u32 = 2;

#[derive(Debug, Default)]
pub struct SimulatedDrive {
    running: bool,
    set_frequency: u16,
    output_frequency: u16,
}

impl SimulatedDrive {
    /// Handle one frame written by the engine, returning the drive's reply.
    pub fn respond(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if !codec::verify(frame) {
            return None;
        }
        if frame == codec::stop_frame().as_slice() {
            self.running = false;
        } else if frame == codec::run_forward_frame().as_slice()
            || frame == codec::run_backward_frame().as_slice()
        {
            self.running = true;
        } else if frame.len() == 7 && frame[1] == codec::FUNC_FREQUENCY_WRITE {
            self.set_frequency = u16::from_be_bytes([frame[3], frame[4]]);
        } else if frame == codec::query_frequency_frame().as_slice() {
            self.ramp();
            return Some(codec::frequency_reply_frame(self.output_frequency));
        }
        None
    }

    fn ramp(&mut self) {
        let target = if self.running { self.set_frequency } else { 0 };
        let output = u32::from(self.output_frequency);
        let target = u32::from(target);
        let next = if target > output {
            output + (target - output).div_ceil(RAMP_STEP)
        } else {
            output - (output - target).div_ceil(RAMP_STEP)
        };
        self.output_frequency = next as u16;
    }
}

/// A mock transport wired to a fresh [`SimulatedDrive`].
pub fn simulated_transport() -> MockTransport {
    let mut drive = SimulatedDrive::default();
    MockTransport::new().with_responder(move |frame| drive.respond(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(drive: &mut SimulatedDrive) -> u16 {
        let reply = drive.respond(&codec::query_frequency_frame()).unwrap();
        codec::decode_frequency_reply(&reply).unwrap()
    }

    #[test]
    fn idle_drive_reports_zero() {
        let mut drive = SimulatedDrive::default();
        assert_eq!(query(&mut drive), 0);
    }

    #[test]
    fn running_drive_ramps_to_set_frequency() {
        let mut drive = SimulatedDrive::default();
        assert!(drive.respond(&codec::set_frequency_frame(1000)).is_none());
        assert!(drive.respond(&codec::run_forward_frame()).is_none());

        assert_eq!(query(&mut drive), 500);
        assert_eq!(query(&mut drive), 750);
        for _ in 0..10 {
            query(&mut drive);
        }
        assert_eq!(query(&mut drive), 1000);
    }

    #[test]
    fn stopped_drive_ramps_down() {
        let mut drive = SimulatedDrive::default();
        drive.respond(&codec::set_frequency_frame(800));
        drive.respond(&codec::run_backward_frame());
        for _ in 0..12 {
            query(&mut drive);
        }
        drive.respond(&codec::stop_frame());
        assert_eq!(query(&mut drive), 400);
    }

    #[test]
    fn unsigned_frames_are_ignored() {
        let mut drive = SimulatedDrive::default();
        let mut frame = codec::query_frequency_frame();
        frame[7] ^= 0x01;
        assert!(drive.respond(&frame).is_none());
    }
}
