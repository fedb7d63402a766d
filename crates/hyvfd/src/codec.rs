//! Huanyang frame encoder/decoder.
//!
//! Huanyang drives use a fixed, MODBUS-flavoured RTU framing rather than
//! real MODBUS registers. Every frame is a short payload followed by a
//! CRC-16/MODBUS checksum, low byte first.
//!
//! # Frame format
//!
//! ```text
//! <addr> <func> <len> <data...> <crc lo> <crc hi>
//! ```
//!
//! - `addr`: drive address, always `0x01` on a point-to-point link
//! - `func`: `0x03` control write, `0x04` status read, `0x05` frequency write
//! - `len`: number of data bytes that follow
//! - `data`: control word, status selector, or big-endian frequency
//!
//! Frames carry no request identifier. The only reply decoded is the
//! 8-byte output-frequency status frame, recognized by its fixed header.

use bytes::{BufMut, BytesMut};
use crc::{CRC_16_MODBUS, Crc};
use hyvfd_core::{Error, Result};

use crate::commands::{Command, rpm_to_frequency};

/// Drive address on the point-to-point link.
pub const DRIVE_ADDR: u8 = 0x01;

/// Function code: write control data (run/stop/direction).
pub const FUNC_CONTROL_WRITE: u8 = 0x03;

/// Function code: read control status.
pub const FUNC_STATUS_READ: u8 = 0x04;

/// Function code: write target frequency.
pub const FUNC_FREQUENCY_WRITE: u8 = 0x05;

/// Control word: run forward.
pub const CONTROL_RUN_FORWARD: u8 = 0x01;

/// Control word: stop.
pub const CONTROL_STOP: u8 = 0x08;

/// Control word: run reverse.
pub const CONTROL_RUN_BACKWARD: u8 = 0x11;

/// Status selector: output frequency.
pub const STATUS_OUTPUT_FREQUENCY: u8 = 0x01;

/// Length of the trailing checksum in bytes.
pub const CHECKSUM_LEN: usize = 2;

/// Total length of an output-frequency reply.
pub const FREQUENCY_REPLY_LEN: usize = 8;

/// Fixed leading bytes of an output-frequency reply.
pub const FREQUENCY_REPLY_HEADER: [u8; 4] = [
    DRIVE_ADDR,
    FUNC_STATUS_READ,
    0x03,
    STATUS_OUTPUT_FREQUENCY,
];

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16/MODBUS over `payload`.
pub fn checksum(payload: &[u8]) -> u16 {
    CRC_MODBUS.checksum(payload)
}

/// Append the checksum to `payload`, producing a wire-ready frame.
///
/// # Example
///
/// ```
/// use hyvfd::codec::sign;
///
/// let frame = sign(&[0x01, 0x03, 0x01, 0x08]);
/// assert_eq!(frame, vec![0x01, 0x03, 0x01, 0x08, 0xF1, 0x8E]);
/// ```
pub fn sign(payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(payload.len() + CHECKSUM_LEN);
    buf.put_slice(payload);
    buf.put_u16_le(checksum(payload));
    buf.to_vec()
}

/// Check the trailing two bytes of `frame` against the checksum of the rest.
///
/// Frames shorter than the checksum itself never verify.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < CHECKSUM_LEN {
        return false;
    }
    let (payload, trailer) = frame.split_at(frame.len() - CHECKSUM_LEN);
    checksum(payload).to_le_bytes() == trailer
}

fn control_frame(control: u8) -> Vec<u8> {
    sign(&[DRIVE_ADDR, FUNC_CONTROL_WRITE, 0x01, control])
}

/// Stop the spindle.
pub fn stop_frame() -> Vec<u8> {
    control_frame(CONTROL_STOP)
}

/// Run forward (clockwise).
pub fn run_forward_frame() -> Vec<u8> {
    control_frame(CONTROL_RUN_FORWARD)
}

/// Run reverse (counter-clockwise).
pub fn run_backward_frame() -> Vec<u8> {
    control_frame(CONTROL_RUN_BACKWARD)
}

/// Set the target frequency, in the drive's raw units.
pub fn set_frequency_frame(frequency: u16) -> Vec<u8> {
    let mut payload = BytesMut::with_capacity(5);
    payload.put_u8(DRIVE_ADDR);
    payload.put_u8(FUNC_FREQUENCY_WRITE);
    payload.put_u8(0x02);
    payload.put_u16(frequency);
    sign(&payload)
}

/// Ask the drive for its current output frequency.
pub fn query_frequency_frame() -> Vec<u8> {
    sign(&[DRIVE_ADDR, FUNC_STATUS_READ, 0x03, STATUS_OUTPUT_FREQUENCY, 0x00, 0x00])
}

/// The reply a drive sends to [`query_frequency_frame`].
///
/// The engine never sends this; simulators and tests use it to play the
/// drive's side of the link.
pub fn frequency_reply_frame(frequency: u16) -> Vec<u8> {
    let mut payload = BytesMut::with_capacity(FREQUENCY_REPLY_LEN - CHECKSUM_LEN);
    payload.put_slice(&FREQUENCY_REPLY_HEADER);
    payload.put_u16(frequency);
    sign(&payload)
}

/// Encode a parsed command into its wire frame.
///
/// `SetSpeed` is converted to the drive's frequency units with
/// `hertz_per_rpm`. No upper bound is applied to the requested speed.
pub fn encode_command(command: Command, hertz_per_rpm: f64) -> Vec<u8> {
    match command {
        Command::Stop => stop_frame(),
        Command::RunForward => run_forward_frame(),
        Command::RunBackward => run_backward_frame(),
        Command::SetSpeed { rpm } => set_frequency_frame(rpm_to_frequency(rpm, hertz_per_rpm)),
        Command::QueryFrequency => query_frequency_frame(),
    }
}

/// Validate an output-frequency reply and extract the frequency.
///
/// Returns [`Error::Protocol`] if the length, header, or checksum is wrong.
pub fn decode_frequency_reply(frame: &[u8]) -> Result<u16> {
    if frame.len() != FREQUENCY_REPLY_LEN {
        return Err(Error::Protocol(format!(
            "frequency reply must be {} bytes, got {}",
            FREQUENCY_REPLY_LEN,
            frame.len()
        )));
    }
    if frame[..4] != FREQUENCY_REPLY_HEADER {
        return Err(Error::Protocol(format!(
            "unexpected reply header {:02X?}",
            &frame[..4]
        )));
    }
    if !verify(frame) {
        return Err(Error::Protocol(format!(
            "checksum mismatch: expected {:02X?}, got {:02X?}",
            checksum(&frame[..6]).to_le_bytes(),
            &frame[6..]
        )));
    }
    Ok(u16::from_be_bytes([frame[4], frame[5]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_check_value() {
        let frame = sign(&[0x01, 0x03, 0x01, 0x08]);
        assert_eq!(frame.len(), 6);
        assert_eq!(frame[4], 0xF1);
        assert_eq!(frame[5], 0x8E);
    }

    #[test]
    fn signed_frames_verify() {
        let payloads: [&[u8]; 5] = [
            &[],
            &[0x00],
            &[0x01, 0x03, 0x01, 0x08],
            &[0x01, 0x05, 0x02, 0xFF, 0xFF],
            &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x11, 0x22, 0x33, 0x44],
        ];
        for payload in payloads {
            assert!(verify(&sign(payload)), "payload {payload:02X?}");
        }
    }

    #[test]
    fn verify_rejects_short_frames() {
        assert!(!verify(&[]));
        assert!(!verify(&[0xFF]));
    }

    #[test]
    fn verify_rejects_flipped_bit() {
        let mut frame = sign(&[0x01, 0x03, 0x01, 0x01]);
        frame[5] ^= 0x01;
        assert!(!verify(&frame));
    }

    #[test]
    fn control_frames() {
        assert_eq!(stop_frame(), vec![0x01, 0x03, 0x01, 0x08, 0xF1, 0x8E]);
        assert_eq!(run_forward_frame(), vec![0x01, 0x03, 0x01, 0x01, 0x31, 0x88]);
        assert_eq!(run_backward_frame(), vec![0x01, 0x03, 0x01, 0x11, 0x30, 0x44]);
    }

    #[test]
    fn query_frame() {
        assert_eq!(
            query_frequency_frame(),
            vec![0x01, 0x04, 0x03, 0x01, 0x00, 0x00, 0xA1, 0x8E]
        );
    }

    #[test]
    fn set_speed_encodes_big_endian_frequency() {
        let frame = encode_command(Command::SetSpeed { rpm: 1000 }, 3.47222);
        assert_eq!(frame, vec![0x01, 0x05, 0x02, 0x0D, 0x90, 0xBC, 0x30]);
    }

    #[test]
    fn set_speed_is_not_clamped() {
        let frame = encode_command(Command::SetSpeed { rpm: u16::MAX }, 1.0);
        assert_eq!(&frame[3..5], &[0xFF, 0xFF]);
    }

    #[test]
    fn encode_each_command() {
        assert_eq!(encode_command(Command::Stop, 1.0), stop_frame());
        assert_eq!(encode_command(Command::RunForward, 1.0), run_forward_frame());
        assert_eq!(encode_command(Command::RunBackward, 1.0), run_backward_frame());
        assert_eq!(
            encode_command(Command::QueryFrequency, 1.0),
            query_frequency_frame()
        );
    }

    #[test]
    fn decode_valid_reply() {
        let frame = frequency_reply_frame(3472);
        assert_eq!(frame, vec![0x01, 0x04, 0x03, 0x01, 0x0D, 0x90, 0xA5, 0x72]);
        assert_eq!(decode_frequency_reply(&frame).unwrap(), 3472);
    }

    #[test]
    fn decode_rejects_bad_checksum() {
        let mut frame = frequency_reply_frame(3472);
        frame[7] ^= 0x80;
        assert!(matches!(
            decode_frequency_reply(&frame),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn decode_rejects_wrong_header() {
        // Correctly signed, but a control-write echo rather than a status reply.
        let frame = sign(&[0x01, 0x03, 0x03, 0x01, 0x0D, 0x90]);
        assert!(matches!(
            decode_frequency_reply(&frame),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let frame = frequency_reply_frame(100);
        assert!(decode_frequency_reply(&frame[..7]).is_err());
        let mut long = frame.clone();
        long.push(0x00);
        assert!(decode_frequency_reply(&long).is_err());
    }
}
