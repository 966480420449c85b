//! Inbound frame classification and decoding
//!
//! Frames are classified by their header signature. Unrecognized frames
//! decode to [`Message::Unknown`] and are dropped by the caller; newer
//! station firmware may emit frame types this client does not know.

use crate::domain::types::{BusStatus, FeedbackEvent, SystemState};
use crate::protocol::header;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Feedback(FeedbackEvent),
    SystemState(SystemState),
    BusStatus(BusStatus),
    SerialNumber(u32),
    HardwareInfo { hardware_type: u32, firmware: u32 },
    Unknown,
}

/// Classify and decode a raw datagram.
pub fn parse(data: &[u8]) -> Message {
    if data.len() < 4 {
        return Message::Unknown;
    }

    if is_feedback(data) {
        return Message::Feedback(FeedbackEvent::new(
            data[4] as u16,
            data[5],
            data.to_vec(),
        ));
    }

    match (data[2], data[3]) {
        (header::X_BUS, 0x00) => parse_bus_status(data),
        (header::SYSTEM_STATE, 0x00) => parse_system_state(data),
        (header::SERIAL_NUMBER, 0x00) => parse_serial_number(data),
        (header::HARDWARE_INFO, 0x00) => parse_hardware_info(data),
        _ => Message::Unknown,
    }
}

fn is_feedback(data: &[u8]) -> bool {
    data.len() >= 6 && data[2..4] == header::FEEDBACK_SIGNATURE
}

fn parse_bus_status(data: &[u8]) -> Message {
    if data.len() < 7 {
        return Message::Unknown;
    }
    let x_header = data[4];
    if x_header != crate::protocol::xbus::STATUS && x_header != crate::protocol::xbus::STATUS_CHANGED
    {
        return Message::Unknown;
    }
    let status = data[6];
    Message::BusStatus(BusStatus {
        emergency_stop: status & 0x01 != 0,
        track_off: status & 0x02 != 0,
        short_circuit: status & 0x04 != 0,
        programming: status & 0x20 != 0,
    })
}

fn parse_system_state(data: &[u8]) -> Message {
    // 4 header bytes + 14 payload bytes used by the parser
    if data.len() < 18 {
        return Message::Unknown;
    }
    Message::SystemState(SystemState {
        main_current_ma: i16::from_le_bytes([data[4], data[5]]),
        prog_current_ma: i16::from_le_bytes([data[6], data[7]]),
        filtered_main_current_ma: i16::from_le_bytes([data[8], data[9]]),
        temperature_c: i16::from_le_bytes([data[10], data[11]]),
        supply_voltage_mv: u16::from_le_bytes([data[12], data[13]]),
        vcc_voltage_mv: u16::from_le_bytes([data[14], data[15]]),
        central_state: data[16],
        central_state_ex: data[17],
    })
}

fn parse_serial_number(data: &[u8]) -> Message {
    if data.len() < 8 {
        return Message::Unknown;
    }
    Message::SerialNumber(u32::from_le_bytes([data[4], data[5], data[6], data[7]]))
}

fn parse_hardware_info(data: &[u8]) -> Message {
    if data.len() < 12 {
        return Message::Unknown;
    }
    Message::HardwareInfo {
        hardware_type: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        firmware: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_frame_decodes_channel_and_primary_contact() {
        let message = parse(&[0x04, 0x00, 0xF0, 0xA1, 0x05, 0x03]);

        let Message::Feedback(event) = message else {
            panic!("expected feedback, got {message:?}");
        };
        assert_eq!(event.channel, 5);
        assert!(event.occupied());
        assert_eq!(event.raw, vec![0x04, 0x00, 0xF0, 0xA1, 0x05, 0x03]);
    }

    #[test]
    fn test_feedback_saturated_value_bytes() {
        let Message::Feedback(all_on) = parse(&[0x04, 0x00, 0xF0, 0xA1, 0x07, 0xFF]) else {
            panic!("expected feedback");
        };
        assert_eq!(all_on.active_contacts().len(), 8);

        let Message::Feedback(all_off) = parse(&[0x04, 0x00, 0xF0, 0xA1, 0x07, 0x00]) else {
            panic!("expected feedback");
        };
        assert!(!all_off.occupied());
    }

    #[test]
    fn test_bus_status_flags() {
        // X-Bus status changed: emergency stop + short circuit
        let message = parse(&[0x08, 0x00, 0x40, 0x00, 0x62, 0x22, 0x05, 0x45]);

        let Message::BusStatus(status) = message else {
            panic!("expected bus status, got {message:?}");
        };
        assert!(status.emergency_stop);
        assert!(!status.track_off);
        assert!(status.short_circuit);
        assert!(!status.programming);
    }

    #[test]
    fn test_xbus_frame_with_other_group_is_unknown() {
        // A loco info reply is X-Bus but not a status frame
        assert_eq!(parse(&[0x08, 0x00, 0x40, 0x00, 0xEF, 0x00, 0x03, 0x00]), Message::Unknown);
    }

    #[test]
    fn test_system_state_decodes_little_endian_fields() {
        let mut frame = vec![0x14, 0x00, 0x84, 0x00];
        frame.extend_from_slice(&500i16.to_le_bytes()); // main current
        frame.extend_from_slice(&0i16.to_le_bytes()); // prog current
        frame.extend_from_slice(&480i16.to_le_bytes()); // filtered
        frame.extend_from_slice(&36i16.to_le_bytes()); // temperature
        frame.extend_from_slice(&18200u16.to_le_bytes()); // supply
        frame.extend_from_slice(&17900u16.to_le_bytes()); // vcc
        frame.push(0x00); // central state
        frame.push(0x00); // central state ex
        frame.extend_from_slice(&[0x00, 0x00]); // reserved

        let Message::SystemState(state) = parse(&frame) else {
            panic!("expected system state");
        };
        assert_eq!(state.main_current_ma, 500);
        assert_eq!(state.filtered_main_current_ma, 480);
        assert_eq!(state.temperature_c, 36);
        assert_eq!(state.supply_voltage_mv, 18200);
        assert_eq!(state.vcc_voltage_mv, 17900);
    }

    #[test]
    fn test_short_system_state_is_unknown() {
        assert_eq!(parse(&[0x06, 0x00, 0x84, 0x00, 0x01, 0x02]), Message::Unknown);
    }

    #[test]
    fn test_serial_number_reply() {
        let mut frame = vec![0x08, 0x00, 0x10, 0x00];
        frame.extend_from_slice(&101953u32.to_le_bytes());

        assert_eq!(parse(&frame), Message::SerialNumber(101953));
    }

    #[test]
    fn test_hardware_info_reply() {
        let mut frame = vec![0x0C, 0x00, 0x1A, 0x00];
        frame.extend_from_slice(&0x0000_0206u32.to_le_bytes());
        frame.extend_from_slice(&0x0000_0143u32.to_le_bytes());

        assert_eq!(
            parse(&frame),
            Message::HardwareInfo { hardware_type: 0x0206, firmware: 0x0143 }
        );
    }

    #[test]
    fn test_unrecognized_frames_are_unknown_not_errors() {
        assert_eq!(parse(&[]), Message::Unknown);
        assert_eq!(parse(&[0x04, 0x00]), Message::Unknown);
        assert_eq!(parse(&[0x04, 0x00, 0x99, 0x00]), Message::Unknown);
        assert_eq!(parse(&[0x04, 0x00, 0xF0, 0xA2, 0x05, 0x03]), Message::Unknown);
    }
}
