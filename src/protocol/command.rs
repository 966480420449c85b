//! Outbound command frame builders
//!
//! Each builder returns the complete wire frame including the length
//! prefix. Addresses and channels are passed through permissively:
//! values are masked to their field width, never clamped or rejected.

use crate::protocol::{broadcast, header, track_power, xbus};

/// XOR checksum: fold the group code and all subsequent payload bytes.
fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Encode a locomotive address. Addresses >= 128 set the long-address
/// marker in the MSB.
fn encode_loco_address(address: u16) -> (u8, u8) {
    if address < 128 {
        (0x00, address as u8)
    } else {
        (0xC0 | ((address >> 8) & 0x3F) as u8, (address & 0xFF) as u8)
    }
}

/// Request the station serial number. Reply: 8 bytes, u32 LE serial.
pub fn serial_number_request() -> Vec<u8> {
    vec![0x04, 0x00, header::SERIAL_NUMBER, 0x00]
}

/// Request hardware type and firmware version.
pub fn hardware_info_request() -> Vec<u8> {
    vec![0x04, 0x00, header::HARDWARE_INFO, 0x00]
}

/// Unsubscribe from station broadcasts. Sent before disconnecting to
/// immediately free the client slot; without it the station keeps the
/// session alive for another 60 seconds.
pub fn logoff() -> Vec<u8> {
    vec![0x04, 0x00, header::LOGOFF, 0x00]
}

/// Initial handshake: requests a full system state report.
pub fn handshake() -> Vec<u8> {
    vec![0x04, 0x00, header::SYSTEM_STATE_REQUEST, 0x00]
}

/// Subscribe to the given broadcast flag set.
pub fn broadcast_flags(flags: u32) -> Vec<u8> {
    vec![
        0x08,
        0x00,
        header::BROADCAST_FLAGS,
        0x00,
        (flags & 0xFF) as u8,
        ((flags >> 8) & 0xFF) as u8,
        ((flags >> 16) & 0xFF) as u8,
        ((flags >> 24) & 0xFF) as u8,
    ]
}

/// Subscribe to sensor feedback and system state only. Cuts station
/// traffic by roughly 90% compared to [`broadcast::ALL`].
pub fn broadcast_flags_basic() -> Vec<u8> {
    broadcast_flags(broadcast::BASIC)
}

pub fn track_power_on() -> Vec<u8> {
    vec![0x07, 0x00, header::X_BUS, 0x00, xbus::TRACK_POWER, track_power::ON, 0xA0]
}

pub fn track_power_off() -> Vec<u8> {
    vec![0x07, 0x00, header::X_BUS, 0x00, xbus::TRACK_POWER, track_power::OFF, 0xA1]
}

/// Global emergency stop: locomotives halt, track power stays on.
pub fn emergency_stop() -> Vec<u8> {
    vec![0x06, 0x00, header::X_BUS, 0x00, xbus::SET_STOP, 0x80]
}

/// Request the current central status.
pub fn status_request() -> Vec<u8> {
    vec![0x07, 0x00, header::X_BUS, 0x00, xbus::TRACK_POWER, xbus::GET_STATUS, 0x05]
}

/// Drive a locomotive with 128 speed steps.
///
/// `speed`: 0 = stop, 1 = emergency stop, 2-127 = speed 1-126.
pub fn locomotive_drive(address: u16, speed: u8, forward: bool) -> Vec<u8> {
    let (msb, lsb) = encode_loco_address(address);
    // Bit 7 = direction, bits 0-6 = speed.
    let speed_byte = (if forward { 0x80 } else { 0x00 }) | (speed & 0x7F);
    let db0 = 0x13; // 128 speed steps
    let xor = xor_checksum(&[xbus::SET_LOCO_DRIVE, db0, msb, lsb, speed_byte]);

    vec![0x0A, 0x00, header::X_BUS, 0x00, xbus::SET_LOCO_DRIVE, db0, msb, lsb, speed_byte, xor]
}

/// Switch a locomotive function (F0 = light, F1, ...).
pub fn locomotive_function(address: u16, function_index: u8, on: bool) -> Vec<u8> {
    let (msb, lsb) = encode_loco_address(address);
    // Bits 6-7: 00 = off, 01 = on; bits 0-5: function index.
    let func_byte = (if on { 0x40 } else { 0x00 }) | (function_index & 0x3F);
    let db0 = 0xF8;
    let xor = xor_checksum(&[xbus::SET_LOCO_FUNCTION, db0, msb, lsb, func_byte]);

    vec![0x0A, 0x00, header::X_BUS, 0x00, xbus::SET_LOCO_FUNCTION, db0, msb, lsb, func_byte, xor]
}

/// Subscribe to updates for a locomotive address (max 16 per client).
pub fn locomotive_info_request(address: u16) -> Vec<u8> {
    let (msb, lsb) = encode_loco_address(address);
    let db0 = 0xF0;
    let xor = xor_checksum(&[xbus::GET_LOCO_INFO, db0, msb, lsb]);

    vec![0x09, 0x00, header::X_BUS, 0x00, xbus::GET_LOCO_INFO, db0, msb, lsb, xor]
}

/// Switch a turnout or signal decoder output.
///
/// The wire address is the decoder address minus one; the station adds
/// one back internally. The command byte packs `10Q0A00P`: bit 5 queue
/// flag, bit 3 activate flag, bit 0 output selector, bit 7 fixed.
pub fn turnout_set(decoder_address: u16, output: u8, activate: bool, queue: bool) -> Vec<u8> {
    let wire_address = decoder_address.wrapping_sub(1);
    let msb = ((wire_address >> 8) & 0xFF) as u8;
    let lsb = (wire_address & 0xFF) as u8;

    let cmd = 0x80
        | (if queue { 0x20 } else { 0x00 })
        | (if activate { 0x08 } else { 0x00 })
        | (output & 0x01);

    let xor = xor_checksum(&[xbus::SET_TURNOUT, msb, lsb, cmd]);

    vec![0x09, 0x00, header::X_BUS, 0x00, xbus::SET_TURNOUT, msb, lsb, cmd, xor]
}

/// Set an extended accessory decoder to one of 256 aspect values.
pub fn extended_accessory_set(address: u16, value: u8) -> Vec<u8> {
    let msb = ((address >> 8) & 0xFF) as u8;
    let lsb = (address & 0xFF) as u8;
    let xor = xor_checksum(&[xbus::SET_EXT_ACCESSORY, msb, lsb, value, 0x00]);

    vec![0x0A, 0x00, header::X_BUS, 0x00, xbus::SET_EXT_ACCESSORY, msb, lsb, value, 0x00, xor]
}

/// Request the state of a turnout or signal decoder.
pub fn turnout_info_request(decoder_address: u16) -> Vec<u8> {
    let wire_address = decoder_address.wrapping_sub(1);
    let msb = ((wire_address >> 8) & 0xFF) as u8;
    let lsb = (wire_address & 0xFF) as u8;
    let xor = xor_checksum(&[xbus::GET_TURNOUT_INFO, msb, lsb]);

    vec![0x09, 0x00, header::X_BUS, 0x00, xbus::GET_TURNOUT_INFO, msb, lsb, xor]
}
