//! Shared types for command station events and feedback statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A decoded track sensor feedback event.
///
/// Each feedback channel is a numbered physical sensor input. The value
/// byte carries one contact state per bit; bit 0 is the primary contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEvent {
    /// Sensor channel number (wire frames carry one byte, the domain
    /// allows headroom for larger bus layouts).
    pub channel: u16,
    /// Raw contact bit flags from the frame.
    pub bits: u8,
    /// The complete frame as received, for traffic logging.
    pub raw: Vec<u8>,
    /// Receipt timestamp.
    pub received_at: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(channel: u16, bits: u8, raw: Vec<u8>) -> Self {
        Self { channel, bits, raw, received_at: Utc::now() }
    }

    /// Contact state of a single bit (0-7).
    #[inline]
    pub fn contact(&self, bit: u8) -> bool {
        bit < 8 && (self.bits & (1 << bit)) != 0
    }

    /// Primary contact state (bit 0) - occupancy for most sensor types.
    #[inline]
    pub fn occupied(&self) -> bool {
        self.contact(0)
    }

    /// Indices of all active contact bits, LSB first.
    pub fn active_contacts(&self) -> SmallVec<[u8; 8]> {
        (0u8..8).filter(|&bit| self.contact(bit)).collect()
    }
}

/// Periodic system state report from the command station.
///
/// Currents are milliamperes, voltages millivolts, temperature degrees
/// Celsius, exactly as carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub main_current_ma: i16,
    pub prog_current_ma: i16,
    pub filtered_main_current_ma: i16,
    pub temperature_c: i16,
    pub supply_voltage_mv: u16,
    pub vcc_voltage_mv: u16,
    pub central_state: u8,
    pub central_state_ex: u8,
}

/// Decoded accessory bus status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStatus {
    pub emergency_stop: bool,
    pub track_off: bool,
    pub short_circuit: bool,
    pub programming: bool,
}

impl BusStatus {
    /// True when the track is powered and no fault flag is raised.
    pub fn is_normal(&self) -> bool {
        !self.emergency_stop && !self.track_off && !self.short_circuit
    }
}

/// Version information reported by the command station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub serial_number: u32,
    pub hardware_type_code: u32,
    pub firmware_code: u32,
}

impl VersionInfo {
    /// Human-readable hardware type for the common controller models.
    pub fn hardware_name(&self) -> String {
        match self.hardware_type_code {
            0x0000_0200 => "Z21 (old)".to_string(),
            0x0000_0201 => "z21start".to_string(),
            0x0000_0202 => "Z21".to_string(),
            0x0000_0203 => "smartRail".to_string(),
            0x0000_0204 => "z21small".to_string(),
            0x0000_0205 => "z21select".to_string(),
            0x0000_0206 => "Z21a".to_string(),
            0x0000_0211 => "z21 single booster".to_string(),
            0x0000_0212 => "z21 dual booster".to_string(),
            other => format!("Unknown (0x{other:08X})"),
        }
    }

    /// Firmware version string. The wire encoding is BCD: 0x0143 = V1.43.
    pub fn firmware_version(&self) -> String {
        let major = (self.firmware_code >> 8) & 0xFF;
        let minor = self.firmware_code & 0xFF;
        format!("V{major:X}.{minor:02X}")
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "S/N: {}, HW: {}, FW: {}",
            self.serial_number,
            self.hardware_name(),
            self.firmware_version()
        )
    }
}

/// Trigger statistics for a single feedback channel.
///
/// Entries are created lazily on first feedback and live until an
/// explicit reset. Entity labels identify the journey or workflow bound
/// to the channel when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStatistics {
    pub channel: u16,
    pub total_count: u64,
    pub last_trigger: DateTime<Utc>,
    pub entity_name: Option<String>,
    pub entity_type: Option<String>,
}
