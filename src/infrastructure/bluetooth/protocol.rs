//! Gear VR Controller Protocol
//!
//! GATT identifiers and the decoder for the controller's data notifications.

use crate::domain::models::ControllerSnapshot;
use crate::infrastructure::bluetooth::transport::{GattCharacteristic, GattProfile, GattService};
use thiserror::Error;
use uuid::Uuid;

/// Gear VR Controller BLE Service UUID
/// Decoded: "OculusThreemote" in ASCII (4F 63 75 6C 75 73 20 54 68 72 65 65 6D 6F 74 65)
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4f63756c_7573_2054_6872_65656d6f7465);

/// Data Receive Characteristic UUID - where sensor data is received
pub const DATA_CHAR_UUID: Uuid = Uuid::from_u128(0xc8c51726_81bc_483b_a052_f7a14ea3d281);

/// Client Characteristic Configuration Descriptor (standard 0x2902)
pub const CONFIG_DESCRIPTOR_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Value written to the configuration descriptor to turn notifications on
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Paired devices are only offered when their name contains this
pub const DEVICE_NAME_FILTER: &str = "Gear VR Controller";

/// Minimum length of a data notification
pub const FRAME_LEN: usize = 60;

pub const GYRO_OFFSET: usize = 4;
pub const ACCEL_OFFSET: usize = 10;
pub const TOUCHPAD_X_OFFSET: usize = 53;
pub const TOUCHPAD_Y_OFFSET: usize = 54;
pub const BUTTON_OFFSET: usize = 58;

/// Raw IMU counts per physical unit
pub const IMU_SCALE: f32 = 10000.0;
/// Touchpad axes are signed bytes normalized by the positive maximum
pub const TOUCHPAD_SCALE: f32 = 127.0;
/// Gyro rate above which the controller counts as moving
pub const MOVEMENT_THRESHOLD: f32 = 0.01;

/// Button bits in the byte at [`BUTTON_OFFSET`].
///
/// Touchpad click is bit 4 and trigger is bit 5; this is the order the
/// controller sends.
pub mod buttons {
    pub const VOLUME_UP: u8 = 0x01;
    pub const VOLUME_DOWN: u8 = 0x02;
    pub const HOME: u8 = 0x04;
    pub const BACK: u8 = 0x08;
    pub const TOUCHPAD: u8 = 0x10;
    pub const TRIGGER: u8 = 0x20;
}

/// The GATT layout the controller advertises.
pub fn controller_profile() -> GattProfile {
    GattProfile {
        services: vec![GattService {
            uuid: SERVICE_UUID,
            characteristics: vec![GattCharacteristic {
                uuid: DATA_CHAR_UUID,
                descriptors: vec![CONFIG_DESCRIPTOR_UUID],
            }],
        }],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame too short: need at least 60 bytes, got {len}")]
    TooShort { len: usize },

    #[error("malformed frame: cannot read field at offset {offset}")]
    Malformed { offset: usize },
}

/// Decode one data notification into a snapshot.
///
/// # Data Packet Structure (60 bytes, longer frames are accepted)
///
/// ```text
/// [4-9]   : Gyro X, Y, Z (i16 little-endian, / 10000)
/// [10-15] : Accel X, Y, Z (i16 little-endian, / 10000)
/// [53]    : Touchpad X (i8, / 127)
/// [54]    : Touchpad Y (i8, / 127)
/// [58]    : Button state byte
///           bit 0: Volume Up
///           bit 1: Volume Down
///           bit 2: Home
///           bit 3: Back
///           bit 4: Touchpad pressed
///           bit 5: Trigger
/// ```
pub fn decode(bytes: &[u8]) -> Result<ControllerSnapshot, DecodeError> {
    if bytes.len() < FRAME_LEN {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }

    let button_byte = read_u8(bytes, BUTTON_OFFSET)?;

    let touchpad_x = read_u8(bytes, TOUCHPAD_X_OFFSET)? as i8 as f32 / TOUCHPAD_SCALE;
    let touchpad_y = read_u8(bytes, TOUCHPAD_Y_OFFSET)? as i8 as f32 / TOUCHPAD_SCALE;

    let [gyro_x, gyro_y, gyro_z] = read_axes(bytes, GYRO_OFFSET)?;
    let [accel_x, accel_y, accel_z] = read_axes(bytes, ACCEL_OFFSET)?;

    let is_moving = gyro_x.abs() > MOVEMENT_THRESHOLD || gyro_y.abs() > MOVEMENT_THRESHOLD;

    Ok(ControllerSnapshot {
        volume_up_button: button_byte & buttons::VOLUME_UP != 0,
        volume_down_button: button_byte & buttons::VOLUME_DOWN != 0,
        home_button: button_byte & buttons::HOME != 0,
        back_button: button_byte & buttons::BACK != 0,
        trigger_button: button_byte & buttons::TRIGGER != 0,
        touchpad_button: button_byte & buttons::TOUCHPAD != 0,
        touchpad_x,
        touchpad_y,
        gyro_x,
        gyro_y,
        gyro_z,
        accel_x,
        accel_y,
        accel_z,
        is_moving,
    })
}

fn read_u8(bytes: &[u8], offset: usize) -> Result<u8, DecodeError> {
    bytes
        .get(offset)
        .copied()
        .ok_or(DecodeError::Malformed { offset })
}

fn read_i16_le(bytes: &[u8], offset: usize) -> Result<i16, DecodeError> {
    match bytes.get(offset..offset + 2) {
        Some(&[lo, hi]) => Ok(i16::from_le_bytes([lo, hi])),
        _ => Err(DecodeError::Malformed { offset }),
    }
}

/// Three consecutive scaled i16 axes starting at `offset`.
fn read_axes(bytes: &[u8], offset: usize) -> Result<[f32; 3], DecodeError> {
    let mut axes = [0.0; 3];
    for (i, axis) in axes.iter_mut().enumerate() {
        *axis = read_i16_le(bytes, offset + i * 2)? as f32 / IMU_SCALE;
    }
    Ok(axes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Vec<u8> {
        vec![0u8; FRAME_LEN]
    }

    #[test]
    fn test_uuid_constants() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "4f63756c-7573-2054-6872-65656d6f7465"
        );
        assert_eq!(
            DATA_CHAR_UUID.to_string(),
            "c8c51726-81bc-483b-a052-f7a14ea3d281"
        );
        assert_eq!(
            CONFIG_DESCRIPTOR_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_short_frame_rejected() {
        for len in [0, 1, 2, 59] {
            assert_eq!(decode(&vec![0u8; len]), Err(DecodeError::TooShort { len }));
        }
    }

    #[test]
    fn test_longer_frame_accepted() {
        let mut bytes = vec![0u8; 64];
        bytes[BUTTON_OFFSET] = buttons::HOME;
        assert!(decode(&bytes).unwrap().home_button);
    }

    #[test]
    fn test_button_bits() {
        let cases: [(u8, fn(&ControllerSnapshot) -> bool); 6] = [
            (0, |s| s.volume_up_button),
            (1, |s| s.volume_down_button),
            (2, |s| s.home_button),
            (3, |s| s.back_button),
            (4, |s| s.touchpad_button),
            (5, |s| s.trigger_button),
        ];

        for (bit, pressed) in cases {
            let mut bytes = frame();
            bytes[BUTTON_OFFSET] = 1 << bit;
            let snapshot = decode(&bytes).unwrap();
            assert!(pressed(&snapshot), "bit {bit} not mapped");

            let pressed_count = cases.iter().filter(|(_, f)| f(&snapshot)).count();
            assert_eq!(pressed_count, 1, "bit {bit} set more than one flag");
        }
    }

    #[test]
    fn test_upper_button_bits_ignored() {
        let mut bytes = frame();
        bytes[BUTTON_OFFSET] = 0xC0;
        assert!(!decode(&bytes).unwrap().any_button_pressed());
    }

    #[test]
    fn test_touchpad_normalization() {
        let mut bytes = frame();
        bytes[TOUCHPAD_X_OFFSET] = 127;
        bytes[TOUCHPAD_Y_OFFSET] = 0x80; // -128
        let snapshot = decode(&bytes).unwrap();

        assert_eq!(snapshot.touchpad_x, 1.0);
        // No clamping at the negative end
        assert_eq!(snapshot.touchpad_y, -128.0 / 127.0);
        assert!(snapshot.touchpad_y < -1.0);
    }

    #[test]
    fn test_gyro_little_endian() {
        let mut bytes = frame();
        bytes[4] = 0x10;
        bytes[5] = 0x27; // 0x2710 = 10000
        bytes[6] = 0xF0;
        bytes[7] = 0xD8; // 0xD8F0 = -10000
        bytes[8] = 0x88;
        bytes[9] = 0x13; // 0x1388 = 5000
        let snapshot = decode(&bytes).unwrap();

        assert_eq!(snapshot.gyro_x, 1.0);
        assert_eq!(snapshot.gyro_y, -1.0);
        assert_eq!(snapshot.gyro_z, 0.5);
        assert!(snapshot.is_moving);
    }

    #[test]
    fn test_accel_axes() {
        let mut bytes = frame();
        bytes[10..12].copy_from_slice(&2500i16.to_le_bytes());
        bytes[12..14].copy_from_slice(&(-5000i16).to_le_bytes());
        bytes[14..16].copy_from_slice(&i16::MIN.to_le_bytes());
        let snapshot = decode(&bytes).unwrap();

        assert_eq!(snapshot.accel_x, 0.25);
        assert_eq!(snapshot.accel_y, -0.5);
        assert_eq!(snapshot.accel_z, -3.2768);
        // Acceleration never marks the controller as moving
        assert!(!snapshot.is_moving);
    }

    #[test]
    fn test_is_moving_threshold() {
        let with_rates = |x: i16, y: i16, z: i16| {
            let mut bytes = frame();
            bytes[4..6].copy_from_slice(&x.to_le_bytes());
            bytes[6..8].copy_from_slice(&y.to_le_bytes());
            bytes[8..10].copy_from_slice(&z.to_le_bytes());
            decode(&bytes).unwrap().is_moving
        };

        // 0.005 on both axes
        assert!(!with_rates(50, 50, 0));
        // exactly 0.01 is not above the threshold
        assert!(!with_rates(100, -100, 0));
        assert!(with_rates(101, 0, 0));
        assert!(with_rates(0, -150, 0));
        // Z is not considered
        assert!(!with_rates(0, 0, 30000));
    }

    #[test]
    fn test_volume_up_only_frame() {
        let mut bytes = frame();
        bytes[BUTTON_OFFSET] = 0x01;

        let expected = ControllerSnapshot {
            volume_up_button: true,
            ..Default::default()
        };
        assert_eq!(decode(&bytes), Ok(expected));
    }
}
