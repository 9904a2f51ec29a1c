use std::hash::{Hash, Hasher};

/// Decoded controller state for a single notification frame.
///
/// A snapshot is never patched in place: every valid frame produces a fresh
/// value that replaces the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerSnapshot {
    // Button states
    pub volume_up_button: bool,
    pub volume_down_button: bool,
    pub home_button: bool,
    pub back_button: bool,
    pub trigger_button: bool,
    /// Touchpad click
    pub touchpad_button: bool,

    // Touchpad position (normalized, nominally [-1, 1])
    pub touchpad_x: f32,
    pub touchpad_y: f32,

    // Gyroscope data
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,

    // Accelerometer data
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,

    /// Set when the controller is being swung (gyro X or Y above threshold)
    pub is_moving: bool,
}

impl ControllerSnapshot {
    /// Direction the touchpad is pushed towards, if any.
    ///
    /// Vertical directions win over horizontal ones when both axes are past
    /// the threshold.
    pub fn touchpad_direction(&self) -> Option<TouchpadDirection> {
        if self.touchpad_x == 0.0 && self.touchpad_y == 0.0 {
            return None;
        }

        if self.touchpad_y < -0.5 {
            Some(TouchpadDirection::Up)
        } else if self.touchpad_y > 0.5 {
            Some(TouchpadDirection::Down)
        } else if self.touchpad_x < -0.5 {
            Some(TouchpadDirection::Left)
        } else if self.touchpad_x > 0.5 {
            Some(TouchpadDirection::Right)
        } else {
            None
        }
    }

    pub fn any_button_pressed(&self) -> bool {
        self.volume_up_button
            || self.volume_down_button
            || self.home_button
            || self.back_button
            || self.trigger_button
            || self.touchpad_button
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchpadDirection {
    Up,
    Down,
    Left,
    Right,
}

/// A paired physical controller.
///
/// Two handles refer to the same device when their addresses match, whatever
/// their display names say.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub address: String,
    pub name: String,
}

impl DeviceHandle {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for DeviceHandle {}

impl Hash for DeviceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn touch(x: f32, y: f32) -> ControllerSnapshot {
        ControllerSnapshot {
            touchpad_x: x,
            touchpad_y: y,
            ..Default::default()
        }
    }

    #[test]
    fn test_rest_state() {
        let snapshot = ControllerSnapshot::default();
        assert!(!snapshot.any_button_pressed());
        assert!(!snapshot.is_moving);
        assert_eq!(snapshot.gyro_x, 0.0);
        assert_eq!(snapshot.touchpad_direction(), None);
    }

    #[test]
    fn test_touchpad_direction() {
        assert_eq!(touch(0.0, -0.8).touchpad_direction(), Some(TouchpadDirection::Up));
        assert_eq!(touch(0.0, 0.8).touchpad_direction(), Some(TouchpadDirection::Down));
        assert_eq!(touch(-0.8, 0.0).touchpad_direction(), Some(TouchpadDirection::Left));
        assert_eq!(touch(0.8, 0.0).touchpad_direction(), Some(TouchpadDirection::Right));
        assert_eq!(touch(0.2, 0.2).touchpad_direction(), None);
        // Vertical takes precedence
        assert_eq!(touch(0.9, -0.9).touchpad_direction(), Some(TouchpadDirection::Up));
    }

    #[test]
    fn test_device_handle_equality_uses_address() {
        let a = DeviceHandle::new("AA:BB:CC:DD:EE:FF", "Gear VR Controller(1234)");
        let b = DeviceHandle::new("AA:BB:CC:DD:EE:FF", "Renamed");
        let c = DeviceHandle::new("11:22:33:44:55:66", "Gear VR Controller(1234)");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_default_status() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }
}
