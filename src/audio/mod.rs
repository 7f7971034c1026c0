//! Audio subsystem: device enumeration and blocking stream adapters

pub mod capture;
pub mod device;
pub mod playback;

pub use capture::{CaptureStream, CpalCapture};
pub use device::{list_devices, AudioDeviceInfo};
pub use playback::{CpalPlayback, PlaybackStream};
