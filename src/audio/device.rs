//! Audio device enumeration and selection
//!
//! Devices are picked by case-sensitive substring match against their
//! reported name, which is how a virtual output like "CABLE Input" gets
//! selected without knowing the full device name.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::DeviceError;

/// Summary of one enumerated device
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let is_default = default_input_name.as_ref() == Some(&name);
                let (sample_rates, channels) = device_capabilities(&device, true);
                devices.push(AudioDeviceInfo {
                    name,
                    is_input: true,
                    is_output: false,
                    is_default,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);
                let (sample_rates, channels) = device_capabilities(&device, false);

                // Duplex devices show up in both enumerations
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    if is_default && !existing.is_default {
                        existing.is_default = true;
                    }
                } else {
                    devices.push(AudioDeviceInfo {
                        name,
                        is_input: false,
                        is_output: true,
                        is_default,
                        sample_rates,
                        channels,
                    });
                }
            }
        }
    }

    devices
}

/// Probe supported sample rates and channel counts
fn device_capabilities(device: &cpal::Device, is_input: bool) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    let mut probe = |configs: Vec<cpal::SupportedStreamConfigRange>| {
        for config in configs {
            for rate_val in [44100u32, 48000, 88200, 96000, 176400, 192000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }
            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    };

    if is_input {
        if let Ok(configs) = device.supported_input_configs() {
            probe(configs.collect());
        }
    } else if let Ok(configs) = device.supported_output_configs() {
        probe(configs.collect());
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();

    (sample_rates, channels)
}

/// Find an input device whose name contains `needle`, or the default
/// input device when `needle` is `None`.
pub fn find_input_device(needle: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    match needle {
        Some(needle) => {
            let devices = host
                .input_devices()
                .map_err(|e| DeviceError::NotFound(e.to_string()))?;
            for device in devices {
                if let Ok(name) = device.name() {
                    if name.contains(needle) {
                        tracing::info!("selected capture device '{}'", name);
                        return Ok(device);
                    }
                }
            }
            Err(DeviceError::NotFound(needle.to_string()))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| DeviceError::NotFound("no default input device".to_string())),
    }
}

/// Find an output device whose name contains `needle`, or the default
/// output device when `needle` is `None`.
pub fn find_output_device(needle: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    match needle {
        Some(needle) => {
            let devices = host
                .output_devices()
                .map_err(|e| DeviceError::NotFound(e.to_string()))?;
            for device in devices {
                if let Ok(name) = device.name() {
                    if name.contains(needle) {
                        tracing::info!("selected playback device '{}'", name);
                        return Ok(device);
                    }
                }
            }
            Err(DeviceError::NotFound(needle.to_string()))
        }
        None => host
            .default_output_device()
            .ok_or_else(|| DeviceError::NotFound("no default output device".to_string())),
    }
}
