//! Output devices
//!
//! An [`AudioHost`] enumerates and opens output devices. Opening a device
//! creates a fresh [`Context`] at the device's native rate and channel count
//! and, for real hardware, a cpal stream whose callback renders it.
//!
//! [`HeadlessHost`] offers named virtual devices with no audio output; tests
//! drive playback by calling `Context::render` themselves.

use super::context::Context;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Source of output devices
pub trait AudioHost {
    /// Names of every output device, in enumeration order
    fn output_device_names(&self) -> Result<Vec<String>>;

    /// Open a device by name, or the host's preferred device for `None`
    fn open_output(&self, name: Option<&str>) -> Result<OutputDevice>;
}

impl<T: AudioHost + ?Sized> AudioHost for Arc<T> {
    fn output_device_names(&self) -> Result<Vec<String>> {
        (**self).output_device_names()
    }

    fn open_output(&self, name: Option<&str>) -> Result<OutputDevice> {
        (**self).open_output(name)
    }
}

/// An opened output device
///
/// Dropping it stops the stream.
pub struct OutputDevice {
    name: String,
    context: Arc<Context>,
    stream: Option<Stream>,
}

impl OutputDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// True when no hardware stream is attached
    pub fn is_headless(&self) -> bool {
        self.stream.is_none()
    }
}

impl std::fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputDevice")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("headless", &self.is_headless())
            .finish()
    }
}

/// Host backed by the platform's default cpal host
#[derive(Debug, Default)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }

    /// The named output device, or the first enumerated one
    fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
        let devices = host
            .output_devices()
            .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?;
        select_device(devices, name, |d| d.name().ok()).ok_or_else(|| match name {
            Some(name) => Error::Device(format!("Output device '{}' not found", name)),
            None => Error::Device("No output device available".into()),
        })
    }

    fn build_stream(
        device: &cpal::Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        context: Arc<Context>,
    ) -> Result<Stream> {
        let on_error = |err: cpal::StreamError| error!("Audio stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::F32 => device.build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    context.render(data);
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => {
                let mut mix = Vec::new();
                device.build_output_stream(
                    config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        mix.resize(data.len(), 0.0);
                        context.render(&mut mix);
                        for (out, s) in data.iter_mut().zip(&mix) {
                            *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        }
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::U16 => {
                let mut mix = Vec::new();
                device.build_output_stream(
                    config,
                    move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                        mix.resize(data.len(), 0.0);
                        context.render(&mut mix);
                        for (out, s) in data.iter_mut().zip(&mix) {
                            *out = ((s.clamp(-1.0, 1.0) + 1.0) * 32767.5) as u16;
                        }
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(Error::Device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream.map_err(|e| Error::Device(format!("Failed to build stream: {}", e)))
    }
}

impl AudioHost for CpalHost {
    fn output_device_names(&self) -> Result<Vec<String>> {
        let host = cpal::default_host();
        let names: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", names.len());
        Ok(names)
    }

    fn open_output(&self, name: Option<&str>) -> Result<OutputDevice> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, name)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::Device(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let context = Arc::new(Context::new(config.sample_rate.0, config.channels));
        let stream = Self::build_stream(&device, &config, sample_format, Arc::clone(&context))?;
        stream
            .play()
            .map_err(|e| Error::Device(format!("Failed to start stream: {}", e)))?;

        info!("Opened audio device: {}", device_name);
        Ok(OutputDevice {
            name: device_name,
            context,
            stream: Some(stream),
        })
    }
}

/// Host with virtual devices and no audio output
#[derive(Debug)]
pub struct HeadlessHost {
    names: Vec<String>,
    failing: Mutex<HashSet<String>>,
    sample_rate: u32,
    channels: u16,
}

impl HeadlessHost {
    /// Virtual devices rendering stereo at 44.1 kHz
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_format(names, 44100, 2)
    }

    pub fn with_format<I, S>(names: I, sample_rate: u32, channels: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            failing: Mutex::new(HashSet::new()),
            sample_rate,
            channels,
        }
    }

    /// Make future opens of `name` fail (or succeed again)
    pub fn set_failing(&self, name: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }
}

impl AudioHost for HeadlessHost {
    fn output_device_names(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }

    fn open_output(&self, name: Option<&str>) -> Result<OutputDevice> {
        let name = match name {
            Some(name) => self
                .names
                .iter()
                .find(|n| n.as_str() == name)
                .ok_or_else(|| Error::Device(format!("Output device '{}' not found", name)))?,
            None => self
                .names
                .first()
                .ok_or_else(|| Error::Device("No output device available".into()))?,
        };

        if self.failing.lock().contains(name) {
            return Err(Error::Device(format!("Failed to open '{}'", name)));
        }

        debug!("Opened headless device: {}", name);
        Ok(OutputDevice {
            name: name.clone(),
            context: Arc::new(Context::new(self.sample_rate, self.channels)),
            stream: None,
        })
    }
}

/// Pick `name` from `devices`, or the first one when no name is given
fn select_device<D>(
    mut devices: impl Iterator<Item = D>,
    name: Option<&str>,
    name_of: impl Fn(&D) -> Option<String>,
) -> Option<D> {
    match name {
        Some(name) => devices.find(|d| name_of(d).as_deref() == Some(name)),
        None => devices.next(),
    }
}
