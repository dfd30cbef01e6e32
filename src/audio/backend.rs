// ABOUTME: Audio output backend boundary and the cpal implementation
// ABOUTME: Device enumeration, device selection and a stream owned by a dedicated thread

use crate::audio::AudioFormat;
use crate::error::Error;
use crate::sync::instant_to_monotonic_us;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// How long `open` waits for the output thread to start the stream.
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);
/// How long closing waits for the output thread to release the device.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Called once per device period with the interleaved output block and the
/// local monotonic time (µs) at which its first frame reaches the speaker.
///
/// Runs on the audio thread: it must not block, allocate or panic.
pub type RenderCallback = Box<dyn FnMut(&mut [f32], i64) + Send + 'static>;

/// An output device as reported by [`AudioBackend::devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Position in the backend's enumeration order
    pub index: usize,
    /// Human readable device name
    pub name: String,
    /// Whether this is the host's default output
    pub is_default: bool,
}

/// How the user picks an output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Device at this enumeration index
    Index(usize),
    /// First device whose name starts with this prefix
    NamePrefix(String),
}

impl DeviceSelector {
    /// Find the device this selector names.
    pub fn select<'a>(&self, devices: &'a [AudioDevice]) -> Option<&'a AudioDevice> {
        match self {
            DeviceSelector::Index(index) => devices.iter().find(|d| d.index == *index),
            DeviceSelector::NamePrefix(prefix) => {
                devices.iter().find(|d| d.name.starts_with(prefix.as_str()))
            }
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Index(index) => write!(f, "device #{}", index),
            DeviceSelector::NamePrefix(prefix) => write!(f, "device named '{}*'", prefix),
        }
    }
}

/// An open output stream. Dropping it closes the device.
pub struct OutputHandle {
    closer: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl OutputHandle {
    /// Wrap the action that closes the stream.
    pub fn new(closer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            closer: Some(Box::new(closer)),
        }
    }

    /// Close the device and wait for the stream to stop.
    pub fn stop(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandle")
            .field("open", &self.closer.is_some())
            .finish()
    }
}

/// Audio output device access.
pub trait AudioBackend: Send + Sync + 'static {
    /// List output devices.
    fn devices(&self) -> Result<Vec<AudioDevice>, Error>;

    /// Open `device` (or the default output when `None`) in `format` and
    /// start calling `render` once per device period.
    fn open(
        &self,
        device: Option<&AudioDevice>,
        format: &AudioFormat,
        render: RenderCallback,
    ) -> Result<OutputHandle, Error>;

    /// Resolve a user selector against the current device list.
    ///
    /// `None` means the host default. A selector matching nothing is
    /// [`Error::InvalidDevice`].
    fn resolve(&self, selector: Option<&DeviceSelector>) -> Result<Option<AudioDevice>, Error> {
        let Some(selector) = selector else {
            return Ok(None);
        };
        let devices = self.devices()?;
        selector
            .select(&devices)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::InvalidDevice(format!("no output matches {}", selector)))
    }
}

/// Output through the host's default cpal audio API.
///
/// cpal streams cannot move between threads, so each open stream lives on
/// its own owner thread until the [`OutputHandle`] is stopped or dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    /// Create a backend on the default host.
    pub fn new() -> Self {
        Self
    }

    fn find_device(host: &cpal::Host, wanted: Option<&AudioDevice>) -> Result<cpal::Device, Error> {
        let Some(wanted) = wanted else {
            return host
                .default_output_device()
                .ok_or_else(|| Error::Output("No output device available".to_string()));
        };
        let devices = host
            .output_devices()
            .map_err(|e| Error::Output(e.to_string()))?;
        for (index, device) in devices.enumerate() {
            if index == wanted.index && device.name().ok().as_deref() == Some(wanted.name.as_str()) {
                return Ok(device);
            }
        }
        Err(Error::InvalidDevice(format!(
            "output device #{} '{}' is gone",
            wanted.index, wanted.name
        )))
    }

    fn run_stream(
        device: Option<AudioDevice>,
        config: StreamConfig,
        mut render: RenderCallback,
        ready: crossbeam::channel::Sender<Result<(), Error>>,
        stop: Receiver<()>,
    ) {
        let host = cpal::default_host();
        let device = match Self::find_device(&host, device.as_ref()) {
            Ok(device) => device,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                let callback_instant = Instant::now();
                let ts = info.timestamp();
                let playback_delta = ts
                    .playback
                    .duration_since(&ts.callback)
                    .unwrap_or(Duration::ZERO);
                render(data, instant_to_monotonic_us(callback_instant + playback_delta));
            },
            |err| log::warn!("Audio output stream error: {}", err),
            None,
        );
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(Error::Output(e.to_string())));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = ready.send(Err(Error::Output(e.to_string())));
            return;
        }
        if ready.send(Ok(())).is_err() {
            return;
        }

        // Parked until stop is requested or the handle is dropped.
        let _ = stop.recv();
        drop(stream);
        log::debug!("Audio output stream closed");
    }
}

impl AudioBackend for CpalBackend {
    fn devices(&self) -> Result<Vec<AudioDevice>, Error> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let devices = host
            .output_devices()
            .map_err(|e| Error::Output(e.to_string()))?;

        Ok(devices
            .enumerate()
            .filter_map(|(index, device)| {
                let name = device.name().ok()?;
                Some(AudioDevice {
                    index,
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                })
            })
            .collect())
    }

    fn open(
        &self,
        device: Option<&AudioDevice>,
        format: &AudioFormat,
        render: RenderCallback,
    ) -> Result<OutputHandle, Error> {
        let config = StreamConfig {
            channels: u16::from(format.channels),
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let (ready_tx, ready_rx) = bounded::<Result<(), Error>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        // Never sent on; disconnects when the output thread exits.
        let (exited_tx, exited_rx) = bounded::<()>(0);
        let device = device.cloned();

        let handle = thread::Builder::new()
            .name("sendspin-output".to_string())
            .spawn(move || {
                let _exited = exited_tx;
                Self::run_stream(device, config, render, ready_tx, stop_rx)
            })
            .map_err(|e| Error::Output(e.to_string()))?;

        match wait_for_startup(&ready_rx, OPEN_TIMEOUT) {
            Startup::Ready => {}
            Startup::Failed(e) => {
                let _ = handle.join();
                return Err(e);
            }
            Startup::TimedOut => {
                // The thread gives up on its own once it sees nobody is waiting.
                drop(stop_tx);
                return Err(Error::Output(format!(
                    "audio output did not start within {:?}",
                    OPEN_TIMEOUT
                )));
            }
        }

        log::info!(
            "Audio output open: {}Hz, {} channels",
            format.sample_rate,
            format.channels
        );
        Ok(OutputHandle::new(move || {
            let _ = stop_tx.send(());
            if !release_thread(handle, &exited_rx, CLOSE_TIMEOUT) {
                log::warn!("Audio output thread did not stop within {:?}", CLOSE_TIMEOUT);
            }
        }))
    }
}

enum Startup {
    Ready,
    Failed(Error),
    TimedOut,
}

/// Wait for the output thread's ready report.
fn wait_for_startup(ready: &Receiver<Result<(), Error>>, timeout: Duration) -> Startup {
    match ready.recv_timeout(timeout) {
        Ok(Ok(())) => Startup::Ready,
        Ok(Err(e)) => Startup::Failed(e),
        Err(RecvTimeoutError::Timeout) => Startup::TimedOut,
        Err(RecvTimeoutError::Disconnected) => {
            Startup::Failed(Error::Output("audio output thread exited".to_string()))
        }
    }
}

/// Join `handle` once `exited` disconnects. Detaches the thread and returns
/// false if that takes longer than `timeout`.
fn release_thread(handle: thread::JoinHandle<()>, exited: &Receiver<()>, timeout: Duration) -> bool {
    if let Err(RecvTimeoutError::Timeout) = exited.recv_timeout(timeout) {
        return false;
    }
    let _ = handle.join();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<AudioDevice> {
        vec![
            AudioDevice {
                index: 0,
                name: "Built-in Output".to_string(),
                is_default: true,
            },
            AudioDevice {
                index: 1,
                name: "USB DAC".to_string(),
                is_default: false,
            },
        ]
    }

    #[test]
    fn test_select_by_index_and_prefix() {
        let devices = devices();
        assert_eq!(
            DeviceSelector::Index(1).select(&devices).map(|d| d.name.as_str()),
            Some("USB DAC")
        );
        assert_eq!(
            DeviceSelector::NamePrefix("Built".into())
                .select(&devices)
                .map(|d| d.index),
            Some(0)
        );
        assert!(DeviceSelector::Index(7).select(&devices).is_none());
    }

    #[test]
    fn test_handle_closes_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let handle = OutputHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.stop();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_startup_wait_is_bounded() {
        let (_ready_tx, ready_rx) = bounded::<Result<(), Error>>(1);
        let started = Instant::now();
        assert!(matches!(
            wait_for_startup(&ready_rx, Duration::from_millis(20)),
            Startup::TimedOut
        ));
        assert!(started.elapsed() < Duration::from_secs(1));

        let (ready_tx, ready_rx) = bounded::<Result<(), Error>>(1);
        drop(ready_tx);
        assert!(matches!(
            wait_for_startup(&ready_rx, Duration::from_secs(1)),
            Startup::Failed(Error::Output(_))
        ));
    }

    #[test]
    fn test_stuck_output_thread_is_detached() {
        let (exited_tx, exited_rx) = bounded::<()>(0);
        let (release_tx, release_rx) = bounded::<()>(0);
        let handle = thread::spawn(move || {
            let _exited = exited_tx;
            let _ = release_rx.recv();
        });

        let started = Instant::now();
        assert!(!release_thread(handle, &exited_rx, Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(release_tx);
    }

    #[test]
    fn test_finished_output_thread_is_joined() {
        let (exited_tx, exited_rx) = bounded::<()>(0);
        let handle = thread::spawn(move || drop(exited_tx));
        assert!(release_thread(handle, &exited_rx, Duration::from_secs(1)));
    }
}
