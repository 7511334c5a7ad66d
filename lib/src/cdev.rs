// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The GPIO character device implementation of the controller
//! capability traits.

use crate::cancel::CancelToken;
use crate::events::EventBatch;
use crate::line::{Bias, Config, Direction, Drive, EdgeDetection, EventClock, Settings};
use crate::monitor::{Controller, EventSource, Wait};
use crate::{Error, Result, UapiCall};
use pinmon_uapi as uapi;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A GPIO character device controller.
///
/// Owns the chip file between [`open`] and [`close`]. Closing is
/// idempotent and, per the documented kernel layer ordering, must only
/// happen once any request taken from the chip has been released.
///
/// [`open`]: Controller::open
/// [`close`]: Controller::close
#[derive(Debug, Default)]
pub struct CdevController {
    chip: Option<File>,
    path: PathBuf,
}

impl CdevController {
    pub fn new() -> CdevController {
        Default::default()
    }
}

impl Controller for CdevController {
    type Source = CdevRequest;

    fn open(&mut self, path: &Path) -> Result<()> {
        let f = File::open(path).map_err(|e| Error::Chip(path.to_path_buf(), e))?;
        self.chip = Some(f);
        self.path = path.to_path_buf();
        Ok(())
    }

    fn request_lines(
        &mut self,
        config: &Config,
        consumer: &str,
        kernel_event_buffer_size: u32,
    ) -> Result<CdevRequest> {
        let cf = self.chip.as_ref().ok_or_else(|| {
            Error::Chip(
                self.path.clone(),
                std::io::Error::new(ErrorKind::NotConnected, "chip is not open"),
            )
        })?;
        let lr = to_uapi(config, consumer, kernel_event_buffer_size);
        let f = uapi::get_line(cf, lr).map_err(|e| Error::Uapi(UapiCall::GetLine, e))?;
        Ok(CdevRequest {
            f: Some(f),
            buf: Vec::new(),
        })
    }

    fn close(&mut self) {
        // dropping the File closes the chip fd
        self.chip.take();
    }
}

/// Translate the validated line configuration into a uAPI line request.
fn to_uapi(config: &Config, consumer: &str, kernel_event_buffer_size: u32) -> uapi::LineRequest {
    let offsets = config.offsets();
    let settings = config.settings();
    let mut lr = uapi::LineRequest {
        offsets: uapi::Offsets::from_slice(offsets),
        consumer: uapi::Name::from_bytes(consumer.as_bytes()),
        num_lines: offsets.len() as u32,
        event_buffer_size: kernel_event_buffer_size,
        ..Default::default()
    };
    lr.config.flags = flags(settings);
    if let Some(period) = settings.debounce_period {
        lr.config
            .add_debounce(debounce_us(period), line_mask(offsets.len()));
    }
    lr
}

/// The debounce period in microseconds, saturated to the field width.
fn debounce_us(period: Duration) -> u32 {
    u32::try_from(period.as_micros()).unwrap_or(u32::MAX)
}

/// The uAPI flags equivalent to the line settings.
fn flags(settings: &Settings) -> uapi::LineFlags {
    let mut flags = uapi::LineFlags::default();
    if settings.active_low {
        flags.set(uapi::LineFlags::ACTIVE_LOW, true);
    }
    match settings.bias {
        None => {}
        Some(Bias::PullUp) => flags.set(uapi::LineFlags::BIAS_PULL_UP, true),
        Some(Bias::PullDown) => flags.set(uapi::LineFlags::BIAS_PULL_DOWN, true),
        Some(Bias::Disabled) => flags.set(uapi::LineFlags::BIAS_DISABLED, true),
    };
    match settings.direction {
        Direction::Output => {
            flags.set(uapi::LineFlags::OUTPUT, true);
            match settings.drive {
                None | Some(Drive::PushPull) => {}
                Some(Drive::OpenDrain) => flags.set(uapi::LineFlags::OPEN_DRAIN, true),
                Some(Drive::OpenSource) => flags.set(uapi::LineFlags::OPEN_SOURCE, true),
            };
        }
        Direction::Input => {
            flags.set(uapi::LineFlags::INPUT, true);
            match settings.edge_detection {
                None => {}
                Some(EdgeDetection::RisingEdge) => flags.set(uapi::LineFlags::EDGE_RISING, true),
                Some(EdgeDetection::FallingEdge) => flags.set(uapi::LineFlags::EDGE_FALLING, true),
                Some(EdgeDetection::BothEdges) => flags.set(
                    uapi::LineFlags::EDGE_RISING | uapi::LineFlags::EDGE_FALLING,
                    true,
                ),
            };
            if settings.edge_detection.is_some() {
                match settings.event_clock {
                    None | Some(EventClock::Monotonic) => {}
                    Some(EventClock::Realtime) => {
                        flags.set(uapi::LineFlags::EVENT_CLOCK_REALTIME, true)
                    }
                };
            }
        }
    };
    flags
}

/// A bitmap selecting the first `n` requested lines.
fn line_mask(n: usize) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// An active character device line request.
///
/// Exclusively owns the request fd. [`release`] drops the fd and is
/// idempotent; any subsequent wait or read fails.
///
/// [`release`]: EventSource::release
#[derive(Debug)]
pub struct CdevRequest {
    f: Option<File>,

    /// The raw uAPI event buffer, sized on first read.
    buf: Vec<u64>,
}

fn released() -> Error {
    Error::Io(std::io::Error::new(
        ErrorKind::NotConnected,
        "request has been released",
    ))
}

impl EventSource for CdevRequest {
    fn wait(&mut self, timeout: Option<Duration>, cancel: &CancelToken) -> Result<Wait> {
        let f = self.f.as_ref().ok_or_else(released)?;
        if cancel.is_cancelled() {
            return Ok(Wait::Interrupted);
        }
        loop {
            match uapi::wait_event(f, Some(cancel.read_fd()), timeout) {
                Ok(uapi::Wait::Ready) => return Ok(Wait::Ready),
                Ok(uapi::Wait::TimedOut) => return Ok(Wait::TimedOut),
                Ok(uapi::Wait::Woken) => return Ok(Wait::Interrupted),
                Err(uapi::Error::Os(e)) if e.kind() == ErrorKind::Interrupted => {
                    if cancel.is_cancelled() {
                        return Ok(Wait::Interrupted);
                    }
                    // an unrelated signal - re-enter the wait
                }
                Err(e) => return Err(Error::Uapi(UapiCall::WaitEvent, e)),
            }
        }
    }

    fn read(&mut self, batch: &mut EventBatch) -> Result<usize> {
        let esize = uapi::LineEdgeEvent::u64_size();
        let needed = batch.capacity() * esize;
        if self.buf.len() != needed {
            self.buf.resize(needed, 0);
        }
        // borrow only the fd field, leaving the buffer free to lend out
        let f = self.f.as_ref().ok_or_else(released)?;
        let n = uapi::read_event(f, &mut self.buf)
            .map_err(|e| Error::Uapi(UapiCall::ReadEvent, e))?;
        batch.clear();
        for d in self.buf[..n].chunks(esize) {
            let le = uapi::LineEdgeEvent::from_slice(d)
                .map_err(|e| Error::Uapi(UapiCall::LEEFromBuf, e))?;
            batch.push(le.into());
        }
        Ok(batch.len())
    }

    fn release(&mut self) {
        // dropping the File closes the request fd
        self.f.take();
    }
}
