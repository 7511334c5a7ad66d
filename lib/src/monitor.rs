// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The edge event acquisition pipeline.
//!
//! [`run`] drives a [`Controller`] through the monitoring lifecycle:
//! build the line configuration, open the chip and request the lines,
//! then repeatedly wait for edge events, read them in bounded batches
//! and report them until cancelled or a fatal error occurs. Teardown
//! runs on every exit path - the request is released and then the chip
//! closed, each exactly once.

use crate::cancel::CancelToken;
use crate::events::EventBatch;
use crate::line::{Config, Offset, Settings};
use crate::report::Reporter;
use crate::Result;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// The outcome of one wait for edge events.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wait {
    /// At least one event is ready to be read.
    Ready,

    /// The wait timeout expired with no event available.
    TimedOut,

    /// The cancellation token fired while waiting.
    ///
    /// This is the normal shutdown trigger, never an error.
    Interrupted,
}

/// An active request delivering edge events.
///
/// The character device implementation is [`CdevRequest`]; tests
/// substitute a scripted double.
///
/// [`CdevRequest`]: crate::cdev::CdevRequest
pub trait EventSource {
    /// Wait until an event is ready, the timeout expires, or the token
    /// is cancelled.
    ///
    /// A `None` timeout blocks indefinitely and `Duration::ZERO` is a
    /// non-blocking poll. The wait must observe cancellation promptly,
    /// even while blocked.
    fn wait(&mut self, timeout: Option<Duration>, cancel: &CancelToken) -> Result<Wait>;

    /// Destructively read all pending events, up to the batch capacity.
    ///
    /// Refills `batch` from position zero - events retained from a
    /// previous read are dropped. Only valid immediately after `wait`
    /// returned [`Wait::Ready`]. Returns the number of events read.
    fn read(&mut self, batch: &mut EventBatch) -> Result<usize>;

    /// Release the request.
    ///
    /// Idempotent - the second and subsequent calls are no-ops.
    fn release(&mut self);
}

/// The capability surface of a GPIO controller.
pub trait Controller {
    type Source: EventSource;

    /// Open the controller device at `path`.
    fn open(&mut self, path: &Path) -> Result<()>;

    /// Request the configured lines from the open controller.
    ///
    /// The consumer label is applied to the requested lines and may be
    /// silently truncated if too long - truncation never fails the
    /// request.
    fn request_lines(
        &mut self,
        config: &Config,
        consumer: &str,
        kernel_event_buffer_size: u32,
    ) -> Result<Self::Source>;

    /// Close the controller device.
    ///
    /// Idempotent, and must only be called once any request taken from
    /// the controller has been released.
    fn close(&mut self);
}

/// The monitoring session configuration, fixed at startup.
#[derive(Clone, Debug)]
pub struct Options {
    /// The offsets of the lines to monitor.
    pub offsets: Vec<Offset>,

    /// The settings applied to all monitored lines.
    pub settings: Settings,

    /// The consumer label applied to the requested lines.
    pub consumer: String,

    /// The maximum number of events returned by a single read.
    pub max_events: usize,

    /// A hint for the size of the kernel event buffer, or zero for the
    /// kernel default.
    pub kernel_event_buffer_size: u32,

    /// The wait timeout policy - `None` blocks indefinitely.
    pub wait_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            offsets: Vec::new(),
            settings: Settings::default(),
            consumer: "pinmon".into(),
            max_events: 32,
            kernel_event_buffer_size: 0,
            wait_timeout: None,
        }
    }
}

/// Monitor the configured lines until cancelled or a fatal error occurs.
///
/// One record is written to `out` per event, and a blank line after
/// each batch, in the format described by [`Reporter`].
///
/// Cancellation is a normal shutdown and returns `Ok`; configuration,
/// request and I/O failures are fatal and return the error. In either
/// case everything acquired has been released before returning, with
/// the request released before the chip is closed.
pub fn run<C, W>(
    ctrl: &mut C,
    chip: &Path,
    opts: &Options,
    cancel: &CancelToken,
    out: &mut W,
) -> Result<()>
where
    C: Controller,
    W: Write,
{
    let res = acquire_and_monitor(ctrl, chip, opts, cancel, out);
    ctrl.close();
    res
}

fn acquire_and_monitor<C, W>(
    ctrl: &mut C,
    chip: &Path,
    opts: &Options,
    cancel: &CancelToken,
    out: &mut W,
) -> Result<()>
where
    C: Controller,
    W: Write,
{
    // config is transient - consumed by the request and then dropped
    let config = Config::build(&opts.offsets, opts.settings.clone())?;
    ctrl.open(chip)?;
    let mut src = ctrl.request_lines(&config, &opts.consumer, opts.kernel_event_buffer_size)?;
    drop(config);
    let res = monitor(&mut src, opts, cancel, out);
    src.release();
    res
}

fn monitor<S, W>(src: &mut S, opts: &Options, cancel: &CancelToken, out: &mut W) -> Result<()>
where
    S: EventSource,
    W: Write,
{
    let mut batch = EventBatch::new(opts.max_events);
    let mut reporter = Reporter::new();
    loop {
        match src.wait(opts.wait_timeout, cancel)? {
            Wait::TimedOut => continue,
            Wait::Interrupted => return Ok(()),
            Wait::Ready => {
                src.read(&mut batch)?;
                reporter.emit(&batch, out)?;
                out.flush()?;
            }
        }
    }
}
