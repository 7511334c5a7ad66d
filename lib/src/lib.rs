// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A library for monitoring GPIO lines for edge events on Linux
//! platforms using the GPIO character device.
//!
//! The [`line`] module describes the settings applied to the monitored
//! lines, and the events they produce.
//!
//! The [`monitor`] module drives the acquisition pipeline: it requests
//! the lines from a [`Controller`], waits for edge events, reads them
//! in bounded batches and hands them to the [`report::Reporter`].
//! The wait is interruptible at any point by a [`CancelToken`].
//!
//! The [`cdev`] module provides the character device [`Controller`].
//! Any other implementation of the capability traits, such as a
//! scripted test double, can be substituted for it.
//!
//! [`Controller`]: monitor::Controller
//! [`CancelToken`]: cancel::CancelToken

use std::fmt;
use std::path::PathBuf;

pub mod cancel;
pub mod cdev;
pub mod events;
pub mod line;
pub mod monitor;
pub mod report;

use pinmon_uapi as uapi;

/// Errors returned by [`pinmon`] functions.
///
/// [`pinmon`]: crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested line settings or offsets are invalid.
    ///
    /// Detected before any hardware interaction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Problem accessing a GPIO chip character device.
    #[error("\"{0}\": {1}")]
    Chip(PathBuf, #[source] std::io::Error),

    /// An error returned from an underlying uAPI call.
    #[error("uAPI {0} returned: {1}")]
    Uapi(UapiCall, #[source] uapi::Error),

    /// An error writing to the report stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Identifiers for the underlying uAPI calls.
#[doc(hidden)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UapiCall {
    GetLine,
    LEEFromBuf,
    ReadEvent,
    WaitEvent,
}

impl fmt::Display for UapiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UapiCall::GetLine => "get_line",
            UapiCall::LEEFromBuf => "LineEdgeEvent::from_buf",
            UapiCall::ReadEvent => "read_event",
            UapiCall::WaitEvent => "wait_event",
        };
        write!(f, "{}", name)
    }
}

/// The result for [`pinmon`] functions.
///
/// [`pinmon`]: crate
pub type Result<T> = std::result::Result<T, Error>;
