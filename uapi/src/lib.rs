// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A thin but safe Rust layer around the subset of the Linux GPIO
//! character device uAPI (v2) required to request input lines and read
//! edge events from them.

use bitflags::bitflags;
use libc::{c_long, pollfd, ppoll, sigset_t, time_t, timespec, POLLIN};
use std::ffi::OsStr;
use std::fs::File;
use std::io::Error as IoError;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::ptr::null;
use std::slice;
use std::str::FromStr;
use std::time::Duration;

pub(crate) const IOCTL_MAGIC: u8 = 0xb4;

#[repr(u8)]
enum Ioctl {
    GetLine = 7,
}

macro_rules! iorw {
    ($nr:expr, $ty:ty) => {
        ioctl_sys::iorw!(IOCTL_MAGIC, $nr as u8, std::mem::size_of::<$ty>()) as libc::c_ulong
    };
}

/// The result returned by [`pinmon_uapi`] functions.
///
/// [`pinmon_uapi`]: crate
pub type Result<T> = std::result::Result<T, Error>;

/// Result returned by struct validators.
pub type ValidationResult = std::result::Result<(), ValidationError>;

/// Errors returned by [`pinmon_uapi`] functions.
///
/// [`pinmon_uapi`]: crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error returned from an underlying system call.
    #[error(transparent)]
    Os(#[from] std::io::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UnderRead(#[from] UnderReadError),
}

/// A failure to validate a struct returned from a system call.
//
// Should only be seen if a kernel update adds an enum value we are unaware of.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error("Kernel returned invalid {field}: {msg}")]
pub struct ValidationError {
    pub field: String,
    pub msg: String,
}

impl ValidationError {
    pub fn new<S: Into<String>, T: Into<String>>(field: S, msg: T) -> ValidationError {
        ValidationError {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

/// The kernel returned fewer bytes than required for a complete struct.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error("Read {actual} bytes for a {obj}, expected {expected}")]
pub struct UnderReadError {
    pub obj: &'static str,
    pub expected: usize,
    pub actual: usize,
}

impl UnderReadError {
    pub fn new(obj: &'static str, expected: usize, actual: usize) -> UnderReadError {
        UnderReadError {
            obj,
            expected,
            actual,
        }
    }
}

/// The maximum number of bytes stored in a Name.
pub const NAME_MAX: usize = 32;

/// A uAPI name string, as used for consumer labels.
///
/// Construction from `&str` silently truncates to the storage size,
/// so attaching an overly long consumer label can never fail.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Name([u8; NAME_MAX]);

impl Name {
    /// Checks whether the Name is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// The length of the contained name.
    #[inline]
    pub fn strlen(&self) -> usize {
        self.0.iter().position(|&x| x == 0).unwrap_or(self.0.len())
    }

    /// Convert the contained name to an OsStr slice.
    pub fn as_os_str(&self) -> &OsStr {
        unsafe { OsStr::from_bytes(slice::from_raw_parts(&self.0[0], self.strlen())) }
    }

    /// Construct a Name from a byte slice, truncating to fit.
    ///
    /// May result in invalid UTF-8 if truncated in the middle of a
    /// multi-byte character.
    pub fn from_bytes(s: &[u8]) -> Name {
        let mut n: Name = Default::default();
        // leave the final byte as the NUL terminator
        for (src, dst) in s.iter().zip(n.0[..NAME_MAX - 1].iter_mut()) {
            *dst = *src;
        }
        n
    }
}

impl FromStr for Name {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Name::from_bytes(s.as_bytes()))
    }
}

/// An identifier for a line on a particular chip.
pub type Offset = u32;

/// The maximum number of lines that may be requested in a single request.
pub const LINES_MAX: usize = 64;

/// A collection of line offsets.
///
/// Identifies the lines belonging to a particular request.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Offsets([Offset; LINES_MAX]);

impl Offsets {
    /// Create offsets from an iterable list.
    pub fn from_slice(s: &[u32]) -> Self {
        let mut n: Offsets = Default::default();
        for (src, dst) in s.iter().zip(n.0.iter_mut()) {
            *dst = *src;
        }
        n
    }

    /// Get the indexed offset from the set.
    #[inline]
    pub fn get(&self, idx: usize) -> Offset {
        self.0[idx]
    }
}

impl Default for Offsets {
    fn default() -> Self {
        Offsets([0; LINES_MAX])
    }
}

/// Space reserved for future use.
///
/// Sized in multiples of u32 words.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[doc(hidden)]
pub struct Padding<const SIZE: usize>([u32; SIZE]);

impl<const SIZE: usize> Default for Padding<SIZE> {
    fn default() -> Self {
        Padding([0; SIZE])
    }
}

impl<const SIZE: usize> Padding<SIZE> {
    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|x| *x == 0)
    }
}

bitflags! {
    /// Flags indicating the configuration of a line.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct LineFlags: u64 {
        /// The line is in use and is not available for request.
        const USED = 1;

        /// The line active state corresponds to a physical low.
        const ACTIVE_LOW = 2;

        /// The line is an input.
        const INPUT = 4;

        /// The line is an output.
        const OUTPUT = 8;

        /// The line detects rising (inactive to active) edges.
        const EDGE_RISING = 16;

        /// The line detects falling (active to inactive) edges.
        const EDGE_FALLING = 32;

        /// The line is an open drain output.
        const OPEN_DRAIN = 64;

        /// The line is an open source output.
        const OPEN_SOURCE = 128;

        /// The line has pull-up bias enabled.
        const BIAS_PULL_UP = 256;

        /// The line has pull-down bias enabled.
        const BIAS_PULL_DOWN = 512;

        /// The line has bias disabled.
        const BIAS_DISABLED = 1024;

        /// The line events contain CLOCK_REALTIME timestamps.
        const EVENT_CLOCK_REALTIME = 2048;
    }
}

/// The maximum number of attributes for one line request.
pub const NUM_ATTRS_MAX: usize = 10;

/// The kinds of attribute that can be associated with a line.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineAttributeKind {
    /// The attribute contains line flags.
    Flags = 1,

    /// The attribute contains output values.
    Values = 2,

    /// The attribute contains a debounce period.
    Debounce = 3,
}

#[repr(C)]
#[derive(Clone, Copy)]
union LineAttributeValueUnion {
    flags: u64,
    values: u64,
    debounce_period_us: u32,
}

impl Default for LineAttributeValueUnion {
    fn default() -> Self {
        LineAttributeValueUnion { flags: 0 }
    }
}

/// A configurable attribute of a line.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct LineAttribute {
    kind: u32,
    padding: Padding<1>,
    value: LineAttributeValueUnion,
}

impl LineAttribute {
    /// Set the attribute to a debounce period, in microseconds.
    pub fn set_debounce_period_us(&mut self, debounce_period_us: u32) {
        self.kind = LineAttributeKind::Debounce as u32;
        self.value = LineAttributeValueUnion { debounce_period_us };
    }

    /// Set the attribute to a set of line flags.
    pub fn set_flags(&mut self, flags: LineFlags) {
        self.kind = LineAttributeKind::Flags as u32;
        self.value = LineAttributeValueUnion {
            flags: flags.bits(),
        };
    }
}

/// A configuration attribute associated with a subset of requested lines.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct LineConfigAttribute {
    /// The attribute to be applied.
    pub attr: LineAttribute,

    /// A bitmap identifying the requested lines, by index, to which the
    /// attribute applies.
    pub mask: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[doc(hidden)]
pub struct LineConfigAttributes([LineConfigAttribute; NUM_ATTRS_MAX]);

impl Default for LineConfigAttributes {
    fn default() -> Self {
        LineConfigAttributes([Default::default(); NUM_ATTRS_MAX])
    }
}

/// The configuration to be applied to a line request.
#[repr(C)]
#[derive(Clone, Default)]
pub struct LineConfig {
    /// The flags applied to all requested lines, unless overridden by
    /// an attribute.
    pub flags: LineFlags,

    /// The number of attributes in use.
    pub num_attrs: u32,

    /// Reserved for future use and must be zero filled.
    #[doc(hidden)]
    pub padding: Padding<5>,

    attrs: LineConfigAttributes,
}

impl LineConfig {
    /// Add a debounce period attribute for the lines identified by mask.
    ///
    /// Silently ignored if the attribute slots are exhausted.
    pub fn add_debounce(&mut self, period_us: u32, mask: u64) {
        if let Some(lca) = self.attrs.0.get_mut(self.num_attrs as usize) {
            lca.attr.set_debounce_period_us(period_us);
            lca.mask = mask;
            self.num_attrs += 1;
        }
    }

    /// Add a flags attribute for the lines identified by mask.
    pub fn add_flags(&mut self, flags: LineFlags, mask: u64) {
        if let Some(lca) = self.attrs.0.get_mut(self.num_attrs as usize) {
            lca.attr.set_flags(flags);
            lca.mask = mask;
            self.num_attrs += 1;
        }
    }
}

/// Information about a request for GPIO lines.
#[repr(C)]
#[derive(Clone, Default)]
pub struct LineRequest {
    /// An array of requested lines, identified by offset on the associated
    /// GPIO chip.
    pub offsets: Offsets,

    /// The requested consumer label for the selected GPIO lines.
    pub consumer: Name,

    /// The requested configuration for the lines.
    pub config: LineConfig,

    /// The number of lines requested in this request.
    /// i.e. the number of valid elements in `offsets`.
    pub num_lines: u32,

    /// A suggested minimum number of line events that the kernel should buffer.
    ///
    /// Note that this is only a suggested value and the kernel may allocate a
    /// larger buffer or cap the size of the buffer.
    /// If this field is zero then the buffer size defaults to a minimum of
    /// `num_lines*16`.
    pub event_buffer_size: u32,

    /// Reserved for future use and must be zero filled.
    #[doc(hidden)]
    pub padding: Padding<5>,

    /// This field is only present for the underlying ioctl call and is only
    /// used internally.
    #[doc(hidden)]
    pub fd: i32,
}

/// Request a line or set of lines for exclusive access.
///
/// * `cf` - The open gpiochip device file.
/// * `lr` - The line request.
#[inline]
pub fn get_line(cf: &File, mut lr: LineRequest) -> Result<File> {
    // SAFETY: lr is consumed and the returned file is drawn from the returned fd.
    unsafe {
        match libc::ioctl(cf.as_raw_fd(), iorw!(Ioctl::GetLine, LineRequest), &mut lr) {
            0 => Ok(File::from_raw_fd(lr.fd)),
            _ => Err(Error::from(IoError::last_os_error())),
        }
    }
}

/// The trigger identifier for a [`LineEdgeEvent`].
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineEdgeEventKind {
    /// Indicates the line transitioned from *inactive* to *active*.
    RisingEdge = 1,

    /// Indicates the line transitioned from *active* to *inactive*.
    FallingEdge = 2,
}

impl TryFrom<u32> for LineEdgeEventKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use LineEdgeEventKind::*;
        match v {
            x if x == RisingEdge as u32 => Ok(RisingEdge),
            x if x == FallingEdge as u32 => Ok(FallingEdge),
            _ => Err(format!("invalid value: {}", v)),
        }
    }
}

impl LineEdgeEventKind {
    /// Confirm that the value read from the kernel is valid in Rust.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        LineEdgeEventKind::try_from(*self as u32).map(|_i| ())
    }
}

/// Information about an edge event on a requested line.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineEdgeEvent {
    /// The best estimate of time of event occurrence, in nanoseconds.
    ///
    /// By default the timestamp is read from **CLOCK_MONOTONIC**.
    /// If the [`LineFlags::EVENT_CLOCK_REALTIME`] flag is set then the
    /// timestamp is read from **CLOCK_REALTIME**.
    pub timestamp_ns: u64,

    /// The event trigger identifier.
    pub kind: LineEdgeEventKind,

    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The sequence number for this event in the sequence of events for all
    /// the lines in this line request.
    pub seqno: u32,

    /// The sequence number for this event in the sequence of events on this
    /// particular line.
    pub line_seqno: u32,

    /// Reserved for future use.
    #[doc(hidden)]
    pub padding: Padding<6>,
}

impl LineEdgeEvent {
    /// Read an edge event from a buffer.
    ///
    /// The buffer is assumed to have been populated by a read of the line
    /// request File, so the content is validated before being returned.
    #[inline]
    pub fn from_slice(d: &[u64]) -> Result<&LineEdgeEvent> {
        debug_assert!(std::mem::size_of::<LineEdgeEvent>() % 8 == 0);
        let len = d.len() * 8;
        if len < std::mem::size_of::<LineEdgeEvent>() {
            return Err(Error::from(UnderReadError::new(
                "LineEdgeEvent",
                std::mem::size_of::<LineEdgeEvent>(),
                len,
            )));
        }
        // SAFETY: returned struct is explicitly validated before being returned.
        let le = unsafe { &*(d as *const [u64] as *const LineEdgeEvent) };
        le.validate().map(|_| le).map_err(Error::from)
    }

    fn validate(&self) -> ValidationResult {
        self.kind
            .validate()
            .map_err(|e| ValidationError::new("kind", e))
    }

    /// The number of u64 words required to store a LineEdgeEvent.
    pub fn u64_size() -> usize {
        std::mem::size_of::<LineEdgeEvent>() / 8
    }
}

/// Read edge events from a line request file into a buffer.
///
/// Each call overwrites the buffer from the beginning - it is never an
/// append. Blocks if no event is available, so check with [`wait_event`]
/// first to avoid blocking.
///
/// The slice is u64 to satisfy alignment requirements on 32bit platforms.
///
/// Returns the number of u64 words read.
pub fn read_event(f: &File, buf: &mut [u64]) -> Result<usize> {
    // SAFETY: buf is a valid preallocated u64 slice, so is 64bit aligned.
    unsafe {
        let bufptr: *mut libc::c_void = std::ptr::addr_of_mut!(buf[0]).cast();
        match libc::read(f.as_raw_fd(), bufptr, buf.len() * 8) {
            -1 => Err(Error::from(IoError::last_os_error())),
            x => Ok(x as usize / 8),
        }
    }
}

/// The outcome of waiting on a line request file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wait {
    /// The file has an event available to read.
    Ready,

    /// The timeout expired with no event available.
    TimedOut,

    /// The wake fd became readable before any event arrived.
    Woken,
}

/// Check if the file has an event available to read.
pub fn has_event(f: &File) -> Result<bool> {
    wait_event(f, None, Some(Duration::ZERO)).map(|w| w == Wait::Ready)
}

/// Wait for the file to have an event available to read.
///
/// * `f` - The line request file.
/// * `wake` - An optional fd that interrupts the wait when it becomes
///   readable, e.g. the read end of a self-pipe written by a signal
///   handler.
/// * `timeout` - The maximum time to wait, `Duration::ZERO` for a
///   non-blocking poll, or `None` to block indefinitely.
pub fn wait_event(f: &File, wake: Option<RawFd>, timeout: Option<Duration>) -> Result<Wait> {
    let mut pfds = [
        pollfd {
            fd: f.as_raw_fd(),
            events: POLLIN,
            revents: 0,
        },
        pollfd {
            fd: wake.unwrap_or(-1),
            events: POLLIN,
            revents: 0,
        },
    ];
    let ts;
    let tsptr = match timeout {
        Some(d) => {
            ts = timespec {
                tv_sec: d.as_secs() as time_t,
                tv_nsec: d.subsec_nanos() as c_long,
            };
            std::ptr::addr_of!(ts)
        }
        None => null(),
    };
    // SAFETY: pfds outlives the call and the kernel only mutates revents.
    unsafe {
        match ppoll(
            std::ptr::addr_of_mut!(pfds[0]),
            pfds.len() as libc::nfds_t,
            tsptr,
            null() as *const sigset_t,
        ) {
            -1 => Err(Error::from(IoError::last_os_error())),
            0 => Ok(Wait::TimedOut),
            _ => {
                if pfds[1].revents & POLLIN != 0 {
                    Ok(Wait::Woken)
                } else {
                    Ok(Wait::Ready)
                }
            }
        }
    }
}
