// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A scripted controller double for exercising the monitor pipeline
//! without GPIO hardware.

use pinmon::cancel::CancelToken;
use pinmon::events::EventBatch;
use pinmon::line::{Config, EdgeEvent, EdgeKind, Offset};
use pinmon::monitor::{Controller, EventSource, Wait};
use pinmon::{Error, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// One scripted response from the source, consumed per wait.
#[derive(Debug)]
pub enum Step {
    /// Events become pending and the wait reports ready.
    Events(Vec<EdgeEvent>),

    /// The wait times out.
    TimeOut,

    /// The token is cancelled, as if by an external handler.
    Cancel,

    /// The wait fails.
    FailWait,

    /// The wait reports ready but the following read fails.
    FailRead,
}

/// The lifecycle operations the double has observed, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Op {
    Open,
    Request,
    Release,
    Close,
}

/// What the double saw happen, shared with the test.
#[derive(Debug, Default)]
pub struct Trace {
    pub order: Vec<Op>,
    pub releases: u32,
    pub closes: u32,
    pub chip: PathBuf,
    pub offsets: Vec<Offset>,
    pub consumer: String,
    pub kernel_event_buffer_size: u32,
}

impl Trace {
    /// The request was released exactly once, then the chip closed
    /// exactly once, in that order.
    pub fn assert_clean_teardown(&self) {
        assert_eq!(self.releases, 1);
        assert_eq!(self.closes, 1);
        let release = self.order.iter().position(|op| *op == Op::Release);
        let close = self.order.iter().position(|op| *op == Op::Close);
        assert!(release < close, "release must precede close: {:?}", self.order);
    }
}

#[derive(Debug)]
pub struct SimController {
    script: Option<VecDeque<Step>>,
    open_fails: bool,
    request_fails: bool,
    trace: Rc<RefCell<Trace>>,
}

impl SimController {
    pub fn new(script: Vec<Step>) -> (SimController, Rc<RefCell<Trace>>) {
        let trace = Rc::new(RefCell::new(Trace::default()));
        (
            SimController {
                script: Some(script.into()),
                open_fails: false,
                request_fails: false,
                trace: trace.clone(),
            },
            trace,
        )
    }

    pub fn failing_open() -> (SimController, Rc<RefCell<Trace>>) {
        let (mut ctrl, trace) = SimController::new(Vec::new());
        ctrl.open_fails = true;
        (ctrl, trace)
    }

    pub fn failing_request() -> (SimController, Rc<RefCell<Trace>>) {
        let (mut ctrl, trace) = SimController::new(Vec::new());
        ctrl.request_fails = true;
        (ctrl, trace)
    }
}

impl Controller for SimController {
    type Source = SimSource;

    fn open(&mut self, path: &Path) -> Result<()> {
        if self.open_fails {
            return Err(Error::Chip(
                path.to_path_buf(),
                io::Error::new(io::ErrorKind::NotFound, "no such device"),
            ));
        }
        let mut trace = self.trace.borrow_mut();
        trace.order.push(Op::Open);
        trace.chip = path.to_path_buf();
        Ok(())
    }

    fn request_lines(
        &mut self,
        config: &Config,
        consumer: &str,
        kernel_event_buffer_size: u32,
    ) -> Result<SimSource> {
        if self.request_fails {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "lines are busy",
            )));
        }
        let mut trace = self.trace.borrow_mut();
        trace.order.push(Op::Request);
        trace.offsets = config.offsets().to_vec();
        trace.consumer = consumer.into();
        trace.kernel_event_buffer_size = kernel_event_buffer_size;
        let script = self.script.take().unwrap_or_default();
        Ok(SimSource {
            script,
            pending: VecDeque::new(),
            read_fails: false,
            trace: self.trace.clone(),
        })
    }

    fn close(&mut self) {
        let mut trace = self.trace.borrow_mut();
        trace.order.push(Op::Close);
        trace.closes += 1;
    }
}

#[derive(Debug)]
pub struct SimSource {
    script: VecDeque<Step>,
    pending: VecDeque<EdgeEvent>,
    read_fails: bool,
    trace: Rc<RefCell<Trace>>,
}

impl EventSource for SimSource {
    fn wait(&mut self, _timeout: Option<Duration>, cancel: &CancelToken) -> Result<Wait> {
        if cancel.is_cancelled() {
            return Ok(Wait::Interrupted);
        }
        // events left over from a capacity bounded read
        if !self.pending.is_empty() {
            return Ok(Wait::Ready);
        }
        match self.script.pop_front() {
            None => Ok(Wait::Interrupted),
            Some(Step::Events(events)) => {
                self.pending.extend(events);
                Ok(Wait::Ready)
            }
            Some(Step::TimeOut) => Ok(Wait::TimedOut),
            Some(Step::Cancel) => {
                cancel.cancel();
                Ok(Wait::Interrupted)
            }
            Some(Step::FailWait) => Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "wait failed",
            ))),
            Some(Step::FailRead) => {
                self.read_fails = true;
                Ok(Wait::Ready)
            }
        }
    }

    fn read(&mut self, batch: &mut EventBatch) -> Result<usize> {
        if self.read_fails {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "read failed",
            )));
        }
        batch.clear();
        while let Some(event) = self.pending.pop_front() {
            if !batch.push(event) {
                unreachable!("batch is cleared and only filled to capacity");
            }
            if batch.len() == batch.capacity() {
                break;
            }
        }
        Ok(batch.len())
    }

    fn release(&mut self) {
        let mut trace = self.trace.borrow_mut();
        trace.order.push(Op::Release);
        trace.releases += 1;
    }
}

pub fn rising(seqno: u32, line_seqno: u32, offset: Offset, timestamp_ns: u64) -> EdgeEvent {
    EdgeEvent {
        timestamp_ns,
        kind: EdgeKind::Rising,
        offset,
        seqno,
        line_seqno,
    }
}

pub fn falling(seqno: u32, line_seqno: u32, offset: Offset, timestamp_ns: u64) -> EdgeEvent {
    EdgeEvent {
        kind: EdgeKind::Falling,
        ..rising(seqno, line_seqno, offset, timestamp_ns)
    }
}
