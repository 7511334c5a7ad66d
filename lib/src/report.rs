// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Formatting of the reported event stream.

use crate::events::EventBatch;
use crate::line::EdgeEvent;
use crate::Result;
use std::io::Write;

/// Formats batches of edge events as the reported stream.
///
/// One line per event:
///
/// ```text
/// <seqno>:<line_seqno> pin <offset> = <0|1> @ <timestamp_ns>[ +<delta_ns>]
/// ```
///
/// where the delta is measured from the previously reported event,
/// whichever line it arrived on, so the very first event carries none.
/// A blank line follows each batch to group events that arrived in the
/// same read.
#[derive(Debug, Default)]
pub struct Reporter {
    /// The timestamp of the most recently reported event.
    ///
    /// Unset until the first event is reported, never reset after.
    last_ns: Option<u64>,
}

impl Reporter {
    pub fn new() -> Reporter {
        Reporter::default()
    }

    /// Report all events in a freshly read batch, in delivery order,
    /// followed by the batch separator.
    pub fn emit<W: Write>(&mut self, batch: &EventBatch, out: &mut W) -> Result<()> {
        for event in batch {
            self.emit_event(event, out)?;
        }
        writeln!(out)?;
        Ok(())
    }

    fn emit_event<W: Write>(&mut self, event: &EdgeEvent, out: &mut W) -> Result<()> {
        write!(
            out,
            "{}:{} pin {} = {} @ {}",
            event.seqno,
            event.line_seqno,
            event.offset,
            event.kind.level(),
            event.timestamp_ns
        )?;
        if let Some(last_ns) = self.last_ns {
            // a realtime clock may step backwards
            write!(out, " +{}", event.timestamp_ns.saturating_sub(last_ns))?;
        }
        self.last_ns = Some(event.timestamp_ns);
        writeln!(out)?;
        Ok(())
    }
}
