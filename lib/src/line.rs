// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Types describing the monitored lines and the events they produce.

use crate::{Error, Result};
use pinmon_uapi as uapi;
use std::time::Duration;

/// An identifier for a line on a particular chip.
pub type Offset = u32;

/// The direction of a line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    /// The line is an input.
    #[default]
    Input,

    /// The line is an output.
    Output,
}

/// The bias settings for a line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Bias {
    /// The line has pull-up enabled.
    PullUp,

    /// The line has pull-down enabled.
    PullDown,

    /// The line has bias disabled and will float unless externally driven.
    Disabled,
}

/// The drive policy settings for an output line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Drive {
    /// The line is driven when both active and inactive.
    #[default]
    PushPull,

    /// The line is driven when low and set high impedance when high.
    OpenDrain,

    /// The line is driven when high and set high impedance when low.
    OpenSource,
}

/// The edge detection options for an input line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeDetection {
    /// Edge detection is only enabled on rising edges.
    ///
    /// A rising edge means a transition from an inactive state to an
    /// active state.
    RisingEdge,

    /// Edge detection is only enabled on falling edges.
    ///
    /// A falling edge means a transition from an active state to an
    /// inactive state.
    FallingEdge,

    /// Edge detection is enabled on both rising and falling edges.
    BothEdges,
}

/// The available clock sources for edge event timestamps.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EventClock {
    /// The **CLOCK_MONOTONIC** clock source.
    #[default]
    Monotonic,

    /// The **CLOCK_REALTIME** clock source.
    Realtime,
}

/// The configuration settings for a single line.
///
/// Immutable once attached to a [`Config`].
//
// Note it does not contain the offset to allow it to be applied to
// multiple lines.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Settings {
    /// The direction setting for the line.
    pub direction: Direction,

    /// The active low setting for the line.
    pub active_low: bool,

    /// The bias setting for the line.
    pub bias: Option<Bias>,

    /// The drive setting for the line.
    ///
    /// Only relevant for output lines.
    pub drive: Option<Drive>,

    /// The edge detection setting for the line.
    ///
    /// Only relevant for input lines.
    pub edge_detection: Option<EdgeDetection>,

    /// The source clock for edge event timestamps.
    ///
    /// Only relevant for input lines with edge detection enabled.
    pub event_clock: Option<EventClock>,

    /// The debounce period.
    ///
    /// Setting the debounce period filters edges occurring at a rate
    /// faster than that period.
    ///
    /// Only relevant for input lines with edge detection enabled.
    pub debounce_period: Option<Duration>,
}

impl Settings {
    fn validate(&self) -> Result<()> {
        match self.direction {
            Direction::Input => {
                if self.drive.is_some() {
                    return Err(Error::Config(
                        "drive requires the line to be an output".into(),
                    ));
                }
            }
            Direction::Output => {
                if self.edge_detection.is_some() {
                    return Err(Error::Config(
                        "edge detection requires the line to be an input".into(),
                    ));
                }
                if self.debounce_period.is_some() {
                    return Err(Error::Config(
                        "debounce requires the line to be an input".into(),
                    ));
                }
                if self.event_clock.is_some() {
                    return Err(Error::Config(
                        "event clock requires the line to be an input".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The validated configuration for a request - an ordered set of line
/// offsets and the settings applied to them.
///
/// Built once, consumed by the request operation, then discardable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    offsets: Vec<Offset>,
    settings: Settings,
}

impl Config {
    /// Build a configuration applying `settings` to each of `offsets`.
    ///
    /// The offsets must be non-empty and unique, and the settings must
    /// be consistent with the line direction.
    pub fn build(offsets: &[Offset], settings: Settings) -> Result<Config> {
        if offsets.is_empty() {
            return Err(Error::Config("no lines specified".into()));
        }
        if offsets.len() > uapi::LINES_MAX {
            return Err(Error::Config(format!(
                "requested {} lines but the maximum is {}",
                offsets.len(),
                uapi::LINES_MAX
            )));
        }
        for (idx, offset) in offsets.iter().enumerate() {
            if offsets[..idx].contains(offset) {
                return Err(Error::Config(format!("duplicate line offset {}", offset)));
            }
        }
        settings.validate()?;
        Ok(Config {
            offsets: offsets.to_vec(),
            settings,
        })
    }

    /// The offsets of the configured lines, in the order provided to
    /// [`build`](Config::build).
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// The settings applied to all configured lines.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// The cause of an [`EdgeEvent`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    /// Indicates the line transitioned from inactive to active.
    Rising = 1,

    /// Indicates the line transitioned from active to inactive.
    Falling = 2,
}

impl EdgeKind {
    /// The resolved line level implied by the edge, 1 for rising and
    /// 0 for falling.
    pub fn level(&self) -> u8 {
        match self {
            EdgeKind::Rising => 1,
            EdgeKind::Falling => 0,
        }
    }
}

impl From<uapi::LineEdgeEventKind> for EdgeKind {
    fn from(kind: uapi::LineEdgeEventKind) -> Self {
        match kind {
            uapi::LineEdgeEventKind::RisingEdge => EdgeKind::Rising,
            uapi::LineEdgeEventKind::FallingEdge => EdgeKind::Falling,
        }
    }
}

/// The details of an edge detected on an input line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeEvent {
    /// The best estimate of time of event occurrence, in nanoseconds,
    /// from the configured [`EventClock`].
    pub timestamp_ns: u64,

    /// The event trigger identifier.
    pub kind: EdgeKind,

    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The sequence number for this event in the sequence of events for
    /// all the lines in this request.
    pub seqno: u32,

    /// The sequence number for this event in the sequence of events on
    /// this particular line.
    pub line_seqno: u32,
}

impl From<&uapi::LineEdgeEvent> for EdgeEvent {
    fn from(le: &uapi::LineEdgeEvent) -> Self {
        EdgeEvent {
            timestamp_ns: le.timestamp_ns,
            kind: le.kind.into(),
            offset: le.offset,
            seqno: le.seqno,
            line_seqno: le.line_seqno,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_settings() -> Settings {
        Settings {
            edge_detection: Some(EdgeDetection::BothEdges),
            bias: Some(Bias::PullUp),
            debounce_period: Some(Duration::from_millis(1)),
            ..Default::default()
        }
    }

    #[test]
    fn build() {
        let cfg = Config::build(&[23, 24], input_settings()).unwrap();
        assert_eq!(cfg.offsets(), &[23, 24]);
        assert_eq!(
            cfg.settings().edge_detection,
            Some(EdgeDetection::BothEdges)
        );
    }

    #[test]
    fn build_no_lines() {
        let err = Config::build(&[], input_settings()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_duplicate_offset() {
        let err = Config::build(&[23, 24, 23], input_settings()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_too_many_lines() {
        let offsets: Vec<Offset> = (0..65).collect();
        let err = Config::build(&offsets, input_settings()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_edge_detection_on_output() {
        let settings = Settings {
            direction: Direction::Output,
            edge_detection: Some(EdgeDetection::BothEdges),
            ..Default::default()
        };
        let err = Config::build(&[23], settings).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_debounce_on_output() {
        let settings = Settings {
            direction: Direction::Output,
            debounce_period: Some(Duration::from_millis(1)),
            ..Default::default()
        };
        assert!(Config::build(&[23], settings).is_err());
    }

    #[test]
    fn build_drive_on_input() {
        let settings = Settings {
            drive: Some(Drive::OpenDrain),
            ..Default::default()
        };
        assert!(Config::build(&[23], settings).is_err());
    }

    #[test]
    fn edge_kind_level() {
        assert_eq!(EdgeKind::Rising.level(), 1);
        assert_eq!(EdgeKind::Falling.level(), 0);
    }
}
