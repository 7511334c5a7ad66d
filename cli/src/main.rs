// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A command line tool reporting edge events on GPIO lines.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pinmon::cancel::CancelToken;
use pinmon::cdev::CdevController;
use pinmon::line::{Offset, Settings};
use pinmon::monitor::{self, Options};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    match Opts::try_parse() {
        Ok(opts) => match do_cmd(&opts) {
            Ok(()) => return ExitCode::SUCCESS,
            Err(e) => eprintln!("pinmon: {:#}", e),
        },
        Err(e) => eprintln!("{e}"),
    }
    ExitCode::FAILURE
}

#[derive(Debug, Parser)]
#[command(
    name = "pinmon",
    about = "Report edge events on GPIO lines.",
    version
)]
struct Opts {
    /// The offsets of the lines to monitor
    #[arg(value_name = "offset", required = true)]
    lines: Vec<Offset>,

    /// The path of the GPIO character device containing the lines
    #[arg(short, long, value_name = "chip", default_value = "/dev/gpiochip0")]
    chip: PathBuf,

    /// The debounce period for the monitored lines
    ///
    /// The period is taken as milliseconds unless otherwise specified.
    /// A zero period disables debouncing.
    #[arg(
        short = 'p',
        long,
        value_name = "period",
        value_parser = parse_duration,
        default_value = "1ms"
    )]
    debounce_period: Duration,

    /// The edges to detect
    #[arg(short, long, value_name = "edges", value_enum, default_value = "both")]
    edges: Edges,

    /// The bias applied to the monitored lines
    #[arg(short, long, value_name = "bias", value_enum, default_value = "pull-up")]
    bias: Bias,

    /// Treat the monitored lines as active low
    #[arg(short = 'l', long)]
    active_low: bool,

    /// The source clock for event timestamps
    #[arg(
        short = 'E',
        long,
        value_name = "clock",
        value_enum,
        default_value = "monotonic"
    )]
    event_clock: EventClock,

    /// The maximum number of events read in one batch
    #[arg(short = 'n', long, value_name = "num", default_value_t = 32)]
    max_events: usize,

    /// A hint for the size of the kernel event buffer, 0 for the kernel default
    #[arg(long, value_name = "num", default_value_t = 0)]
    event_buffer_size: u32,

    /// The consumer label applied to the requested lines
    #[arg(short = 'C', long, value_name = "name", default_value = "pinmon")]
    consumer: String,

    /// The maximum time to block in each wait for events
    ///
    /// The period is taken as milliseconds unless otherwise specified.
    /// If not specified then waits block indefinitely.
    #[arg(long, value_name = "period", value_parser = parse_duration)]
    wait_timeout: Option<Duration>,

    /// Don't display the startup banner
    #[arg(short, long)]
    quiet: bool,
}

impl Opts {
    fn settings(&self) -> Settings {
        Settings {
            active_low: self.active_low,
            bias: self.bias.into(),
            edge_detection: Some(self.edges.into()),
            event_clock: Some(self.event_clock.into()),
            debounce_period: if self.debounce_period.is_zero() {
                None
            } else {
                Some(self.debounce_period)
            },
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Edges {
    Rising,
    Falling,
    Both,
}
impl From<Edges> for pinmon::line::EdgeDetection {
    fn from(e: Edges) -> Self {
        match e {
            Edges::Rising => pinmon::line::EdgeDetection::RisingEdge,
            Edges::Falling => pinmon::line::EdgeDetection::FallingEdge,
            Edges::Both => pinmon::line::EdgeDetection::BothEdges,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Bias {
    PullUp,
    PullDown,
    Disabled,
    AsIs,
}
impl From<Bias> for Option<pinmon::line::Bias> {
    fn from(b: Bias) -> Self {
        match b {
            Bias::PullUp => Some(pinmon::line::Bias::PullUp),
            Bias::PullDown => Some(pinmon::line::Bias::PullDown),
            Bias::Disabled => Some(pinmon::line::Bias::Disabled),
            Bias::AsIs => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum EventClock {
    Monotonic,
    Realtime,
}
impl From<EventClock> for pinmon::line::EventClock {
    fn from(c: EventClock) -> Self {
        match c {
            EventClock::Monotonic => pinmon::line::EventClock::Monotonic,
            EventClock::Realtime => pinmon::line::EventClock::Realtime,
        }
    }
}

fn do_cmd(opts: &Opts) -> anyhow::Result<()> {
    let cancel = CancelToken::new().context("failed to create the cancellation token")?;
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel())
        .context("failed to install the interrupt handler")?;

    if !opts.quiet {
        print_banner(&opts.lines, opts.debounce_period);
    }

    let mopts = Options {
        offsets: opts.lines.clone(),
        settings: opts.settings(),
        consumer: opts.consumer.clone(),
        max_events: opts.max_events,
        kernel_event_buffer_size: opts.event_buffer_size,
        wait_timeout: opts.wait_timeout,
    };
    let mut ctrl = CdevController::new();
    let mut out = std::io::stdout();
    monitor::run(&mut ctrl, &opts.chip, &mopts, &cancel, &mut out)
        .with_context(|| format!("failed monitoring lines on '{}'", opts.chip.display()))
}

fn print_banner(lines: &[Offset], debounce_period: Duration) {
    use std::io::Write;

    if lines.len() > 1 {
        print!("Monitoring lines ");
        for l in lines.iter().take(lines.len() - 1) {
            print!("{}, ", l);
        }
        print!("and {}", lines[lines.len() - 1]);
    } else {
        print!("Monitoring line {}", lines[0]);
    }
    if debounce_period.is_zero() {
        println!("...");
    } else {
        println!(", debounce time = {}us...", debounce_period.as_micros());
    }
    _ = std::io::stdout().flush();
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
enum ParseDurationError {
    #[error("'{0}' unknown units - use 's', 'ms' or 'us'.")]
    Units(String),
    #[error("'{0}' must start with a digit")]
    NoDigits(String),
    #[error("'{0}' {1}")]
    ParseDigits(String, std::num::ParseIntError),
}

fn parse_duration(s: &str) -> std::result::Result<Duration, ParseDurationError> {
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    let t = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(0) => return Err(ParseDurationError::NoDigits(s.into())),
        Some(n) => {
            let (num, units) = s.split_at(n);
            let t = num
                .parse::<u64>()
                .map_err(|e| ParseDurationError::ParseDigits(num.into(), e))?;
            t * match units {
                "us" => 1000,
                "ms" => 1000000,
                "s" => 1000000000,
                _ => return Err(ParseDurationError::Units(s.into())),
            }
        }
        None => {
            s.parse::<u64>()
                .map_err(|e| ParseDurationError::ParseDigits(s.into(), e))?
                * 1000000
        }
    };
    Ok(Duration::from_nanos(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_with_units() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("5us"), Ok(Duration::from_micros(5)));
        assert_eq!(parse_duration("1ms"), Ok(Duration::from_millis(1)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
    }

    #[test]
    fn parse_duration_defaults_to_millis() {
        assert_eq!(parse_duration("3"), Ok(Duration::from_millis(3)));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert_eq!(
            parse_duration("5ns"),
            Err(ParseDurationError::Units("5ns".into()))
        );
        assert_eq!(
            parse_duration("ms"),
            Err(ParseDurationError::NoDigits("ms".into()))
        );
    }

    #[test]
    fn settings_from_defaults() {
        let opts = Opts::try_parse_from(["pinmon", "23", "24"]).unwrap();
        let settings = opts.settings();
        assert_eq!(settings.bias, Some(pinmon::line::Bias::PullUp));
        assert_eq!(
            settings.edge_detection,
            Some(pinmon::line::EdgeDetection::BothEdges)
        );
        assert_eq!(
            settings.event_clock,
            Some(pinmon::line::EventClock::Monotonic)
        );
        assert_eq!(settings.debounce_period, Some(Duration::from_millis(1)));
        assert!(!settings.active_low);
        assert_eq!(opts.max_events, 32);
        assert_eq!(opts.consumer, "pinmon");
        assert_eq!(opts.chip, PathBuf::from("/dev/gpiochip0"));
    }

    #[test]
    fn zero_debounce_disables_debouncing() {
        let opts = Opts::try_parse_from(["pinmon", "-p", "0", "23"]).unwrap();
        assert_eq!(opts.settings().debounce_period, None);
    }

    #[test]
    fn bias_as_is() {
        let opts = Opts::try_parse_from(["pinmon", "--bias", "as-is", "23"]).unwrap();
        assert_eq!(opts.settings().bias, None);
    }
}
