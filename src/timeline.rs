use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Optional `YYYY-MM-DD ` prefix, then `HH:MM:SS.` at the start of the line.
const TIMESTAMP_PATTERN: &str =
    r"^([0-9]{4}-[0-9]{2}-[0-9]{2} )?([0-9]{2}):([0-9]{2}):([0-9]{2})\.";

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern is valid"))
}

/// Wall-clock time of the first dated line in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineAnchor {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedLogEntry {
    #[serde(rename = "second")]
    pub relative_second: u64,
    #[serde(rename = "entry")]
    pub text: String,
    #[serde(rename = "first")]
    pub first_of_second: bool,
}

/// Result of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizedPass {
    pub anchor: Option<TimelineAnchor>,
    pub entries: Vec<NormalizedLogEntry>,
}

/// State for a single parsing pass.
///
/// Every pass starts from a fresh `Timeline`; the anchor and the running
/// second never carry over between passes.
#[derive(Debug, Default)]
pub struct Timeline {
    anchor: Option<TimelineAnchor>,
    last_second: Option<u64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next raw line. Lines without a leading timestamp yield `None`.
    ///
    /// Components are subtracted one by one with wrapping arithmetic, so a
    /// component smaller than the anchor's still sums to the right offset as
    /// long as the whole line is not earlier than the anchor.
    pub fn push(&mut self, line: String) -> Option<NormalizedLogEntry> {
        let caps = timestamp_regex().captures(&line)?;

        let mut hours: u64 = caps[2].parse().ok()?;
        let mut minutes: u64 = caps[3].parse().ok()?;
        let mut seconds: u64 = caps[4].parse().ok()?;

        if caps.get(1).is_some() && self.anchor.is_none() {
            self.anchor = Some(TimelineAnchor {
                hours,
                minutes,
                seconds,
            });
        }

        if let Some(anchor) = self.anchor {
            hours = hours.wrapping_sub(anchor.hours);
            minutes = minutes.wrapping_sub(anchor.minutes);
            seconds = seconds.wrapping_sub(anchor.seconds);
        }

        let relative_second = seconds
            .wrapping_add(minutes.wrapping_mul(60))
            .wrapping_add(hours.wrapping_mul(3600));

        let first_of_second = self.last_second != Some(relative_second);
        if first_of_second {
            self.last_second = Some(relative_second);
        }

        Some(NormalizedLogEntry {
            relative_second,
            text: line,
            first_of_second,
        })
    }
}

/// Run one complete pass over `lines`.
pub fn normalize<I>(lines: I) -> NormalizedPass
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut timeline = Timeline::new();
    let entries = lines
        .into_iter()
        .filter_map(|line| timeline.push(line.into()))
        .collect();

    NormalizedPass {
        anchor: timeline.anchor,
        entries,
    }
}
