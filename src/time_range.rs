//! Plages horaires `[start, end)` au sein d'une journée et validation des
//! chevauchements.

use crate::scheduler::{util, SchedError};
use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DAY_MINUTES: u32 = 24 * 60;

/// Plage horaire validée, granularité minute, `start < end` strictement.
///
/// Stockée en minutes depuis minuit ; `end` peut valoir `24:00` (fin de
/// journée), `start` jamais.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange", into = "RawTimeRange")]
pub struct TimeRange {
    start: u32,
    end: u32,
}

/// Forme persistée : `{"start": "09:00", "end": "17:00"}`.
#[derive(Serialize, Deserialize)]
struct RawTimeRange {
    start: String,
    end: String,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = SchedError;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        TimeRange::parse(&raw.start, &raw.end)
    }
}

impl From<TimeRange> for RawTimeRange {
    fn from(range: TimeRange) -> Self {
        Self {
            start: hhmm(range.start),
            end: hhmm(range.end),
        }
    }
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, SchedError> {
        Self::from_minutes(minute_of(start)?, minute_of(end)?)
    }

    /// `start` et `end` en minutes depuis minuit, `end <= 1440`.
    pub fn from_minutes(start: u32, end: u32) -> Result<Self, SchedError> {
        if end > DAY_MINUTES {
            return Err(SchedError::InvalidRange(format!("end {end} minutes is past 24:00")));
        }
        if start >= end {
            return Err(SchedError::InvalidRange(format!(
                "end {} must be after start {}",
                hhmm(end),
                hhmm(start)
            )));
        }
        Ok(Self { start, end })
    }

    /// Construit une plage depuis deux chaînes `HH:MM` (`24:00` accepté en fin).
    pub fn parse(start: &str, end: &str) -> Result<Self, SchedError> {
        Self::from_minutes(parse_minute(start)?, parse_minute(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        NaiveTime::MIN + Duration::minutes(i64::from(self.start))
    }

    pub fn start_minute(&self) -> u32 {
        self.start
    }

    pub fn end_minute(&self) -> u32 {
        self.end
    }

    /// Vrai si la plage court jusqu'à minuit.
    pub fn ends_at_midnight(&self) -> bool {
        self.end == DAY_MINUTES
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.end - self.start))
    }

    /// Semi-ouvert : deux plages qui se touchent ne se chevauchent pas.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        util::overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", hhmm(self.start), hhmm(self.end))
    }
}

/// Accepte `09:00-17:00`.
impl FromStr for TimeRange {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| SchedError::InvalidRange(format!("expected HH:MM-HH:MM, got {s:?}")))?;
        Self::parse(start.trim(), end.trim())
    }
}

fn minute_of(t: NaiveTime) -> Result<u32, SchedError> {
    if t.second() != 0 || t.nanosecond() != 0 {
        return Err(SchedError::InvalidRange(format!(
            "{} is not a whole minute",
            t.format("%H:%M:%S")
        )));
    }
    Ok(t.hour() * 60 + t.minute())
}

fn parse_minute(raw: &str) -> Result<u32, SchedError> {
    let raw = raw.trim();
    if raw == "24:00" {
        return Ok(DAY_MINUTES);
    }
    let t = NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| SchedError::InvalidRange(format!("invalid HH:MM time: {raw:?}")))?;
    minute_of(t)
}

fn hhmm(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Vrai si `candidate` chevauche une plage de `existing`, hormis celle à
/// l'index `exclude` (édition en place).
pub fn has_overlap(existing: &[TimeRange], candidate: &TimeRange, exclude: Option<usize>) -> bool {
    existing
        .iter()
        .enumerate()
        .any(|(idx, range)| Some(idx) != exclude && range.overlaps(candidate))
}

/// Première plage libre d'exactement `slot_length` dans `day_bounds`
/// (first-fit, la plus tôt gagne).
pub fn find_next_available_slot(
    existing: &[TimeRange],
    slot_length: Duration,
    day_bounds: &TimeRange,
) -> Option<TimeRange> {
    let length = u32::try_from(slot_length.num_minutes()).ok().filter(|m| *m > 0)?;

    let mut sorted: Vec<&TimeRange> = existing.iter().collect();
    sorted.sort_by_key(|r| r.start);

    let fits = |from: u32, to: u32| -> Option<TimeRange> {
        if from < to && to - from >= length {
            TimeRange::from_minutes(from, from + length).ok()
        } else {
            None
        }
    };

    let mut cursor = day_bounds.start;
    for range in sorted {
        if range.end <= cursor {
            continue;
        }
        if range.start >= day_bounds.end {
            break;
        }
        if let Some(found) = fits(cursor, range.start.min(day_bounds.end)) {
            return Some(found);
        }
        cursor = cursor.max(range.end);
        if cursor >= day_bounds.end {
            return None;
        }
    }

    fits(cursor, day_bounds.end)
}
