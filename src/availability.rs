//! Disponibilités hebdomadaires récurrentes d'un professeur.
//!
//! Convention unique pour les jours : `0 = dimanche .. 6 = samedi` ([`Day`]).
//! Toute autre représentation (noms, `chrono::Weekday`, numérotation ISO) est
//! convertie à la frontière.

use crate::model::UserId;
use crate::scheduler::SchedError;
use crate::time_range::{find_next_available_slot, has_overlap, TimeRange};
use chrono::{Duration, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Day {
    Sunday = 0,
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Sunday,
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: u8) -> Option<Day> {
        Day::ALL.get(usize::from(idx)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Day::Sunday => "sunday",
            Day::Monday => "monday",
            Day::Tuesday => "tuesday",
            Day::Wednesday => "wednesday",
            Day::Thursday => "thursday",
            Day::Friday => "friday",
            Day::Saturday => "saturday",
        }
    }
}

impl From<Weekday> for Day {
    fn from(w: Weekday) -> Self {
        Day::ALL[w.num_days_from_sunday() as usize]
    }
}

impl From<Day> for Weekday {
    fn from(d: Day) -> Self {
        match d {
            Day::Sunday => Weekday::Sun,
            Day::Monday => Weekday::Mon,
            Day::Tuesday => Weekday::Tue,
            Day::Wednesday => Weekday::Wed,
            Day::Thursday => Weekday::Thu,
            Day::Friday => Weekday::Fri,
            Day::Saturday => Weekday::Sat,
        }
    }
}

impl TryFrom<u8> for Day {
    type Error = SchedError;

    fn try_from(idx: u8) -> Result<Self, Self::Error> {
        Day::from_index(idx).ok_or_else(|| SchedError::NotFound {
            kind: "day",
            id: idx.to_string(),
        })
    }
}

impl From<Day> for u8 {
    fn from(d: Day) -> Self {
        d as u8
    }
}

/// Accepte `0`..`6` (0 = dimanche), `monday`, `mon`.
impl FromStr for Day {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        if let Ok(idx) = raw.parse::<u8>() {
            return Day::try_from(idx);
        }
        Day::ALL
            .into_iter()
            .find(|d| d.name() == raw || (raw.len() == 3 && d.name().starts_with(&raw)))
            .ok_or(SchedError::NotFound { kind: "day", id: raw })
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entrée d'une journée : activée ou non, plages triées sans chevauchement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    ranges: Vec<TimeRange>,
}

impl DaySchedule {
    fn default_hours() -> Self {
        let ranges = NaiveTime::from_hms_opt(9, 0, 0)
            .zip(NaiveTime::from_hms_opt(17, 0, 0))
            .and_then(|(start, end)| TimeRange::new(start, end).ok())
            .into_iter()
            .collect();
        Self {
            enabled: false,
            ranges,
        }
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    /// Jour activé avec au moins une plage.
    pub fn is_open(&self) -> bool {
        self.enabled && !self.ranges.is_empty()
    }
}

/// Semaine type d'un professeur, exprimée dans un fuseau IANA explicite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub teacher_id: UserId,
    pub timezone: Tz,
    days: [DaySchedule; 7],
}

impl WeeklyAvailability {
    /// Tous les jours désactivés, plage par défaut 09:00-17:00, fuseau UTC.
    pub fn new(teacher_id: UserId) -> Self {
        Self::with_timezone(teacher_id, Tz::UTC)
    }

    pub fn with_timezone(teacher_id: UserId, timezone: Tz) -> Self {
        Self {
            teacher_id,
            timezone,
            days: std::array::from_fn(|_| DaySchedule::default_hours()),
        }
    }

    pub fn day(&self, day: Day) -> &DaySchedule {
        &self.days[day.index()]
    }

    pub fn set_timezone(&mut self, timezone: Tz) {
        self.timezone = timezone;
    }

    /// Bascule `enabled` sans toucher aux plages ; retourne le nouvel état.
    pub fn toggle_day(&mut self, day: Day) -> bool {
        let entry = &mut self.days[day.index()];
        entry.enabled = !entry.enabled;
        entry.enabled
    }

    pub fn set_enabled(&mut self, day: Day, enabled: bool) {
        self.days[day.index()].enabled = enabled;
    }

    pub fn add_range(&mut self, day: Day, range: TimeRange) -> Result<(), SchedError> {
        let ranges = &mut self.days[day.index()].ranges;
        if let Some(existing) = ranges.iter().find(|r| r.overlaps(&range)) {
            return Err(SchedError::Overlap {
                day,
                range,
                existing: *existing,
            });
        }
        ranges.push(range);
        ranges.sort_by_key(|r| r.start());
        Ok(())
    }

    pub fn update_range(&mut self, day: Day, index: usize, range: TimeRange) -> Result<(), SchedError> {
        let ranges = &mut self.days[day.index()].ranges;
        if index >= ranges.len() {
            return Err(range_not_found(day, index));
        }
        if has_overlap(ranges, &range, Some(index)) {
            let existing = ranges
                .iter()
                .enumerate()
                .find(|(idx, r)| *idx != index && r.overlaps(&range))
                .map(|(_, r)| *r)
                .unwrap_or(range);
            return Err(SchedError::Overlap { day, range, existing });
        }
        ranges[index] = range;
        ranges.sort_by_key(|r| r.start());
        Ok(())
    }

    /// Retire une plage ; le jour peut rester activé sans aucune plage.
    pub fn remove_range(&mut self, day: Day, index: usize) -> Result<TimeRange, SchedError> {
        let ranges = &mut self.days[day.index()].ranges;
        if index >= ranges.len() {
            return Err(range_not_found(day, index));
        }
        Ok(ranges.remove(index))
    }

    /// Remplace les plages de `to` par celles de `from`. `enabled` n'est
    /// jamais modifié par une copie.
    pub fn copy_day_to_day(&mut self, from: Day, to: Day) {
        if from == to {
            return;
        }
        self.days[to.index()].ranges = self.days[from.index()].ranges.clone();
    }

    pub fn copy_day_to_all_days(&mut self, from: Day) {
        for to in Day::ALL {
            self.copy_day_to_day(from, to);
        }
    }

    /// Première plage libre de `length` dans `bounds` pour ce jour.
    pub fn next_free_range(&self, day: Day, length: Duration, bounds: &TimeRange) -> Option<TimeRange> {
        find_next_available_slot(self.day(day).ranges(), length, bounds)
    }

    /// Vrai si `range` tient entièrement dans une plage d'un jour activé.
    pub fn covers(&self, day: Day, range: &TimeRange) -> bool {
        let entry = self.day(day);
        entry.enabled && entry.ranges.iter().any(|r| r.contains(range))
    }

    /// Vérifie l'invariant (tri + absence de chevauchement), utile après un
    /// chargement depuis un support externe.
    pub fn validate(&self) -> Result<(), SchedError> {
        for day in Day::ALL {
            for pair in self.day(day).ranges.windows(2) {
                if let [a, b] = pair {
                    if b.start() < a.start() || a.overlaps(b) {
                        return Err(SchedError::Overlap {
                            day,
                            range: *b,
                            existing: *a,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn range_not_found(day: Day, index: usize) -> SchedError {
    SchedError::NotFound {
        kind: "range",
        id: format!("{day}#{index}"),
    }
}
