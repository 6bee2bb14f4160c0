use super::{util, SchedError};
use crate::availability::{Day, WeeklyAvailability};
use crate::model::{Booking, LessonOffering, Slot};
use crate::time_range::TimeRange;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Déroule la semaine type en créneaux datés sur `horizon_weeks` semaines à
/// partir de `horizon_start`.
///
/// Chaque plage est découpée en morceaux de la durée du cours depuis son
/// début ; un reste plus court est ignoré. Les heures locales sont converties
/// dans le fuseau de `avail`. Sont écartés les créneaux qui chevauchent une
/// réservation active du professeur et ceux qui commencent avant
/// `not_before`. L'itérateur est paresseux, fini et chronologique.
pub fn generate_slots<'a>(
    avail: &'a WeeklyAvailability,
    lesson: &'a LessonOffering,
    horizon_start: NaiveDate,
    horizon_weeks: u32,
    existing: &'a [Booking],
    not_before: DateTime<Utc>,
) -> Result<impl Iterator<Item = Slot> + 'a, SchedError> {
    if lesson.duration_minutes == 0 {
        return Err(SchedError::InvalidRange("lesson duration must be positive".into()));
    }
    if lesson.teacher_id != avail.teacher_id {
        return Err(SchedError::LessonMismatch {
            lesson: lesson.id.clone(),
            teacher: avail.teacher_id.clone(),
        });
    }

    let minutes = lesson.duration_minutes;
    let blocking: Vec<&'a Booking> = existing
        .iter()
        .filter(|b| b.teacher_id == avail.teacher_id && b.status.is_active())
        .collect();
    let days = horizon_weeks as usize * 7;

    Ok(horizon_start
        .iter_days()
        .take(days)
        .flat_map(move |date| day_tiles(avail, date, minutes))
        .filter(move |(start, _)| *start >= not_before)
        .filter(move |(start, end)| util::first_blocking(blocking.iter().copied(), *start, *end).is_none())
        .map(move |(start, end)| Slot {
            teacher_id: avail.teacher_id.clone(),
            lesson_id: lesson.id.clone(),
            start,
            end,
        }))
}

/// Vrai si `slot` fait partie des créneaux que la semaine type produit pour
/// ce cours, sans tenir compte des réservations.
pub(super) fn is_offered(avail: &WeeklyAvailability, lesson: &LessonOffering, slot: &Slot) -> bool {
    let date = slot.start.with_timezone(&avail.timezone).date_naive();
    day_tiles(avail, date, lesson.duration_minutes).any(|(start, end)| start == slot.start && end == slot.end)
}

/// Vrai si `[start, end)` tient dans une plage activée, quel que soit le
/// découpage.
pub(super) fn within_availability(avail: &WeeklyAvailability, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let local_start = start.with_timezone(&avail.timezone);
    let local_end = end.with_timezone(&avail.timezone);
    let date = local_start.date_naive();
    let end_minute = if local_end.date_naive() == date {
        minute_of_day(local_end.time())
    } else if date.succ_opt() == Some(local_end.date_naive()) && local_end.time() == NaiveTime::MIN {
        24 * 60
    } else {
        return false;
    };
    let day = Day::from(local_start.weekday());
    TimeRange::from_minutes(minute_of_day(local_start.time()), end_minute)
        .map(|range| avail.covers(day, &range))
        .unwrap_or(false)
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

fn day_tiles(
    avail: &WeeklyAvailability,
    date: NaiveDate,
    minutes: u32,
) -> impl Iterator<Item = (DateTime<Utc>, DateTime<Utc>)> + '_ {
    let entry = avail.day(Day::from(date.weekday()));
    let ranges: &[TimeRange] = if entry.enabled { entry.ranges() } else { &[] };
    let tz = avail.timezone;

    ranges
        .iter()
        .flat_map(move |range| tiles(range, minutes))
        .filter_map(move |(start, end)| localize(tz, date, start, end))
}

/// Découpe en minutes depuis minuit ; une plage finissant à 24:00 produit
/// une fin au lendemain 00:00.
fn tiles(range: &TimeRange, minutes: u32) -> impl Iterator<Item = (u32, u32)> {
    let first = range.start_minute();
    let count = (range.end_minute() - first).checked_div(minutes).unwrap_or(0);
    (0..count).map(move |k| {
        let start = first + k * minutes;
        (start, start + minutes)
    })
}

// Heure locale inexistante (passage à l'heure d'été) : créneau ignoré.
// Heure ambiguë : la plus tôt. Un créneau traversé par un changement d'heure
// est ignoré.
fn localize(tz: Tz, date: NaiveDate, start: u32, end: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = date.and_time(NaiveTime::MIN);
    let at = |minute: u32| {
        let local = midnight.checked_add_signed(Duration::minutes(i64::from(minute)))?;
        tz.from_local_datetime(&local)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    };
    let (start_at, end_at) = (at(start)?, at(end)?);
    (end_at - start_at == Duration::minutes(i64::from(end - start))).then_some((start_at, end_at))
}
