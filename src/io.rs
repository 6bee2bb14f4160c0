use crate::availability::Day;
use crate::model::{Booking, Slot};
use crate::time_range::TimeRange;
use anyhow::Context;
use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;

/// Import de plages depuis CSV: header `day,start,end` (`HH:MM`, jour en
/// nom anglais ou 0..6 avec 0 = dimanche)
pub fn import_ranges_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<(Day, TimeRange)>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let day = rec.get(0).context("missing day")?;
        let start = rec.get(1).context("missing start")?;
        let end = rec.get(2).context("missing end")?;
        let day: Day = day.parse().with_context(|| format!("row {}: day", line + 1))?;
        let range = TimeRange::parse(start, end).with_context(|| format!("row {}: range", line + 1))?;
        out.push((day, range));
    }
    Ok(out)
}

/// Export CSV des réservations: header `id,student_id,teacher_id,lesson_id,start,end,status`
pub fn write_bookings_csv<W: std::io::Write>(writer: W, bookings: &[Booking]) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(writer);
    w.write_record(["id", "student_id", "teacher_id", "lesson_id", "start", "end", "status"])?;
    for b in bookings {
        let start = b.start.to_rfc3339();
        let end = b.end.to_rfc3339();
        w.write_record([
            b.id.as_str(),
            b.student_id.as_str(),
            b.teacher_id.as_str(),
            b.lesson_id.as_str(),
            start.as_str(),
            end.as_str(),
            b.status.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Export CSV des créneaux: header `teacher_id,lesson_id,start,end`
pub fn write_slots_csv<W: std::io::Write>(writer: W, slots: &[Slot]) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(writer);
    w.write_record(["teacher_id", "lesson_id", "start", "end"])?;
    for s in slots {
        let start = s.start.to_rfc3339();
        let end = s.end.to_rfc3339();
        w.write_record([s.teacher_id.as_str(), s.lesson_id.as_str(), start.as_str(), end.as_str()])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_bookings_csv<P: AsRef<Path>>(path: P, bookings: &[Booking]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path.as_ref())
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    write_bookings_csv(file, bookings)
}

pub fn export_slots_csv<P: AsRef<Path>>(path: P, slots: &[Slot]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path.as_ref())
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    write_slots_csv(file, slots)
}
