use super::{slots, Conflict, ConflictKind, SchedError, Scheduler};
use crate::storage::Storage;
use crate::model::UserId;

/// Audit du registre : paires de réservations actives qui se chevauchent, et
/// réservations actives sorties des disponibilités courantes.
pub(super) fn detect_conflicts<S: Storage>(
    scheduler: &Scheduler<S>,
    teacher: &UserId,
) -> Result<Vec<Conflict>, SchedError> {
    let bookings = scheduler.store.active_bookings(teacher, None)?;
    let avail = scheduler.store.load_availability(teacher)?;
    let mut out = Vec::new();

    for (idx, a) in bookings.iter().enumerate() {
        for b in bookings.iter().skip(idx + 1) {
            if b.start >= a.end {
                break;
            }
            if a.overlaps(b.start, b.end) {
                out.push(Conflict {
                    teacher: teacher.clone(),
                    booking: a.id.clone(),
                    other: Some(b.id.clone()),
                    kind: ConflictKind::Overlap,
                });
            }
        }

        if let Some(avail) = &avail {
            if !slots::within_availability(avail, a.start, a.end) {
                out.push(Conflict {
                    teacher: teacher.clone(),
                    booking: a.id.clone(),
                    other: None,
                    kind: ConflictKind::OutsideAvailability,
                });
            }
        }
    }

    Ok(out)
}
