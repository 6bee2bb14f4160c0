use super::{slots, Decision, SchedError, Scheduler};
use crate::model::{Booking, BookingId, BookingStatus, Slot, UserId};
use crate::storage::{Commit, Storage};
use chrono::{DateTime, Utc};

pub(super) fn request_booking<S: Storage>(
    scheduler: &Scheduler<S>,
    slot: &Slot,
    student: &UserId,
    now: DateTime<Utc>,
) -> Result<Booking, SchedError> {
    if student == &slot.teacher_id {
        return Err(SchedError::NotAuthorized {
            actor: student.clone(),
            action: format!("book their own lesson {}", slot.lesson_id),
        });
    }
    check_slot(scheduler, slot, now)?;

    let booking = Booking::pending(slot, student.clone(), now);
    match scheduler.store.insert_if_no_overlap(&booking)? {
        Commit::Done(created) => {
            tracing::info!(
                booking = %created.id,
                teacher = %created.teacher_id,
                student = %created.student_id,
                start = %created.start,
                "booking requested"
            );
            Ok(created)
        }
        Commit::Conflict(taken) => {
            tracing::warn!(teacher = %slot.teacher_id, start = %slot.start, taken_by = %taken, "slot already taken");
            Err(unavailable(slot))
        }
        Commit::Stale(_) | Commit::Missing => Err(unavailable(slot)),
    }
}

pub(super) fn decide<S: Storage>(
    scheduler: &Scheduler<S>,
    booking_id: &BookingId,
    teacher: &UserId,
    decision: Decision,
) -> Result<Booking, SchedError> {
    let booking = load(scheduler, booking_id)?;
    if &booking.teacher_id != teacher {
        return Err(SchedError::NotAuthorized {
            actor: teacher.clone(),
            action: format!("decide on booking {}", booking.id),
        });
    }
    let next = decision.target();
    if booking.status != BookingStatus::Pending {
        return Err(invalid(&booking, next));
    }
    transition(scheduler, &booking, next)
}

/// Annulation par l'élève ou le professeur, avant le début du cours.
pub(super) fn cancel<S: Storage>(
    scheduler: &Scheduler<S>,
    booking_id: &BookingId,
    actor: &UserId,
    now: DateTime<Utc>,
) -> Result<Booking, SchedError> {
    let booking = load(scheduler, booking_id)?;
    if !booking.involves(actor) {
        return Err(SchedError::NotAuthorized {
            actor: actor.clone(),
            action: format!("cancel booking {}", booking.id),
        });
    }
    if booking.start <= now {
        return Err(invalid(&booking, BookingStatus::Cancelled));
    }
    transition(scheduler, &booking, BookingStatus::Cancelled)
}

/// Annulation + nouvelle demande, appliquées ensemble ou pas du tout.
pub(super) fn reschedule<S: Storage>(
    scheduler: &Scheduler<S>,
    booking_id: &BookingId,
    actor: &UserId,
    new_slot: &Slot,
    now: DateTime<Utc>,
) -> Result<Booking, SchedError> {
    let old = load(scheduler, booking_id)?;
    if !old.involves(actor) {
        return Err(SchedError::NotAuthorized {
            actor: actor.clone(),
            action: format!("reschedule booking {}", old.id),
        });
    }
    if !old.status.can_transition_to(BookingStatus::Cancelled) || old.start <= now {
        return Err(invalid(&old, BookingStatus::Cancelled));
    }
    if new_slot.teacher_id != old.teacher_id {
        return Err(SchedError::LessonMismatch {
            lesson: new_slot.lesson_id.clone(),
            teacher: old.teacher_id.clone(),
        });
    }
    check_slot(scheduler, new_slot, now)?;

    let replacement = Booking::pending(new_slot, old.student_id.clone(), now);
    match scheduler.store.replace_booking(&old.id, old.status, &replacement)? {
        Commit::Done(created) => {
            tracing::info!(from = %old.id, to = %created.id, start = %created.start, "booking rescheduled");
            Ok(created)
        }
        Commit::Conflict(_) => Err(unavailable(new_slot)),
        Commit::Stale(current) => Err(invalid(&current, BookingStatus::Cancelled)),
        Commit::Missing => Err(SchedError::not_found("booking", &old.id)),
    }
}

/// Passe en `completed` les réservations confirmées terminées avant `now`.
pub(super) fn complete_elapsed<S: Storage>(
    scheduler: &Scheduler<S>,
    teacher: &UserId,
    now: DateTime<Utc>,
) -> Result<Vec<Booking>, SchedError> {
    let mut done = Vec::new();
    for booking in scheduler.store.active_bookings(teacher, None)? {
        if booking.status != BookingStatus::Confirmed || booking.end > now {
            continue;
        }
        // une annulation concurrente l'emporte
        if let Commit::Done(completed) =
            scheduler
                .store
                .set_status(&booking.id, BookingStatus::Confirmed, BookingStatus::Completed)?
        {
            done.push(completed);
        }
    }
    if !done.is_empty() {
        tracing::info!(teacher = %teacher, count = done.len(), "bookings completed");
    }
    Ok(done)
}

/// Re-validation d'un créneau proposé : la liste générée peut être périmée.
fn check_slot<S: Storage>(scheduler: &Scheduler<S>, slot: &Slot, now: DateTime<Utc>) -> Result<(), SchedError> {
    let lesson = scheduler.lesson(&slot.lesson_id)?;
    if lesson.teacher_id != slot.teacher_id {
        return Err(SchedError::LessonMismatch {
            lesson: lesson.id,
            teacher: slot.teacher_id.clone(),
        });
    }
    if slot.end - slot.start != lesson.duration() {
        return Err(SchedError::InvalidRange(format!(
            "slot lasts {} minutes, lesson {} lasts {}",
            slot.duration_minutes(),
            lesson.id,
            lesson.duration_minutes
        )));
    }
    if slot.start < now {
        return Err(unavailable(slot));
    }
    let avail = scheduler.availability(&slot.teacher_id)?;
    if !slots::is_offered(&avail, &lesson, slot) {
        return Err(unavailable(slot));
    }
    Ok(())
}

fn transition<S: Storage>(
    scheduler: &Scheduler<S>,
    booking: &Booking,
    next: BookingStatus,
) -> Result<Booking, SchedError> {
    if !booking.status.can_transition_to(next) {
        return Err(invalid(booking, next));
    }
    match scheduler.store.set_status(&booking.id, booking.status, next)? {
        Commit::Done(updated) => {
            tracing::info!(booking = %updated.id, from = %booking.status, to = %next, "booking status changed");
            Ok(updated)
        }
        Commit::Stale(current) => Err(invalid(&current, next)),
        Commit::Missing | Commit::Conflict(_) => Err(SchedError::not_found("booking", &booking.id)),
    }
}

fn load<S: Storage>(scheduler: &Scheduler<S>, id: &BookingId) -> Result<Booking, SchedError> {
    scheduler
        .store
        .load_booking(id)?
        .ok_or_else(|| SchedError::not_found("booking", id))
}

fn unavailable(slot: &Slot) -> SchedError {
    SchedError::SlotUnavailable {
        start: slot.start,
        end: slot.end,
    }
}

fn invalid(booking: &Booking, to: BookingStatus) -> SchedError {
    SchedError::InvalidTransition {
        booking: booking.id.clone(),
        from: booking.status,
        to,
    }
}
