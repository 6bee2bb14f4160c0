mod conflicts;
mod mutate;
mod slots;
mod types;
pub(crate) mod util;

pub use slots::generate_slots;
pub use types::{Conflict, ConflictKind, Decision, SchedError, SlotOptions};

use crate::availability::WeeklyAvailability;
use crate::model::{Booking, BookingId, LessonId, LessonOffering, Slot, UserId};
use crate::storage::Storage;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Scheduler : moteur de disponibilités et de réservations, adossé à un
/// [`Storage`] injecté.
#[derive(Debug, Default)]
pub struct Scheduler<S> {
    store: S,
    opts: SlotOptions,
}

impl<S: Storage> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, SlotOptions::default())
    }

    pub fn with_options(store: S, opts: SlotOptions) -> Self {
        Self { store, opts }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> SlotOptions {
        self.opts
    }

    pub fn availability(&self, teacher: &UserId) -> Result<WeeklyAvailability, SchedError> {
        self.store
            .load_availability(teacher)?
            .ok_or_else(|| SchedError::not_found("availability", teacher))
    }

    /// Charge (ou crée) la semaine type, applique `edit` puis persiste.
    /// Rien n'est écrit si `edit` échoue.
    pub fn update_availability<F>(&self, teacher: &UserId, edit: F) -> Result<WeeklyAvailability, SchedError>
    where
        F: FnOnce(&mut WeeklyAvailability) -> Result<(), SchedError>,
    {
        let mut avail = self
            .store
            .load_availability(teacher)?
            .unwrap_or_else(|| WeeklyAvailability::new(teacher.clone()));
        edit(&mut avail)?;
        self.store.save_availability(&avail)?;
        tracing::debug!(teacher = %teacher, "availability saved");
        Ok(avail)
    }

    pub fn lesson(&self, id: &LessonId) -> Result<LessonOffering, SchedError> {
        self.store
            .load_lesson(id)?
            .ok_or_else(|| SchedError::not_found("lesson", id))
    }

    /// Créneaux libres pour `lesson_id` sur l'horizon configuré.
    pub fn available_slots(
        &self,
        lesson_id: &LessonId,
        horizon_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, SchedError> {
        let lesson = self.lesson(lesson_id)?;
        let avail = self.availability(&lesson.teacher_id)?;
        let window = horizon_window(horizon_start, self.opts.horizon_weeks)?;
        let bookings = self.store.active_bookings(&lesson.teacher_id, Some(&window))?;
        let not_before = now + Duration::minutes(i64::from(self.opts.min_notice_minutes));

        let slots: Vec<Slot> = generate_slots(
            &avail,
            &lesson,
            horizon_start,
            self.opts.horizon_weeks,
            &bookings,
            not_before,
        )?
        .collect();
        tracing::debug!(
            teacher = %lesson.teacher_id,
            lesson = %lesson.id,
            count = slots.len(),
            "slots generated"
        );
        Ok(slots)
    }

    pub fn request_booking(
        &self,
        slot: &Slot,
        student: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Booking, SchedError> {
        mutate::request_booking(self, slot, student, now)
    }

    pub fn decide(&self, booking_id: &BookingId, teacher: &UserId, decision: Decision) -> Result<Booking, SchedError> {
        mutate::decide(self, booking_id, teacher, decision)
    }

    pub fn cancel(&self, booking_id: &BookingId, actor: &UserId, now: DateTime<Utc>) -> Result<Booking, SchedError> {
        mutate::cancel(self, booking_id, actor, now)
    }

    pub fn reschedule(
        &self,
        booking_id: &BookingId,
        actor: &UserId,
        new_slot: &Slot,
        now: DateTime<Utc>,
    ) -> Result<Booking, SchedError> {
        mutate::reschedule(self, booking_id, actor, new_slot, now)
    }

    pub fn complete_elapsed(&self, teacher: &UserId, now: DateTime<Utc>) -> Result<Vec<Booking>, SchedError> {
        mutate::complete_elapsed(self, teacher, now)
    }

    pub fn detect_conflicts(&self, teacher: &UserId) -> Result<Vec<Conflict>, SchedError> {
        conflicts::detect_conflicts(self, teacher)
    }
}

// Élargi d'un jour de chaque côté pour couvrir les décalages de fuseau.
fn horizon_window(start: NaiveDate, weeks: u32) -> Result<std::ops::Range<DateTime<Utc>>, SchedError> {
    let out_of_range = || SchedError::InvalidRange(format!("horizon of {weeks} weeks from {start} is out of range"));
    let from = Utc
        .from_utc_datetime(&start.and_time(NaiveTime::MIN))
        .checked_sub_signed(Duration::days(1))
        .ok_or_else(out_of_range)?;
    let to = Duration::try_days(i64::from(weeks) * 7 + 2)
        .and_then(|span| from.checked_add_signed(span))
        .ok_or_else(out_of_range)?;
    Ok(from..to)
}
