use crate::availability::Day;
use crate::model::{BookingId, BookingStatus, LessonId, UserId};
use crate::time_range::TimeRange;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Options de génération des créneaux
#[derive(Debug, Clone, Copy)]
pub struct SlotOptions {
    pub horizon_weeks: u32,
    /// Préavis minimal entre "maintenant" et le début d'un créneau proposé.
    pub min_notice_minutes: u32,
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            horizon_weeks: 4,
            min_notice_minutes: 0,
        }
    }
}

/// Réponse du professeur à une demande `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn target(self) -> BookingStatus {
        match self {
            Decision::Accept => BookingStatus::Confirmed,
            Decision::Reject => BookingStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// deux réservations actives se chevauchent
    Overlap,
    /// réservation active hors des disponibilités courantes
    OutsideAvailability,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub teacher: UserId,
    pub booking: BookingId,
    pub other: Option<BookingId>,
    pub kind: ConflictKind,
}

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("invalid time range: {0}")]
    InvalidRange(String),
    #[error("range {range} overlaps existing range {existing} on {day}")]
    Overlap {
        day: Day,
        range: TimeRange,
        existing: TimeRange,
    },
    #[error("slot {start} -> {end} is no longer available")]
    SlotUnavailable {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("lesson {lesson} is not offered by teacher {teacher}")]
    LessonMismatch { lesson: LessonId, teacher: UserId },
    #[error("{actor} is not allowed to {action}")]
    NotAuthorized { actor: UserId, action: String },
    #[error("booking {booking} cannot move from {from} to {to}")]
    InvalidTransition {
        booking: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("unknown {kind}: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl SchedError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        SchedError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
