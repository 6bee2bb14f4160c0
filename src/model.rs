use crate::scheduler::util;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifiant fort pour un utilisateur (élève ou professeur).
///
/// L'identité elle-même est gérée hors du moteur : on ne manipule ici qu'un
/// identifiant opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiant fort pour LessonOffering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LessonId(String);

impl LessonId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiant fort pour Booking
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(String);

impl BookingId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Offre de cours publiée par un professeur. Lecture seule pour le moteur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonOffering {
    pub id: LessonId,
    pub teacher_id: UserId,
    pub duration_minutes: u32,
    /// Prix en centimes.
    pub price_amount: u64,
}

impl LessonOffering {
    /// Crée une offre en validant que la durée est non nulle.
    pub fn new(teacher_id: UserId, duration_minutes: u32, price_amount: u64) -> Result<Self, String> {
        if duration_minutes == 0 {
            return Err("lesson duration must be positive".to_string());
        }
        Ok(Self {
            id: LessonId::random(),
            teacher_id,
            duration_minutes,
            price_amount,
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Créneau concret réservable (UTC). N'a pas d'identité tant qu'aucune
/// réservation ne s'y rattache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub teacher_id: UserId,
    pub lesson_id: LessonId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Slot {
    /// Durée en minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    #[serde(alias = "accepted")]
    Confirmed,
    #[serde(alias = "rejected")]
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Une réservation active bloque son intervalle pour le professeur.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Réservation d'un créneau par un élève (intervalle UTC [start, end)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub student_id: UserId,
    pub teacher_id: UserId,
    pub lesson_id: LessonId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Nouvelle demande `pending` pour `slot`.
    pub fn pending(slot: &Slot, student_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: BookingId::random(),
            student_id,
            teacher_id: slot.teacher_id.clone(),
            lesson_id: slot.lesson_id.clone(),
            start: slot.start,
            end: slot.end,
            status: BookingStatus::Pending,
            created_at: now,
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        util::overlaps(self.start, self.end, start, end)
    }

    /// Vrai si la réservation est active et chevauche `[start, end)`.
    pub fn blocks(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.status.is_active() && self.overlaps(start, end)
    }

    /// L'acteur est l'élève ou le professeur de la réservation.
    pub fn involves(&self, actor: &UserId) -> bool {
        &self.student_id == actor || &self.teacher_id == actor
    }
}
