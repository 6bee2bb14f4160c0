#![forbid(unsafe_code)]
//! Tutorat : moteur de disponibilités et de réservation de créneaux pour une
//! plateforme de cours particuliers.
//!
//! - Semaine type par professeur, jours `0 = dimanche .. 6 = samedi`.
//! - Génération paresseuse des créneaux sur un horizon en semaines.
//! - Aucune double réservation : vérification + écriture atomiques côté stockage.
//! - Instants en UTC ; la semaine type porte un fuseau IANA explicite.

pub mod availability;
pub mod io;
pub mod model;
pub mod scheduler;
pub mod storage;
pub mod time_range;

pub use availability::{Day, DaySchedule, WeeklyAvailability};
pub use model::{Booking, BookingId, BookingStatus, LessonId, LessonOffering, Slot, UserId};
pub use scheduler::{generate_slots, Conflict, ConflictKind, Decision, SchedError, Scheduler, SlotOptions};
pub use storage::{Commit, JsonStorage, Ledger, MemoryStorage, Storage};
pub use time_range::{find_next_available_slot, has_overlap, TimeRange};
