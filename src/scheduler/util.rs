use crate::model::Booking;
use chrono::{DateTime, Utc};

/// Chevauchement semi-ouvert : `a.end == b.start` ne compte pas.
pub(crate) fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Première réservation active du professeur qui chevauche `[start, end)`.
pub(crate) fn first_blocking<'a, I>(bookings: I, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&'a Booking>
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings.into_iter().find(|b| b.blocks(start, end))
}
