#![forbid(unsafe_code)]
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tutorat::{
    generate_slots, Booking, BookingStatus, Day, LessonOffering, MemoryStorage, SchedError, Scheduler, Slot,
    SlotOptions, Storage, TimeRange, UserId, WeeklyAvailability,
};

fn r(start: &str, end: &str) -> TimeRange {
    TimeRange::parse(start, end).unwrap()
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

// Lundi 7 janvier 2030
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn long_ago() -> DateTime<Utc> {
    utc(2029, 1, 1, 0, 0)
}

fn monday_morning(teacher: &UserId) -> WeeklyAvailability {
    let mut avail = WeeklyAvailability::new(teacher.clone());
    avail.toggle_day(Day::Monday);
    avail.update_range(Day::Monday, 0, r("09:00", "12:00")).unwrap();
    avail
}

fn lesson(teacher: &UserId, minutes: u32) -> LessonOffering {
    LessonOffering::new(teacher.clone(), minutes, 3000).unwrap()
}

fn starts(slots: &[Slot]) -> Vec<DateTime<Utc>> {
    slots.iter().map(|s| s.start).collect()
}

#[test]
fn monday_morning_end_to_end() {
    let teacher = UserId::new("prof");
    let student = UserId::new("eleve");
    let scheduler = Scheduler::with_options(
        MemoryStorage::new(),
        SlotOptions {
            horizon_weeks: 1,
            min_notice_minutes: 0,
        },
    );
    scheduler.store().save_availability(&monday_morning(&teacher)).unwrap();
    let lesson = lesson(&teacher, 60);
    scheduler.store().save_lesson(&lesson).unwrap();

    let slots = scheduler.available_slots(&lesson.id, monday(), long_ago()).unwrap();
    assert_eq!(
        starts(&slots),
        vec![utc(2030, 1, 7, 9, 0), utc(2030, 1, 7, 10, 0), utc(2030, 1, 7, 11, 0)]
    );

    let booking = scheduler.request_booking(&slots[1], &student, long_ago()).unwrap();
    scheduler.decide(&booking.id, &teacher, tutorat::Decision::Accept).unwrap();

    let slots = scheduler.available_slots(&lesson.id, monday(), long_ago()).unwrap();
    assert_eq!(starts(&slots), vec![utc(2030, 1, 7, 9, 0), utc(2030, 1, 7, 11, 0)]);
}

#[test]
fn slots_match_duration_and_lie_in_ranges() {
    let teacher = UserId::new("prof");
    let mut avail = WeeklyAvailability::new(teacher.clone());
    for day in [Day::Monday, Day::Wednesday, Day::Saturday] {
        avail.toggle_day(day);
    }
    avail.update_range(Day::Monday, 0, r("08:15", "10:00")).unwrap();
    avail.add_range(Day::Monday, r("13:00", "17:20")).unwrap();
    avail.update_range(Day::Saturday, 0, r("10:00", "10:44")).unwrap();
    let lesson = lesson(&teacher, 45);

    let slots: Vec<Slot> = generate_slots(&avail, &lesson, monday(), 2, &[], long_ago())
        .unwrap()
        .collect();

    assert!(!slots.is_empty());
    for slot in &slots {
        assert_eq!(slot.end - slot.start, Duration::minutes(45));
        let day = Day::from(chrono::Datelike::weekday(&slot.start));
        let range = TimeRange::new(slot.start.time(), slot.end.time()).unwrap();
        assert!(avail.covers(day, &range), "{:?} not covered", slot);
    }
    // samedi : 44 minutes ne suffisent pas pour un cours de 45
    assert!(slots.iter().all(|s| Day::from(chrono::Datelike::weekday(&s.start)) != Day::Saturday));
    // chronologique
    assert!(slots.windows(2).all(|w| w[0].start < w[1].start));
    // lundi : 2 + 5 créneaux, mercredi : 08:45 de 9h à 17h = 10, sur deux semaines
    assert_eq!(slots.len(), 2 * (2 + 5 + 10));
}

#[test]
fn trailing_partial_slot_is_dropped() {
    let teacher = UserId::new("prof");
    let mut avail = monday_morning(&teacher);
    avail.update_range(Day::Monday, 0, r("09:00", "10:30")).unwrap();
    let lesson = lesson(&teacher, 60);

    let slots: Vec<Slot> = generate_slots(&avail, &lesson, monday(), 1, &[], long_ago())
        .unwrap()
        .collect();
    assert_eq!(starts(&slots), vec![utc(2030, 1, 7, 9, 0)]);
}

#[test]
fn past_slots_are_not_offered() {
    let teacher = UserId::new("prof");
    let avail = monday_morning(&teacher);
    let lesson = lesson(&teacher, 60);

    let now = utc(2030, 1, 7, 10, 30);
    let slots: Vec<Slot> = generate_slots(&avail, &lesson, monday(), 1, &[], now).unwrap().collect();
    assert_eq!(starts(&slots), vec![utc(2030, 1, 7, 11, 0)]);
}

#[test]
fn active_bookings_block_only_their_teacher() {
    let teacher = UserId::new("prof");
    let other = UserId::new("autre-prof");
    let avail = monday_morning(&teacher);
    let lesson = lesson(&teacher, 60);

    let mk = |teacher: &UserId, start: DateTime<Utc>, status: BookingStatus| Booking {
        status,
        ..Booking::pending(
            &Slot {
                teacher_id: teacher.clone(),
                lesson_id: lesson.id.clone(),
                start,
                end: start + Duration::minutes(60),
            },
            UserId::new("eleve"),
            long_ago(),
        )
    };
    let existing = vec![
        mk(&teacher, utc(2030, 1, 7, 10, 0), BookingStatus::Confirmed),
        mk(&teacher, utc(2030, 1, 7, 9, 0), BookingStatus::Cancelled),
        mk(&other, utc(2030, 1, 7, 11, 0), BookingStatus::Pending),
        // chevauche partiellement 11:00-12:00
        mk(&teacher, utc(2030, 1, 7, 11, 30), BookingStatus::Pending),
    ];

    let slots: Vec<Slot> = generate_slots(&avail, &lesson, monday(), 1, &existing, long_ago())
        .unwrap()
        .collect();
    assert_eq!(starts(&slots), vec![utc(2030, 1, 7, 9, 0)]);
}

#[test]
fn horizon_spans_whole_weeks() {
    let teacher = UserId::new("prof");
    let avail = monday_morning(&teacher);
    let lesson = lesson(&teacher, 60);

    // départ un mardi : trois semaines couvrent trois lundis
    let tuesday = NaiveDate::from_ymd_opt(2030, 1, 8).unwrap();
    let slots: Vec<Slot> = generate_slots(&avail, &lesson, tuesday, 3, &[], long_ago()).unwrap().collect();
    assert_eq!(slots.len(), 9);
    assert_eq!(slots[0].start, utc(2030, 1, 14, 9, 0));
    assert_eq!(slots[8].start, utc(2030, 1, 28, 11, 0));

    let none: Vec<Slot> = generate_slots(&avail, &lesson, tuesday, 0, &[], long_ago()).unwrap().collect();
    assert!(none.is_empty());
}

#[test]
fn generation_is_restartable() {
    let teacher = UserId::new("prof");
    let avail = monday_morning(&teacher);
    let lesson = lesson(&teacher, 30);

    let first: Vec<Slot> = generate_slots(&avail, &lesson, monday(), 2, &[], long_ago()).unwrap().collect();
    let second: Vec<Slot> = generate_slots(&avail, &lesson, monday(), 2, &[], long_ago()).unwrap().collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 12);
}

#[test]
fn local_hours_follow_teacher_timezone() {
    let teacher = UserId::new("prof");
    let mut avail = monday_morning(&teacher);
    avail.set_timezone(chrono_tz::Europe::Paris);
    let lesson = lesson(&teacher, 60);

    let slots: Vec<Slot> = generate_slots(&avail, &lesson, monday(), 1, &[], long_ago()).unwrap().collect();
    // hiver : UTC+1
    assert_eq!(
        starts(&slots),
        vec![utc(2030, 1, 7, 8, 0), utc(2030, 1, 7, 9, 0), utc(2030, 1, 7, 10, 0)]
    );
}

#[test]
fn nonexistent_local_times_are_skipped() {
    let teacher = UserId::new("prof");
    let mut avail = WeeklyAvailability::with_timezone(teacher.clone(), chrono_tz::Europe::Paris);
    avail.toggle_day(Day::Sunday);
    avail.update_range(Day::Sunday, 0, r("01:00", "04:00")).unwrap();
    let lesson = lesson(&teacher, 60);

    // 31 mars 2030 : 02:00 n'existe pas à Paris
    let dst = NaiveDate::from_ymd_opt(2030, 3, 31).unwrap();
    let slots: Vec<Slot> = generate_slots(&avail, &lesson, dst, 1, &[], long_ago()).unwrap().collect();
    assert_eq!(starts(&slots), vec![utc(2030, 3, 31, 1, 0)]);
    assert!(slots.iter().all(|s| s.end - s.start == Duration::minutes(60)));
}

#[test]
fn repeated_local_hour_keeps_earliest_and_drops_stretched_tile() {
    let teacher = UserId::new("prof");
    let mut avail = WeeklyAvailability::with_timezone(teacher.clone(), chrono_tz::Europe::Paris);
    avail.toggle_day(Day::Sunday);
    avail.update_range(Day::Sunday, 0, r("01:00", "04:00")).unwrap();
    let lesson = lesson(&teacher, 60);

    // 27 octobre 2030 : 02:00-03:00 existe deux fois à Paris
    let fall_back = NaiveDate::from_ymd_opt(2030, 10, 27).unwrap();
    let slots: Vec<Slot> = generate_slots(&avail, &lesson, fall_back, 1, &[], long_ago())
        .unwrap()
        .collect();

    // 01:00 CEST -> 02:00 (première occurrence) ; 02:00 -> 03:00 CET dure 120
    // minutes et disparaît ; 03:00 CET -> 04:00 CET.
    assert_eq!(
        slots.iter().map(|s| (s.start, s.end)).collect::<Vec<_>>(),
        vec![
            (utc(2030, 10, 26, 23, 0), utc(2030, 10, 27, 0, 0)),
            (utc(2030, 10, 27, 2, 0), utc(2030, 10, 27, 3, 0)),
        ]
    );
}

#[test]
fn zero_duration_and_foreign_lesson_are_rejected() {
    let teacher = UserId::new("prof");
    let avail = monday_morning(&teacher);

    let mut broken = lesson(&teacher, 60);
    broken.duration_minutes = 0;
    assert!(matches!(
        generate_slots(&avail, &broken, monday(), 1, &[], long_ago()).map(|it| it.count()),
        Err(SchedError::InvalidRange(_))
    ));

    let foreign = lesson(&UserId::new("autre"), 60);
    assert!(matches!(
        generate_slots(&avail, &foreign, monday(), 1, &[], long_ago()).map(|it| it.count()),
        Err(SchedError::LessonMismatch { .. })
    ));
    assert!(LessonOffering::new(teacher, 0, 0).is_err());
}

#[test]
fn minimum_notice_hides_imminent_slots() {
    let teacher = UserId::new("prof");
    let scheduler = Scheduler::with_options(
        MemoryStorage::new(),
        SlotOptions {
            horizon_weeks: 1,
            min_notice_minutes: 120,
        },
    );
    scheduler.store().save_availability(&monday_morning(&teacher)).unwrap();
    let lesson = lesson(&teacher, 60);
    scheduler.store().save_lesson(&lesson).unwrap();

    let slots = scheduler
        .available_slots(&lesson.id, monday(), utc(2030, 1, 7, 8, 30))
        .unwrap();
    assert_eq!(starts(&slots), vec![utc(2030, 1, 7, 11, 0)]);
}

#[test]
fn missing_lesson_or_availability_is_not_found() {
    let teacher = UserId::new("prof");
    let scheduler = Scheduler::new(MemoryStorage::new());
    let lesson = lesson(&teacher, 60);

    assert!(matches!(
        scheduler.available_slots(&lesson.id, monday(), long_ago()),
        Err(SchedError::NotFound { kind: "lesson", .. })
    ));
    scheduler.store().save_lesson(&lesson).unwrap();
    assert!(matches!(
        scheduler.available_slots(&lesson.id, monday(), long_ago()),
        Err(SchedError::NotFound { kind: "availability", .. })
    ));
}

#[test]
fn range_may_run_until_midnight() {
    let teacher = UserId::new("prof");
    let scheduler = Scheduler::with_options(
        MemoryStorage::new(),
        SlotOptions {
            horizon_weeks: 1,
            min_notice_minutes: 0,
        },
    );
    let mut avail = WeeklyAvailability::new(teacher.clone());
    avail.toggle_day(Day::Monday);
    avail.update_range(Day::Monday, 0, r("22:00", "24:00")).unwrap();
    scheduler.store().save_availability(&avail).unwrap();
    let lesson = lesson(&teacher, 60);
    scheduler.store().save_lesson(&lesson).unwrap();

    let slots = scheduler.available_slots(&lesson.id, monday(), long_ago()).unwrap();
    assert_eq!(starts(&slots), vec![utc(2030, 1, 7, 22, 0), utc(2030, 1, 7, 23, 0)]);
    assert_eq!(slots[1].end, utc(2030, 1, 8, 0, 0));

    scheduler.request_booking(&slots[1], &UserId::new("eleve"), long_ago()).unwrap();
    assert!(scheduler.detect_conflicts(&teacher).unwrap().is_empty());
}

#[test]
fn unrepresentable_horizon_is_rejected() {
    let teacher = UserId::new("prof");
    let scheduler = Scheduler::with_options(
        MemoryStorage::new(),
        SlotOptions {
            horizon_weeks: u32::MAX,
            min_notice_minutes: 0,
        },
    );
    scheduler.store().save_availability(&monday_morning(&teacher)).unwrap();
    let lesson = lesson(&teacher, 60);
    scheduler.store().save_lesson(&lesson).unwrap();

    assert!(matches!(
        scheduler.available_slots(&lesson.id, monday(), long_ago()),
        Err(SchedError::InvalidRange(_))
    ));
}
