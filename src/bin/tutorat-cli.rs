#![forbid(unsafe_code)]
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use tutorat::{
    io,
    model::{BookingId, LessonId, LessonOffering, Slot, UserId},
    scheduler::{ConflictKind, Decision, Scheduler, SlotOptions},
    storage::{JsonStorage, Storage},
    Day, TimeRange,
};
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI du moteur de réservation (registre JSON local)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Fichier JSON du registre
    #[arg(long, global = true, default_value = "tutorat.json")]
    store: String,

    /// Horloge figée (RFC3339 UTC), sinon l'heure système
    #[arg(long, global = true)]
    now: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Afficher la semaine type d'un professeur (JSON)
    Availability {
        #[arg(long)]
        teacher: String,
    },

    /// Changer le fuseau IANA de la semaine type
    SetTimezone {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        tz: String,
    },

    /// Activer/désactiver un jour (0 = dimanche, ou nom anglais)
    ToggleDay {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        day: String,
    },

    /// Ajouter une plage HH:MM
    AddRange {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        day: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },

    /// Remplacer la plage d'index donné
    UpdateRange {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        day: String,
        #[arg(long)]
        index: usize,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },

    /// Retirer la plage d'index donné
    RemoveRange {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        day: String,
        #[arg(long)]
        index: usize,
    },

    /// Copier les plages d'un jour vers un autre (ou vers tous avec --all)
    CopyDay {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        from: String,
        #[arg(long, conflicts_with = "all")]
        to: Option<String>,
        #[arg(long)]
        all: bool,
    },

    /// Importer des plages depuis un CSV `day,start,end`
    ImportRanges {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        csv: String,
    },

    /// Publier une offre de cours
    AddLesson {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        duration: u32,
        /// en centimes
        #[arg(long, default_value_t = 0)]
        price: u64,
    },

    /// Lister les créneaux libres d'un cours
    Slots {
        #[arg(long)]
        lesson: String,
        /// YYYY-MM-DD, aujourd'hui (UTC) par défaut
        #[arg(long)]
        from: Option<String>,
        #[arg(long, default_value_t = 4)]
        weeks: u32,
        #[arg(long, default_value_t = 0)]
        min_notice_minutes: u32,
        #[arg(long)]
        out_csv: Option<String>,
    },

    /// Réserver un créneau
    Book {
        #[arg(long)]
        lesson: String,
        #[arg(long)]
        student: String,
        /// RFC3339
        #[arg(long)]
        start: String,
    },

    /// Accepter (ou refuser avec --reject) une demande
    Decide {
        #[arg(long)]
        booking: String,
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        reject: bool,
    },

    /// Annuler une réservation (élève ou professeur)
    Cancel {
        #[arg(long)]
        booking: String,
        #[arg(long)]
        actor: String,
    },

    /// Déplacer une réservation vers un autre créneau
    Reschedule {
        #[arg(long)]
        booking: String,
        #[arg(long)]
        actor: String,
        /// autre cours du même professeur (par défaut le même)
        #[arg(long)]
        lesson: Option<String>,
        /// RFC3339
        #[arg(long)]
        start: String,
    },

    /// Passer en `completed` les cours confirmés terminés
    Complete {
        #[arg(long)]
        teacher: String,
    },

    /// Lister les réservations d'un professeur
    Bookings {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        out_csv: Option<String>,
    },

    /// Vérifier les conflits
    Check {
        #[arg(long)]
        teacher: String,
        /// Export CSV des conflits (optionnel)
        #[arg(long)]
        report: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    let now: DateTime<Utc> = match &cli.now {
        Some(raw) => raw.parse().with_context(|| format!("--now {raw}"))?,
        None => Utc::now(),
    };

    let storage = JsonStorage::open(&cli.store)?;
    let opts = match &cli.cmd {
        Commands::Slots {
            weeks,
            min_notice_minutes,
            ..
        } => SlotOptions {
            horizon_weeks: *weeks,
            min_notice_minutes: *min_notice_minutes,
        },
        _ => SlotOptions::default(),
    };
    let scheduler = Scheduler::with_options(storage, opts);

    let code = match cli.cmd {
        Commands::Availability { teacher } => {
            let avail = scheduler.availability(&UserId::new(teacher))?;
            println!("{}", serde_json::to_string_pretty(&avail)?);
            0
        }
        Commands::SetTimezone { teacher, tz } => {
            let tz: Tz = tz.parse().map_err(|e| anyhow!("invalid timezone {tz}: {e}"))?;
            scheduler.update_availability(&UserId::new(teacher), |a| {
                a.set_timezone(tz);
                Ok(())
            })?;
            0
        }
        Commands::ToggleDay { teacher, day } => {
            let day: Day = day.parse()?;
            let avail = scheduler.update_availability(&UserId::new(teacher), |a| {
                a.toggle_day(day);
                Ok(())
            })?;
            let state = if avail.day(day).enabled { "enabled" } else { "disabled" };
            println!("{day}: {state}");
            0
        }
        Commands::AddRange {
            teacher,
            day,
            start,
            end,
        } => {
            let day: Day = day.parse()?;
            let range = TimeRange::parse(&start, &end)?;
            scheduler.update_availability(&UserId::new(teacher), |a| a.add_range(day, range))?;
            0
        }
        Commands::UpdateRange {
            teacher,
            day,
            index,
            start,
            end,
        } => {
            let day: Day = day.parse()?;
            let range = TimeRange::parse(&start, &end)?;
            scheduler.update_availability(&UserId::new(teacher), |a| a.update_range(day, index, range))?;
            0
        }
        Commands::RemoveRange { teacher, day, index } => {
            let day: Day = day.parse()?;
            scheduler.update_availability(&UserId::new(teacher), |a| a.remove_range(day, index).map(|_| ()))?;
            0
        }
        Commands::CopyDay { teacher, from, to, all } => {
            let from: Day = from.parse()?;
            let to: Option<Day> = to.map(|d| d.parse()).transpose()?;
            if to.is_none() && !all {
                bail!("either --to or --all is required");
            }
            scheduler.update_availability(&UserId::new(teacher), |a| {
                match to {
                    Some(to) => a.copy_day_to_day(from, to),
                    None => a.copy_day_to_all_days(from),
                }
                Ok(())
            })?;
            0
        }
        Commands::ImportRanges { teacher, csv } => {
            let rows = io::import_ranges_csv(csv)?;
            scheduler.update_availability(&UserId::new(teacher), |a| {
                for (day, range) in rows {
                    a.add_range(day, range)?;
                }
                Ok(())
            })?;
            0
        }
        Commands::AddLesson {
            teacher,
            duration,
            price,
        } => {
            let lesson = LessonOffering::new(UserId::new(teacher), duration, price).map_err(anyhow::Error::msg)?;
            scheduler.store().save_lesson(&lesson)?;
            println!("{}", lesson.id);
            0
        }
        Commands::Slots { lesson, from, out_csv, .. } => {
            let from = match from {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d").with_context(|| format!("--from {raw}"))?,
                None => now.date_naive(),
            };
            let slots = scheduler.available_slots(&LessonId::new(lesson), from, now)?;
            if let Some(path) = out_csv {
                io::export_slots_csv(path, &slots)?;
            }
            for s in &slots {
                println!("{} → {}", s.start.to_rfc3339(), s.end.to_rfc3339());
            }
            0
        }
        Commands::Book { lesson, student, start } => {
            let slot = slot_for(&scheduler, &LessonId::new(lesson), &start)?;
            let booking = scheduler.request_booking(&slot, &UserId::new(student), now)?;
            println!("{}", booking.id);
            0
        }
        Commands::Decide {
            booking,
            teacher,
            reject,
        } => {
            let decision = if reject { Decision::Reject } else { Decision::Accept };
            let b = scheduler.decide(&BookingId::new(booking), &UserId::new(teacher), decision)?;
            println!("{} {}", b.id, b.status);
            0
        }
        Commands::Cancel { booking, actor } => {
            let b = scheduler.cancel(&BookingId::new(booking), &UserId::new(actor), now)?;
            println!("{} {}", b.id, b.status);
            0
        }
        Commands::Reschedule {
            booking,
            actor,
            lesson,
            start,
        } => {
            let booking = BookingId::new(booking);
            let lesson = match lesson {
                Some(id) => LessonId::new(id),
                None => scheduler
                    .store()
                    .load_booking(&booking)?
                    .map(|b| b.lesson_id)
                    .ok_or_else(|| anyhow!("unknown booking: {booking}"))?,
            };
            let slot = slot_for(&scheduler, &lesson, &start)?;
            let b = scheduler.reschedule(&booking, &UserId::new(actor), &slot, now)?;
            println!("{}", b.id);
            0
        }
        Commands::Complete { teacher } => {
            let done = scheduler.complete_elapsed(&UserId::new(teacher), now)?;
            println!("{} booking(s) completed", done.len());
            0
        }
        Commands::Bookings { teacher, out_csv } => {
            let bookings = scheduler.store().bookings(&UserId::new(teacher))?;
            if let Some(path) = out_csv {
                io::export_bookings_csv(path, &bookings)?;
            }
            // impression compacte
            for b in &bookings {
                println!(
                    "{} | {} → {} | {} | {}",
                    b.id,
                    b.start.to_rfc3339(),
                    b.end.to_rfc3339(),
                    b.student_id,
                    b.status
                );
            }
            0
        }
        Commands::Check { teacher, report } => {
            let conflicts = scheduler.detect_conflicts(&UserId::new(teacher))?;
            if conflicts.is_empty() {
                println!("OK: no conflicts");
                0
            } else {
                eprintln!("Found {} conflict(s)", conflicts.len());
                if let Some(path) = report {
                    let mut w = csv::Writer::from_path(path)?;
                    w.write_record(["teacher_id", "booking", "other", "kind"])?;
                    for c in &conflicts {
                        w.write_record([
                            c.teacher.as_str(),
                            c.booking.as_str(),
                            c.other.as_ref().map(|o| o.as_str()).unwrap_or(""),
                            match c.kind {
                                ConflictKind::Overlap => "overlap",
                                ConflictKind::OutsideAvailability => "outside",
                            },
                        ])?;
                    }
                    w.flush()?;
                }
                // Code 2 = WARNING/INCOMPLETE
                2
            }
        }
    };

    std::process::exit(code);
}

/// Créneau du cours `lesson` débutant à `start` (RFC3339).
fn slot_for<S: Storage>(scheduler: &Scheduler<S>, lesson: &LessonId, start: &str) -> Result<Slot> {
    let lesson = scheduler.lesson(lesson)?;
    let start: DateTime<Utc> = start.parse().with_context(|| format!("start {start}"))?;
    Ok(Slot {
        teacher_id: lesson.teacher_id.clone(),
        lesson_id: lesson.id.clone(),
        start,
        end: start + lesson.duration(),
    })
}
