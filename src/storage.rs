//! Persistance des disponibilités, offres et réservations.
//!
//! Le moteur ne manipule les réservations qu'à travers les primitives
//! atomiques de [`Storage`] : la re-vérification du chevauchement et
//! l'écriture se font sous le même verrou (par professeur en mémoire, par
//! fichier pour le registre JSON).

use crate::availability::WeeklyAvailability;
use crate::model::{Booking, BookingId, BookingStatus, LessonId, LessonOffering, UserId};
use crate::scheduler::util;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use fd_lock::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Résultat d'une écriture conditionnelle sur les réservations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    /// Écriture effectuée ; porte la réservation écrite.
    Done(Booking),
    /// Une réservation active occupe déjà l'intervalle.
    Conflict(BookingId),
    /// Le statut courant ne correspond pas au statut attendu.
    Stale(Booking),
    Missing,
}

pub trait Storage: Send + Sync {
    fn load_availability(&self, teacher: &UserId) -> anyhow::Result<Option<WeeklyAvailability>>;
    /// Remplace l'enregistrement du professeur.
    fn save_availability(&self, avail: &WeeklyAvailability) -> anyhow::Result<()>;

    fn load_lesson(&self, id: &LessonId) -> anyhow::Result<Option<LessonOffering>>;
    fn save_lesson(&self, lesson: &LessonOffering) -> anyhow::Result<()>;

    fn load_booking(&self, id: &BookingId) -> anyhow::Result<Option<Booking>>;
    /// Toutes les réservations du professeur, triées par début.
    fn bookings(&self, teacher: &UserId) -> anyhow::Result<Vec<Booking>>;
    /// Réservations `pending`/`confirmed` du professeur qui chevauchent
    /// `window` (toutes si `None`).
    fn active_bookings(
        &self,
        teacher: &UserId,
        window: Option<&Range<DateTime<Utc>>>,
    ) -> anyhow::Result<Vec<Booking>>;

    /// Insère `booking` si aucune réservation active du même professeur ne le
    /// chevauche. Atomique vis-à-vis des autres écritures sur ce professeur.
    fn insert_if_no_overlap(&self, booking: &Booking) -> anyhow::Result<Commit>;
    /// Compare-and-set du statut.
    fn set_status(&self, id: &BookingId, expected: BookingStatus, next: BookingStatus) -> anyhow::Result<Commit>;
    /// Annule `old` (attendu dans le statut `expected`) et insère
    /// `replacement` en une seule opération ; `old` est ignoré pour le test de
    /// chevauchement.
    fn replace_booking(
        &self,
        old: &BookingId,
        expected: BookingStatus,
        replacement: &Booking,
    ) -> anyhow::Result<Commit>;
}

// ── Primitives partagées, appelées sous verrou ─────────────────────────────

fn commit_insert(bookings: &mut Vec<Booking>, booking: &Booking, ignore: Option<&BookingId>) -> Commit {
    let same_teacher = bookings
        .iter()
        .filter(|b| b.teacher_id == booking.teacher_id && Some(&b.id) != ignore);
    if let Some(taken) = util::first_blocking(same_teacher, booking.start, booking.end) {
        return Commit::Conflict(taken.id.clone());
    }
    bookings.push(booking.clone());
    Commit::Done(booking.clone())
}

fn commit_status(bookings: &mut [Booking], id: &BookingId, expected: BookingStatus, next: BookingStatus) -> Commit {
    let Some(current) = bookings.iter_mut().find(|b| &b.id == id) else {
        return Commit::Missing;
    };
    if current.status != expected {
        return Commit::Stale(current.clone());
    }
    current.status = next;
    Commit::Done(current.clone())
}

fn commit_replace(
    bookings: &mut Vec<Booking>,
    old: &BookingId,
    expected: BookingStatus,
    replacement: &Booking,
) -> Commit {
    let Some(pos) = bookings.iter().position(|b| &b.id == old) else {
        return Commit::Missing;
    };
    if bookings[pos].status != expected {
        return Commit::Stale(bookings[pos].clone());
    }
    match commit_insert(bookings, replacement, Some(old)) {
        Commit::Done(inserted) => {
            bookings[pos].status = BookingStatus::Cancelled;
            Commit::Done(inserted)
        }
        other => other,
    }
}

fn sorted_active(bookings: &[Booking], window: Option<&Range<DateTime<Utc>>>) -> Vec<Booking> {
    let mut out: Vec<Booking> = bookings
        .iter()
        .filter(|b| b.status.is_active())
        .filter(|b| window.map_or(true, |w| b.overlaps(w.start, w.end)))
        .cloned()
        .collect();
    out.sort_by_key(|b| b.start);
    out
}

// ── Mémoire ────────────────────────────────────────────────────────────────

type Partition = Arc<Mutex<Vec<Booking>>>;

/// Stockage en mémoire ; les réservations sont partitionnées par professeur,
/// chaque partition derrière son propre verrou.
#[derive(Default)]
pub struct MemoryStorage {
    availability: DashMap<UserId, WeeklyAvailability>,
    lessons: DashMap<LessonId, LessonOffering>,
    bookings: DashMap<UserId, Partition>,
    owners: DashMap<BookingId, UserId>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, teacher: &UserId) -> Partition {
        self.bookings.entry(teacher.clone()).or_default().value().clone()
    }

    fn owned_partition(&self, id: &BookingId) -> Option<Partition> {
        let teacher = self.owners.get(id).map(|e| e.value().clone())?;
        Some(self.partition(&teacher))
    }
}

fn lock(partition: &Partition) -> anyhow::Result<std::sync::MutexGuard<'_, Vec<Booking>>> {
    partition.lock().map_err(|_| anyhow!("booking partition lock poisoned"))
}

impl Storage for MemoryStorage {
    fn load_availability(&self, teacher: &UserId) -> anyhow::Result<Option<WeeklyAvailability>> {
        Ok(self.availability.get(teacher).map(|e| e.value().clone()))
    }

    fn save_availability(&self, avail: &WeeklyAvailability) -> anyhow::Result<()> {
        self.availability.insert(avail.teacher_id.clone(), avail.clone());
        Ok(())
    }

    fn load_lesson(&self, id: &LessonId) -> anyhow::Result<Option<LessonOffering>> {
        Ok(self.lessons.get(id).map(|e| e.value().clone()))
    }

    fn save_lesson(&self, lesson: &LessonOffering) -> anyhow::Result<()> {
        self.lessons.insert(lesson.id.clone(), lesson.clone());
        Ok(())
    }

    fn load_booking(&self, id: &BookingId) -> anyhow::Result<Option<Booking>> {
        let Some(partition) = self.owned_partition(id) else {
            return Ok(None);
        };
        let guard = lock(&partition)?;
        Ok(guard.iter().find(|b| &b.id == id).cloned())
    }

    fn bookings(&self, teacher: &UserId) -> anyhow::Result<Vec<Booking>> {
        let partition = self.partition(teacher);
        let mut out = lock(&partition)?.clone();
        out.sort_by_key(|b| b.start);
        Ok(out)
    }

    fn active_bookings(
        &self,
        teacher: &UserId,
        window: Option<&Range<DateTime<Utc>>>,
    ) -> anyhow::Result<Vec<Booking>> {
        let partition = self.partition(teacher);
        let guard = lock(&partition)?;
        Ok(sorted_active(&guard, window))
    }

    fn insert_if_no_overlap(&self, booking: &Booking) -> anyhow::Result<Commit> {
        let partition = self.partition(&booking.teacher_id);
        let mut guard = lock(&partition)?;
        let outcome = commit_insert(&mut guard, booking, None);
        if let Commit::Done(inserted) = &outcome {
            self.owners.insert(inserted.id.clone(), inserted.teacher_id.clone());
        }
        Ok(outcome)
    }

    fn set_status(&self, id: &BookingId, expected: BookingStatus, next: BookingStatus) -> anyhow::Result<Commit> {
        let Some(partition) = self.owned_partition(id) else {
            return Ok(Commit::Missing);
        };
        let mut guard = lock(&partition)?;
        Ok(commit_status(&mut guard, id, expected, next))
    }

    fn replace_booking(
        &self,
        old: &BookingId,
        expected: BookingStatus,
        replacement: &Booking,
    ) -> anyhow::Result<Commit> {
        let Some(partition) = self.owned_partition(old) else {
            return Ok(Commit::Missing);
        };
        let mut guard = lock(&partition)?;
        if guard.iter().any(|b| &b.id == old && b.teacher_id != replacement.teacher_id) {
            return Err(anyhow!("replacement for {old} targets another teacher"));
        }
        let outcome = commit_replace(&mut guard, old, expected, replacement);
        if let Commit::Done(inserted) = &outcome {
            self.owners.insert(inserted.id.clone(), inserted.teacher_id.clone());
        }
        Ok(outcome)
    }
}

// ── Fichier JSON ───────────────────────────────────────────────────────────

/// Contenu complet du registre JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub availability: Vec<WeeklyAvailability>,
    #[serde(default)]
    pub lessons: Vec<LessonOffering>,
    #[serde(default)]
    pub bookings: Vec<Booking>,
}

/// Registre sur un fichier JSON unique. Chaque écriture recharge le fichier,
/// vérifie puis sauvegarde de manière atomique, le tout sous un verrou
/// exclusif sur `<store>.lock`, partagé entre processus. Les lectures
/// prennent ce verrou en mode partagé.
pub struct JsonStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Charge le registre ; un fichier absent donne un registre vide. Ne
    /// prend aucun verrou.
    pub fn load(&self) -> anyhow::Result<Ledger> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Ledger::default()),
            Err(err) => return Err(err).with_context(|| format!("reading {}", self.path.display())),
        };
        let ledger: Ledger = serde_json::from_slice(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        for avail in &ledger.availability {
            avail
                .validate()
                .with_context(|| format!("availability of teacher {}", avail.teacher_id))?;
        }
        Ok(ledger)
    }

    /// Sauvegarde de manière atomique, sans verrou.
    pub fn save(&self, ledger: &Ledger) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(ledger)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| "atomic rename")?;
        Ok(())
    }

    /// Fichier verrou à côté du registre (`<store>.lock`).
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    // Verrou consultatif inter-processus ; relâché quand la garde tombe.
    fn file_lock(&self) -> anyhow::Result<RwLock<File>> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(RwLock::new(file))
    }

    fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> anyhow::Result<T> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        let file = self.file_lock()?;
        let _shared = file.read().with_context(|| "locking ledger for reading")?;
        Ok(f(&self.load()?))
    }

    /// Charge, applique `f`, puis sauvegarde si `f` a effectué une écriture.
    fn write(&self, f: impl FnOnce(&mut Ledger) -> Commit) -> anyhow::Result<Commit> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        let mut file = self.file_lock()?;
        let _exclusive = file.write().with_context(|| "locking ledger for writing")?;
        let mut ledger = self.load()?;
        let outcome = f(&mut ledger);
        if matches!(outcome, Commit::Done(_)) {
            self.save(&ledger)?;
        }
        Ok(outcome)
    }

    fn upsert(&self, f: impl FnOnce(&mut Ledger)) -> anyhow::Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        let mut file = self.file_lock()?;
        let _exclusive = file.write().with_context(|| "locking ledger for writing")?;
        let mut ledger = self.load()?;
        f(&mut ledger);
        self.save(&ledger)
    }
}

impl Storage for JsonStorage {
    fn load_availability(&self, teacher: &UserId) -> anyhow::Result<Option<WeeklyAvailability>> {
        self.read(|l| l.availability.iter().find(|a| &a.teacher_id == teacher).cloned())
    }

    fn save_availability(&self, avail: &WeeklyAvailability) -> anyhow::Result<()> {
        self.upsert(|l| match l.availability.iter_mut().find(|a| a.teacher_id == avail.teacher_id) {
            Some(slot) => *slot = avail.clone(),
            None => l.availability.push(avail.clone()),
        })
    }

    fn load_lesson(&self, id: &LessonId) -> anyhow::Result<Option<LessonOffering>> {
        self.read(|l| l.lessons.iter().find(|x| &x.id == id).cloned())
    }

    fn save_lesson(&self, lesson: &LessonOffering) -> anyhow::Result<()> {
        self.upsert(|l| match l.lessons.iter_mut().find(|x| x.id == lesson.id) {
            Some(slot) => *slot = lesson.clone(),
            None => l.lessons.push(lesson.clone()),
        })
    }

    fn load_booking(&self, id: &BookingId) -> anyhow::Result<Option<Booking>> {
        self.read(|l| l.bookings.iter().find(|b| &b.id == id).cloned())
    }

    fn bookings(&self, teacher: &UserId) -> anyhow::Result<Vec<Booking>> {
        self.read(|l| {
            let mut out: Vec<Booking> = l
                .bookings
                .iter()
                .filter(|b| &b.teacher_id == teacher)
                .cloned()
                .collect();
            out.sort_by_key(|b| b.start);
            out
        })
    }

    fn active_bookings(
        &self,
        teacher: &UserId,
        window: Option<&Range<DateTime<Utc>>>,
    ) -> anyhow::Result<Vec<Booking>> {
        self.read(|l| {
            let mine: Vec<Booking> = l
                .bookings
                .iter()
                .filter(|b| &b.teacher_id == teacher)
                .cloned()
                .collect();
            sorted_active(&mine, window)
        })
    }

    fn insert_if_no_overlap(&self, booking: &Booking) -> anyhow::Result<Commit> {
        self.write(|l| commit_insert(&mut l.bookings, booking, None))
    }

    fn set_status(&self, id: &BookingId, expected: BookingStatus, next: BookingStatus) -> anyhow::Result<Commit> {
        self.write(|l| commit_status(&mut l.bookings, id, expected, next))
    }

    fn replace_booking(
        &self,
        old: &BookingId,
        expected: BookingStatus,
        replacement: &Booking,
    ) -> anyhow::Result<Commit> {
        self.write(|l| commit_replace(&mut l.bookings, old, expected, replacement))
    }
}
