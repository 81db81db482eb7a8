use crate::alphabet::Alphabet;
use crate::error::Result;
use crate::storage::{KeyValueStore, PROGRESS_KEY};
use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{info, warn};

/// Attempt counters for one character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub character: char,
    pub attempts: u32,
    pub successful_attempts: u32,
    pub last_attempt: DateTime<Local>,
}

impl Progress {
    fn first_attempt(character: char, at: DateTime<Local>) -> Self {
        Self {
            character,
            attempts: 0,
            successful_attempts: 0,
            last_attempt: at,
        }
    }

    /// Share of successful attempts; 0 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successful_attempts as f64 / self.attempts as f64
        }
    }
}

/// Window of recent activity used to filter progress records
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum_macros::Display)]
pub enum TimeRange {
    Week,
    Month,
    #[default]
    All,
}

impl TimeRange {
    /// Whether a record last touched at `last_attempt` falls inside the window ending at `now`
    pub fn contains(&self, last_attempt: DateTime<Local>, now: DateTime<Local>) -> bool {
        match self {
            TimeRange::Week => last_attempt > now - Duration::days(7),
            TimeRange::Month => last_attempt > now - Duration::days(30),
            TimeRange::All => true,
        }
    }
}

/// Per-character attempt history and next-character selection
#[derive(Debug)]
pub struct ProgressTracker {
    alphabet: Alphabet,
    backend: Rc<dyn KeyValueStore>,
    records: BTreeMap<char, Progress>,
}

impl ProgressTracker {
    /// Load persisted progress from `backend`; undecodable data counts as no progress
    pub fn new(alphabet: Alphabet, backend: Rc<dyn KeyValueStore>) -> Result<Self> {
        let records = load_progress(&alphabet, &*backend)?;
        Ok(Self {
            alphabet,
            backend,
            records,
        })
    }

    pub fn record_attempt(&mut self, character: char, was_successful: bool) -> Result<()> {
        self.record_attempt_at(character, was_successful, Local::now())
    }

    pub fn record_attempt_at(
        &mut self,
        character: char,
        was_successful: bool,
        at: DateTime<Local>,
    ) -> Result<()> {
        let character = self.alphabet.ensure(character)?;

        let mut record = self
            .records
            .get(&character)
            .cloned()
            .unwrap_or_else(|| Progress::first_attempt(character, at));
        record.attempts = record.attempts.saturating_add(1);
        if was_successful {
            record.successful_attempts = record.successful_attempts.saturating_add(1);
        }
        record.last_attempt = at;

        let mut updated = self.records.clone();
        updated.insert(character, record);
        save_progress(&*self.backend, &updated)?;
        self.records = updated;
        Ok(())
    }

    pub fn progress(&self, character: char) -> Result<Option<&Progress>> {
        let character = self.alphabet.ensure(character)?;
        Ok(self.records.get(&character))
    }

    /// Every recorded character, in alphabet order
    pub fn all_progress(&self) -> Vec<&Progress> {
        self.alphabet
            .characters()
            .iter()
            .filter_map(|c| self.records.get(c))
            .collect()
    }

    /// The character to practice next.
    ///
    /// The first never-attempted character in alphabet order wins. Once all
    /// have been tried, the lowest success rate wins, ties going to the
    /// character that comes first in the alphabet.
    pub fn next_recommended(&self) -> char {
        let characters = self.alphabet.characters();

        if let Some(&untried) = characters.iter().find(|&&c| !self.records.contains_key(&c)) {
            return untried;
        }

        // min_by keeps the first of equal elements, so alphabet order breaks ties
        self.all_progress()
            .into_iter()
            .min_by(|a, b| a.success_rate().total_cmp(&b.success_rate()))
            .map(|p| p.character)
            .unwrap_or_else(|| self.alphabet.first())
    }

    /// Forget every progress record
    pub fn reset(&mut self) -> Result<()> {
        save_progress(&*self.backend, &BTreeMap::new())?;
        self.records.clear();
        info!("reset letter progress");
        Ok(())
    }
}

fn save_progress(backend: &dyn KeyValueStore, records: &BTreeMap<char, Progress>) -> Result<()> {
    let data = serde_json::to_vec(records)?;
    backend.save(PROGRESS_KEY, &data)
}

fn load_progress(
    alphabet: &Alphabet,
    backend: &dyn KeyValueStore,
) -> Result<BTreeMap<char, Progress>> {
    let Some(bytes) = backend.load(PROGRESS_KEY)? else {
        return Ok(BTreeMap::new());
    };

    let mut records: BTreeMap<char, Progress> = match serde_json::from_slice(&bytes) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "letter progress is corrupt, starting from scratch");
            return Ok(BTreeMap::new());
        }
    };

    records.retain(|character, record| {
        if !alphabet.contains(*character) || record.character != *character {
            warn!(%character, "dropping progress for a character outside the alphabet");
            return false;
        }
        record.successful_attempts = record.successful_attempts.min(record.attempts);
        true
    });

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{FailingStore, MemoryStore};
    use assert_matches::assert_matches;

    fn create_test_tracker(letters: &str) -> (Rc<MemoryStore>, ProgressTracker) {
        let backend = Rc::new(MemoryStore::new());
        let alphabet = Alphabet::new("test", letters.chars()).unwrap();
        let tracker = ProgressTracker::new(alphabet, backend.clone()).unwrap();
        (backend, tracker)
    }

    fn record(tracker: &mut ProgressTracker, c: char, successes: u32, attempts: u32) {
        for i in 0..attempts {
            tracker.record_attempt(c, i < successes).unwrap();
        }
    }

    #[test]
    fn test_success_rate() {
        let now = Local::now();
        let mut p = Progress::first_attempt('A', now);
        assert_eq!(p.success_rate(), 0.0);

        p.attempts = 4;
        p.successful_attempts = 3;
        assert_eq!(p.success_rate(), 0.75);
    }

    #[test]
    fn test_record_attempt_creates_and_updates() {
        let (_, mut tracker) = create_test_tracker("ABC");

        assert_eq!(tracker.progress('A').unwrap(), None);

        tracker.record_attempt('A', true).unwrap();
        tracker.record_attempt('A', false).unwrap();

        let p = tracker.progress('A').unwrap().unwrap();
        assert_eq!(p.attempts, 2);
        assert_eq!(p.successful_attempts, 1);
        assert_eq!(p.character, 'A');
    }

    #[test]
    fn test_last_attempt_is_stamped() {
        let (_, mut tracker) = create_test_tracker("ABC");
        let earlier = Local::now() - Duration::days(3);
        let later = Local::now();

        tracker.record_attempt_at('B', true, earlier).unwrap();
        tracker.record_attempt_at('B', true, later).unwrap();

        assert_eq!(tracker.progress('B').unwrap().unwrap().last_attempt, later);
    }

    #[test]
    fn test_unknown_character_rejected() {
        let (_, mut tracker) = create_test_tracker("ABC");

        assert_matches!(
            tracker.record_attempt('Q', true),
            Err(Error::UnknownCharacter('Q'))
        );
        assert_matches!(tracker.progress('Q'), Err(Error::UnknownCharacter('Q')));
        assert!(tracker.all_progress().is_empty());
    }

    #[test]
    fn test_next_recommended_fresh_tracker() {
        let (_, tracker) = create_test_tracker("ABC");

        assert_eq!(tracker.next_recommended(), 'A');
    }

    #[test]
    fn test_next_recommended_walks_untried_in_order() {
        let (_, mut tracker) = create_test_tracker("ABC");

        tracker.record_attempt('A', false).unwrap();
        assert_eq!(tracker.next_recommended(), 'B');

        tracker.record_attempt('C', true).unwrap();
        assert_eq!(tracker.next_recommended(), 'B');
    }

    #[test]
    fn test_next_recommended_lowest_success_rate() {
        let (_, mut tracker) = create_test_tracker("ABC");

        record(&mut tracker, 'A', 3, 4);
        record(&mut tracker, 'B', 1, 4);
        record(&mut tracker, 'C', 2, 4);

        assert_eq!(tracker.next_recommended(), 'B');
    }

    #[test]
    fn test_next_recommended_ties_follow_alphabet_order() {
        let (_, mut tracker) = create_test_tracker("ŠAB");

        record(&mut tracker, 'B', 1, 2);
        record(&mut tracker, 'A', 1, 2);
        record(&mut tracker, 'Š', 1, 2);

        // Š sorts last by code point but comes first in this alphabet
        assert_eq!(tracker.next_recommended(), 'Š');
    }

    #[test]
    fn test_all_progress_in_alphabet_order() {
        let (_, mut tracker) = create_test_tracker("ČAB");

        tracker.record_attempt('B', true).unwrap();
        tracker.record_attempt('Č', true).unwrap();

        let order: Vec<char> = tracker.all_progress().iter().map(|p| p.character).collect();
        assert_eq!(order, vec!['Č', 'B']);
    }

    #[test]
    fn test_progress_persists_through_backend() {
        let (backend, mut tracker) = create_test_tracker("ABC");
        record(&mut tracker, 'C', 2, 3);

        let alphabet = Alphabet::new("test", "ABC".chars()).unwrap();
        let reloaded = ProgressTracker::new(alphabet, backend).unwrap();

        let p = reloaded.progress('C').unwrap().unwrap();
        assert_eq!((p.successful_attempts, p.attempts), (2, 3));
    }

    #[test]
    fn test_corrupt_progress_loads_empty() {
        let backend = Rc::new(MemoryStore::new());
        backend.insert(PROGRESS_KEY, b"[1, 2".to_vec());
        let alphabet = Alphabet::new("test", "AB".chars()).unwrap();

        let tracker = ProgressTracker::new(alphabet, backend).unwrap();

        assert!(tracker.all_progress().is_empty());
        assert_eq!(tracker.next_recommended(), 'A');
    }

    #[test]
    fn test_reset() {
        let (backend, mut tracker) = create_test_tracker("AB");
        record(&mut tracker, 'A', 1, 1);
        record(&mut tracker, 'B', 1, 1);

        tracker.reset().unwrap();

        assert!(tracker.all_progress().is_empty());
        assert_eq!(tracker.next_recommended(), 'A');
        let alphabet = Alphabet::new("test", "AB".chars()).unwrap();
        let reloaded = ProgressTracker::new(alphabet, backend).unwrap();
        assert!(reloaded.all_progress().is_empty());
    }

    #[test]
    fn test_time_range() {
        let now = Local::now();

        assert!(TimeRange::Week.contains(now - Duration::days(6), now));
        assert!(!TimeRange::Week.contains(now - Duration::days(8), now));
        assert!(TimeRange::Month.contains(now - Duration::days(29), now));
        assert!(!TimeRange::Month.contains(now - Duration::days(31), now));
        assert!(TimeRange::All.contains(now - Duration::days(3650), now));
    }

    #[test]
    fn test_failed_save_leaves_records_unchanged() {
        let backend = Rc::new(FailingStore::new());
        let alphabet = Alphabet::new("test", "AB".chars()).unwrap();
        let mut tracker = ProgressTracker::new(alphabet, backend.clone()).unwrap();
        tracker.record_attempt('A', true).unwrap();

        backend.fail_saves_for(PROGRESS_KEY);
        assert_matches!(tracker.record_attempt('A', false), Err(Error::Io(_)));
        assert_matches!(tracker.record_attempt('B', true), Err(Error::Io(_)));
        assert_matches!(tracker.reset(), Err(Error::Io(_)));

        let a = tracker.progress('A').unwrap().unwrap();
        assert_eq!((a.successful_attempts, a.attempts), (1, 1));
        assert_eq!(tracker.progress('B').unwrap(), None);
        assert_eq!(tracker.next_recommended(), 'B');
    }
}
