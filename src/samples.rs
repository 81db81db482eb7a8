use crate::alphabet::Alphabet;
use crate::error::{check_confidence, Error, Result};
use crate::storage::{KeyValueStore, SAMPLES_KEY};
use crate::util::mean;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{info, warn};

pub const DEFAULT_MAX_SAMPLES: usize = 10;
pub const DEFAULT_THRESHOLD_FLOOR: f64 = 0.5;
pub const DEFAULT_THRESHOLD_FACTOR: f64 = 0.8;

/// One completed drawing check, as stored in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub character: char,
    pub confidence: f64,
    pub timestamp: DateTime<Local>,
    pub was_successful: bool,
    /// Opaque drawing payload, exactly as handed in by the caller
    pub drawing: Vec<u8>,
}

/// Which samples survive once a character's history is over capacity
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Keep the highest-confidence samples, regardless of age
    #[default]
    Confidence,
    /// Keep the newest samples
    Recency,
}

/// Bounded per-character history of drawing samples.
///
/// Each character's list is kept sorted by descending confidence. With the
/// default [`EvictionPolicy::Confidence`] it is a top-K set, so an old
/// high-confidence sample can outlive every newer attempt.
#[derive(Debug)]
pub struct SampleStore {
    alphabet: Alphabet,
    backend: Rc<dyn KeyValueStore>,
    samples: BTreeMap<char, Vec<Sample>>,
    max_samples: usize,
    eviction: EvictionPolicy,
    threshold_floor: f64,
    threshold_factor: f64,
}

impl SampleStore {
    /// Load the persisted history from `backend`.
    ///
    /// Undecodable data is replaced by an empty history and overwritten on
    /// the next save.
    pub fn new(alphabet: Alphabet, backend: Rc<dyn KeyValueStore>) -> Result<Self> {
        let samples = load_samples(&alphabet, &*backend)?;

        let mut store = Self {
            alphabet,
            backend,
            samples,
            max_samples: DEFAULT_MAX_SAMPLES,
            eviction: EvictionPolicy::default(),
            threshold_floor: DEFAULT_THRESHOLD_FLOOR,
            threshold_factor: DEFAULT_THRESHOLD_FACTOR,
        };
        store.enforce_capacity();
        Ok(store)
    }

    pub fn with_capacity(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(1);
        self.enforce_capacity();
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self.enforce_capacity();
        self
    }

    /// Threshold is `max(floor, factor * average)`; floor in `[0, 1]`, factor in `(0, 1]`
    pub fn with_threshold(mut self, floor: f64, factor: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&floor) {
            return Err(Error::InvalidConfig(format!(
                "threshold_floor {floor} is outside [0, 1]"
            )));
        }
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "threshold_factor {factor} is outside (0, 1]"
            )));
        }
        self.threshold_floor = floor;
        self.threshold_factor = factor;
        Ok(self)
    }

    pub fn record_sample(
        &mut self,
        character: char,
        drawing: Vec<u8>,
        confidence: f64,
        was_successful: bool,
    ) -> Result<()> {
        self.record_sample_at(character, drawing, confidence, was_successful, Local::now())
    }

    /// Record a sample with an explicit timestamp (imports, replays)
    pub fn record_sample_at(
        &mut self,
        character: char,
        drawing: Vec<u8>,
        confidence: f64,
        was_successful: bool,
        timestamp: DateTime<Local>,
    ) -> Result<()> {
        let character = self.alphabet.ensure(character)?;
        let confidence = check_confidence(confidence)?;

        let mut history = self.samples.get(&character).cloned().unwrap_or_default();
        history.push(Sample {
            character,
            confidence,
            timestamp,
            was_successful,
            drawing,
        });
        evict(&mut history, self.max_samples, self.eviction);

        self.replace_history(character, history)
    }

    /// Persist `history` as the whole history of `character`, then adopt it.
    ///
    /// Memory is left untouched when the save fails.
    pub(crate) fn replace_history(&mut self, character: char, history: Vec<Sample>) -> Result<()> {
        let mut updated = self.samples.clone();
        if history.is_empty() {
            updated.remove(&character);
        } else {
            updated.insert(character, history);
        }
        save_samples(&*self.backend, &updated)?;
        self.samples = updated;
        Ok(())
    }

    /// The stored history for `character`, highest confidence first
    pub fn samples(&self, character: char) -> Result<&[Sample]> {
        let character = self.alphabet.ensure(character)?;
        Ok(self
            .samples
            .get(&character)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Mean confidence of the successful samples, `None` when there are none
    pub fn average_confidence(&self, character: char) -> Result<Option<f64>> {
        let confidences: Vec<f64> = self
            .samples(character)?
            .iter()
            .filter(|s| s.was_successful)
            .map(|s| s.confidence)
            .collect();

        Ok(mean(&confidences))
    }

    /// Minimum confidence a candidate needs to be considered for `character`
    pub fn adaptive_threshold(&self, character: char) -> Result<f64> {
        let threshold = match self.average_confidence(character)? {
            Some(avg) => (avg * self.threshold_factor).max(self.threshold_floor),
            None => self.threshold_floor,
        };
        Ok(threshold.min(1.0))
    }

    /// Drop every character's history
    pub fn clear(&mut self) -> Result<()> {
        save_samples(&*self.backend, &BTreeMap::new())?;
        self.samples.clear();
        info!("cleared handwriting sample history");
        Ok(())
    }

    fn enforce_capacity(&mut self) {
        for history in self.samples.values_mut() {
            evict(history, self.max_samples, self.eviction);
        }
    }

}

fn save_samples(backend: &dyn KeyValueStore, samples: &BTreeMap<char, Vec<Sample>>) -> Result<()> {
    let data = serde_json::to_vec(samples)?;
    backend.save(SAMPLES_KEY, &data)
}

fn evict(history: &mut Vec<Sample>, max_samples: usize, eviction: EvictionPolicy) {
    if eviction == EvictionPolicy::Recency && history.len() > max_samples {
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history.truncate(max_samples);
    }
    history.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    history.truncate(max_samples);
}

fn load_samples(
    alphabet: &Alphabet,
    backend: &dyn KeyValueStore,
) -> Result<BTreeMap<char, Vec<Sample>>> {
    let Some(bytes) = backend.load(SAMPLES_KEY)? else {
        return Ok(BTreeMap::new());
    };

    let mut samples: BTreeMap<char, Vec<Sample>> = match serde_json::from_slice(&bytes) {
        Ok(samples) => samples,
        Err(e) => {
            warn!(error = %e, "sample history is corrupt, starting from an empty history");
            return Ok(BTreeMap::new());
        }
    };

    samples.retain(|character, history| {
        if !alphabet.contains(*character) {
            warn!(%character, "dropping samples for a character outside the alphabet");
            return false;
        }
        history.retain(|s| s.character == *character && check_confidence(s.confidence).is_ok());
        !history.is_empty()
    });

    Ok(samples)
}
