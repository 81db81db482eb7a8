use crate::alphabet::Alphabet;
use crate::candidates::{best_candidate, Candidate};
use crate::config::EngineConfig;
use crate::error::{check_confidence, Result};
use crate::progress::{Progress, ProgressTracker, TimeRange};
use crate::samples::SampleStore;
use crate::storage::KeyValueStore;
use crate::validator::{MatchRule, Validator};
use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{info, warn};

/// What to do with a check that produced no usable candidate
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnrecognizedPolicy {
    /// Count it as a failed attempt
    #[default]
    CountAsFailure,
    /// Leave progress untouched
    Skip,
}

/// Result of checking one drawing
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub accepted: bool,
    /// Candidate text that was accepted
    pub matched_text: Option<String>,
    /// Candidate text that reached validation, accepted or not
    pub recognized_text: Option<String>,
    pub confidence: Option<f64>,
    pub rule: Option<MatchRule>,
}

impl AttemptOutcome {
    fn unrecognized() -> Self {
        Self {
            accepted: false,
            matched_text: None,
            recognized_text: None,
            confidence: None,
            rule: None,
        }
    }
}

/// Progress of one character together with its sample confidence
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterSummary {
    pub character: char,
    pub attempts: u32,
    pub successful_attempts: u32,
    pub last_attempt: DateTime<Local>,
    /// Mean confidence of the successful samples, `None` without any
    pub average_confidence: Option<f64>,
}

impl CharacterSummary {
    fn new(progress: &Progress, average_confidence: Option<f64>) -> Self {
        Self {
            character: progress.character,
            attempts: progress.attempts,
            successful_attempts: progress.successful_attempts,
            last_attempt: progress.last_attempt,
            average_confidence,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successful_attempts as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub overall_success_rate: f64,
    /// Attempted characters, in alphabet order
    pub per_character: Vec<CharacterSummary>,
    pub best_characters: Vec<CharacterSummary>,
    pub weakest_characters: Vec<CharacterSummary>,
}

/// Handwriting practice engine: one learner, one alphabet, one backend.
///
/// Sample history and progress live in two independent stores; `submit_attempt`
/// is the only place that keeps them in step. Writes take `&mut self`, so
/// sharing an engine across threads means putting it behind a lock.
#[derive(Debug)]
pub struct Engine {
    alphabet: Alphabet,
    config: EngineConfig,
    validator: Validator<'static>,
    samples: SampleStore,
    progress: ProgressTracker,
}

impl Engine {
    /// Build an engine for the configured built-in alphabet
    pub fn new(config: EngineConfig, backend: Rc<dyn KeyValueStore>) -> Result<Self> {
        let alphabet = config.alphabet.load()?;
        Self::with_alphabet(alphabet, config, backend)
    }

    pub fn with_alphabet(
        alphabet: Alphabet,
        config: EngineConfig,
        backend: Rc<dyn KeyValueStore>,
    ) -> Result<Self> {
        config.validate()?;

        let samples = SampleStore::new(alphabet.clone(), backend.clone())?
            .with_capacity(config.max_samples_per_character)
            .with_eviction(config.eviction)
            .with_threshold(config.threshold_floor, config.threshold_factor)?;
        let progress = ProgressTracker::new(alphabet.clone(), backend)?;

        Ok(Self {
            alphabet,
            config,
            validator: Validator::default(),
            samples,
            progress,
        })
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn next_recommended(&self) -> char {
        self.progress.next_recommended()
    }

    /// Check one drawing of `character` against the recognizer's candidates.
    ///
    /// `None` means the recognizer gave no result at all; it is handled like
    /// an empty list. A surviving candidate is stored as a sample and counted
    /// as an attempt. Without one, nothing is sampled and the attempt is
    /// counted as a failure unless the config says to skip it.
    pub fn submit_attempt(
        &mut self,
        character: char,
        drawing: Vec<u8>,
        candidates: Option<&[Candidate]>,
    ) -> Result<AttemptOutcome> {
        let character = self.alphabet.ensure(character)?;
        let candidates = candidates.unwrap_or_default();
        for candidate in candidates {
            check_confidence(candidate.confidence)?;
        }

        let threshold = self.samples.adaptive_threshold(character)?;
        let Some(best) = best_candidate(candidates, threshold) else {
            if self.config.unrecognized == UnrecognizedPolicy::CountAsFailure {
                self.progress.record_attempt(character, false)?;
            }
            info!(%character, threshold, "no usable candidate");
            return Ok(AttemptOutcome::unrecognized());
        };

        let rule = self.validator.matching_rule(&best.text, character);
        let accepted = rule.is_some();

        let previous_history = self.samples.samples(character)?.to_vec();
        self.samples
            .record_sample(character, drawing, best.confidence, accepted)?;
        if let Err(e) = self.progress.record_attempt(character, accepted) {
            // Keep the two stores in step: the attempt counts in neither
            if let Err(rollback) = self.samples.replace_history(character, previous_history) {
                warn!(%character, error = %rollback, "could not roll back sample history");
            }
            return Err(e);
        }

        info!(
            %character,
            recognized = %best.text,
            confidence = best.confidence,
            accepted,
            "recorded attempt"
        );

        Ok(AttemptOutcome {
            accepted,
            matched_text: accepted.then(|| best.text.clone()),
            recognized_text: Some(best.text),
            confidence: Some(best.confidence),
            rule,
        })
    }

    pub fn statistics(&self) -> Statistics {
        self.statistics_within(TimeRange::All)
    }

    /// Statistics over characters last attempted within `range`.
    ///
    /// Unlike a chart filter, the range applies to every figure: characters
    /// outside it are left out of `per_character`, the overall success rate
    /// and both rankings. `statistics()` is the same call with
    /// [`TimeRange::All`].
    pub fn statistics_within(&self, range: TimeRange) -> Statistics {
        let now = Local::now();
        let per_character: Vec<CharacterSummary> = self
            .progress
            .all_progress()
            .into_iter()
            .filter(|p| range.contains(p.last_attempt, now))
            .map(|p| {
                let average = self.samples.average_confidence(p.character).ok().flatten();
                CharacterSummary::new(p, average)
            })
            .collect();

        let (attempts, successes) = per_character.iter().fold((0u64, 0u64), |(a, s), p| {
            (a + p.attempts as u64, s + p.successful_attempts as u64)
        });
        let overall_success_rate = if attempts == 0 {
            0.0
        } else {
            successes as f64 / attempts as f64
        };

        let ranked: Vec<&CharacterSummary> = per_character
            .iter()
            .filter(|p| p.attempts >= self.config.min_attempts_for_ranking)
            .collect();
        // Stable sorts over alphabet-ordered input, so ties stay in alphabet order
        let best_characters = ranked
            .iter()
            .sorted_by(|a, b| b.success_rate().total_cmp(&a.success_rate()))
            .take(self.config.ranking_size)
            .map(|p| (*p).clone())
            .collect();
        let weakest_characters = ranked
            .iter()
            .sorted_by(|a, b| a.success_rate().total_cmp(&b.success_rate()))
            .take(self.config.ranking_size)
            .map(|p| (*p).clone())
            .collect();

        Statistics {
            overall_success_rate,
            per_character,
            best_characters,
            weakest_characters,
        }
    }

    /// Clear sample history and progress for every character
    pub fn reset_all(&mut self) -> Result<()> {
        self.samples.clear()?;
        self.progress.reset()?;
        info!("reset all practice data");
        Ok(())
    }
}
