use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::candidates::Candidate;
use crate::engine::{AttemptOutcome, Engine};
use crate::error::Result;

/// What a recognizer reports for one drawing
#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionOutcome {
    Candidates(Vec<Candidate>),
    /// The recognizer failed or found nothing
    NoResult,
}

struct Delivery {
    ticket: u64,
    outcome: RecognitionOutcome,
}

/// One-shot handle a recognizer uses to report back.
///
/// Completing consumes the handle. Dropping it without completing reports
/// [`RecognitionOutcome::NoResult`], so every request gets exactly one answer.
pub struct Completion {
    ticket: u64,
    tx: Option<Sender<Delivery>>,
}

impl Completion {
    pub fn complete(mut self, outcome: RecognitionOutcome) {
        self.deliver(outcome);
    }

    fn deliver(&mut self, outcome: RecognitionOutcome) {
        if let Some(tx) = self.tx.take() {
            // The session may be gone; nobody is left to care
            let _ = tx.send(Delivery {
                ticket: self.ticket,
                outcome,
            });
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.deliver(RecognitionOutcome::NoResult);
    }
}

/// Handwriting recognizer boundary.
///
/// Implementations may answer inline or hand the completion to another
/// thread; the session waits either way.
pub trait Recognizer {
    fn recognize(&self, drawing: &[u8], completion: Completion);
}

/// Recognizer that answers every request with the same outcome
#[derive(Clone, Debug)]
pub struct FixedRecognizer {
    outcome: RecognitionOutcome,
}

impl FixedRecognizer {
    pub fn new(outcome: RecognitionOutcome) -> Self {
        Self { outcome }
    }

    pub fn candidates(candidates: Vec<Candidate>) -> Self {
        Self::new(RecognitionOutcome::Candidates(candidates))
    }
}

impl Recognizer for FixedRecognizer {
    fn recognize(&self, _drawing: &[u8], completion: Completion) {
        completion.complete(self.outcome.clone());
    }
}

struct PendingCheck {
    ticket: u64,
    character: char,
    drawing: Vec<u8>,
}

/// A learner's checking session: at most one drawing in flight.
///
/// Starting a new check or clearing the canvas supersedes the pending one;
/// a result that arrives for a superseded check is discarded.
pub struct Session<R: Recognizer> {
    recognizer: R,
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
    pending: Option<PendingCheck>,
    next_ticket: u64,
    timeout: Duration,
}

impl<R: Recognizer> Session<R> {
    pub fn new(recognizer: R, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            recognizer,
            tx,
            rx,
            pending: None,
            next_ticket: 0,
            timeout,
        }
    }

    /// Send `drawing` of `character` to the recognizer, replacing any pending check
    pub fn check(&mut self, character: char, drawing: Vec<u8>) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        if let Some(previous) = self.pending.take() {
            debug!(ticket = previous.ticket, "superseding pending check");
        }

        let completion = Completion {
            ticket,
            tx: Some(self.tx.clone()),
        };
        self.recognizer.recognize(&drawing, completion);
        self.pending = Some(PendingCheck {
            ticket,
            character,
            drawing,
        });
        ticket
    }

    /// The drawing was cleared; whatever the recognizer says about it no longer matters
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Block until the pending check resolves, then submit it to `engine`.
    ///
    /// A timeout counts as the recognizer having no result. Returns `None`
    /// when nothing was pending.
    pub fn wait(&mut self, engine: &mut Engine) -> Result<Option<AttemptOutcome>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };

        let outcome = self.receive(pending.ticket);
        let candidates = match &outcome {
            RecognitionOutcome::Candidates(candidates) => Some(candidates.as_slice()),
            RecognitionOutcome::NoResult => None,
        };

        engine
            .submit_attempt(pending.character, pending.drawing, candidates)
            .map(Some)
    }

    fn receive(&self, ticket: u64) -> RecognitionOutcome {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(delivery) if delivery.ticket == ticket => return delivery.outcome,
                Ok(delivery) => {
                    warn!(ticket = delivery.ticket, "discarding stale recognition result");
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    warn!(ticket, timeout = ?self.timeout, "recognizer did not answer in time");
                    return RecognitionOutcome::NoResult;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::config::EngineConfig;
    use crate::storage::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn create_test_engine() -> Engine {
        let alphabet = Alphabet::new("test", "ABC".chars()).unwrap();
        Engine::with_alphabet(alphabet, EngineConfig::default(), Rc::new(MemoryStore::new()))
            .unwrap()
    }

    /// Holds completions until the test releases them
    #[derive(Default)]
    struct DeferredRecognizer {
        held: RefCell<Vec<Completion>>,
    }

    impl Recognizer for &DeferredRecognizer {
        fn recognize(&self, _drawing: &[u8], completion: Completion) {
            self.held.borrow_mut().push(completion);
        }
    }

    #[test]
    fn wait_without_pending_check_is_none() {
        let mut engine = create_test_engine();
        let mut session = Session::new(
            FixedRecognizer::new(RecognitionOutcome::NoResult),
            Duration::from_millis(10),
        );

        assert!(session.wait(&mut engine).unwrap().is_none());
    }

    #[test]
    fn completed_check_is_submitted() {
        let mut engine = create_test_engine();
        let recognizer = FixedRecognizer::candidates(vec![Candidate::new("a", 0.9)]);
        let mut session = Session::new(recognizer, Duration::from_millis(100));

        session.check('A', vec![9]);
        let outcome = session.wait(&mut engine).unwrap().unwrap();

        assert!(outcome.accepted);
        assert!(!session.is_pending());
        assert_eq!(engine.samples().samples('A').unwrap()[0].drawing, vec![9]);
    }

    #[test]
    fn dropped_completion_reports_no_result() {
        let mut engine = create_test_engine();
        let recognizer = DeferredRecognizer::default();
        let mut session = Session::new(&recognizer, Duration::from_millis(100));

        session.check('B', vec![]);
        recognizer.held.borrow_mut().clear();
        let outcome = session.wait(&mut engine).unwrap().unwrap();

        assert!(!outcome.accepted);
        assert_eq!(engine.progress().progress('B').unwrap().unwrap().attempts, 1);
    }

    #[test]
    fn stale_result_is_discarded() {
        let mut engine = create_test_engine();
        let recognizer = DeferredRecognizer::default();
        let mut session = Session::new(&recognizer, Duration::from_millis(100));

        session.check('A', vec![1]);
        session.check('A', vec![2]);
        let mut held: Vec<Completion> = recognizer.held.borrow_mut().drain(..).collect();
        let second = held.pop().unwrap();
        let first = held.pop().unwrap();
        first.complete(RecognitionOutcome::Candidates(vec![Candidate::new("B", 0.9)]));
        second.complete(RecognitionOutcome::Candidates(vec![Candidate::new("A", 0.9)]));

        let outcome = session.wait(&mut engine).unwrap().unwrap();

        assert!(outcome.accepted);
        let samples = engine.samples().samples('A').unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].drawing, vec![2]);
    }

    #[test]
    fn cleared_check_is_ignored() {
        let mut engine = create_test_engine();
        let recognizer = FixedRecognizer::candidates(vec![Candidate::new("A", 0.9)]);
        let mut session = Session::new(recognizer, Duration::from_millis(10));

        session.check('A', vec![]);
        session.clear();

        assert!(session.wait(&mut engine).unwrap().is_none());
        assert!(engine.progress().all_progress().is_empty());
    }

    #[test]
    fn timeout_counts_as_no_result() {
        let mut engine = create_test_engine();
        let recognizer = DeferredRecognizer::default();
        let mut session = Session::new(&recognizer, Duration::from_millis(5));

        session.check('C', vec![]);
        let outcome = session.wait(&mut engine).unwrap().unwrap();

        assert!(!outcome.accepted);
        assert_eq!(engine.progress().progress('C').unwrap().unwrap().attempts, 1);
        // Answering late changes nothing
        recognizer.held.borrow_mut().clear();
        assert!(session.wait(&mut engine).unwrap().is_none());
    }
}
