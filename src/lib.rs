// Library surface for the CLI and integration tests.
pub mod alphabet;
pub mod app_dirs;
pub mod candidates;
pub mod config;
pub mod distance;
pub mod engine;
pub mod equivalence;
pub mod error;
pub mod progress;
pub mod runtime;
pub mod samples;
pub mod storage;
pub mod util;
pub mod validator;

pub use alphabet::{Alphabet, SupportedAlphabet};
pub use candidates::Candidate;
pub use config::EngineConfig;
pub use engine::{AttemptOutcome, CharacterSummary, Engine, Statistics, UnrecognizedPolicy};
pub use error::{Error, Result};
