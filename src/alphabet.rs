use crate::error::{Error, Result};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static ALPHABET_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/alphabets");

/// Alphabets shipped with the crate
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum SupportedAlphabet {
    /// Serbian latin (gajica), including the diacritic letters
    #[default]
    Serbian,
    English,
}

impl SupportedAlphabet {
    pub fn load(&self) -> Result<Alphabet> {
        Alphabet::builtin(&self.to_string().to_lowercase())
    }
}

#[derive(Deserialize)]
struct AlphabetFile {
    name: String,
    characters: String,
}

/// The fixed, ordered set of symbols a learner practices.
///
/// Order matters: it drives which character is recommended first and breaks
/// ties between characters with equal success rates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    name: String,
    characters: Vec<char>,
}

impl Alphabet {
    /// Build an alphabet from an explicit character sequence.
    ///
    /// Fails on an empty sequence or a repeated character.
    pub fn new<I>(name: impl Into<String>, characters: I) -> Result<Self>
    where
        I: IntoIterator<Item = char>,
    {
        let characters: Vec<char> = characters.into_iter().collect();
        if characters.is_empty() {
            return Err(Error::EmptyAlphabet);
        }

        let mut seen = HashSet::with_capacity(characters.len());
        for &c in &characters {
            if !seen.insert(c) {
                return Err(Error::DuplicateCharacter(c));
            }
        }

        Ok(Self {
            name: name.into(),
            characters,
        })
    }

    /// Load one of the alphabets embedded under `src/alphabets`
    pub fn builtin(name: &str) -> Result<Self> {
        let file = ALPHABET_DIR
            .get_file(format!("{name}.json"))
            .ok_or_else(|| Error::UnknownAlphabet(name.to_string()))?;
        let contents = file
            .contents_utf8()
            .ok_or_else(|| Error::UnknownAlphabet(name.to_string()))?;
        let parsed: AlphabetFile = serde_json::from_str(contents)?;

        Self::new(parsed.name, parsed.characters.chars())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn characters(&self) -> &[char] {
        &self.characters
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn first(&self) -> char {
        // Non-empty by construction
        self.characters[0]
    }

    pub fn contains(&self, c: char) -> bool {
        self.characters.contains(&c)
    }

    pub fn position(&self, c: char) -> Option<usize> {
        self.characters.iter().position(|&x| x == c)
    }

    /// Returns `c` unchanged when it belongs to the alphabet
    pub fn ensure(&self, c: char) -> Result<char> {
        if self.contains(c) {
            Ok(c)
        } else {
            Err(Error::UnknownCharacter(c))
        }
    }
}
