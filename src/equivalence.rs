use crate::error::Result;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

static BUILTIN_TABLES: &str = include_str!("tables/equivalence.json");
static BUILTIN: OnceLock<Equivalence> = OnceLock::new();

#[derive(Deserialize)]
struct EquivalenceFile {
    confusable: HashMap<char, Vec<String>>,
    rotation: Vec<(char, char)>,
}

/// Visual equivalences the recognizer is known to produce.
///
/// Confusables are directional and keyed by the expected character: `A`
/// accepts a recognized `4`, which says nothing about `4` accepting `A`.
/// Rotation pairs are symmetric.
#[derive(Debug, Clone, Default)]
pub struct Equivalence {
    confusable: HashMap<char, HashSet<String>>,
    rotation: HashSet<(char, char)>,
}

impl Equivalence {
    pub fn new<C, R>(confusable: C, rotation: R) -> Self
    where
        C: IntoIterator<Item = (char, Vec<String>)>,
        R: IntoIterator<Item = (char, char)>,
    {
        Self {
            confusable: confusable
                .into_iter()
                .map(|(expected, accepted)| (expected, accepted.into_iter().collect()))
                .collect(),
            rotation: rotation.into_iter().map(|(a, b)| ordered(a, b)).collect(),
        }
    }

    /// Parse tables in the same JSON layout as the embedded ones
    pub fn from_json(json: &str) -> Result<Self> {
        let file: EquivalenceFile = serde_json::from_str(json)?;
        Ok(Self::new(file.confusable, file.rotation))
    }

    /// The tables shipped with the crate, parsed on first use.
    pub fn builtin() -> &'static Equivalence {
        BUILTIN.get_or_init(|| {
            Self::from_json(BUILTIN_TABLES).expect("embedded equivalence tables are valid JSON")
        })
    }

    /// Whether `recognized` is an accepted stand-in for `expected`
    pub fn is_confusable(&self, expected: char, recognized: &str) -> bool {
        self.confusable
            .get(&expected)
            .is_some_and(|accepted| accepted.contains(recognized))
    }

    /// Whether `a` and `b` form a rotation pair, in either order
    pub fn is_rotation(&self, a: char, b: char) -> bool {
        self.rotation.contains(&ordered(a, b))
    }

    pub fn confusables_for(&self, expected: char) -> impl Iterator<Item = &str> {
        self.confusable
            .get(&expected)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

fn ordered(a: char, b: char) -> (char, char) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
