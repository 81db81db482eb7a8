use crate::distance::edit_distance;
use crate::equivalence::Equivalence;
use tracing::debug;

/// Which rule accepted a recognized string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Exact,
    Confusable,
    EditDistance,
    Rotation,
}

/// Decides whether recognizer output matches the character being practiced.
///
/// Rules are tried in order and the first hit wins: exact match, the
/// confusable table for the expected character, edit distance of at most one,
/// then rotation pairs.
///
/// The edit-distance rule only applies when the recognized text is longer
/// than one symbol. A lone symbol that differs from the expected one is a
/// different letter, not recognizer noise; otherwise `B` would pass for `A`.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'t> {
    tables: &'t Equivalence,
}

impl Default for Validator<'static> {
    fn default() -> Self {
        Self::new(Equivalence::builtin())
    }
}

impl<'t> Validator<'t> {
    pub fn new(tables: &'t Equivalence) -> Self {
        Self { tables }
    }

    pub fn validate(&self, recognized: &str, expected: char) -> bool {
        self.matching_rule(recognized, expected).is_some()
    }

    pub fn matching_rule(&self, recognized: &str, expected: char) -> Option<MatchRule> {
        let recognized = recognized.trim().to_uppercase();
        let expected_str = expected.to_string();

        let rule = if recognized == expected_str {
            Some(MatchRule::Exact)
        } else if self.tables.is_confusable(expected, &recognized) {
            Some(MatchRule::Confusable)
        } else if recognized.chars().count() > 1 && edit_distance(&recognized, &expected_str) <= 1 {
            Some(MatchRule::EditDistance)
        } else if single_char(&recognized).is_some_and(|r| self.tables.is_rotation(r, expected)) {
            Some(MatchRule::Rotation)
        } else {
            None
        };

        debug!(%recognized, %expected, ?rule, "validated candidate");
        rule
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
