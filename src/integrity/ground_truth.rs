// ABOUTME: Literal spot-check battery and view list asserted against a rebuilt store
// ABOUTME: Defaults to the pronunciation dataset facts; empty battery for arbitrary databases

use rusqlite::types::Value;
use std::fmt;

/// Expected scalar result of a spot check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Text(String),
    Integer(i64),
}

impl Expected {
    /// Exact match against the first column of the first row
    pub fn matches(&self, actual: &Value) -> bool {
        match (self, actual) {
            (Expected::Text(e), Value::Text(a)) => e == a,
            (Expected::Integer(e), Value::Integer(a)) => e == a,
            _ => false,
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Text(s) => write!(f, "{:?}", s),
            Expected::Integer(i) => write!(f, "{}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotCheck {
    pub label: String,
    pub sql: String,
    pub expected: Expected,
}

impl SpotCheck {
    pub fn text(label: &str, sql: &str, expected: &str) -> Self {
        Self {
            label: label.to_string(),
            sql: sql.to_string(),
            expected: Expected::Text(expected.to_string()),
        }
    }

    pub fn integer(label: &str, sql: &str, expected: i64) -> Self {
        Self {
            label: label.to_string(),
            sql: sql.to_string(),
            expected: Expected::Integer(expected),
        }
    }
}

/// Domain facts a reconstructed store must satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruth {
    pub spot_checks: Vec<SpotCheck>,
    /// Views that must each return at least one row
    pub nonempty_views: Vec<String>,
    /// Log the top active part-of-speech tags by word count
    pub pos_report: bool,
}

impl GroundTruth {
    /// No spot checks, no views, no report
    pub fn none() -> Self {
        Self {
            spot_checks: Vec::new(),
            nonempty_views: Vec::new(),
            pos_report: false,
        }
    }

    /// Battery for the pronunciation dataset
    pub fn pronunciation() -> Self {
        let pos_of = |word: &str, tag: &str| {
            format!(
                "SELECT stress_pattern FROM Variants v \
                 JOIN Words w ON v.word_id = w.word_id \
                 JOIN PartOfSpeech p ON w.part_of_speech = p.pos_id \
                 WHERE LOWER(w.word) = '{}' AND p.pos_abbreviation = '{}' \
                 LIMIT 1",
                word, tag
            )
        };

        let spot_checks = vec![
            SpotCheck::text(
                "PartOfSpeech pos_id=9 is NN",
                "SELECT pos_abbreviation FROM PartOfSpeech WHERE pos_id = 9",
                "NN",
            ),
            SpotCheck::text(
                "PartOfSpeech pos_id=11 is NNP",
                "SELECT pos_abbreviation FROM PartOfSpeech WHERE pos_id = 11",
                "NNP",
            ),
            SpotCheck::text(
                "PartOfSpeech pos_id=14 is VBD",
                "SELECT pos_abbreviation FROM PartOfSpeech WHERE pos_id = 14",
                "VBD",
            ),
            SpotCheck::text(
                "PartOfSpeech pos_id=20 is JJ",
                "SELECT pos_abbreviation FROM PartOfSpeech WHERE pos_id = 20",
                "JJ",
            ),
            SpotCheck::integer(
                "Legacy POS pos_id=1 is inactive",
                "SELECT is_active FROM PartOfSpeech WHERE pos_id = 1",
                0,
            ),
            SpotCheck::text(
                "London is tagged NNP",
                "SELECT p.pos_abbreviation FROM Words w \
                 JOIN PartOfSpeech p ON w.part_of_speech = p.pos_id \
                 WHERE LOWER(w.word) = 'london' AND p.pos_abbreviation = 'NNP' \
                 LIMIT 1",
                "NNP",
            ),
            SpotCheck::integer(
                "desert has both NN and VB rows",
                "SELECT COUNT(*) FROM Words w \
                 JOIN PartOfSpeech p ON w.part_of_speech = p.pos_id \
                 WHERE LOWER(w.word) = 'desert' AND p.pos_abbreviation IN ('NN','VB')",
                2,
            ),
            SpotCheck::text("desert NN stress=1-0", &pos_of("desert", "NN"), "1-0"),
            SpotCheck::text("desert VB stress=0-1", &pos_of("desert", "VB"), "0-1"),
            SpotCheck::text("record NN stress=0-1", &pos_of("record", "NN"), "0-1"),
            SpotCheck::integer(
                "No NULL stress_pattern",
                "SELECT COUNT(*) FROM Variants WHERE stress_pattern IS NULL",
                0,
            ),
            SpotCheck::integer(
                "No NULL syllable_count",
                "SELECT COUNT(*) FROM Variants WHERE syllable_count IS NULL",
                0,
            ),
            SpotCheck::integer(
                "heteronym_groups has 116 entries",
                "SELECT COUNT(*) FROM heteronym_groups",
                116,
            ),
            SpotCheck::integer(
                "heteronym_pronunciations has 235 entries",
                "SELECT COUNT(*) FROM heteronym_pronunciations",
                235,
            ),
            SpotCheck::integer(
                "IpaAllowedChars has 611 entries",
                "SELECT COUNT(*) FROM IpaAllowedChars",
                611,
            ),
            SpotCheck::integer(
                "POSLookup view functional",
                "SELECT COUNT(*) FROM POSLookup WHERE abbreviation = 'NN'",
                1,
            ),
            SpotCheck::text(
                "English language present",
                "SELECT language_code FROM Languages WHERE language_id = 1",
                "en",
            ),
        ];

        Self {
            spot_checks,
            nonempty_views: [
                "Pronunciations",
                "v_StressPatterns",
                "v_RhymeFinder",
                "unique_pronunciations",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            pos_report: true,
        }
    }
}

impl Default for GroundTruth {
    fn default() -> Self {
        Self::pronunciation()
    }
}
