//! Confidence scoring for retrieval results.
//!
//! Turns raw similarity numbers into a discrete trust level. Once a
//! [`ConfidenceScore`] exists, the rest of the system consumes only its two
//! predicates ([`ConfidenceScore::is_acceptable`],
//! [`ConfidenceScore::requires_caution`]) and its localized explanation;
//! nothing downstream inspects raw similarity again.

use serde::Serialize;

use crate::error::{QaError, Result};
use crate::models::SearchMatch;
use crate::prompt::Language;

/// Process-wide thresholds, loaded once at startup.
#[derive(Debug, Clone, Copy)]
pub struct ConfidencePolicy {
    min_acceptable: f32,
    low_confidence: f32,
}

impl ConfidencePolicy {
    /// Both thresholds must be in `[0, 1]` with
    /// `low_confidence >= min_acceptable`.
    pub fn new(min_acceptable: f32, low_confidence: f32) -> Result<Self> {
        check_unit_range("min_acceptable threshold", min_acceptable)?;
        check_unit_range("low_confidence threshold", low_confidence)?;
        if low_confidence < min_acceptable {
            return Err(QaError::validation(format!(
                "low_confidence threshold ({low_confidence}) must not be below min_acceptable ({min_acceptable})"
            )));
        }
        Ok(Self {
            min_acceptable,
            low_confidence,
        })
    }

    pub fn min_acceptable(&self) -> f32 {
        self.min_acceptable
    }

    pub fn low_confidence(&self) -> f32 {
        self.low_confidence
    }
}

/// Discrete trust classification of a match set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    None,
    Low,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "none",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::High => "high",
        }
    }
}

/// Derived trust score. Never persisted; the level is a pure function of
/// `max_similarity` against the policy thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScore {
    pub level: ConfidenceLevel,
    pub max_similarity: f32,
    pub avg_similarity: f32,
}

impl ConfidenceScore {
    /// Classify a similarity pair. Fails if either value is outside `[0, 1]`.
    pub fn calculate(
        max_similarity: f32,
        avg_similarity: f32,
        policy: &ConfidencePolicy,
    ) -> Result<Self> {
        check_unit_range("max_similarity", max_similarity)?;
        check_unit_range("avg_similarity", avg_similarity)?;

        let level = if max_similarity < policy.min_acceptable {
            ConfidenceLevel::None
        } else if max_similarity < policy.low_confidence {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::High
        };

        Ok(Self {
            level,
            max_similarity,
            avg_similarity,
        })
    }

    /// Score for an empty match set.
    pub fn none() -> Self {
        Self {
            level: ConfidenceLevel::None,
            max_similarity: 0.0,
            avg_similarity: 0.0,
        }
    }

    /// Score a ranked match set. Empty input yields [`ConfidenceScore::none`].
    pub fn from_matches(matches: &[SearchMatch], policy: &ConfidencePolicy) -> Result<Self> {
        if matches.is_empty() {
            return Ok(Self::none());
        }
        let max = matches
            .iter()
            .map(|m| m.similarity_score)
            .fold(f32::MIN, f32::max);
        let avg = matches.iter().map(|m| m.similarity_score).sum::<f32>() / matches.len() as f32;
        Self::calculate(max, avg, policy)
    }

    /// True when the match set is strong enough to condition the language
    /// model on. This is the gating decision.
    pub fn is_acceptable(&self) -> bool {
        matches!(self.level, ConfidenceLevel::Low | ConfidenceLevel::High)
    }

    /// True only for weakly supported matches; triggers the hedged-language
    /// instruction block in the composed prompt.
    pub fn requires_caution(&self) -> bool {
        self.level == ConfidenceLevel::Low
    }

    /// Human-readable, localized account of the classification. Contains no
    /// raw similarity numbers so it is safe everywhere.
    pub fn explanation(&self, language: Language) -> &'static str {
        match (self.level, language) {
            (ConfidenceLevel::None, Language::English) => {
                "The retrieved passages were not similar enough to the question to answer reliably."
            }
            (ConfidenceLevel::Low, Language::English) => {
                "The retrieved passages are only weakly related to the question; the answer may be incomplete."
            }
            (ConfidenceLevel::High, Language::English) => {
                "The retrieved passages are strongly related to the question."
            }
            (ConfidenceLevel::None, Language::Turkish) => {
                "Bulunan pasajlar soruya güvenilir bir yanıt verecek kadar benzer değildi."
            }
            (ConfidenceLevel::Low, Language::Turkish) => {
                "Bulunan pasajlar soruyla yalnızca zayıf düzeyde ilgili; yanıt eksik olabilir."
            }
            (ConfidenceLevel::High, Language::Turkish) => {
                "Bulunan pasajlar soruyla güçlü şekilde ilgili."
            }
        }
    }
}

fn check_unit_range(name: &'static str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(QaError::OutOfRange {
            name,
            value: value as f64,
            expected: "[0, 1]",
        });
    }
    Ok(())
}
