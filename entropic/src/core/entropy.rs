//! Disagreement-based entropy scoring for risk registers.
//!
//! Several registers are sampled independently for the same spec. A risk that
//! only some samples mention is one the oracle is unsure about; combined with
//! its self-reported confidence and weighted by severity, that yields a single
//! score used to rank what to resolve first.
//!
//! Everything here is pure: identical inputs give identical, identically
//! ordered outputs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::normalize::normalize_key;
use crate::core::types::{Risk, RiskRegister};

/// Weight of cross-sample disagreement in the raw score.
const DISAGREEMENT_WEIGHT: f64 = 0.6;
/// Weight of self-reported uncertainty in the raw score.
const UNCERTAINTY_WEIGHT: f64 = 0.4;

/// Derived uncertainty signal for one risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntropyAnnotation {
    /// Fraction of samples whose register mentions this risk's title key.
    pub appear_frac: f64,
    pub score: f64,
    /// Sample count `appear_frac` was computed against.
    pub samples: usize,
}

/// A risk together with its entropy annotation, as kept in the agent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRisk {
    #[serde(flatten)]
    pub risk: Risk,
    pub entropy: EntropyAnnotation,
    /// Loop iteration at which a rescan last matched this risk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_iter: Option<u32>,
}

impl ScoredRisk {
    pub fn id(&self) -> &str {
        &self.risk.id
    }

    pub fn key(&self) -> String {
        normalize_key(&self.risk.title)
    }
}

/// Score cut-offs for the high-entropy subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum score for `high`/`critical` risks.
    pub severe_min: f64,
    /// Minimum score for any risk regardless of severity.
    pub any_min: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            severe_min: 0.35,
            any_min: 0.55,
        }
    }
}

impl Thresholds {
    pub fn is_high_entropy(&self, scored: &ScoredRisk) -> bool {
        let score = scored.entropy.score;
        (scored.risk.severity.is_severe() && score >= self.severe_min) || score >= self.any_min
    }
}

/// `[(1 - appear_frac) * 0.6 + (1 - confidence) * 0.4] * (0.5 + 0.5 * severity_weight)`.
pub fn entropy_score(appear_frac: f64, confidence: f64, severity_weight: f64) -> f64 {
    let raw = (1.0 - appear_frac) * DISAGREEMENT_WEIGHT + (1.0 - confidence) * UNCERTAINTY_WEIGHT;
    raw * (0.5 + 0.5 * severity_weight)
}

/// Recompute the annotation of a risk from an appearance fraction.
pub fn annotate(risk: Risk, appear_frac: f64, samples: usize) -> ScoredRisk {
    let score = entropy_score(appear_frac, risk.confidence, risk.severity.weight());
    ScoredRisk {
        risk,
        entropy: EntropyAnnotation {
            appear_frac,
            score,
            samples,
        },
        last_seen_iter: None,
    }
}

/// Score the primary (first) register against all registers.
///
/// Only the primary contributes risks; the rest only contribute agreement.
/// Within one register a repeated title key counts once. The result is sorted
/// by score descending, ties kept in primary order.
pub fn score_registers(registers: &[RiskRegister], sample_count: usize) -> Vec<ScoredRisk> {
    let Some(primary) = registers.first() else {
        return Vec::new();
    };
    let samples = sample_count.max(1);

    let mut key_counts: HashMap<String, usize> = HashMap::new();
    for register in registers {
        let mut seen = HashSet::new();
        for risk in &register.risks {
            let key = normalize_key(&risk.title);
            if seen.insert(key.clone()) {
                *key_counts.entry(key).or_insert(0) += 1;
            }
        }
    }

    let mut scored: Vec<ScoredRisk> = primary
        .risks
        .iter()
        .map(|risk| {
            let count = key_counts
                .get(&normalize_key(&risk.title))
                .copied()
                .unwrap_or(0);
            let appear_frac = (count as f64 / samples as f64).min(1.0);
            annotate(risk.clone(), appear_frac, samples)
        })
        .collect();
    sort_by_score(&mut scored);
    scored
}

/// Ids of risks that cross the thresholds, in ranked order.
pub fn select_high_entropy_ids(risks: &[ScoredRisk], thresholds: &Thresholds) -> Vec<String> {
    risks
        .iter()
        .filter(|r| thresholds.is_high_entropy(r))
        .map(|r| r.risk.id.clone())
        .collect()
}

/// Fold a freshly scored list into an existing ranked list.
///
/// Matching is by title key. A match keeps the existing id and adopts every
/// other field from the incoming risk. Unmatched incoming risks are appended;
/// an appended risk whose id is already taken gets a `-N` suffix. Both matched
/// and appended risks are stamped with `iteration` when given. Repeated
/// incoming keys after the first are dropped, and blank keys never match.
pub fn merge_risks(
    existing: &[ScoredRisk],
    incoming: Vec<ScoredRisk>,
    iteration: Option<u32>,
) -> Vec<ScoredRisk> {
    let mut unmatched: Vec<Option<ScoredRisk>> = Vec::with_capacity(incoming.len());
    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    for risk in incoming {
        let key = risk.key();
        if key.is_empty() {
            unmatched.push(Some(risk));
            continue;
        }
        if index_by_key.contains_key(&key) {
            continue;
        }
        index_by_key.insert(key, unmatched.len());
        unmatched.push(Some(risk));
    }

    let mut merged = Vec::with_capacity(existing.len() + unmatched.len());
    for current in existing {
        let key = current.key();
        let slot = index_by_key
            .get(&key)
            .filter(|_| !key.is_empty())
            .and_then(|&idx| unmatched[idx].take());
        match slot {
            Some(mut updated) => {
                updated.risk.id = current.risk.id.clone();
                updated.last_seen_iter = iteration.or(updated.last_seen_iter);
                merged.push(updated);
            }
            None => merged.push(current.clone()),
        }
    }

    let mut taken: HashSet<String> = merged.iter().map(|r| r.risk.id.clone()).collect();
    for mut risk in unmatched.into_iter().flatten() {
        if taken.contains(&risk.risk.id) {
            risk.risk.id = fresh_id(&risk.risk.id, &taken);
        }
        taken.insert(risk.risk.id.clone());
        risk.last_seen_iter = iteration.or(risk.last_seen_iter);
        merged.push(risk);
    }

    sort_by_score(&mut merged);
    merged
}

fn fresh_id(base: &str, taken: &HashSet<String>) -> String {
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Stable sort, highest score first.
fn sort_by_score(risks: &mut [ScoredRisk]) {
    risks.sort_by(|a, b| b.entropy.score.total_cmp(&a.entropy.score));
}
