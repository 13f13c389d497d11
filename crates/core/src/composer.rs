//! Assembles the concrete question set for one assessment attempt.
//!
//! Composition is a pure function of a bank snapshot, a policy and a random
//! source. Nothing here mutates a bank or a definition, and calling it twice
//! with fresh randomness yields two different but equally valid sets.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::model::{
    AssessmentDefinition, BankId, CompositionPolicy, Question, QuestionBank, QuestionId,
    QuestionType, QuotaRequest, TypeCounts,
};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyViolation {
    #[error("{kind} quota is negative ({count})")]
    NegativeQuota { kind: QuestionType, count: i64 },

    #[error("question count is negative ({0})")]
    NegativeCount(i64),

    #[error("explicit question list is empty")]
    EmptyIdList,

    #[error("question {0} is not in the source banks")]
    UnknownQuestion(QuestionId),

    #[error("question {0} is listed more than once")]
    DuplicateQuestion(QuestionId),

    #[error("no source banks to compose from")]
    NoBanks,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ComposeError {
    #[error("question bank {0} not found")]
    BankNotFound(BankId),

    #[error("invalid composition policy: {0}")]
    InvalidPolicy(#[from] PolicyViolation),
}

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

/// The questions selected for one attempt, with what was asked for and what
/// the pool could actually supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedSet {
    questions: Vec<Question>,
    total_points: u32,
    realized: TypeCounts,
    requested: Option<TypeCounts>,
}

impl ComposedSet {
    fn new(questions: Vec<Question>, requested: Option<TypeCounts>) -> Self {
        let mut realized = TypeCounts::default();
        for q in &questions {
            realized.increment(q.kind());
        }
        let total_points = questions.iter().map(Question::points).sum();
        Self {
            questions,
            total_points,
            realized,
            requested,
        }
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn into_questions(self) -> Vec<Question> {
        self.questions
    }

    #[must_use]
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(Question::id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Sum of points over the selected questions only.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    /// Per-type counts actually returned.
    #[must_use]
    pub fn realized(&self) -> TypeCounts {
        self.realized
    }

    /// Per-type counts asked for; only set for quota composition.
    #[must_use]
    pub fn requested(&self) -> Option<TypeCounts> {
        self.requested
    }

    /// Types whose pool was smaller than the quota.
    #[must_use]
    pub fn underfilled_types(&self) -> Vec<QuestionType> {
        let Some(requested) = self.requested else {
            return Vec::new();
        };
        QuestionType::ALL
            .into_iter()
            .filter(|kind| self.realized.get(*kind) < requested.get(*kind))
            .collect()
    }

    #[must_use]
    pub fn is_underfilled(&self) -> bool {
        !self.underfilled_types().is_empty()
    }
}

//
// ─── COMPOSITION ───────────────────────────────────────────────────────────────
//

/// Compose from a single bank.
///
/// # Errors
///
/// Returns `ComposeError::InvalidPolicy` for negative counts or a bad
/// explicit id list.
pub fn compose<R: Rng + ?Sized>(
    bank: &QuestionBank,
    policy: &CompositionPolicy,
    shuffle_questions: bool,
    rng: &mut R,
) -> Result<ComposedSet, ComposeError> {
    compose_from_banks(&[bank], policy, shuffle_questions, rng)
}

/// Compose for a definition, looking its source banks up in `available`.
///
/// # Errors
///
/// Returns `ComposeError::BankNotFound` if a referenced bank is missing from
/// `available`, or `ComposeError::InvalidPolicy` for a malformed policy.
pub fn compose_for<R: Rng + ?Sized>(
    definition: &AssessmentDefinition,
    available: &[QuestionBank],
    rng: &mut R,
) -> Result<ComposedSet, ComposeError> {
    let banks = resolve_banks(definition.source_banks(), available)?;
    compose_from_banks(
        &banks,
        definition.composition(),
        definition.presentation().shuffle_questions,
        rng,
    )
}

/// Picks the banks named by `ids` out of `available`, in `ids` order.
///
/// # Errors
///
/// Returns `ComposeError::BankNotFound` for the first id with no bank.
pub fn resolve_banks<'a>(
    ids: &[BankId],
    available: &'a [QuestionBank],
) -> Result<Vec<&'a QuestionBank>, ComposeError> {
    ids.iter()
        .map(|id| {
            available
                .iter()
                .find(|bank| bank.id() == *id)
                .ok_or(ComposeError::BankNotFound(*id))
        })
        .collect()
}

/// Compose from the union of several banks, concatenated in the given order.
///
/// Quota, random-N and explicit-id policies treat the union as one pool;
/// per-bank-count samples each bank independently.
///
/// # Errors
///
/// Returns `ComposeError::InvalidPolicy` for negative counts, an empty or
/// unknown explicit id list, or no banks at all.
pub fn compose_from_banks<R: Rng + ?Sized>(
    banks: &[&QuestionBank],
    policy: &CompositionPolicy,
    shuffle_questions: bool,
    rng: &mut R,
) -> Result<ComposedSet, ComposeError> {
    if banks.is_empty() {
        return Err(PolicyViolation::NoBanks.into());
    }
    let pool: Vec<&Question> = banks.iter().flat_map(|b| b.questions()).collect();

    let (mut selected, requested) = match policy {
        CompositionPolicy::QuotaByType(quota) => {
            let counts = validate_quota(quota)?;
            (select_by_quota(&pool, counts, rng), Some(counts))
        }
        CompositionPolicy::RandomCount { count } => {
            let n = validate_count(*count)?;
            (sample(pool, n, rng), None)
        }
        CompositionPolicy::ExplicitIds { question_ids } => {
            (select_explicit(&pool, question_ids)?, None)
        }
        CompositionPolicy::PerBankCount { count } => {
            let n = validate_count(*count)?;
            let mut picked = Vec::new();
            for bank in banks {
                picked.extend(sample(bank.questions().iter().collect(), n, rng));
            }
            (picked, None)
        }
    };

    // Second, independent permutation over the concatenation breaks up the
    // per-type grouping of quota selection.
    if shuffle_questions {
        selected.shuffle(rng);
    }

    Ok(ComposedSet::new(
        selected.into_iter().cloned().collect(),
        requested,
    ))
}

fn validate_quota(quota: &QuotaRequest) -> Result<TypeCounts, PolicyViolation> {
    let mut counts = TypeCounts::default();
    for kind in QuestionType::ALL {
        let raw = quota.raw(kind);
        if raw < 0 {
            return Err(PolicyViolation::NegativeQuota { kind, count: raw });
        }
        counts.set(kind, u32::try_from(raw).unwrap_or(u32::MAX));
    }
    Ok(counts)
}

fn validate_count(count: i64) -> Result<usize, PolicyViolation> {
    if count < 0 {
        return Err(PolicyViolation::NegativeCount(count));
    }
    Ok(usize::try_from(count).unwrap_or(usize::MAX))
}

/// Uniform shuffle, then keep a prefix of `min(n, len)`.
fn sample<'a, R: Rng + ?Sized>(
    mut pool: Vec<&'a Question>,
    n: usize,
    rng: &mut R,
) -> Vec<&'a Question> {
    pool.shuffle(rng);
    pool.truncate(n);
    pool
}

fn select_by_quota<'a, R: Rng + ?Sized>(
    pool: &[&'a Question],
    counts: TypeCounts,
    rng: &mut R,
) -> Vec<&'a Question> {
    let mut selected = Vec::new();
    for kind in QuestionType::ALL {
        let partition: Vec<&Question> = pool.iter().copied().filter(|q| q.kind() == kind).collect();
        let want = usize::try_from(counts.get(kind)).unwrap_or(usize::MAX);
        // A short partition silently yields fewer questions.
        selected.extend(sample(partition, want, rng));
    }
    selected
}

fn select_explicit<'a>(
    pool: &[&'a Question],
    ids: &[QuestionId],
) -> Result<Vec<&'a Question>, PolicyViolation> {
    if ids.is_empty() {
        return Err(PolicyViolation::EmptyIdList);
    }
    let by_id: HashMap<QuestionId, &Question> = pool.iter().map(|q| (q.id(), *q)).collect();
    let mut seen = HashSet::with_capacity(ids.len());
    let mut selected = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(*id) {
            return Err(PolicyViolation::DuplicateQuestion(*id));
        }
        let question = by_id
            .get(id)
            .copied()
            .ok_or(PolicyViolation::UnknownQuestion(*id))?;
        selected.push(question);
    }
    Ok(selected)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
