use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// One-way hash of a normalized security-question answer.
///
/// Answers are trimmed before hashing so that stray whitespace at
/// registration or challenge time does not change the digest. Plaintext
/// answers are never persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerHash(String);

impl AnswerHash {
    /// Hashes a candidate answer after normalization.
    #[must_use]
    pub fn of(answer: &str) -> Self {
        let digest = Sha256::digest(answer.trim().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }

    /// Rehydrates a hash that was previously persisted.
    #[must_use]
    pub fn from_stored(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the candidate answer hashes to this value.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        Self::of(candidate) == *self
    }
}

impl fmt::Debug for AnswerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Avoid dumping the full digest into logs.
        write!(f, "AnswerHash({}…)", &self.0[..8.min(self.0.len())])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityQuestion {
    pub question: String,
    pub answer_hash: AnswerHash,
}

impl SecurityQuestion {
    #[must_use]
    pub fn new(question: impl Into<String>, answer: &str) -> Self {
        Self {
            question: question.into(),
            answer_hash: AnswerHash::of(answer),
        }
    }
}

/// A user's registered security questions, in registration order.
///
/// Created or overwritten wholesale when the user saves their questions;
/// three questions in practice, but any count is tolerated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecurityProfile {
    questions: Vec<SecurityQuestion>,
}

impl SecurityProfile {
    #[must_use]
    pub fn new(questions: Vec<SecurityQuestion>) -> Self {
        Self { questions }
    }

    #[must_use]
    pub fn questions(&self) -> &[SecurityQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&SecurityQuestion> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_normalizes_surrounding_whitespace() {
        assert_eq!(AnswerHash::of("  Rex "), AnswerHash::of("Rex"));
        assert_ne!(AnswerHash::of("Rex"), AnswerHash::of("rex"));
    }

    #[test]
    fn matches_compares_normalized_candidate() {
        let hash = AnswerHash::of("first car");
        assert!(hash.matches(" first car "));
        assert!(!hash.matches("second car"));
    }

    #[test]
    fn hash_is_not_the_plaintext() {
        let hash = AnswerHash::of("Rex");
        assert_ne!(hash.as_str(), "Rex");
        assert_eq!(hash.as_str().len(), 64);
    }

    #[test]
    fn profile_round_trips_stored_hash() {
        let question = SecurityQuestion::new("What was your first pet's name?", "Rex");
        let stored = AnswerHash::from_stored(question.answer_hash.as_str());
        assert!(stored.matches("Rex"));

        let profile = SecurityProfile::new(vec![question]);
        assert_eq!(profile.len(), 1);
        assert!(!profile.is_empty());
        assert!(profile.question(1).is_none());
    }
}
