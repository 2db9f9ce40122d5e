//! Randomized identity re-verification via stored security questions.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use drive_core::model::{AnswerHash, SecurityProfile, UserId};
use storage::repository::{
    AuditRecord, AuditRepository, ProgressRepository, SecurityRepository, VERIFICATION_LOGS,
};

/// Bounds of the uniformly random interval between challenges.
pub const CHALLENGE_MIN_INTERVAL_SECONDS: u64 = 1_200;
pub const CHALLENGE_MAX_INTERVAL_SECONDS: u64 = 2_400;
/// Answer attempts granted per challenge.
pub const CHALLENGE_ATTEMPTS: u32 = 3;

/// Draw a fresh delay until the next challenge.
///
/// The draw happens at every re-arm, never once at construction, so a student
/// cannot learn the cadence and pre-arrange a proxy.
pub fn next_challenge_delay(rng: &mut impl Rng) -> Duration {
    Duration::from_secs(
        rng.random_range(CHALLENGE_MIN_INTERVAL_SECONDS..=CHALLENGE_MAX_INTERVAL_SECONDS),
    )
}

/// An open challenge awaiting the student's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenChallenge {
    pub question: String,
    answer_hash: AnswerHash,
    pub attempts_left: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChallengeState {
    #[default]
    Idle,
    Open(OpenChallenge),
    /// Terminal for the session; never cleared by teardown.
    LockedOut,
}

/// Result of attempting to open a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// A question was drawn; the modal opens and playback pauses.
    Opened,
    /// No questions are configured; deliberate benign bypass.
    AutoPassed,
    /// Already open or locked out; nothing fired.
    Suppressed,
}

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SubmitOutcome {
    Passed,
    Retry { attempts_left: u32 },
    LockedOut,
    /// No challenge is open.
    NotOpen,
}

/// The challenge state machine, free of I/O for testability.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChallengeMachine {
    state: ChallengeState,
}

impl ChallengeMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &ChallengeState {
        &self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, ChallengeState::Open(_))
    }

    #[must_use]
    pub fn is_locked_out(&self) -> bool {
        matches!(self.state, ChallengeState::LockedOut)
    }

    #[must_use]
    pub fn open_challenge(&self) -> Option<&OpenChallenge> {
        match &self.state {
            ChallengeState::Open(open) => Some(open),
            _ => None,
        }
    }

    /// Open a challenge with a randomly drawn question.
    ///
    /// Attempts reset to the full budget and any prior error clears. An
    /// account without configured questions auto-passes.
    pub fn open(
        &mut self,
        profile: Option<&SecurityProfile>,
        rng: &mut impl Rng,
    ) -> ChallengeOutcome {
        if !matches!(self.state, ChallengeState::Idle) {
            return ChallengeOutcome::Suppressed;
        }

        let Some(profile) = profile.filter(|p| !p.is_empty()) else {
            tracing::warn!("no security questions configured; auto-passing challenge");
            return ChallengeOutcome::AutoPassed;
        };

        let index = rng.random_range(0..profile.len());
        let Some(question) = profile.question(index) else {
            return ChallengeOutcome::AutoPassed;
        };

        self.state = ChallengeState::Open(OpenChallenge {
            question: question.question.clone(),
            answer_hash: question.answer_hash.clone(),
            attempts_left: CHALLENGE_ATTEMPTS,
            error: None,
        });
        ChallengeOutcome::Opened
    }

    /// Check a candidate answer against the question that was asked.
    pub fn submit(&mut self, answer: &str) -> SubmitOutcome {
        let ChallengeState::Open(open) = &mut self.state else {
            return SubmitOutcome::NotOpen;
        };

        if open.answer_hash.matches(answer) {
            self.state = ChallengeState::Idle;
            return SubmitOutcome::Passed;
        }

        open.attempts_left -= 1;
        if open.attempts_left == 0 {
            self.state = ChallengeState::LockedOut;
            return SubmitOutcome::LockedOut;
        }

        let attempts_left = open.attempts_left;
        open.error = Some(format!(
            "Incorrect answer. You have {attempts_left} attempt(s) remaining."
        ));
        SubmitOutcome::Retry { attempts_left }
    }
}

/// Persistence side of the challenge flow: profile fetch, lockout write and
/// the append-only verification audit trail.
#[derive(Clone)]
pub struct IdentityChallengeService {
    user: UserId,
    security: Arc<dyn SecurityRepository>,
    audit: Arc<dyn AuditRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl IdentityChallengeService {
    #[must_use]
    pub fn new(
        user: UserId,
        security: Arc<dyn SecurityRepository>,
        audit: Arc<dyn AuditRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            user,
            security,
            audit,
            progress,
        }
    }

    /// Fire the challenge timer: fetch the profile and open the machine.
    ///
    /// A profile that cannot be read is treated like a missing one — the
    /// challenge auto-passes rather than blocking playback on a storage
    /// fault.
    pub async fn fire(&self, machine: &mut ChallengeMachine) -> ChallengeOutcome {
        let profile = match self.security.security_profile(&self.user).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user = %self.user, error = %e, "security profile read failed");
                None
            }
        };

        let mut rng = rand::rng();
        machine.open(profile.as_ref(), &mut rng)
    }

    /// Submit an answer, writing the audit entry and, on the final failure,
    /// the persistent account lock.
    pub async fn submit(
        &self,
        machine: &mut ChallengeMachine,
        answer: &str,
        at: DateTime<Utc>,
    ) -> SubmitOutcome {
        let question = machine
            .open_challenge()
            .map(|open| open.question.clone());
        let outcome = machine.submit(answer);

        let (result, action) = match &outcome {
            SubmitOutcome::Passed => ("Pass", "Successful Validation".to_owned()),
            SubmitOutcome::Retry { attempts_left } => (
                "Fail",
                format!("Attempt Failed ({attempts_left}/{CHALLENGE_ATTEMPTS} remaining)"),
            ),
            SubmitOutcome::LockedOut => ("Fail", "Account Locked".to_owned()),
            SubmitOutcome::NotOpen => return outcome,
        };

        if matches!(outcome, SubmitOutcome::LockedOut)
            && let Err(e) = self.progress.lock_account(&self.user).await
        {
            tracing::warn!(user = %self.user, error = %e, "failed to persist account lock");
        }

        let record = AuditRecord {
            user: self.user.clone(),
            question,
            user_response: Some(answer.trim().to_owned()),
            result: result.to_owned(),
            action,
            recorded_at: at,
        };
        if let Err(e) = self.audit.append(VERIFICATION_LOGS, record).await {
            tracing::warn!(user = %self.user, error = %e, "failed to append verification audit");
        }

        outcome
    }
}
