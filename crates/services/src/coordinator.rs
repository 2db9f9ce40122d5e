//! Session coordinator: composes the timing subsystems into one façade.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use rand::Rng;

use drive_core::Clock;
use drive_core::model::{Catalog, CourseId, LessonId, UserId};
use drive_core::time::learning_day_key;
use storage::repository::Store;

use crate::break_scheduler::{BreakEvent, BreakScheduler};
use crate::daily_limit::{DailyLimitService, DailyLimitStatus};
use crate::error::{CompletionError, SessionError};
use crate::identity::{
    self, ChallengeMachine, ChallengeOutcome, IdentityChallengeService, OpenChallenge,
    SubmitOutcome,
};
use crate::idleness::{ActivityKind, IdlenessMonitor};
use crate::progression::{CurrentLesson, ProgressionService, ProgressionState};
use crate::time_accumulator::{TimeAccumulator, TimeTrackingService};

/// Independent reasons playback is currently forced to pause.
///
/// Each subsystem owns one flag; resolving a flag only resumes playback when
/// no other flag remains set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PauseState {
    pub on_break: bool,
    pub idle: bool,
    pub limit_reached: bool,
    pub verification_open: bool,
}

impl PauseState {
    #[must_use]
    pub fn should_pause(&self) -> bool {
        self.on_break || self.idle || self.limit_reached || self.verification_open
    }
}

/// Owns a single user's study session for one course.
///
/// All subsystem state lives here; periodic drivers ([`crate::SessionRuntime`]
/// or a UI event loop) call the tick methods and render from the view
/// accessors. Time always flows in through the [`Clock`], never from
/// `Utc::now()` directly, so the whole session is steppable in tests.
pub struct SessionCoordinator {
    user: UserId,
    catalog: Catalog,
    clock: Clock,
    tz: FixedOffset,

    time_tracking: TimeTrackingService,
    daily_limit: DailyLimitService,
    identity: IdentityChallengeService,
    progression_svc: ProgressionService,

    accumulator: TimeAccumulator,
    /// Segments cut off by a sync suspension, waiting for the next flush.
    pending_flushes: Vec<(LessonId, u64)>,
    breaks: BreakScheduler,
    idle: IdlenessMonitor,
    challenge: ChallengeMachine,
    limit_status: DailyLimitStatus,
    progression: ProgressionState,
    pause: PauseState,
    /// User intent: whether the player should run when nothing forces a pause.
    playing: bool,
    /// The break countdown has elapsed; the dialog waits for acknowledgement.
    break_finished: bool,
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator").finish_non_exhaustive()
    }
}

impl SessionCoordinator {
    /// Open a session: load the catalog and progress record, refuse locked
    /// accounts and evaluate the daily cap before any playback starts.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AccountLocked`] for a locked account and
    /// rethrows storage failures from the initial loads.
    pub async fn start(
        store: &Store,
        user: UserId,
        course: &CourseId,
        clock: Clock,
        tz: FixedOffset,
    ) -> Result<Self, SessionError> {
        let catalog = store.catalog.load_catalog(course).await?;
        let record = store.progress.load_progress(&user).await?;
        if record.is_locked {
            return Err(SessionError::AccountLocked);
        }

        let progression = ProgressionState::from_record(&record, course);

        let now = clock.now();
        let now_local = now.with_timezone(&tz).naive_local();
        let today = record.time_for_day(&learning_day_key(now_local));
        let limit_status = crate::daily_limit::evaluate(today, now_local);

        let mut breaks = BreakScheduler::new();
        breaks.start();
        let mut idle = IdlenessMonitor::with_default_timeout();
        idle.arm(now);

        let pause = PauseState {
            limit_reached: limit_status.limit_reached,
            ..PauseState::default()
        };

        Ok(Self {
            time_tracking: TimeTrackingService::new(user.clone(), store.progress.clone()),
            daily_limit: DailyLimitService::new(user.clone(), store.progress.clone()),
            identity: IdentityChallengeService::new(
                user.clone(),
                store.security.clone(),
                store.audit.clone(),
                store.progress.clone(),
            ),
            progression_svc: ProgressionService::new(
                user.clone(),
                store.progress.clone(),
                store.audit.clone(),
            ),
            user,
            catalog,
            clock,
            tz,
            accumulator: TimeAccumulator::new(),
            pending_flushes: Vec::new(),
            breaks,
            idle,
            challenge: ChallengeMachine::new(),
            limit_status,
            progression,
            pause,
            playing: false,
            break_finished: false,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn now_local(&self) -> NaiveDateTime {
        self.now().with_timezone(&self.tz).naive_local()
    }

    /// Step a fixed clock forward. No effect on the default clock.
    pub fn advance_clock(&mut self, delta: Duration) {
        self.clock.advance(delta);
    }

    //
    // ─── TRACKING ──────────────────────────────────────────────────────────────
    //

    /// Whether the current lesson accrues watch time at all. Completed
    /// lessons play freely without counting.
    fn tracking_eligible(&self) -> Option<LessonId> {
        match self.progression.current(&self.catalog) {
            CurrentLesson::Lesson(id) if !self.progression.completed.contains(&id) => Some(id),
            _ => None,
        }
    }

    /// The player reports playback started. Refused while a pause flag is
    /// set; a completed or capped lesson plays without tracking.
    pub fn handle_play(&mut self) {
        if self.pause.should_pause() || self.challenge.is_locked_out() {
            return;
        }
        self.playing = true;
        if self.tracking_eligible().is_some() {
            self.accumulator.start(self.now());
        }
    }

    /// The player reports a user-initiated pause.
    pub async fn handle_pause(&mut self, playback_position: Option<f64>) {
        self.playing = false;
        self.flush_segment(playback_position, true).await;
    }

    /// Flush the open segment to storage. With `close` the segment ends;
    /// otherwise it continues from now (the periodic flush). Segments cut
    /// off by a suspension drain first, credited to the lesson they belong
    /// to.
    async fn flush_segment(&mut self, playback_position: Option<f64>, close: bool) {
        let now = self.now();
        let day = learning_day_key(self.now_local());

        for (lesson, seconds) in std::mem::take(&mut self.pending_flushes) {
            self.time_tracking
                .record(&lesson, &day, seconds, None, now)
                .await;
        }

        let seconds = if close {
            self.accumulator.stop(now)
        } else {
            self.accumulator.take_elapsed(now)
        };
        if seconds == 0 {
            return;
        }
        let Some(lesson) = self.tracking_eligible() else {
            return;
        };
        self.time_tracking
            .record(&lesson, &day, seconds, playback_position, now)
            .await;
    }

    /// Periodic 30-second flush while a segment is open.
    pub async fn flush_tick(&mut self) {
        self.flush_segment(None, false).await;
    }

    /// Best-effort final flush for page-exit paths.
    pub async fn save_on_exit(&mut self, playback_position: Option<f64>) {
        self.flush_segment(playback_position, true).await;
    }

    /// Stop accruing without touching the `playing` intent. The cut-off
    /// segment is parked for the next flush rather than written here, since
    /// suspension points are synchronous.
    fn suspend_tracking(&mut self) {
        let seconds = self.accumulator.stop(self.now());
        if seconds > 0
            && let Some(lesson) = self.tracking_eligible()
        {
            self.pending_flushes.push((lesson, seconds));
        }
    }

    /// Restart accruing when the user still wants playback and nothing
    /// forces a pause any more.
    fn try_resume(&mut self) {
        if self.playing
            && !self.pause.should_pause()
            && !self.challenge.is_locked_out()
            && self.tracking_eligible().is_some()
        {
            self.accumulator.start(self.now());
        }
    }

    //
    // ─── BREAKS ────────────────────────────────────────────────────────────────
    //

    /// Drive the break scheduler by `seconds` of wall-clock time. Runs every
    /// second while the session is active and not suspended elsewhere.
    pub fn break_tick(&mut self, seconds: u64) {
        // Instructional time only accrues while actually playing.
        if !self.playing || self.pause.should_pause() {
            // A running break countdown still drains while paused for it.
            if self.pause.on_break {
                let events = self.breaks.tick(seconds);
                self.apply_break_events(&events);
            }
            return;
        }
        let events = self.breaks.tick(seconds);
        self.apply_break_events(&events);
    }

    fn apply_break_events(&mut self, events: &[BreakEvent]) {
        for event in events {
            match event {
                BreakEvent::Started => {
                    self.pause.on_break = true;
                    self.break_finished = false;
                    self.suspend_tracking();
                }
                BreakEvent::Ended => {
                    // The flag stays up until the learner acknowledges.
                    self.break_finished = true;
                }
            }
        }
    }

    /// The learner acknowledges the finished break and resumes study.
    pub fn resume_from_break(&mut self) {
        if !self.break_finished {
            return;
        }
        self.break_finished = false;
        self.pause.on_break = false;
        self.try_resume();
    }

    /// Seconds left in the current break, zero otherwise.
    #[must_use]
    pub fn break_remaining(&self) -> u64 {
        self.breaks.break_remaining()
    }

    #[must_use]
    pub fn break_finished(&self) -> bool {
        self.break_finished
    }

    //
    // ─── IDLENESS ──────────────────────────────────────────────────────────────
    //

    /// Forward a user-input signal to the idle countdown.
    pub fn record_activity(&mut self, kind: ActivityKind) {
        self.idle.record_activity(kind, self.now());
    }

    /// Poll the idle deadline. On elapse the idle prompt opens and tracking
    /// suspends; already-idle sessions are left alone.
    pub fn idle_poll(&mut self) {
        if self.pause.idle {
            return;
        }
        if self.idle.poll(self.now()) {
            self.pause.idle = true;
            self.suspend_tracking();
        }
    }

    /// The learner dismisses the idle prompt.
    pub fn confirm_presence(&mut self) {
        self.pause.idle = false;
        self.idle.arm(self.now());
        self.try_resume();
    }

    //
    // ─── DAILY LIMIT ───────────────────────────────────────────────────────────
    //

    /// Re-evaluate the daily cap against stored totals. Reaching the cap
    /// suspends tracking; dropping below it clears the flag but never
    /// auto-resumes playback.
    pub async fn limit_poll(&mut self) {
        let status = self
            .daily_limit
            .poll(self.now_local(), &self.limit_status)
            .await;
        let reached_now = status.limit_reached && !self.limit_status.limit_reached;
        self.limit_status = status;
        self.pause.limit_reached = self.limit_status.limit_reached;
        if reached_now {
            self.suspend_tracking();
            self.playing = false;
        }
    }

    #[must_use]
    pub fn limit_status(&self) -> &DailyLimitStatus {
        &self.limit_status
    }

    //
    // ─── IDENTITY CHALLENGE ────────────────────────────────────────────────────
    //

    /// The challenge timer fires: open the verification modal.
    pub async fn fire_challenge(&mut self) -> ChallengeOutcome {
        let outcome = self.identity.fire(&mut self.challenge).await;
        if outcome == ChallengeOutcome::Opened {
            self.pause.verification_open = true;
            self.suspend_tracking();
        }
        outcome
    }

    /// Submit an answer to the open challenge.
    pub async fn submit_challenge(&mut self, answer: &str) -> SubmitOutcome {
        let now = self.now();
        let outcome = self
            .identity
            .submit(&mut self.challenge, answer, now)
            .await;
        match outcome {
            SubmitOutcome::Passed => {
                self.pause.verification_open = false;
                self.try_resume();
            }
            SubmitOutcome::LockedOut => {
                // The lockout screen replaces the session; never resumes.
                self.playing = false;
            }
            SubmitOutcome::Retry { .. } | SubmitOutcome::NotOpen => {}
        }
        outcome
    }

    /// Draw the delay until the next challenge fires.
    #[must_use]
    pub fn next_challenge_delay(&self, rng: &mut impl Rng) -> std::time::Duration {
        identity::next_challenge_delay(rng)
    }

    #[must_use]
    pub fn open_challenge(&self) -> Option<&OpenChallenge> {
        self.challenge.open_challenge()
    }

    #[must_use]
    pub fn is_locked_out(&self) -> bool {
        self.challenge.is_locked_out()
    }

    //
    // ─── PROGRESSION ───────────────────────────────────────────────────────────
    //

    /// Sidebar navigation to a specific lesson. The open segment flushes
    /// against the lesson being left before the switch.
    pub async fn select_lesson(&mut self, lesson: LessonId, playback_position: Option<f64>) {
        if !self.catalog.contains_lesson(&lesson) {
            return;
        }
        self.flush_segment(playback_position, true).await;
        let course = self.catalog.course_id().clone();
        self.progression_svc
            .remember_last_viewed(&mut self.progression, &course, &lesson)
            .await;
        self.progression.manual_selection = Some(lesson);
    }

    /// The video player signals end-of-playback for a lesson.
    pub fn mark_video_ended(&mut self, lesson: LessonId) {
        self.progression.ended_videos.insert(lesson);
    }

    /// Mark the current lesson completed.
    ///
    /// The open watch segment flushes first so its seconds land before the
    /// completion write.
    ///
    /// # Errors
    ///
    /// See [`ProgressionService::complete_lesson`].
    pub async fn complete_lesson(
        &mut self,
        lesson: &LessonId,
        playback_position: Option<f64>,
    ) -> Result<(), CompletionError> {
        self.save_on_exit(playback_position).await;
        let at = self.now();
        self.progression_svc
            .complete_lesson(&mut self.progression, &self.catalog, lesson, at)
            .await
    }

    #[must_use]
    pub fn current_lesson(&self) -> CurrentLesson {
        self.progression.current(&self.catalog)
    }

    #[must_use]
    pub fn course_completed(&self) -> bool {
        self.current_lesson() == CurrentLesson::CourseComplete
    }

    //
    // ─── VIEWS & TEARDOWN ──────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn pause_state(&self) -> PauseState {
        self.pause
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.accumulator.is_tracking()
    }

    /// Final flush and subsystem shutdown when the session ends.
    pub async fn teardown(&mut self, playback_position: Option<f64>) {
        self.save_on_exit(playback_position).await;
        self.breaks.stop();
        self.idle.cancel();
        self.playing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_core::model::{Course, Lesson, LessonKind, Module, ModuleId, SecurityProfile,
        SecurityQuestion};
    use drive_core::time::fixed_clock;
    use storage::repository::{
        CatalogRepository as _, InMemoryStore, ProgressRepository as _, SecurityRepository as _,
    };

    fn catalog() -> Catalog {
        let course = Course {
            id: CourseId::new("c1"),
            title: "Traffic Rules".into(),
            module_order: vec![ModuleId::new("m1")],
        };
        let module = Module {
            id: ModuleId::new("m1"),
            course_id: CourseId::new("c1"),
            title: "Basics".into(),
            lesson_order: vec![LessonId::new("l1"), LessonId::new("l2")],
        };
        let lessons = vec![
            Lesson {
                id: LessonId::new("l1"),
                module_id: ModuleId::new("m1"),
                course_id: CourseId::new("c1"),
                title: "Right of way".into(),
                kind: LessonKind::Video,
                video_url: Some("videos/l1.mp4".into()),
            },
            Lesson {
                id: LessonId::new("l2"),
                module_id: ModuleId::new("m1"),
                course_id: CourseId::new("c1"),
                title: "Speed limits".into(),
                kind: LessonKind::Reading,
                video_url: None,
            },
        ];
        Catalog::new(course, vec![module], lessons)
    }

    async fn coordinator(store: &InMemoryStore) -> SessionCoordinator {
        store.save_catalog(&catalog()).await.unwrap();
        SessionCoordinator::start(
            &Store::from_in_memory(store),
            UserId::new("u1"),
            &CourseId::new("c1"),
            fixed_clock(),
            FixedOffset::east_opt(3600).unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn locked_account_cannot_start() {
        let store = InMemoryStore::new();
        store.save_catalog(&catalog()).await.unwrap();
        store.lock_account(&UserId::new("u1")).await.unwrap();

        let err = SessionCoordinator::start(
            &Store::from_in_memory(&store),
            UserId::new("u1"),
            &CourseId::new("c1"),
            fixed_clock(),
            FixedOffset::east_opt(0).unwrap(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::AccountLocked));
    }

    #[tokio::test]
    async fn play_flush_credits_lesson_and_day() {
        let store = InMemoryStore::new();
        let mut session = coordinator(&store).await;

        session.handle_play();
        assert!(session.is_tracking());
        session.advance_clock(Duration::seconds(45));
        session.handle_pause(Some(44.7)).await;

        let record = store.load_progress(&UserId::new("u1")).await.unwrap();
        let entry = &record.lessons[&LessonId::new("l1")];
        assert_eq!(entry.time_spent_seconds, 45);
        assert_eq!(entry.playback_time, 44.7);
        let day = learning_day_key(session.now_local());
        assert_eq!(record.time_for_day(&day), 45);
    }

    #[tokio::test]
    async fn pause_flags_compose_with_or() {
        let store = InMemoryStore::new();
        let mut session = coordinator(&store).await;
        session.handle_play();

        // Idle fires while a challenge is also open.
        store
            .save_security_profile(
                &UserId::new("u1"),
                &SecurityProfile::new(vec![SecurityQuestion::new("Pet?", "Rex")]),
            )
            .await
            .unwrap();
        assert_eq!(session.fire_challenge().await, ChallengeOutcome::Opened);
        session.advance_clock(Duration::seconds(400));
        session.idle_poll();

        assert!(session.pause_state().idle);
        assert!(session.pause_state().verification_open);
        assert!(!session.is_tracking());

        // Resolving only the challenge must not resume.
        assert_eq!(session.submit_challenge("Rex").await, SubmitOutcome::Passed);
        assert!(!session.is_tracking());

        // Resolving the last flag resumes.
        session.confirm_presence();
        assert!(session.is_tracking());
    }

    #[tokio::test]
    async fn completed_lesson_plays_without_tracking() {
        let store = InMemoryStore::new();
        let mut session = coordinator(&store).await;

        session.mark_video_ended(LessonId::new("l1"));
        session.complete_lesson(&LessonId::new("l1"), None).await.unwrap();

        // Current moved on to l2; navigate back to the completed lesson.
        session.select_lesson(LessonId::new("l1"), None).await;
        session.handle_play();
        assert!(session.is_playing());
        assert!(!session.is_tracking());
    }

    #[tokio::test]
    async fn break_pause_holds_until_acknowledged() {
        let store = InMemoryStore::new();
        let mut session = coordinator(&store).await;
        session.handle_play();

        session.break_tick(crate::break_scheduler::BREAK_THRESHOLD_SECONDS);
        assert!(session.pause_state().on_break);
        assert!(!session.is_tracking());

        // Countdown drains, but the flag stays until the learner confirms.
        session.break_tick(crate::break_scheduler::BREAK_DURATION_SECONDS);
        assert!(session.break_finished());
        assert!(session.pause_state().on_break);

        // Acknowledging before the countdown elapsed would be a no-op.
        session.resume_from_break();
        assert!(!session.pause_state().on_break);
        assert!(session.is_tracking());
    }

    #[tokio::test]
    async fn reaching_the_cap_suspends_and_stays_paused() {
        let store = InMemoryStore::new();
        let mut session = coordinator(&store).await;
        session.handle_play();

        let day = learning_day_key(session.now_local());
        store
            .add_watch_time(
                &UserId::new("u1"),
                &LessonId::new("l1"),
                &day,
                crate::daily_limit::DAILY_CAP_SECONDS,
                None,
                session.now(),
            )
            .await
            .unwrap();

        session.limit_poll().await;
        assert!(session.pause_state().limit_reached);
        assert!(!session.is_tracking());
        assert!(!session.is_playing());
        assert!(session.limit_status().resume_message.is_some());

        // The player must not restart while capped.
        session.handle_play();
        assert!(!session.is_playing());
    }

    #[tokio::test]
    async fn lockout_never_resumes() {
        let store = InMemoryStore::new();
        store
            .save_security_profile(
                &UserId::new("u1"),
                &SecurityProfile::new(vec![SecurityQuestion::new("Pet?", "Rex")]),
            )
            .await
            .unwrap();
        let mut session = coordinator(&store).await;
        session.handle_play();

        session.fire_challenge().await;
        for _ in 0..crate::identity::CHALLENGE_ATTEMPTS {
            session.submit_challenge("wrong").await;
        }

        assert!(session.is_locked_out());
        assert!(!session.is_playing());
        session.handle_play();
        assert!(!session.is_playing());
        assert!(store.load_progress(&UserId::new("u1")).await.unwrap().is_locked);
    }

    #[tokio::test]
    async fn suspended_segment_is_credited_on_the_next_flush() {
        let store = InMemoryStore::new();
        store
            .save_security_profile(
                &UserId::new("u1"),
                &SecurityProfile::new(vec![SecurityQuestion::new("Pet?", "Rex")]),
            )
            .await
            .unwrap();
        let mut session = coordinator(&store).await;

        session.handle_play();
        session.advance_clock(Duration::seconds(20));
        session.fire_challenge().await;
        assert!(!session.is_tracking());

        session.submit_challenge("Rex").await;
        session.advance_clock(Duration::seconds(10));
        session.flush_tick().await;

        let record = store.load_progress(&UserId::new("u1")).await.unwrap();
        // 20 s before the suspension plus 10 s after the resume.
        assert_eq!(record.lessons[&LessonId::new("l1")].time_spent_seconds, 30);
    }

    #[tokio::test]
    async fn no_security_questions_auto_passes_without_pausing() {
        let store = InMemoryStore::new();
        let mut session = coordinator(&store).await;
        session.handle_play();

        assert_eq!(session.fire_challenge().await, ChallengeOutcome::AutoPassed);
        assert!(!session.pause_state().verification_open);
        assert!(session.is_tracking());
    }
}
