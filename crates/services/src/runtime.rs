//! Background drivers for a running session.
//!
//! The coordinator itself is passive; this module owns the tokio tasks that
//! feed it ticks: the per-second break/idle tick, the 30-second watch-time
//! flush, the daily-limit poll and the randomized challenge timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::coordinator::SessionCoordinator;
use crate::daily_limit::LIMIT_POLL_INTERVAL_SECONDS;
use crate::time_accumulator::FLUSH_INTERVAL_SECONDS;

/// Drives a [`SessionCoordinator`] with periodic ticks until shut down.
pub struct SessionRuntime {
    coordinator: Arc<Mutex<SessionCoordinator>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionRuntime {
    /// Spawn the periodic drivers around an already-started coordinator.
    #[must_use]
    pub fn spawn(coordinator: SessionCoordinator) -> Self {
        let coordinator = Arc::new(Mutex::new(coordinator));
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::with_capacity(4);

        // Per-second tick: break accrual and the idle deadline.
        {
            let coordinator = Arc::clone(&coordinator);
            let mut rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let mut guard = coordinator.lock().await;
                            guard.break_tick(1);
                            guard.idle_poll();
                        }
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        // Periodic watch-time flush.
        {
            let coordinator = Arc::clone(&coordinator);
            let mut rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(FLUSH_INTERVAL_SECONDS));
                // The first tick of a tokio interval fires immediately.
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            coordinator.lock().await.flush_tick().await;
                        }
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        // Daily-limit poll.
        {
            let coordinator = Arc::clone(&coordinator);
            let mut rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(LIMIT_POLL_INTERVAL_SECONDS));
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            coordinator.lock().await.limit_poll().await;
                        }
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        // Challenge timer: a fresh random delay is drawn after every firing.
        {
            let coordinator = Arc::clone(&coordinator);
            let mut rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    let delay = {
                        let guard = coordinator.lock().await;
                        let mut rng = rand::rng();
                        guard.next_challenge_delay(&mut rng)
                    };
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {
                            coordinator.lock().await.fire_challenge().await;
                        }
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        Self {
            coordinator,
            shutdown,
            tasks,
        }
    }

    /// Shared handle for UI code to call session operations on.
    #[must_use]
    pub fn coordinator(&self) -> Arc<Mutex<SessionCoordinator>> {
        Arc::clone(&self.coordinator)
    }

    /// Stop the drivers, run the coordinator teardown and flush the open
    /// segment one last time.
    pub async fn shutdown(mut self, playback_position: Option<f64>) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.coordinator
            .lock()
            .await
            .teardown(playback_position)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use drive_core::model::{
        Catalog, Course, CourseId, Lesson, LessonId, LessonKind, Module, ModuleId, UserId,
    };
    use drive_core::time::fixed_clock;
    use storage::repository::{CatalogRepository as _, InMemoryStore, Store};

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
            lesson_order: vec![LessonId::new("l1")],
        };
        let lesson = Lesson {
            id: LessonId::new("l1"),
            module_id: ModuleId::new("m1"),
            course_id: CourseId::new("c1"),
            title: "Right of way".into(),
            kind: LessonKind::Reading,
            video_url: None,
        };
        Catalog::new(course, vec![module], vec![lesson])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawn_and_shutdown_drain_cleanly() {
        let store = InMemoryStore::new();
        store.save_catalog(&catalog()).await.unwrap();
        let session = SessionCoordinator::start(
            &Store::from_in_memory(&store),
            UserId::new("u1"),
            &CourseId::new("c1"),
            fixed_clock(),
            FixedOffset::east_opt(0).unwrap(),
        )
        .await
        .unwrap();

        let runtime = SessionRuntime::spawn(session);
        let handle = runtime.coordinator();
        handle.lock().await.handle_play();
        assert!(handle.lock().await.is_playing());

        runtime.shutdown(None).await;
        assert!(!handle.lock().await.is_playing());
    }
}
