use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::cache::CacheStore;
use crate::config::TargetConfig;
use crate::evaluator::evaluate;
use crate::fetcher::ScheduleSource;
use crate::notifier::{Audience, Notifier};
use crate::render::{format_time, notification_text, summary_text};
use crate::schedule::ScheduleSnapshot;

const SCHEDULE_PATH: &str = "gachi/schedule";

/// One polling pass: obtain a snapshot, evaluate it, deliver whatever is
/// due, persist the updated state.
pub struct Bot {
    source: Box<dyn ScheduleSource>,
    cache: CacheStore,
    notifier: Box<dyn Notifier>,
    target: TargetConfig,
    ttl: Duration,
}

impl Bot {
    pub fn new(
        source: Box<dyn ScheduleSource>,
        cache: CacheStore,
        notifier: Box<dyn Notifier>,
        target: TargetConfig,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            notifier,
            target,
            ttl,
        }
    }

    pub async fn run(&self) -> Result<()> {
        self.run_at(Utc::now()).await
    }

    async fn run_at(&self, now: DateTime<Utc>) -> Result<()> {
        let snapshot = self.obtain_snapshot(now).await?;
        let offset = self.target.offset();
        let evaluation = evaluate(snapshot, now, &self.target);

        for due in &evaluation.due {
            let text = notification_text(due, &self.target.label, offset);
            self.notifier.post(&text, Audience::MentionFollowers).await?;
        }

        if let Some(starts) = &evaluation.summary_starts {
            let text = summary_text(starts, &self.target.label, offset);
            self.notifier.post(&text, Audience::Public).await?;
        }

        self.cache.save(&evaluation.snapshot)?;
        tracing::info!(
            "Run complete: {} notification(s), summary {}",
            evaluation.due.len(),
            if evaluation.summary_starts.is_some() {
                "posted"
            } else {
                "skipped"
            }
        );
        Ok(())
    }

    /// Cached snapshot if fresh enough, otherwise a fresh fetch. A refetch
    /// keeps the previous summary marker so a new schedule does not reset
    /// the summary throttle.
    async fn obtain_snapshot(&self, now: DateTime<Utc>) -> Result<ScheduleSnapshot> {
        if let Some(snapshot) = self.cache.load()? {
            if !snapshot.is_stale(now, self.ttl) {
                if let Some(at) = snapshot.fetched_at {
                    tracing::info!(
                        "Using cached schedule fetched at {}",
                        format_time(at, self.target.offset())
                    );
                }
                return Ok(snapshot);
            }

            let mut fresh = self.source.fetch(SCHEDULE_PATH).await?;
            fresh.last_summary_at = snapshot.last_summary_at;
            return Ok(fresh);
        }

        self.source.fetch(SCHEDULE_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    use super::*;
    use crate::schedule::{NotifyFlags, RotationWindow};

    #[derive(Clone)]
    struct StubSource {
        snapshot: ScheduleSnapshot,
        calls: Arc<AtomicUsize>,
    }

    impl StubSource {
        fn new(snapshot: ScheduleSnapshot) -> Self {
            Self {
                snapshot,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl ScheduleSource for StubSource {
        async fn fetch(&self, _path: &str) -> Result<ScheduleSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        posts: Arc<Mutex<Vec<(String, Audience)>>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn post(&self, text: &str, audience: Audience) -> Result<()> {
            self.posts
                .lock()
                .unwrap()
                .push((text.to_string(), audience));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn post(&self, _text: &str, _audience: Audience) -> Result<()> {
            anyhow::bail!("post rejected")
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 21, 12, 0, 0).unwrap()
    }

    fn window(start_in_minutes: i64) -> RotationWindow {
        let start_at = now() + Duration::minutes(start_in_minutes);
        RotationWindow {
            rule: "ガチエリア".to_string(),
            rule_key: "area".to_string(),
            maps: vec!["コンブトラック".to_string()],
            start_at,
            end_at: start_at + Duration::hours(2),
            notified: NotifyFlags::default(),
        }
    }

    fn snapshot(windows: Vec<RotationWindow>, fetched_ago_hours: i64) -> ScheduleSnapshot {
        ScheduleSnapshot {
            windows,
            fetched_at: Some(now() - Duration::hours(fetched_ago_hours)),
            last_summary_at: Some(now()),
        }
    }

    struct Harness {
        bot: Bot,
        source: StubSource,
        notifier: RecordingNotifier,
        cache: CacheStore,
        _dir: tempfile::TempDir,
    }

    fn harness(fetched: ScheduleSnapshot, cached: Option<&ScheduleSnapshot>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = CacheStore::new(&path);
        if let Some(snapshot) = cached {
            cache.save(snapshot).unwrap();
        }

        let source = StubSource::new(fetched);
        let notifier = RecordingNotifier::default();
        let bot = Bot::new(
            Box::new(source.clone()),
            CacheStore::new(&path),
            Box::new(notifier.clone()),
            TargetConfig::default(),
            Duration::hours(12),
        );

        Harness {
            bot,
            source,
            notifier,
            cache,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let cached = snapshot(vec![window(300)], 1);
        let h = harness(snapshot(vec![], 0), Some(&cached));

        h.bot.run_at(now()).await.unwrap();

        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
        assert!(h.notifier.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_cache_refetches_and_keeps_summary_marker() {
        let marker = now() - Duration::hours(1);
        let mut cached = snapshot(vec![], 13);
        cached.last_summary_at = Some(marker);

        let mut fetched = snapshot(vec![window(300)], 0);
        fetched.last_summary_at = None;
        let h = harness(fetched, Some(&cached));

        h.bot.run_at(now()).await.unwrap();

        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
        // Marker carried over, so the summary stays throttled.
        assert!(h.notifier.posts.lock().unwrap().is_empty());
        let saved = h.cache.load().unwrap().unwrap();
        assert_eq!(saved.last_summary_at, Some(marker));
    }

    #[tokio::test]
    async fn test_missing_cache_fetches_and_posts_summary() {
        let mut fetched = snapshot(vec![window(5)], 0);
        fetched.last_summary_at = None;
        let h = harness(fetched, None);

        h.bot.run_at(now()).await.unwrap();

        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
        let posts = h.notifier.posts.lock().unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(
            posts[0],
            (
                "コンブエリア soon start at 2026-08-21 21:05 +09:00".to_string(),
                Audience::MentionFollowers,
            )
        );
        assert_eq!(
            posts[1],
            (
                "コンブエリア schedules\nstart at 2026-08-21 21:05 +09:00\n".to_string(),
                Audience::Public,
            )
        );
    }

    #[tokio::test]
    async fn test_second_run_does_not_repeat_notification() {
        let cached = snapshot(vec![window(5)], 1);
        let h = harness(snapshot(vec![], 0), Some(&cached));

        h.bot.run_at(now()).await.unwrap();
        assert_eq!(h.notifier.posts.lock().unwrap().len(), 1);

        h.bot.run_at(now() + Duration::minutes(1)).await.unwrap();
        assert_eq!(h.notifier.posts.lock().unwrap().len(), 1);

        let saved = h.cache.load().unwrap().unwrap();
        assert!(saved.windows[0].notified.early);
        assert!(saved.windows[0].notified.late);
    }

    #[tokio::test]
    async fn test_approaching_window_notifies_early_only() {
        let cached = snapshot(vec![window(90)], 1);
        let h = harness(snapshot(vec![], 0), Some(&cached));

        h.bot.run_at(now()).await.unwrap();

        let posts = h.notifier.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].0,
            "コンブエリア start at 2026-08-21 22:30 +09:00"
        );

        let saved = h.cache.load().unwrap().unwrap();
        assert!(saved.windows[0].notified.early);
        assert!(!saved.windows[0].notified.late);
    }

    #[tokio::test]
    async fn test_summary_posts_after_throttle_opens() {
        let mut cached = snapshot(vec![window(300)], 1);
        cached.last_summary_at = Some(now() - Duration::hours(7));
        let h = harness(snapshot(vec![], 0), Some(&cached));

        h.bot.run_at(now()).await.unwrap();

        let posts = h.notifier.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, Audience::Public);
        assert!(posts[0].0.starts_with("コンブエリア schedules\n"));

        let saved = h.cache.load().unwrap().unwrap();
        assert_eq!(saved.last_summary_at, Some(now()));
    }

    #[tokio::test]
    async fn test_snapshot_persists_even_when_nothing_due() {
        let cached = snapshot(vec![window(300)], 1);
        let h = harness(snapshot(vec![], 0), Some(&cached));

        h.bot.run_at(now()).await.unwrap();

        let saved = h.cache.load().unwrap().unwrap();
        assert_eq!(saved.fetched_at, cached.fetched_at);
        assert_eq!(saved.windows.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_post_aborts_run_without_saving_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = CacheStore::new(&path);
        cache.save(&snapshot(vec![window(5)], 1)).unwrap();

        let bot = Bot::new(
            Box::new(StubSource::new(snapshot(vec![], 0))),
            CacheStore::new(&path),
            Box::new(FailingNotifier),
            TargetConfig::default(),
            Duration::hours(12),
        );

        assert!(bot.run_at(now()).await.is_err());

        // Flags stay false, so the next run posts the notification again.
        let saved = cache.load().unwrap().unwrap();
        assert!(!saved.windows[0].notified.early);
        assert!(!saved.windows[0].notified.late);
    }
}
