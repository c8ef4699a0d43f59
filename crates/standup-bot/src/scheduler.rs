//! The reminder timer loop.
//!
//! Each phase has its own schedule. The loop sleeps until the earliest
//! pending `(time, phase)`, fires it, and advances only that phase, so phases
//! sharing an instant fire one after another in declaration order. A firing
//! that is overdue (after a slow fan-out) fires straight away, unless its
//! cycle closed while the host was suspended or the clock jumped forward;
//! those are dropped so missed days are not replayed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use standup_core::config::{Config, ReminderPolicy};
use standup_core::membership::MembershipStore;
use standup_core::timers::PhaseTimers;
use standup_core::types::{CycleState, Phase};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::BotError;
use crate::notify::{DeliveryReport, Notifier};
use crate::reset::{CycleResetter, ResetOutcome};

/// Upper bound on one sleep, so wall-clock jumps are noticed within a minute.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// What one phase firing did.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub fired_at: DateTime<Utc>,
    /// `None` when the membership store could not be read.
    pub missing: Option<Vec<String>>,
    /// The reminder text, when one was sent.
    pub message: Option<String>,
    pub deliveries: Vec<DeliveryReport>,
    /// Set on deadline firings only.
    pub reset: Option<ResetOutcome>,
}

pub struct ReminderScheduler {
    members: Vec<String>,
    policy: ReminderPolicy,
    store: Arc<MembershipStore>,
    notifier: Arc<Notifier>,
    resetter: CycleResetter,
    timers: PhaseTimers,
    clock: Arc<dyn Clock>,
    state: CycleState,
    reports: broadcast::Sender<PhaseReport>,
}

impl ReminderScheduler {
    pub fn new(
        config: &Config,
        store: Arc<MembershipStore>,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BotError> {
        let timers = config.phase_timers()?;
        Ok(Self {
            members: config.members.clone(),
            policy: config.reminders.clone(),
            resetter: CycleResetter::new(Arc::clone(&store)),
            store,
            notifier,
            timers,
            clock,
            state: CycleState::Idle,
            reports: broadcast::channel(16).0,
        })
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Receive a [`PhaseReport`] for every phase fired from here on.
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseReport> {
        self.reports.subscribe()
    }

    /// Run one phase's action now.
    pub async fn fire(&mut self, phase: Phase) -> PhaseReport {
        if !self.state.accepts(phase) {
            warn!(%phase, state = %self.state, "phase fired out of cycle order");
        }
        let fired_at = self.clock.now();

        let store = Arc::clone(&self.store);
        let members = self.members.clone();
        let lookup = tokio::task::spawn_blocking(move || store.missing_members(&members));
        let missing = match lookup.await {
            Ok(Ok(missing)) => Some(missing),
            Ok(Err(e)) => {
                error!(%phase, error = %e, "cannot compute missing members; skipping reminders");
                None
            }
            Err(e) => {
                error!(%phase, error = %e, "missing-member lookup panicked; skipping reminders");
                None
            }
        };

        let mut message = None;
        let mut deliveries = Vec::new();
        if let Some(missing) = missing.as_deref().filter(|m| !m.is_empty()) {
            let text = phase.reminder_message(missing);
            deliveries.push(self.notifier.remind(&text).await);
            if phase == Phase::Deadline && self.policy.publish_deadline {
                deliveries.push(self.notifier.publish(&text).await);
            }
            if self.policy.direct_message {
                deliveries.push(self.notifier.direct_message(missing, &text).await);
            }
            message = Some(text);
        }

        info!(
            %phase,
            missing = missing.as_ref().map(Vec::len),
            failed = deliveries.iter().map(|d| d.failed.len()).sum::<usize>(),
            "phase fired"
        );

        let reset = if phase == Phase::Deadline {
            self.state = CycleState::Expired;
            let resetter = self.resetter.clone();
            let outcome = tokio::task::spawn_blocking(move || resetter.outcome())
                .await
                .unwrap_or_else(|e| ResetOutcome::Failed {
                    reason: format!("reset task failed: {e}"),
                });
            self.state = CycleState::Idle;
            Some(outcome)
        } else {
            self.state = phase.warned_state();
            None
        };

        let report = PhaseReport {
            phase,
            fired_at,
            missing,
            message,
            deliveries,
            reset,
        };
        let _ = self.reports.send(report.clone());
        report
    }

    /// Fire phases as they come due until `shutdown` receives a value or its
    /// sender goes away. A firing in progress always completes.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut registry = self.timers.registry(self.clock.now());
        if let Some(first) = registry.peek() {
            self.state = resume_state(first.phase);
        }
        info!(pending = ?registry.pending(), state = %self.state, "reminder scheduler started");

        loop {
            if !matches!(
                shutdown.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ) {
                break;
            }

            let Some(firing) = registry.peek() else {
                warn!("no phase will ever fire again; waiting for shutdown");
                let _ = shutdown.recv().await;
                break;
            };

            let now = self.clock.now();
            if firing.at > now {
                let wait = (firing.at - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_SLEEP);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => continue,
                    _ = shutdown.recv() => break,
                }
            }

            registry.advance(firing.phase);
            if self.timers.superseded(firing, now) {
                warn!(
                    phase = %firing.phase,
                    scheduled = %firing.at,
                    "dropping firing from a cycle that already closed"
                );
                self.state = match firing.phase {
                    Phase::Deadline => CycleState::Idle,
                    phase => phase.warned_state(),
                };
                continue;
            }
            self.fire(firing.phase).await;
        }

        info!("reminder scheduler stopped");
    }
}

/// The state a cycle is in just before `phase` fires.
fn resume_state(phase: Phase) -> CycleState {
    match phase.index().checked_sub(1) {
        Some(prev) => Phase::all()[prev].warned_state(),
        None => CycleState::Idle,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::notify::testing::RecordingTransport;
    use crate::notify::DeliveryKind;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const CONFIG: &str = r##"
config:
  irc:
    nick: standupbot
    server: irc.example.org
    channels:
      definitions:
        - name: "#team"
        - name: "#leads"
        - name: "#ops"
      publish: ["#team"]
      remind: ["#team", "#leads", "#ops"]
  members: [alice, bob]
  timers:
    early_reminder: "0 45 9 * * Mon-Fri"
    due_reminder: "0 0 10 * * Mon-Fri"
    late_reminder: "0 15 10 * * Mon-Fri"
    deadline_reminder: "0 0 12 * * Mon-Fri"
"##;

    struct Harness {
        _dir: TempDir,
        store: Arc<MembershipStore>,
        transport: Arc<RecordingTransport>,
        scheduler: ReminderScheduler,
    }

    fn monday_at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    /// Tokio-driven wall time that can also jump forward, like a host waking
    /// from suspend.
    struct JumpClock {
        base: MonotonicClock,
        skew: std::sync::Mutex<chrono::Duration>,
    }

    impl JumpClock {
        fn starting_at(wall: DateTime<Utc>) -> Self {
            Self {
                base: MonotonicClock::starting_at(wall),
                skew: std::sync::Mutex::new(chrono::Duration::zero()),
            }
        }

        fn jump(&self, by: chrono::Duration) {
            *self.skew.lock().unwrap() += by;
        }
    }

    impl Clock for JumpClock {
        fn now(&self) -> DateTime<Utc> {
            self.base.now() + *self.skew.lock().unwrap()
        }
    }

    fn harness_with(config: Config, transport: RecordingTransport) -> Harness {
        let clock = Arc::new(MonotonicClock::starting_at(monday_at(8, 0)));
        harness_on(config, transport, clock)
    }

    fn harness_on(
        config: Config,
        transport: RecordingTransport,
        clock: Arc<dyn Clock>,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MembershipStore::open(dir.path().join("members")).unwrap());
        let transport = Arc::new(transport);
        let notifier = Arc::new(Notifier::new(
            transport.clone(),
            &config.irc.channels,
            &config.reminders,
        ));
        let scheduler =
            ReminderScheduler::new(&config, Arc::clone(&store), notifier, clock).unwrap();
        Harness {
            _dir: dir,
            store,
            transport,
            scheduler,
        }
    }

    fn harness() -> Harness {
        harness_with(
            Config::from_yaml(CONFIG).unwrap(),
            RecordingTransport::default(),
        )
    }

    fn reminders(h: &Harness) -> Vec<String> {
        team_reminders(&h.transport)
    }

    fn team_reminders(transport: &RecordingTransport) -> Vec<String> {
        transport
            .sent_of(DeliveryKind::Remind)
            .into_iter()
            .filter(|(target, _)| target == "#team")
            .map(|(_, message)| message)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn early_names_everyone_missing() {
        let mut h = harness();
        let report = h.scheduler.fire(Phase::Early).await;

        assert_eq!(
            report.missing,
            Some(vec!["alice".to_string(), "bob".to_string()])
        );
        assert_eq!(reminders(&h), vec!["Standups are due soon. (alice, bob)"]);
        assert_eq!(h.transport.sent_of(DeliveryKind::Remind).len(), 3);
        assert_eq!(h.scheduler.state(), CycleState::EarlyWarned);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_before_due_drops_member_from_reminder() {
        let mut h = harness();
        h.scheduler.fire(Phase::Early).await;
        h.store.record_submission("alice", "alice\nCompleted: x").unwrap();

        let report = h.scheduler.fire(Phase::Due).await;
        assert_eq!(report.message.as_deref(), Some("Standups are due! (bob)"));
        assert_eq!(h.scheduler.state(), CycleState::DueWarned);
    }

    #[tokio::test(start_paused = true)]
    async fn nobody_missing_sends_nothing_but_state_advances() {
        let mut h = harness();
        h.store.record_submission("alice", "a").unwrap();
        h.store.record_submission("bob", "b").unwrap();

        let report = h.scheduler.fire(Phase::Early).await;
        assert_eq!(report.missing, Some(Vec::new()));
        assert!(report.message.is_none());
        assert!(report.deliveries.is_empty());
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.scheduler.state(), CycleState::EarlyWarned);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_publishes_when_configured_and_resets() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        config.reminders.publish_deadline = true;
        let mut h = harness_with(config, RecordingTransport::default());
        h.store.record_submission("alice", "a").unwrap();

        for phase in [Phase::Early, Phase::Due, Phase::Late] {
            h.scheduler.fire(phase).await;
        }
        let report = h.scheduler.fire(Phase::Deadline).await;

        let expected = "The deadline for standups is now. You lose the game! (bob)";
        assert_eq!(report.message.as_deref(), Some(expected));
        assert_eq!(
            h.transport.sent_of(DeliveryKind::Publish),
            vec![("#team".to_string(), expected.to_string())]
        );
        assert_eq!(report.reset, Some(ResetOutcome::Cleared { removed: 1 }));
        assert!(!h.store.has_submitted("alice").unwrap());
        assert_eq!(h.scheduler.state(), CycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resets_even_when_nobody_is_missing() {
        let mut h = harness();
        h.store.record_submission("alice", "a").unwrap();
        h.store.record_submission("bob", "b").unwrap();

        let report = h.scheduler.fire(Phase::Deadline).await;
        assert!(report.deliveries.is_empty());
        assert_eq!(report.reset, Some(ResetOutcome::Cleared { removed: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_channel_does_not_block_the_others() {
        let mut h = harness_with(
            Config::from_yaml(CONFIG).unwrap(),
            RecordingTransport::failing(&["#leads"]),
        );
        let report = h.scheduler.fire(Phase::Late).await;

        let remind = &report.deliveries[0];
        assert_eq!(remind.delivered, vec!["#team", "#ops"]);
        assert_eq!(remind.failed.len(), 1);
        assert_eq!(remind.failed[0].target, "#leads");
    }

    #[tokio::test(start_paused = true)]
    async fn direct_message_policy_messages_each_missing_member() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        config.reminders.direct_message = true;
        let mut h = harness_with(config, RecordingTransport::default());
        h.store.record_submission("bob", "b").unwrap();

        h.scheduler.fire(Phase::Due).await;
        assert_eq!(
            h.transport.sent_of(DeliveryKind::Direct),
            vec![("alice".to_string(), "Standups are due! (alice)".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_store_skips_messages_but_deadline_still_resets() {
        let mut h = harness();
        std::fs::remove_dir_all(h.store.dir()).unwrap();

        let late = h.scheduler.fire(Phase::Late).await;
        assert!(late.missing.is_none());
        assert!(late.deliveries.is_empty());

        let deadline = h.scheduler.fire(Phase::Deadline).await;
        assert!(matches!(deadline.reset, Some(ResetOutcome::Failed { .. })));
        assert!(h.transport.sent().is_empty());

        // the next cycle works once the directory is back
        std::fs::create_dir_all(h.store.dir()).unwrap();
        let early = h.scheduler.fire(Phase::Early).await;
        assert_eq!(early.missing.map(|m| m.len()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn run_fires_a_whole_cycle_in_order() {
        let h = harness();
        let store = Arc::clone(&h.store);
        let transport = Arc::clone(&h.transport);
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(h.scheduler.run(rx));

        // alice submits between Early (9:45) and Due (10:00)
        tokio::time::sleep(Duration::from_secs(110 * 60)).await;
        store.record_submission("alice", "a").unwrap();
        // through the deadline at 12:00
        tokio::time::sleep(Duration::from_secs(131 * 60)).await;

        let team: Vec<String> = transport
            .sent_of(DeliveryKind::Remind)
            .into_iter()
            .filter(|(target, _)| target == "#team")
            .map(|(_, message)| message)
            .collect();
        assert_eq!(
            team,
            vec![
                "Standups are due soon. (alice, bob)",
                "Standups are due! (bob)",
                "Standups are late! (bob)",
                "The deadline for standups is now. You lose the game! (bob)",
            ]
        );
        assert!(!store.has_submitted("alice").unwrap());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_the_deadline_when_the_store_goes_away_at_late() {
        let h = harness();
        let store = Arc::clone(&h.store);
        let transport = Arc::clone(&h.transport);
        let mut reports = h.scheduler.subscribe();
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(h.scheduler.run(rx));

        // 10:05, after Due and before Late
        tokio::time::sleep(Duration::from_secs(125 * 60)).await;
        std::fs::remove_dir_all(store.dir()).unwrap();
        // through the deadline at 12:00
        tokio::time::sleep(Duration::from_secs(116 * 60)).await;

        let fired: Vec<PhaseReport> = std::iter::from_fn(|| reports.try_recv().ok()).collect();
        assert_eq!(
            fired.iter().map(|r| r.phase).collect::<Vec<_>>(),
            Phase::all()
        );
        assert!(fired[2].missing.is_none());
        assert!(fired[2].deliveries.is_empty());
        assert_eq!(fired[3].fired_at, monday_at(12, 0));
        assert!(matches!(fired[3].reset, Some(ResetOutcome::Failed { .. })));
        assert_eq!(
            team_reminders(&transport),
            vec![
                "Standups are due soon. (alice, bob)",
                "Standups are due! (alice, bob)",
            ]
        );

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn clock_jump_does_not_replay_missed_cycles() {
        let clock = Arc::new(JumpClock::starting_at(monday_at(8, 0)));
        let h = harness_on(
            Config::from_yaml(CONFIG).unwrap(),
            RecordingTransport::default(),
            clock.clone(),
        );
        let store = Arc::clone(&h.store);
        let transport = Arc::clone(&h.transport);
        let mut reports = h.scheduler.subscribe();
        store.record_submission("alice", "a").unwrap();
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(h.scheduler.run(rx));
        tokio::time::sleep(Duration::from_secs(1)).await;

        // the host sleeps from Monday 08:00 until Thursday 08:00
        clock.jump(chrono::Duration::days(3));
        tokio::time::sleep(MAX_SLEEP + Duration::from_secs(1)).await;

        // only Wednesday's deadline fires, closing the last missed cycle
        let report = reports.try_recv().unwrap();
        assert_eq!(report.phase, Phase::Deadline);
        assert_eq!(report.reset, Some(ResetOutcome::Cleared { removed: 1 }));
        assert!(reports.try_recv().is_err());
        assert_eq!(
            team_reminders(&transport),
            vec!["The deadline for standups is now. You lose the game! (bob)"]
        );

        // Thursday's cycle then runs normally
        tokio::time::sleep(Duration::from_secs(4 * 60 * 60)).await;
        assert_eq!(team_reminders(&transport).len(), 5);
        assert_eq!(
            team_reminders(&transport)[1],
            "Standups are due soon. (alice, bob)"
        );

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn coinciding_phases_fire_in_declaration_order() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        config.timers.due_reminder = config.timers.early_reminder.clone();
        let h = harness_with(config, RecordingTransport::default());
        let transport = Arc::clone(&h.transport);
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(h.scheduler.run(rx));

        tokio::time::sleep(Duration::from_secs(106 * 60)).await;
        let team: Vec<String> = transport
            .sent_of(DeliveryKind::Remind)
            .into_iter()
            .filter(|(target, _)| target == "#team")
            .map(|(_, message)| message)
            .collect();
        assert_eq!(
            team,
            vec![
                "Standups are due soon. (alice, bob)",
                "Standups are due! (alice, bob)",
            ]
        );

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_an_idle_loop() {
        let h = harness();
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(h.scheduler.run(rx));
        tokio::task::yield_now().await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn resume_state_precedes_phase() {
        assert_eq!(resume_state(Phase::Early), CycleState::Idle);
        assert_eq!(resume_state(Phase::Late), CycleState::DueWarned);
        assert_eq!(resume_state(Phase::Deadline), CycleState::LateWarned);
    }
}
