use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Local, NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::import::{self, ImportResult};
use crate::settings::Settings;
use crate::shell::{Shell, SlotNotification};
use crate::slots;
use crate::stale::{compute_stale_slot, StaleSlot};
use crate::store::{Entry, EntryStore};

use super::state::SchedulerState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Cadence of the stale check, independent of slot granularity.
const STALE_CHECK_INTERVAL_SECS: u64 = 60;

/// Accumulated away-notifications that force a digest flush.
const DIGEST_FLUSH_THRESHOLD: usize = 4;

const NOTIFY_TITLE: &str = "Time to log your work";
const DIGEST_TITLE: &str = "Missed work slots";
const STALE_TITLE: &str = "Unlogged time is piling up";

/// Typed events the UI subscribes to instead of being called into directly.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchedulerEvent {
    /// Pending-queue membership changed; one event per logical operation.
    QueueChanged,
    /// The classification prompt should open for this slot.
    PromptOpen { slot: String },
    /// The oldest pending slot outlived the stale threshold.
    StaleAlert { key: String, age_minutes: i64 },
}

type TaskSlot = Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>;

/// Owns the pending queue, the ticker, and the stale detector.
///
/// Clones share the same state; all mutation funnels through these methods so
/// queue invariants hold without any global variables.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    store: EntryStore,
    shell: Arc<dyn Shell>,
    events: broadcast::Sender<SchedulerEvent>,
    ticker: TaskSlot,
    stale_task: TaskSlot,
}

impl Scheduler {
    pub fn new(store: EntryStore, shell: Arc<dyn Shell>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(SchedulerState::new())),
            store,
            shell,
            events,
            ticker: Arc::new(Mutex::new(None)),
            stale_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Sorted snapshot of the slot keys awaiting classification.
    pub async fn pending_slots(&self) -> Vec<String> {
        self.state.lock().await.pending_sorted()
    }

    /// Spawn the ticker and the stale detector. Safe to call again; previous
    /// tasks are torn down first.
    pub async fn start(&self) {
        self.restart_ticker().await;
        self.restart_stale_detector().await;
    }

    /// Cancel both background tasks. Idempotent: a second call (or a call
    /// before `start`) is a no-op.
    pub async fn stop(&self) {
        cancel_task(&self.ticker).await;
        cancel_task(&self.stale_task).await;
    }

    /// Rebuild the backlog of past unlogged slots for today. Used at process
    /// start and after an external import.
    pub async fn rebuild_backlog(&self, include_future: bool) {
        self.rebuild_pending_at(include_future, Local::now().naive_local())
            .await;
    }

    /// Same rebuild, invoked whenever settings are saved: a granularity,
    /// window, or weekday change invalidates previously computed boundaries.
    pub async fn rebuild_after_settings_change(&self, include_future: bool) {
        self.rebuild_pending_at(include_future, Local::now().naive_local())
            .await;
    }

    /// Persist settings, rebuild the queue against the new boundaries, and
    /// re-arm the ticker so the next wake reflects them.
    pub async fn save_settings(&self, settings: Settings) -> Result<Settings> {
        let saved = self.store.save_settings(settings)?;
        self.rebuild_after_settings_change(false).await;
        self.restart_ticker().await;
        Ok(saved)
    }

    /// Classify one or more pending slots: persist an entry per key and drop
    /// each from the queue.
    pub async fn submit_slots(
        &self,
        keys: &[String],
        description: &str,
        category: &str,
    ) -> Result<()> {
        let settings = self.store.get_settings();
        let gran = i64::from(slots::slot_minutes(&settings));
        let description = description.trim();
        let category = category.trim();

        let mut entries = Vec::new();
        let mut submitted = Vec::new();
        for key in keys {
            let Some(start) = slots::parse_slot_key(key) else {
                log_warn!("ignoring unparseable slot key '{key}' in submit");
                continue;
            };
            let end = start + Duration::minutes(gran);
            entries.push(Entry {
                day: slots::to_local_date_ymd(start.date()),
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
                description: description.to_string(),
                category: category.to_string(),
                created_at: None,
            });
            submitted.push(key.clone());
        }

        if entries.is_empty() {
            return Ok(());
        }
        self.store.save_entries(&entries)?;

        {
            let mut state = self.state.lock().await;
            for key in &submitted {
                state.pending.remove(key);
            }
        }
        self.emit(SchedulerEvent::QueueChanged);
        Ok(())
    }

    /// Delete a persisted entry; a past slot of the current workday goes back
    /// into the queue so it can be re-logged.
    pub async fn delete_entry(&self, day: &str, start: &str) -> Result<usize> {
        self.delete_entry_at(day, start, Local::now().naive_local())
            .await
    }

    /// Expand external JSON-lines into entries, persist them in one batch,
    /// and rebuild the backlog so covered slots leave the queue.
    pub async fn import_external(&self, raw: &str) -> Result<ImportResult> {
        let settings = self.store.get_settings();
        let (entries, result) =
            import::expand_lines(raw, slots::slot_minutes(&settings), Utc::now());
        if !entries.is_empty() {
            self.store.save_entries(&entries)?;
        }
        log_info!(
            "import: {} entries, {} lines skipped",
            result.imported,
            result.skipped
        );
        self.rebuild_backlog(false).await;
        Ok(result)
    }

    /// UI focus signal. Regaining focus flushes any accumulated digest.
    pub async fn set_window_focused(&self, focused: bool) {
        let flushed = {
            let mut state = self.state.lock().await;
            state.window_focused = focused;
            if focused {
                state.last_activity = Some(std::time::Instant::now());
                state.take_digest()
            } else {
                Vec::new()
            }
        };
        if !flushed.is_empty() {
            self.show_digest(&flushed, &self.store.get_settings());
        }
    }

    /// Feed the idle clock used by the away heuristic.
    pub async fn note_user_activity(&self) {
        self.state.lock().await.last_activity = Some(std::time::Instant::now());
    }

    /// Shell reports a notification click: raise the window and open the
    /// classification prompt for the clicked slot.
    pub async fn notification_clicked(&self, slot: &str) {
        self.shell.bring_window_to_front();
        self.emit(SchedulerEvent::PromptOpen {
            slot: slot.to_string(),
        });
    }

    pub(crate) async fn rebuild_pending_at(&self, include_future: bool, now: NaiveDateTime) {
        let settings = self.store.get_settings();
        let gran = i64::from(slots::slot_minutes(&settings));
        let today = now.date();
        let day = slots::to_local_date_ymd(today);

        let logged: std::collections::BTreeSet<String> = self
            .store
            .entries_for_day(&day)
            .iter()
            .map(Entry::key)
            .collect();

        {
            let mut state = self.state.lock().await;
            state.pending.clear();
            for slot in slots::day_slots(&settings, today) {
                // Only fully elapsed intervals are ever queued.
                if !include_future && slot + Duration::minutes(gran) > now {
                    break;
                }
                let key = slots::slot_key(slot);
                if !logged.contains(&key) {
                    state.pending.insert(key);
                }
            }
            log_info!("rebuilt pending queue: {} slots", state.pending.len());
        }
        // Observers always hear about a rebuild, even an empty one, so the
        // badge reflects it.
        self.emit(SchedulerEvent::QueueChanged);
    }

    pub(crate) async fn delete_entry_at(
        &self,
        day: &str,
        start: &str,
        now: NaiveDateTime,
    ) -> Result<usize> {
        let removed = self.store.delete_entry(day, start)?;
        if removed == 0 {
            return Ok(0);
        }

        let settings = self.store.get_settings();
        let gran = i64::from(slots::slot_minutes(&settings));
        let key = format!("{day}T{start}");
        if let Some(slot) = slots::parse_slot_key(&key) {
            let (start_min, end_min) = slots::work_window_minutes(&settings);
            let slot_min = slot.hour() * 60 + slot.minute();
            let requeue = slot.date() == now.date()
                && slots::is_workday_enabled(&settings, slot.date())
                && slot_min >= start_min
                && slot_min < end_min
                && slot + Duration::minutes(gran) <= now;
            if requeue {
                self.state.lock().await.pending.insert(key);
                self.emit(SchedulerEvent::QueueChanged);
            }
        }
        Ok(removed)
    }

    /// One ticker firing at boundary `b`: queue and announce the slot that
    /// just fully elapsed, unless it is already logged or out of window.
    pub(crate) async fn handle_boundary_at(&self, b: NaiveDateTime) {
        // Fresh snapshot per firing; the window may have changed since arming.
        let settings = self.store.get_settings();
        if !slots::is_work_time(&settings, b) {
            return;
        }

        let prev = slots::previous_slot_start(&settings, b);
        if prev.date() != b.date() {
            return;
        }
        let (start_min, end_min) = slots::work_window_minutes(&settings);
        let prev_min = prev.hour() * 60 + prev.minute();
        if prev_min < start_min || prev_min >= end_min {
            return;
        }

        // Already logged (e.g. manually): never prompt twice for one slot.
        let day = slots::to_local_date_ymd(prev.date());
        let start_hm = prev.format("%H:%M").to_string();
        if self
            .store
            .entries_for_day(&day)
            .iter()
            .any(|e| e.start == start_hm)
        {
            return;
        }

        let key = slots::slot_key(prev);
        let inserted = self.state.lock().await.pending.insert(key.clone());
        if inserted {
            log_info!("queued elapsed slot {key}");
            self.emit(SchedulerEvent::QueueChanged);
        }

        self.notify_for_slot(prev, &settings).await;

        if settings.auto_focus_on_slot {
            self.shell.bring_window_to_front();
            self.emit(SchedulerEvent::PromptOpen { slot: key });
        }
    }

    /// Stale evaluation at `now`; surfaces each distinct oldest key once.
    pub(crate) async fn check_stale_at(&self, now: NaiveDateTime) -> Option<StaleSlot> {
        let settings = self.store.get_settings();
        let result = {
            let mut state = self.state.lock().await;
            let result = compute_stale_slot(&state.pending, now, &settings)?;
            if state.last_stale_key.as_deref() == Some(result.key.as_str()) {
                return None;
            }
            state.last_stale_key = Some(result.key.clone());
            result
        };

        self.shell.show_notification(SlotNotification {
            title: STALE_TITLE.to_string(),
            body: format!(
                "Slot {} has been waiting {} minutes",
                result.key, result.age_minutes
            ),
            silent: settings.notification_silent,
            slot: Some(result.key.clone()),
        });
        self.emit(SchedulerEvent::StaleAlert {
            key: result.key.clone(),
            age_minutes: result.age_minutes,
        });
        Some(result)
    }

    /// Tear down and re-arm the boundary-aligned ticker.
    pub async fn restart_ticker(&self) {
        cancel_task(&self.ticker).await;
        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            this.run_ticker(token).await;
        });
        *self.ticker.lock().await = Some((handle, cancel));
    }

    async fn restart_stale_detector(&self) {
        cancel_task(&self.stale_task).await;
        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            this.run_stale_detector(token).await;
        });
        *self.stale_task.lock().await = Some((handle, cancel));
    }

    async fn run_ticker(self, cancel: CancellationToken) {
        loop {
            let settings = self.store.get_settings();
            let now = Local::now().naive_local();
            let next = next_wake(&settings, now);
            let delay = (next - now)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            log_info!("ticker armed for {}", slots::slot_key(next));

            tokio::select! {
                _ = cancel.cancelled() => {
                    log_info!("ticker shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    self.handle_boundary_at(Local::now().naive_local()).await;
                }
            }
        }
    }

    async fn run_stale_detector(self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(STALE_CHECK_INTERVAL_SECS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log_info!("stale detector shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.check_stale_at(Local::now().naive_local()).await;
                }
            }
        }
    }

    async fn notify_for_slot(&self, slot_start: NaiveDateTime, settings: &Settings) {
        let gran = i64::from(slots::slot_minutes(settings));
        let end = slot_start + Duration::minutes(gran);
        let key = slots::slot_key(slot_start);

        let digest = {
            let mut state = self.state.lock().await;
            if settings.group_notifications && state.is_away(slots::slot_minutes(settings)) {
                state.digest.push(key.clone());
                if state.digest.len() >= DIGEST_FLUSH_THRESHOLD {
                    Some(state.take_digest())
                } else {
                    return;
                }
            } else {
                None
            }
        };

        match digest {
            Some(keys) => self.show_digest(&keys, settings),
            None => self.shell.show_notification(SlotNotification {
                title: NOTIFY_TITLE.to_string(),
                body: format!(
                    "Log {} {}–{}",
                    slots::to_local_date_ymd(slot_start.date()),
                    slot_start.format("%H:%M"),
                    end.format("%H:%M")
                ),
                silent: settings.notification_silent,
                slot: Some(key),
            }),
        }
    }

    /// One consolidated notification for slots accumulated while away.
    fn show_digest(&self, keys: &[String], settings: &Settings) {
        let (Some(first), Some(last)) = (keys.iter().min(), keys.iter().max()) else {
            return;
        };
        self.shell.show_notification(SlotNotification {
            title: DIGEST_TITLE.to_string(),
            body: format!("{} slots to log ({first} – {last})", keys.len()),
            silent: settings.notification_silent,
            // A digest spans several slots; clicking opens the oldest.
            slot: Some(first.clone()),
        });
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

async fn cancel_task(slot: &TaskSlot) {
    if let Some((handle, cancel)) = slot.lock().await.take() {
        cancel.cancel();
        handle.abort();
    }
}

/// Next instant the ticker should fire, strictly after `now`: the next slot
/// boundary while the working window is open, today's window start before it
/// opens, or the next enabled day's window start otherwise.
fn next_wake(settings: &Settings, now: NaiveDateTime) -> NaiveDateTime {
    let (start_min, end_min) = slots::work_window_minutes(settings);
    let today = now.date();
    let midnight = today.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let today_start = midnight + Duration::minutes(i64::from(start_min));

    if slots::is_workday_enabled(settings, today) {
        if now < today_start {
            return today_start;
        }
        if now.hour() * 60 + now.minute() < end_min {
            return slots::next_slot_boundary(settings, now);
        }
    }

    for offset in 1..=7 {
        let day = today + Duration::days(offset);
        if slots::is_workday_enabled(settings, day) {
            let day_midnight = day.and_hms_opt(0, 0, 0).expect("midnight is always valid");
            return day_midnight + Duration::minutes(i64::from(start_min));
        }
    }

    // Every weekday disabled: idle along slot boundaries until settings change.
    slots::next_slot_boundary(settings, now)
}
