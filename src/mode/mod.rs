//! Per-user authorization mode (Explain vs. Action)
//!
//! Explain is the implicit default. Action is time-boxed: activation arms a
//! revert timer, and any read past the deadline reverts eagerly as well.
//! All transitions for one user run under that user's slot mutex, so timer
//! cancellation always happens before a new timer is armed. Only users in
//! Action mode hold a slot; an idle slot is released from the map.

use crate::models::{ActivationPrompt, AgentMode, Authorization, ModeStatus, ModeType, RequiredMode};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

struct ActiveMode {
    mode: AgentMode,
    deadline: Instant,
}

#[derive(Default)]
struct ModeSlot {
    active: Option<ActiveMode>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every transition; a timer only fires for its own generation.
    generation: u64,
    /// Removed from the map; activation must fetch a fresh slot.
    retired: bool,
}

impl ModeSlot {
    fn reset(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.active = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn expired(&self, now: Instant) -> bool {
        self.active
            .as_ref()
            .map(|active| now >= active.deadline)
            .unwrap_or(false)
    }

    fn remaining(&self) -> Option<u64> {
        self.active
            .as_ref()
            .map(|active| active.deadline.saturating_duration_since(Instant::now()).as_secs())
    }
}

type Slots = Arc<RwLock<HashMap<String, Arc<Mutex<ModeSlot>>>>>;

/// Remove the user's slot if it holds no Action mode.
///
/// Lock order is map, then slot; callers must not hold a slot lock.
async fn release_idle(slots: &Slots, user_id: &str) {
    let mut map = slots.write().await;
    let Some(handle) = map.get(user_id).cloned() else {
        return;
    };

    let mut slot = handle.lock().await;
    if slot.active.is_none() {
        slot.retired = true;
        map.remove(user_id);
        debug!(user_id = %user_id, "Mode slot released");
    }
}

/// Owns every user's mode; no other component mutates it.
pub struct ModeManager {
    slots: Slots,
    timeout: Duration,
}

impl ModeManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn existing_slot(&self, user_id: &str) -> Option<Arc<Mutex<ModeSlot>>> {
        self.slots.read().await.get(user_id).cloned()
    }

    async fn slot(&self, user_id: &str) -> Arc<Mutex<ModeSlot>> {
        if let Some(slot) = self.existing_slot(user_id).await {
            return slot;
        }

        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(user_id.to_string()).or_default())
    }

    /// Number of users currently holding a slot
    pub async fn tracked_users(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Run `read` after eager expiry; `None` when the user has no slot.
    async fn inspect<T>(
        &self,
        user_id: &str,
        read: impl FnOnce(&ModeSlot, AgentMode) -> T,
    ) -> Option<T> {
        let handle = self.existing_slot(user_id).await?;

        let (value, idle) = {
            let mut slot = handle.lock().await;
            let mode = Self::current_locked(&mut slot, user_id);
            (read(&*slot, mode), slot.active.is_none())
        };

        if idle {
            release_idle(&self.slots, user_id).await;
        }
        Some(value)
    }

    /// Current mode; an expired Action mode is reverted as a side effect.
    pub async fn current_mode(&self, user_id: &str) -> AgentMode {
        self.inspect(user_id, |_, mode| mode)
            .await
            .unwrap_or_else(AgentMode::explain)
    }

    fn current_locked(slot: &mut ModeSlot, user_id: &str) -> AgentMode {
        if slot.expired(Instant::now()) {
            info!(user_id = %user_id, "Action mode expired, reverting to explain mode");
            slot.reset();
        }

        slot.active
            .as_ref()
            .map(|active| active.mode.clone())
            .unwrap_or_else(AgentMode::explain)
    }

    /// Enter Action mode for a fresh full timeout, replacing any running timer.
    pub async fn activate(&self, user_id: &str) -> AgentMode {
        let (slot_handle, mut slot) = loop {
            let handle = self.slot(user_id).await;
            let slot = Arc::clone(&handle).lock_owned().await;
            if !slot.retired {
                break (handle, slot);
            }
        };

        slot.reset();

        let deadline = Instant::now() + self.timeout;
        let activated_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|ttl| activated_at.checked_add_signed(ttl));

        let mode = AgentMode {
            mode_type: ModeType::Action,
            activated_at: Some(activated_at),
            activated_by: Some(user_id.to_string()),
            expires_at,
        };

        let generation = slot.generation;
        let timer_slot = slot_handle;
        let timer_slots = Arc::clone(&self.slots);
        let timer_user = user_id.to_string();

        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            {
                let mut slot = timer_slot.lock().await;
                if slot.generation != generation {
                    debug!(user_id = %timer_user, "Stale mode timer ignored");
                    return;
                }
                info!(user_id = %timer_user, "Auto-reverting to explain mode");
                slot.timer = None;
                slot.reset();
            }

            release_idle(&timer_slots, &timer_user).await;
        }));

        slot.active = Some(ActiveMode {
            mode: mode.clone(),
            deadline,
        });

        info!(
            user_id = %user_id,
            expires_at = ?mode.expires_at,
            "Action mode activated"
        );

        mode
    }

    /// Drop back to Explain mode and cancel any pending timer.
    pub async fn deactivate(&self, user_id: &str) -> AgentMode {
        let Some(handle) = self.existing_slot(user_id).await else {
            return AgentMode::explain();
        };

        let was_action = {
            let mut slot = handle.lock().await;
            let was_action = slot.active.is_some();
            slot.reset();
            was_action
        };

        if was_action {
            info!(user_id = %user_id, "Action mode deactivated");
        }
        release_idle(&self.slots, user_id).await;

        AgentMode::explain()
    }

    pub async fn set_mode(&self, user_id: &str, mode: ModeType) -> AgentMode {
        match mode {
            ModeType::Action => self.activate(user_id).await,
            ModeType::Explain => self.deactivate(user_id).await,
        }
    }

    pub async fn is_action_mode(&self, user_id: &str) -> bool {
        self.current_mode(user_id).await.is_action()
    }

    /// Whole seconds left in Action mode; `None` in Explain mode.
    pub async fn remaining_seconds(&self, user_id: &str) -> Option<u64> {
        self.inspect(user_id, |slot, _| slot.remaining()).await.flatten()
    }

    pub async fn status(&self, user_id: &str) -> ModeStatus {
        let (mode, remaining_seconds) = self
            .inspect(user_id, |slot, mode| (mode, slot.remaining()))
            .await
            .unwrap_or_else(|| (AgentMode::explain(), None));

        ModeStatus {
            mode_type: mode.mode_type,
            activated_at: mode.activated_at,
            expires_at: mode.expires_at,
            remaining_seconds,
        }
    }

    pub async fn authorize(&self, user_id: &str, required: RequiredMode) -> Authorization {
        match required {
            RequiredMode::Both | RequiredMode::Explain => Authorization {
                allowed: true,
                reason: None,
            },
            RequiredMode::Action => {
                if self.is_action_mode(user_id).await {
                    Authorization {
                        allowed: true,
                        reason: None,
                    }
                } else {
                    Authorization {
                        allowed: false,
                        reason: Some(
                            "Diese Aktion erfordert den Aktions-Modus. Bitte aktivieren Sie zunächst den Aktions-Modus."
                                .to_string(),
                        ),
                    }
                }
            }
        }
    }

    pub fn activation_prompt(&self) -> ActivationPrompt {
        let minutes = self.timeout.as_secs() / 60;

        ActivationPrompt {
            title: "Aktions-Modus aktivieren".to_string(),
            description: "Im Aktions-Modus kann der AI-Agent:".to_string(),
            capabilities: vec![
                "Korrekturbuchungen vorschlagen und erstellen".to_string(),
                "Prüfungen als erledigt markieren".to_string(),
                "IC-Differenzen akzeptieren".to_string(),
            ],
            warning: format!(
                "Alle Aktionen erfordern Ihre Bestätigung. Der Modus wird nach {} Minuten automatisch deaktiviert.",
                minutes
            ),
        }
    }
}
