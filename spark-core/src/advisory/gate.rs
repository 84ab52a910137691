//! The advisory gate (spec.md §4.6 step 6): the suppression policy sitting
//! between synthesis and emission. Every check here can fire independently
//! and each has its own entry in the engine's error taxonomy so operators
//! can tell "nothing to say" from "had something, held it back, and why".

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::config::{AdvisoryEngineTuneables, AdvisoryGateTuneables};
use crate::error::Result;
use crate::state_dir::StateDir;

use super::context::AdvisoryContext;
use super::dedupe::{text_hash, PersistentDedupe, SessionDedupe};
use super::engine::SuppressReason;
use super::synthesis::AdviceItem;

#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Emit { category: String },
    Suppress(SuppressReason),
}

pub struct AdvisoryGate {
    pub gate: AdvisoryGateTuneables,
    pub engine: AdvisoryEngineTuneables,
    session_dedupe: SessionDedupe,
    global_dedupe: PersistentDedupe,
    low_auth_dedupe: PersistentDedupe,
    tool_cooldown: RwLock<HashMap<(String, String), DateTime<Utc>>>,
    fallback_uses: RwLock<VecDeque<DateTime<Utc>>>,
}

impl AdvisoryGate {
    pub fn open(state: &StateDir) -> Result<Self> {
        Ok(Self {
            gate: AdvisoryGateTuneables::default(),
            engine: AdvisoryEngineTuneables::default(),
            session_dedupe: SessionDedupe::new(),
            global_dedupe: PersistentDedupe::open(state.advisory_global_dedupe())?,
            low_auth_dedupe: PersistentDedupe::open(state.advisory_low_auth_dedupe())?,
            tool_cooldown: RwLock::new(HashMap::new()),
            fallback_uses: RwLock::new(VecDeque::new()),
        })
    }

    fn category_for(&self, authority: f64) -> String {
        if authority >= self.gate.warning_threshold {
            "warning".into()
        } else if authority >= self.gate.whisper_threshold {
            "whisper".into()
        } else {
            "note".into()
        }
    }

    fn fallback_budget_exceeded(&self, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::seconds(self.engine.fallback_budget_window_s as i64);
        let mut uses = self.fallback_uses.write().expect("fallback budget lock poisoned");
        while let Some(front) = uses.front() {
            if now - *front > window {
                uses.pop_front();
            } else {
                break;
            }
        }
        uses.len() as u32 >= self.engine.fallback_budget_cap
    }

    fn record_fallback_use(&self, now: DateTime<Utc>) {
        self.fallback_uses.write().expect("fallback budget lock poisoned").push_back(now);
    }

    /// Decide whether `item` should be emitted for `ctx`. `used_ai_fallback`
    /// marks an item that fell back to the programmatic path after a failed
    /// selective-AI attempt, which draws from the fallback budget.
    pub fn decide(
        &self,
        ctx: &AdvisoryContext,
        item: &AdviceItem,
        used_ai_fallback: bool,
        now: DateTime<Utc>,
    ) -> GateVerdict {
        if let Some(policy) = self.gate.phase_policy.get(ctx.phase.as_str()) {
            if !policy.enabled && item.authority < policy.min_authority {
                return GateVerdict::Suppress(SuppressReason::GateSuppressed);
            }
        }

        if item.authority < self.gate.note_threshold {
            return GateVerdict::Suppress(SuppressReason::GateSuppressed);
        }

        if used_ai_fallback && self.fallback_budget_exceeded(now) {
            return GateVerdict::Suppress(SuppressReason::FallbackBudget);
        }

        let hash = text_hash(&item.text);

        if self
            .session_dedupe
            .is_duplicate(&ctx.session_id, &hash, self.gate.advice_repeat_cooldown_s, now)
        {
            return GateVerdict::Suppress(SuppressReason::DuplicateSuppressed);
        }

        let category = self.category_for(item.authority);
        if category == "note" {
            if self.low_auth_dedupe.is_duplicate(&hash, self.gate.advice_repeat_cooldown_s, now) {
                return GateVerdict::Suppress(SuppressReason::LowAuthGlobalSuppressed);
            }
        } else if self
            .global_dedupe
            .is_duplicate(&hash, self.engine.advisory_text_repeat_cooldown_s, now)
        {
            return GateVerdict::Suppress(SuppressReason::DuplicateSuppressed);
        }

        {
            let mut cooldowns = self.tool_cooldown.write().expect("tool cooldown lock poisoned");
            let key = (ctx.session_id.clone(), ctx.tool.clone());
            if let Some(last) = cooldowns.get(&key) {
                if (now - *last).num_seconds() < self.gate.tool_cooldown_s as i64 {
                    return GateVerdict::Suppress(SuppressReason::GateSuppressed);
                }
            }
            cooldowns.insert(key, now);
        }

        self.session_dedupe.record(&ctx.session_id, &hash, now);
        let dedupe_result = if category == "note" {
            self.low_auth_dedupe.record(&hash, now)
        } else {
            self.global_dedupe.record(&hash, now)
        };
        if let Err(e) = dedupe_result {
            tracing::warn!("failed to persist dedupe record: {e}");
        }
        if used_ai_fallback {
            self.record_fallback_use(now);
        }

        GateVerdict::Emit { category }
    }
}
