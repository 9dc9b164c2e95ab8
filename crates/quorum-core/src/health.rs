//! Provider health tracking and candidate selection.
//!
//! The [`ProviderManager`] keeps registered clients together with rolling
//! health observations and scores providers for a capability on demand.
//! It sits *above* the orchestrator: callers use it to build candidate
//! lists for races and broadcasts, and the orchestrator's workers report
//! call outcomes back into it. The orchestrator itself never selects
//! candidates.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::llm::{ProviderClient, ProviderKind};
use crate::orchestrator::TaskKind;

/// How long a health observation stays meaningful.
const HEALTH_STALE_AFTER: Duration = Duration::from_secs(300);

// Exponential moving average split for the error rate
const ERROR_RATE_DECAY: f32 = 0.9;

/// Rolling health observations for one provider.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: ProviderKind,
    pub is_healthy: bool,
    pub last_check: Instant,
    pub response_time: Duration,
    pub error_rate: f32,
}

impl ProviderHealth {
    fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            is_healthy: true,
            last_check: Instant::now(),
            response_time: Duration::ZERO,
            error_rate: 0.0,
        }
    }

    /// Whether the last observation is too old to trust.
    pub fn is_stale(&self) -> bool {
        self.last_check.elapsed() > HEALTH_STALE_AFTER
    }
}

/// Static selection profile for one provider.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Base selection priority (higher = preferred).
    pub priority: u8,
    /// Task kinds this provider can serve.
    pub capabilities: Vec<TaskKind>,
}

impl ProviderProfile {
    /// Default profile for a provider kind.
    ///
    /// The local GPU service ranks highest when warm; Anthropic carries the
    /// full capability set; OpenAI lacks the native analysis path.
    pub fn default_for(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Anthropic => Self {
                priority: 9,
                capabilities: vec![
                    TaskKind::ChatCompletion,
                    TaskKind::CodeCompletion,
                    TaskKind::CodeAnalysis,
                    TaskKind::CodeExplanation,
                    TaskKind::HealthCheck,
                ],
            },
            ProviderKind::OpenAi => Self {
                priority: 8,
                capabilities: vec![
                    TaskKind::ChatCompletion,
                    TaskKind::CodeCompletion,
                    TaskKind::CodeExplanation,
                    TaskKind::HealthCheck,
                ],
            },
            ProviderKind::Local => Self {
                priority: 10,
                capabilities: vec![
                    TaskKind::ChatCompletion,
                    TaskKind::CodeCompletion,
                    TaskKind::CodeAnalysis,
                    TaskKind::CodeExplanation,
                    TaskKind::HealthCheck,
                ],
            },
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn has_capability(&self, capability: TaskKind) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Default)]
struct ManagerState {
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
    profiles: HashMap<ProviderKind, ProviderProfile>,
    health: HashMap<ProviderKind, ProviderHealth>,
}

/// Registry of provider clients with health-weighted selection.
pub struct ProviderManager {
    state: RwLock<ManagerState>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ManagerState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a client with the default profile for its kind.
    pub fn register(&self, client: Arc<dyn ProviderClient>) {
        let profile = ProviderProfile::default_for(client.provider());
        self.register_with_profile(client, profile);
    }

    /// Register a client with an explicit profile.
    pub fn register_with_profile(&self, client: Arc<dyn ProviderClient>, profile: ProviderProfile) {
        let kind = client.provider();
        debug!(provider = %kind, priority = profile.priority, "registering provider");

        let mut state = self.write();
        state.clients.insert(kind, client);
        state.profiles.insert(kind, profile);
        state.health.insert(kind, ProviderHealth::new(kind));
    }

    /// Client for a specific provider, if registered.
    pub fn client(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderClient>> {
        self.read().clients.get(&kind).cloned()
    }

    /// All registered clients, ordered by descending selection score for
    /// the given capability. The natural candidate list for a race.
    pub fn candidates(&self, capability: TaskKind) -> Vec<Arc<dyn ProviderClient>> {
        let state = self.read();
        let mut scored: Vec<(f32, ProviderKind)> = state
            .profiles
            .iter()
            .filter(|(_, profile)| profile.has_capability(capability))
            .map(|(kind, profile)| (Self::score(profile, state.health.get(kind)), *kind))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .filter_map(|(_, kind)| state.clients.get(&kind).cloned())
            .collect()
    }

    /// Best provider for a capability, by priority weighted with health,
    /// response time, and error rate. `None` when nothing qualifies.
    pub fn select_best_provider(&self, capability: TaskKind) -> Option<ProviderKind> {
        let state = self.read();
        let mut best: Option<(f32, ProviderKind)> = None;
        for (kind, profile) in &state.profiles {
            if !profile.has_capability(capability) {
                continue;
            }
            let score = Self::score(profile, state.health.get(kind));
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, *kind));
            }
        }
        best.map(|(_, kind)| kind)
    }

    fn score(profile: &ProviderProfile, health: Option<&ProviderHealth>) -> f32 {
        let mut score = f32::from(profile.priority);
        if let Some(health) = health {
            if !health.is_healthy {
                // Unhealthy providers stay selectable as a last resort
                score *= 0.1;
            }
            if !health.response_time.is_zero() {
                score *= 1000.0 / health.response_time.as_millis().max(1) as f32;
            }
            score *= 1.0 - health.error_rate;
        }
        score
    }

    /// Record the outcome of a provider call.
    pub fn update_health(&self, kind: ProviderKind, success: bool, response_time: Duration) {
        let mut state = self.write();
        if let Some(health) = state.health.get_mut(&kind) {
            health.is_healthy = success;
            health.last_check = Instant::now();
            health.response_time = response_time;

            let error_value = if success { 0.0 } else { 1.0 };
            health.error_rate =
                health.error_rate * ERROR_RATE_DECAY + error_value * (1.0 - ERROR_RATE_DECAY);
        }
    }

    /// Snapshot of all health observations.
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        self.read().health.values().cloned().collect()
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}
