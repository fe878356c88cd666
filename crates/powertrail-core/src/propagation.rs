//! Propagation Engine - the fill-distance state machine
//!
//! Owns a single scalar: how far power has traveled from the root, in
//! cumulative path length. Each tick the scalar advances toward the fill
//! cap while powered and retreats toward zero while not, at independently
//! configured rates. The three-state power machine is derived purely from
//! the scalar's position relative to its bounds, and transition
//! notifications fire exactly once per crossing, on state entry.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Distance nudge applied when resuming exactly at a bound, so the final
/// transition replays on the next tick instead of being skipped
const RESUME_NUDGE: f32 = 1e-4;

/// Power state derived from the fill distance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    /// Fill distance is exactly zero
    #[default]
    Depowered,
    /// Fill distance is strictly between zero and the cap
    PartiallyPowered,
    /// Fill distance has reached the cap
    Powered,
}

/// Transition notification, fired once per state-machine crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// The fill left zero while powered
    PowerBegin,
    /// The fill reached the cap
    PowerFinish,
    /// The fill left the cap while unpowered
    DepowerBegin,
    /// The fill reached zero
    DepowerFinish,
}

/// Tunable propagation rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Fill speed while powered, in path length per second
    pub power_speed: f32,
    /// Drain speed while unpowered, in path length per second
    pub depower_speed: f32,
    /// Multiplier in `[0, 1]` capping how far the fill may travel
    pub target_fill_amount: f32,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            power_speed: 1.0,
            depower_speed: 1.0,
            target_fill_amount: 1.0,
        }
    }
}

/// Minimum state an external save layer must persist to resume propagation
/// exactly where it left off
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedPropagation {
    /// Fill distance at save time
    pub distance: f32,
    /// Trail length at save time
    pub max_distance: f32,
    /// Powered input at save time
    pub powered: bool,
    /// Derived state at save time
    pub state: PowerState,
}

/// The bounded real-time propagation state machine.
///
/// Advanced exactly once per frame by its owner; consumers read the fill
/// distance after the update and re-marshal only when it reports a change.
#[derive(Debug)]
pub struct PropagationEngine {
    distance: f32,
    max_distance: f32,
    powered: bool,
    state: PowerState,
    config: PropagationConfig,
    /// Cleared to force the next update to report a change even if the
    /// distance is already at its target, so consumers observe the true
    /// starting value once
    initialized: bool,
    pending: Vec<PowerEvent>,
    subscribers: Vec<Sender<PowerEvent>>,
}

impl PropagationEngine {
    /// Create an engine for a trail of length `max_distance`, starting
    /// depowered at zero fill
    pub fn new(max_distance: f32, config: PropagationConfig) -> Self {
        Self {
            distance: 0.0,
            max_distance: max_distance.max(0.0),
            powered: false,
            state: PowerState::Depowered,
            config,
            initialized: false,
            pending: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Current fill distance
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Total trail length
    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    /// Upper bound the fill may reach: `max_distance * target_fill_amount`
    pub fn cap(&self) -> f32 {
        self.max_distance * self.config.target_fill_amount
    }

    /// Derived power state
    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Powered input as last pushed by the power source
    pub fn powered(&self) -> bool {
        self.powered
    }

    /// Current rate configuration
    pub fn config(&self) -> PropagationConfig {
        self.config
    }

    /// Push the powered signal from external power-source logic
    pub fn set_power(&mut self, powered: bool) {
        self.powered = powered;
    }

    /// Replace the rate configuration
    pub fn set_config(&mut self, config: PropagationConfig) {
        self.config = config;
        self.initialized = false;
    }

    /// Cap how far the fill may travel, as a fraction of the trail length
    pub fn set_target_fill_amount(&mut self, amount: f32) {
        self.config.target_fill_amount = amount.clamp(0.0, 1.0);
        self.initialized = false;
    }

    /// Adopt a new trail length after a topology rebuild.
    ///
    /// The fill is re-clamped; any resulting state crossing fires on the
    /// next update.
    pub fn set_max_distance(&mut self, max_distance: f32) {
        self.max_distance = max_distance.max(0.0);
        self.distance = self.distance.clamp(0.0, self.cap());
        self.initialized = false;
    }

    /// Advance the fill by `dt` seconds.
    ///
    /// Returns `true` when consumers must re-marshal: on any real movement,
    /// and exactly once on the first update so the starting value is
    /// observed. Stationary ticks at a bound return `false` and fire
    /// nothing.
    pub fn update(&mut self, dt: f32) -> bool {
        let cap = self.cap();
        let next = if self.powered {
            (self.distance + self.config.power_speed * dt).min(cap)
        } else {
            (self.distance - self.config.depower_speed * dt).max(0.0)
        };
        let next = next.clamp(0.0, cap);

        if next == self.distance && self.initialized {
            return false;
        }
        self.initialized = true;
        self.distance = next;

        let new_state = self.derive_state();
        if new_state != self.state {
            self.fire_transition(self.state, new_state);
            self.state = new_state;
        }
        true
    }

    /// Drain transition events accumulated since the last poll
    pub fn poll_events(&mut self) -> Vec<PowerEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Register an observer channel for transition events
    pub fn subscribe(&mut self) -> Receiver<PowerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Snapshot the fields the save layer persists
    pub fn save(&self) -> SavedPropagation {
        SavedPropagation {
            distance: self.distance,
            max_distance: self.max_distance,
            powered: self.powered,
            state: self.state,
        }
    }

    /// Resume from persisted state.
    ///
    /// A fill restored exactly at zero or at the cap is nudged slightly off
    /// the bound so the final transition re-fires on the next tick; resumed
    /// collaborators rely on that notification to re-sync themselves.
    pub fn restore(&mut self, saved: SavedPropagation) {
        self.max_distance = saved.max_distance.max(0.0);
        self.powered = saved.powered;
        self.state = saved.state;
        self.distance = saved.distance.clamp(0.0, self.cap());
        self.pending.clear();
        self.initialized = false;

        let cap = self.cap();
        if cap > 0.0 {
            let nudge = RESUME_NUDGE.min(cap * 0.5);
            if self.distance <= 0.0 {
                self.distance = nudge;
                self.state = PowerState::PartiallyPowered;
            } else if self.distance >= cap {
                self.distance = cap - nudge;
                self.state = PowerState::PartiallyPowered;
            }
        }
        debug!(
            distance = self.distance,
            powered = self.powered,
            "restored propagation state"
        );
    }

    fn derive_state(&self) -> PowerState {
        if self.distance <= 0.0 {
            PowerState::Depowered
        } else if self.distance >= self.cap() {
            PowerState::Powered
        } else {
            PowerState::PartiallyPowered
        }
    }

    fn fire_transition(&mut self, from: PowerState, to: PowerState) {
        use PowerEvent::*;
        use PowerState::*;

        // A single large tick can cross both bounds at once; fire the full
        // begin/finish pair so no observer misses a phase
        match (from, to) {
            (Depowered, PartiallyPowered) => self.emit(PowerBegin),
            (Depowered, Powered) => {
                self.emit(PowerBegin);
                self.emit(PowerFinish);
            }
            (PartiallyPowered, Powered) => self.emit(PowerFinish),
            (Powered, PartiallyPowered) => {
                // Leaving the cap because the cap itself grew means the
                // trail has resumed filling, not draining
                if self.powered {
                    self.emit(PowerBegin);
                } else {
                    self.emit(DepowerBegin);
                }
            }
            (Powered, Depowered) => {
                self.emit(DepowerBegin);
                self.emit(DepowerFinish);
            }
            (PartiallyPowered, Depowered) => self.emit(DepowerFinish),
            _ => {}
        }
    }

    fn emit(&mut self, event: PowerEvent) {
        debug!(?event, distance = self.distance, "power transition");
        self.pending.push(event);
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}
