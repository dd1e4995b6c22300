use ember_crypto::PeerID;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::debug;

const LOG_TARGET: &str = "ember::p2p::scoring";

/// §4.3 category weights, in declaration order: Latency, Uptime,
/// BlockPropagation, TransactionRelay, ValidatorStatus, Behavior.
pub const WEIGHTS: [f64; 6] = [0.20, 0.20, 0.25, 0.15, 0.10, 0.10];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorEvent {
    GoodBlock,
    BadBlock,
    GoodTx,
    BadTx,
    Spam,
    InvalidMessage,
    Timeout,
    Disconnect,
    Reconnect,
    RelayFailure,
}

impl BehaviorEvent {
    fn delta(self) -> f64 {
        match self {
            BehaviorEvent::GoodBlock => 2.0,
            BehaviorEvent::BadBlock => -5.0,
            BehaviorEvent::GoodTx => 1.0,
            BehaviorEvent::BadTx => -2.0,
            BehaviorEvent::Spam => -10.0,
            BehaviorEvent::InvalidMessage => -3.0,
            BehaviorEvent::Timeout => -1.0,
            BehaviorEvent::Disconnect => -1.0,
            BehaviorEvent::Reconnect => 1.0,
            BehaviorEvent::RelayFailure => -1.0,
        }
    }
}

/// Soft bound on accumulated Behavior so a peer that has been abusive (or
/// exemplary) for a very long time doesn't carry an unbounded float, while
/// staying far wider than the other five categories' 0..10 range: Behavior
/// is the only category that can push `total_score` all the way to the
/// documented +-100 bands on its own, since Latency/Uptime/BlockPropagation/
/// TransactionRelay/ValidatorStatus are all non-negative and capped at 10.
const BEHAVIOR_BOUND: f64 = 2_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreThresholdEvent {
    Ban,
    Probation,
    Disconnect,
    Reconnect,
    Trusted,
}

#[derive(Debug, Clone)]
struct PeerScoreState {
    latency_samples: VecDeque<f64>,
    uptime_ratio: f64,
    uptime_observed: bool,
    block_valid: u64,
    block_total: u64,
    block_propagation_ms: VecDeque<f64>,
    tx_valid: u64,
    tx_total: u64,
    tx_relay_ms: VecDeque<f64>,
    is_validator: bool,
    behavior: f64,
    last_update_epoch: u64,
}

impl Default for PeerScoreState {
    fn default() -> Self {
        PeerScoreState {
            latency_samples: VecDeque::with_capacity(50),
            uptime_ratio: 1.0,
            uptime_observed: false,
            block_valid: 0,
            block_total: 0,
            block_propagation_ms: VecDeque::with_capacity(50),
            tx_valid: 0,
            tx_total: 0,
            tx_relay_ms: VecDeque::with_capacity(50),
            is_validator: false,
            behavior: 0.0,
            last_update_epoch: 0,
        }
    }
}

pub struct ScoringConfig {
    pub decay_period_secs: u64,
    pub decay_factor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            decay_period_secs: 3600,
            decay_factor: 0.95,
        }
    }
}

/// §4.3 PeerScoring: six-category reputation, decayed over time, with
/// threshold events PeerManager and GossipRouter react to.
pub struct PeerScoring {
    config: ScoringConfig,
    peers: RwLock<HashMap<PeerID, PeerScoreState>>,
}

impl PeerScoring {
    pub fn new(config: ScoringConfig) -> Self {
        PeerScoring {
            config,
            peers: RwLock::new(HashMap::new()),
        }
    }

    fn latency_score(samples: &VecDeque<f64>) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        if mean < 50.0 {
            10.0
        } else if mean < 100.0 {
            8.0
        } else if mean < 200.0 {
            5.0
        } else if mean < 500.0 {
            2.0
        } else {
            0.0
        }
    }

    fn uptime_score(observed: bool, ratio: f64) -> f64 {
        if !observed {
            return 0.0;
        }
        if ratio > 0.99 {
            10.0
        } else if ratio > 0.95 {
            8.0
        } else if ratio > 0.90 {
            6.0
        } else if ratio > 0.80 {
            4.0
        } else {
            2.0
        }
    }

    /// "Validity ratio, up to 7 pts" (§4.3).
    fn validity_score(valid: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            7.0 * (valid as f64 / total as f64)
        }
    }

    /// "Avg propagation/relay time, up to 3 pts" (§4.3): a rolling mean over
    /// the last 50 observed delivery delays, bucketed the same way Latency
    /// is, just on a 0..3 scale instead of 0..10.
    fn propagation_score(samples: &VecDeque<f64>) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        if mean < 200.0 {
            3.0
        } else if mean < 500.0 {
            2.0
        } else if mean < 1000.0 {
            1.0
        } else {
            0.0
        }
    }

    /// Total score = Σ(weight·category), clamped to [-100, 100] (§4.3).
    ///
    /// Latency, Uptime, BlockPropagation, TransactionRelay and
    /// ValidatorStatus are all non-negative and capped at 10 per §4.3's
    /// category formulas, so together they can never pull `total_score`
    /// below 0. Behavior is the one signed, unbounded-ish category
    /// (`BEHAVIOR_BOUND`-clamped rather than per-event-clamped): sustained
    /// abuse or sustained good conduct is what drives a peer into the
    /// Ban/Probation/Disconnect or Reconnect/Trusted bands.
    pub fn total_score(&self, peer: &PeerID) -> f64 {
        let peers = self.peers.read().unwrap();
        let Some(state) = peers.get(peer) else { return 0.0 };
        let categories = [
            Self::latency_score(&state.latency_samples),
            Self::uptime_score(state.uptime_observed, state.uptime_ratio),
            Self::validity_score(state.block_valid, state.block_total) + Self::propagation_score(&state.block_propagation_ms),
            Self::validity_score(state.tx_valid, state.tx_total) + Self::propagation_score(&state.tx_relay_ms),
            if state.is_validator { 10.0 } else { 0.0 },
            state.behavior,
        ];
        let total: f64 = WEIGHTS.iter().zip(categories.iter()).map(|(w, c)| w * c).sum();
        total.clamp(-100.0, 100.0)
    }

    pub fn record_latency_sample_ms(&self, peer: PeerID, latency_ms: f64) {
        let mut peers = self.peers.write().unwrap();
        let state = peers.entry(peer).or_default();
        if state.latency_samples.len() == 50 {
            state.latency_samples.pop_front();
        }
        state.latency_samples.push_back(latency_ms);
    }

    pub fn record_uptime_ratio(&self, peer: PeerID, ratio: f64) {
        let mut peers = self.peers.write().unwrap();
        let state = peers.entry(peer).or_default();
        state.uptime_ratio = ratio;
        state.uptime_observed = true;
    }

    pub fn record_block_outcome(&self, peer: PeerID, valid: bool) {
        let mut peers = self.peers.write().unwrap();
        let state = peers.entry(peer).or_default();
        state.block_total += 1;
        if valid {
            state.block_valid += 1;
        }
    }

    /// Rolling mean delivery delay for gossiped blocks (§4.3
    /// BlockPropagation's "avg propagation time" component).
    pub fn record_block_propagation_ms(&self, peer: PeerID, propagation_ms: f64) {
        let mut peers = self.peers.write().unwrap();
        let state = peers.entry(peer).or_default();
        if state.block_propagation_ms.len() == 50 {
            state.block_propagation_ms.pop_front();
        }
        state.block_propagation_ms.push_back(propagation_ms);
    }

    pub fn record_tx_outcome(&self, peer: PeerID, valid: bool) {
        let mut peers = self.peers.write().unwrap();
        let state = peers.entry(peer).or_default();
        state.tx_total += 1;
        if valid {
            state.tx_valid += 1;
        }
    }

    /// Rolling mean delivery delay for gossiped transactions (§4.3
    /// TransactionRelay's "avg relay time" component).
    pub fn record_tx_relay_ms(&self, peer: PeerID, relay_ms: f64) {
        let mut peers = self.peers.write().unwrap();
        let state = peers.entry(peer).or_default();
        if state.tx_relay_ms.len() == 50 {
            state.tx_relay_ms.pop_front();
        }
        state.tx_relay_ms.push_back(relay_ms);
    }

    pub fn set_validator(&self, peer: PeerID, is_validator: bool) {
        self.peers.write().unwrap().entry(peer).or_default().is_validator = is_validator;
    }

    /// Applies a behavior delta and returns any threshold event crossed.
    pub fn record_behavior(&self, peer: PeerID, event: BehaviorEvent, now_epoch: u64) -> Option<ScoreThresholdEvent> {
        {
            let mut peers = self.peers.write().unwrap();
            let state = peers.entry(peer).or_default();
            state.behavior = (state.behavior + event.delta()).clamp(-BEHAVIOR_BOUND, BEHAVIOR_BOUND);
            state.last_update_epoch = now_epoch;
        }
        let total = self.total_score(&peer);
        debug!(target: LOG_TARGET, peer = %peer, total, "behavior recorded");
        Self::threshold_for(total)
    }

    fn threshold_for(total: f64) -> Option<ScoreThresholdEvent> {
        if total <= -100.0 {
            Some(ScoreThresholdEvent::Ban)
        } else if total <= -50.0 {
            Some(ScoreThresholdEvent::Probation)
        } else if total <= -25.0 {
            Some(ScoreThresholdEvent::Disconnect)
        } else if total >= 75.0 {
            Some(ScoreThresholdEvent::Trusted)
        } else if total >= 25.0 {
            Some(ScoreThresholdEvent::Reconnect)
        } else {
            None
        }
    }

    /// Decays Behavior toward zero for any peer untouched for a full
    /// `decayPeriod` (§4.3).
    pub fn decay(&self, now_epoch: u64) {
        let mut peers = self.peers.write().unwrap();
        for state in peers.values_mut() {
            if now_epoch.saturating_sub(state.last_update_epoch) >= self.config.decay_period_secs {
                state.behavior *= self.config.decay_factor;
                state.last_update_epoch = now_epoch;
            }
        }
    }

    pub fn remove(&self, peer: &PeerID) {
        self.peers.write().unwrap().remove(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spam_drives_score_toward_ban_threshold() {
        let scoring = PeerScoring::new(ScoringConfig::default());
        let peer = PeerID::random();
        let mut last = None;
        for i in 0..100 {
            last = scoring.record_behavior(peer, BehaviorEvent::Spam, i);
        }
        assert_eq!(last, Some(ScoreThresholdEvent::Ban));
    }

    #[test]
    fn sustained_good_behavior_reaches_trusted_threshold() {
        let scoring = PeerScoring::new(ScoringConfig::default());
        let peer = PeerID::random();
        let mut last = None;
        for i in 0..400 {
            last = scoring.record_behavior(peer, BehaviorEvent::GoodBlock, i);
        }
        assert_eq!(last, Some(ScoreThresholdEvent::Trusted));
    }

    #[test]
    fn block_propagation_category_rewards_fast_delivery_over_slow() {
        let scoring = PeerScoring::new(ScoringConfig::default());
        let fast = PeerID::random();
        let slow = PeerID::random();
        for _ in 0..5 {
            scoring.record_block_outcome(fast, true);
            scoring.record_block_outcome(slow, true);
        }
        scoring.record_block_propagation_ms(fast, 50.0);
        scoring.record_block_propagation_ms(slow, 5_000.0);
        assert!(scoring.total_score(&fast) > scoring.total_score(&slow));
    }

    #[test]
    fn decay_pulls_behavior_toward_zero_after_a_full_period() {
        let scoring = PeerScoring::new(ScoringConfig {
            decay_period_secs: 100,
            decay_factor: 0.5,
        });
        let peer = PeerID::random();
        scoring.record_behavior(peer, BehaviorEvent::BadBlock, 0);
        let before = scoring.total_score(&peer);
        scoring.decay(200);
        let after = scoring.total_score(&peer);
        assert!(after.abs() < before.abs());
    }

    #[test]
    fn validator_status_raises_total_score() {
        let scoring = PeerScoring::new(ScoringConfig::default());
        let peer = PeerID::random();
        let before = scoring.total_score(&peer);
        scoring.set_validator(peer, true);
        let after = scoring.total_score(&peer);
        assert!(after > before);
    }
}
