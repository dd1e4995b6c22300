use crate::error::ValidatorError;
use ember_common::config::ConsensusConfig;
use ember_crypto::sig::PublicKey;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::RwLock;
use tracing::{info, warn};

const LOG_TARGET: &str = "ember::consensus::validator";

/// Default reputation new validators start at; neutral is `1.0`, i.e. no
/// bonus and no penalty.
pub const NEUTRAL_REPUTATION: f64 = 1.0;
const MIN_REPUTATION: f64 = 0.0;
const MAX_REPUTATION: f64 = 2.0;
/// §4.8 "reputationBonus is a clamped function of reputation": maps
/// `[0, MAX_REPUTATION]` onto `[0, MAX_REPUTATION_BONUS]` linearly, so a
/// validator at neutral reputation gets half the maximum bonus.
const MAX_REPUTATION_BONUS: f64 = 0.5;
const REPUTATION_DECAY_FACTOR: f64 = 0.99;
const REPUTATION_GAIN_FACTOR: f64 = 1.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorState {
    Inactive,
    Active,
    Jailed,
    Tombstoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    pub address: PublicKey,
    pub stake: u64,
    pub moniker: String,
    pub state: ValidatorState,
    pub reputation: f64,
    pub consecutive_missed: u32,
    pub jailed_until_height: u64,
    pub has_produced_block: bool,
}

impl Validator {
    fn new(address: PublicKey, stake: u64, moniker: String) -> Self {
        Validator {
            address,
            stake,
            moniker,
            state: ValidatorState::Inactive,
            reputation: NEUTRAL_REPUTATION,
            consecutive_missed: 0,
            jailed_until_height: 0,
            has_produced_block: false,
        }
    }

    fn is_eligible(&self) -> bool {
        matches!(self.state, ValidatorState::Active)
    }

    /// §4.8 "each validator's weight is `stake * (1 + reputationBonus)`".
    pub fn voting_power(&self) -> f64 {
        self.stake as f64 * (1.0 + self.reputation_bonus())
    }

    fn reputation_bonus(&self) -> f64 {
        (self.reputation / MAX_REPUTATION).clamp(0.0, 1.0) * MAX_REPUTATION_BONUS
    }
}

/// Test-only helper for other consensus modules that need a bare `Active`
/// validator without going through a full `ValidatorManager`.
#[cfg(test)]
pub mod test_support {
    use super::{Validator, ValidatorState, NEUTRAL_REPUTATION};
    use ember_crypto::sig::PublicKey;

    pub fn active_validator(address: PublicKey, stake: u64) -> Validator {
        Validator {
            address,
            stake,
            moniker: "test".to_string(),
            state: ValidatorState::Active,
            reputation: NEUTRAL_REPUTATION,
            consecutive_missed: 0,
            jailed_until_height: 0,
            has_produced_block: false,
        }
    }
}

/// §4.7 ValidatorManager: owns validator records and mediates every
/// transition. Distribution-period bonuses (§4.7) and reputation
/// decay/gain (§4.8) are applied here too, since both are bookkeeping over
/// the same validator map.
pub struct ValidatorManager {
    config: ConsensusConfig,
    min_stake: u64,
    distribution_deadline_height: u64,
    developer_reward: u64,
    validator_reward: u64,
    developer_reward_paid: std::sync::atomic::AtomicBool,
    validators: RwLock<HashMap<PublicKey, Validator>>,
}

pub struct ValidatorManagerConfig {
    pub consensus: ConsensusConfig,
    pub min_stake: u64,
    /// Height at which the distribution-period bonus window closes, derived
    /// by the caller from `distributionPeriodDays` and the chain's block
    /// time (both live in `NodeConfig`, outside this crate's view).
    pub distribution_deadline_height: u64,
    pub developer_reward: u64,
    pub validator_reward: u64,
}

impl ValidatorManager {
    pub fn new(config: ValidatorManagerConfig) -> Self {
        ValidatorManager {
            config: config.consensus,
            min_stake: config.min_stake,
            distribution_deadline_height: config.distribution_deadline_height,
            developer_reward: config.developer_reward,
            validator_reward: config.validator_reward,
            developer_reward_paid: std::sync::atomic::AtomicBool::new(false),
            validators: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, address: PublicKey, stake: u64, moniker: String) -> Result<(), ValidatorError> {
        let mut validators = self.validators.write().unwrap();
        if validators.contains_key(&address) {
            return Err(ValidatorError::AlreadyRegistered(address));
        }
        if stake < self.min_stake {
            return Err(ValidatorError::InsufficientStake {
                have: stake,
                need: self.min_stake,
            });
        }
        info!(target: LOG_TARGET, address = %address.to_hex(), stake, "validator registered");
        validators.insert(address, Validator::new(address, stake, moniker));
        Ok(())
    }

    pub fn activate(&self, address: &PublicKey) -> Result<(), ValidatorError> {
        let mut validators = self.validators.write().unwrap();
        let validator = validators.get_mut(address).ok_or(ValidatorError::NotFound(*address))?;
        if validator.stake < self.min_stake {
            return Err(ValidatorError::InsufficientStake {
                have: validator.stake,
                need: self.min_stake,
            });
        }
        if matches!(validator.state, ValidatorState::Jailed | ValidatorState::Tombstoned) {
            return Err(ValidatorError::NotEligible(*address));
        }
        validator.state = ValidatorState::Active;
        info!(target: LOG_TARGET, address = %address.to_hex(), "validator activated");
        Ok(())
    }

    /// §4.7 `recordProposal`. `height` is the height this round finalized
    /// at (or attempted to), used to stamp `jailedUntilHeight` and to check
    /// the distribution-period window. Returns the one-time distribution
    /// bonus (§4.7) earned by this proposal, if any, for the Integrator to
    /// credit against the chain store's account state.
    pub fn record_proposal(&self, address: &PublicKey, committed: bool, height: u64) -> Result<u64, ValidatorError> {
        let mut validators = self.validators.write().unwrap();
        let mut bonus = 0u64;
        let validator = validators.get_mut(address).ok_or(ValidatorError::NotFound(*address))?;
        if committed {
            validator.consecutive_missed = 0;
            validator.reputation = (validator.reputation * REPUTATION_GAIN_FACTOR).min(MAX_REPUTATION);
            if !validator.has_produced_block {
                validator.has_produced_block = true;
                if height <= self.distribution_deadline_height {
                    let is_developer = !self
                        .developer_reward_paid
                        .swap(true, std::sync::atomic::Ordering::SeqCst);
                    bonus = if is_developer { self.developer_reward } else { self.validator_reward };
                }
            }
        } else {
            validator.consecutive_missed += 1;
            validator.reputation = (validator.reputation * REPUTATION_DECAY_FACTOR).max(MIN_REPUTATION);
            if validator.consecutive_missed >= self.config.missed_blocks_before_jail {
                validator.state = ValidatorState::Jailed;
                validator.jailed_until_height = height + self.config.jail_time_blocks;
                warn!(target: LOG_TARGET, address = %address.to_hex(), "validator jailed after missed blocks");
            }
        }
        Ok(bonus)
    }

    /// Applies reputation decay to every active validator that did not
    /// participate this round (§4.8 "decays toward a neutral value each
    /// round without activity"), called once per round by the engine for
    /// everyone except the set that just voted.
    pub fn decay_inactive(&self, participated: &[PublicKey]) {
        let mut validators = self.validators.write().unwrap();
        for (address, validator) in validators.iter_mut() {
            if participated.contains(address) || !validator.is_eligible() {
                continue;
            }
            let distance = validator.reputation - NEUTRAL_REPUTATION;
            validator.reputation = NEUTRAL_REPUTATION + distance * REPUTATION_DECAY_FACTOR;
        }
    }

    pub fn record_equivocation(&self, address: &PublicKey) -> Result<(), ValidatorError> {
        let mut validators = self.validators.write().unwrap();
        let validator = validators.get_mut(address).ok_or(ValidatorError::NotFound(*address))?;
        validator.state = ValidatorState::Tombstoned;
        validator.stake = (validator.stake as f64 * (1.0 - self.config.slashing_penalty)) as u64;
        warn!(target: LOG_TARGET, address = %address.to_hex(), "validator tombstoned for equivocation");
        Ok(())
    }

    /// §4.7 `tryUnjail`: periodic sweep, `Jailed -> Inactive` once `now >=
    /// jailedUntilHeight`.
    pub fn try_unjail(&self, current_height: u64) {
        let mut validators = self.validators.write().unwrap();
        for validator in validators.values_mut() {
            if validator.state == ValidatorState::Jailed && current_height >= validator.jailed_until_height {
                validator.state = ValidatorState::Inactive;
                validator.consecutive_missed = 0;
                info!(target: LOG_TARGET, address = %validator.address.to_hex(), "validator unjailed");
            }
        }
    }

    pub fn get(&self, address: &PublicKey) -> Option<Validator> {
        self.validators.read().unwrap().get(address).cloned()
    }

    pub fn active_validators(&self) -> Vec<Validator> {
        self.validators
            .read()
            .unwrap()
            .values()
            .filter(|v| v.is_eligible())
            .cloned()
            .collect()
    }

    /// Every known validator regardless of state, for the `validators` CLI
    /// command and read-only projections (§4.10).
    pub fn all_validators(&self) -> Vec<Validator> {
        let mut out: Vec<Validator> = self.validators.read().unwrap().values().cloned().collect();
        out.sort_by(|a, b| a.address.to_hex().cmp(&b.address.to_hex()));
        out
    }

    /// Persists the full validator set to `path`, mirroring `PeerStore`'s
    /// periodic bincode snapshot (§4.2) so a standalone `validators` CLI
    /// invocation has something durable to read without an RPC layer.
    pub fn save_snapshot(&self, path: &Path) -> io::Result<()> {
        let records = self.all_validators();
        let bytes = bincode::serialize(&records).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    }

    /// Loads a snapshot written by [`save_snapshot`](Self::save_snapshot);
    /// returns an empty manager if none exists yet.
    pub fn load_snapshot(config: ValidatorManagerConfig, path: &Path) -> io::Result<Self> {
        let manager = ValidatorManager::new(config);
        if !path.exists() {
            return Ok(manager);
        }
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Ok(manager);
        }
        match bincode::deserialize::<Vec<Validator>>(&bytes) {
            Ok(records) => {
                let mut map = manager.validators.write().unwrap();
                for record in records {
                    map.insert(record.address, record);
                }
            }
            Err(err) => warn!(target: LOG_TARGET, %err, "validators snapshot unreadable, starting with an empty set"),
        }
        Ok(manager)
    }

    pub fn active_count(&self) -> usize {
        self.validators.read().unwrap().values().filter(|v| v.is_eligible()).count()
    }

    /// §4.8 "`seed = H(prevBlockHash || H || R)`; `P =
    /// validatorManager.selectValidator(seed)`" — stake-weighted,
    /// reputation-biased weighted choice over eligible validators. Ties
    /// (equal cumulative weight landing exactly on a boundary, vanishingly
    /// rare with `f64` seeds but possible with an adversarial seed) are
    /// broken by lower address lexicographic order, per §4.8.
    pub fn select_validator(&self, seed: &ember_crypto::Hash) -> Option<PublicKey> {
        let mut eligible = self.active_validators();
        if eligible.is_empty() {
            return None;
        }
        eligible.sort_by(|a, b| a.address.cmp(&b.address));

        let total_weight: f64 = eligible.iter().map(|v| v.voting_power()).sum();
        if total_weight <= 0.0 {
            return eligible.first().map(|v| v.address);
        }

        let mut rng = seeded_rng(seed);
        let pick = rng.gen_range(0.0..total_weight);
        let mut cumulative = 0.0;
        for validator in &eligible {
            cumulative += validator.voting_power();
            if pick < cumulative {
                return Some(validator.address);
            }
        }
        eligible.last().map(|v| v.address)
    }
}

/// Derives a deterministic RNG from the round seed so every honest node
/// reaches the same proposer given the same `(prevBlockHash, H, R)`.
fn seeded_rng(seed: &ember_crypto::Hash) -> rand::rngs::StdRng {
    use rand::SeedableRng;
    rand::rngs::StdRng::from_seed(*seed.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::KeyPair;

    fn manager() -> ValidatorManager {
        ValidatorManager::new(ValidatorManagerConfig {
            consensus: ConsensusConfig::default(),
            min_stake: 100,
            distribution_deadline_height: 1000,
            developer_reward: 100,
            validator_reward: 1,
        })
    }

    #[test]
    fn register_rejects_stake_below_minimum() {
        let mgr = manager();
        let addr = KeyPair::generate().public();
        assert_eq!(
            mgr.register(addr, 10, "low".into()),
            Err(ValidatorError::InsufficientStake { have: 10, need: 100 })
        );
    }

    #[test]
    fn register_rejects_duplicate_address() {
        let mgr = manager();
        let addr = KeyPair::generate().public();
        mgr.register(addr, 1000, "a".into()).unwrap();
        assert_eq!(mgr.register(addr, 1000, "a".into()), Err(ValidatorError::AlreadyRegistered(addr)));
    }

    #[test]
    fn activate_requires_registration_and_sufficient_stake() {
        let mgr = manager();
        let addr = KeyPair::generate().public();
        mgr.register(addr, 1000, "a".into()).unwrap();
        mgr.activate(&addr).unwrap();
        assert_eq!(mgr.get(&addr).unwrap().state, ValidatorState::Active);
    }

    #[test]
    fn missed_blocks_jail_after_threshold() {
        let mgr = manager();
        let addr = KeyPair::generate().public();
        mgr.register(addr, 1000, "a".into()).unwrap();
        mgr.activate(&addr).unwrap();
        for _ in 0..ConsensusConfig::default().missed_blocks_before_jail {
            mgr.record_proposal(&addr, false, 1).unwrap();
        }
        assert_eq!(mgr.get(&addr).unwrap().state, ValidatorState::Jailed);
    }

    #[test]
    fn unjail_sweep_restores_inactive_after_deadline() {
        let mgr = manager();
        let addr = KeyPair::generate().public();
        mgr.register(addr, 1000, "a".into()).unwrap();
        mgr.activate(&addr).unwrap();
        for _ in 0..ConsensusConfig::default().missed_blocks_before_jail {
            mgr.record_proposal(&addr, false, 10).unwrap();
        }
        let jailed_until = mgr.get(&addr).unwrap().jailed_until_height;
        mgr.try_unjail(jailed_until - 1);
        assert_eq!(mgr.get(&addr).unwrap().state, ValidatorState::Jailed);
        mgr.try_unjail(jailed_until);
        assert_eq!(mgr.get(&addr).unwrap().state, ValidatorState::Inactive);
    }

    #[test]
    fn equivocation_tombstones_and_slashes() {
        let mgr = manager();
        let addr = KeyPair::generate().public();
        mgr.register(addr, 1000, "a".into()).unwrap();
        mgr.activate(&addr).unwrap();
        mgr.record_equivocation(&addr).unwrap();
        let validator = mgr.get(&addr).unwrap();
        assert_eq!(validator.state, ValidatorState::Tombstoned);
        assert!(validator.stake < 1000);
    }

    #[test]
    fn select_validator_only_returns_eligible_addresses() {
        let mgr = manager();
        let active = KeyPair::generate().public();
        let inactive = KeyPair::generate().public();
        mgr.register(active, 1000, "a".into()).unwrap();
        mgr.register(inactive, 1000, "b".into()).unwrap();
        mgr.activate(&active).unwrap();

        let seed = ember_crypto::Hash::zero();
        assert_eq!(mgr.select_validator(&seed), Some(active));
    }

    #[test]
    fn select_validator_is_deterministic_given_the_same_seed() {
        let mgr = manager();
        for _ in 0..5 {
            let addr = KeyPair::generate().public();
            mgr.register(addr, 1000, "v".into()).unwrap();
            mgr.activate(&addr).unwrap();
        }
        let seed = ember_crypto::Hash::zero();
        assert_eq!(mgr.select_validator(&seed), mgr.select_validator(&seed));
    }

    #[test]
    fn decay_inactive_pulls_non_participants_toward_neutral_but_skips_participants() {
        let mgr = manager();
        let active = KeyPair::generate().public();
        let idle = KeyPair::generate().public();
        mgr.register(active, 1000, "a".into()).unwrap();
        mgr.register(idle, 1000, "b".into()).unwrap();
        mgr.activate(&active).unwrap();
        mgr.activate(&idle).unwrap();

        mgr.record_proposal(&active, true, 1).unwrap();
        mgr.record_proposal(&idle, true, 1).unwrap();
        let boosted = mgr.get(&idle).unwrap().reputation;
        assert!(boosted > NEUTRAL_REPUTATION);

        mgr.decay_inactive(&[active]);
        assert_eq!(mgr.get(&active).unwrap().reputation, boosted);
        assert!(mgr.get(&idle).unwrap().reputation < boosted);
        assert!(mgr.get(&idle).unwrap().reputation > NEUTRAL_REPUTATION);
    }

    #[test]
    fn tombstoned_validator_is_never_selected() {
        let mgr = manager();
        let addr = KeyPair::generate().public();
        mgr.register(addr, 1000, "a".into()).unwrap();
        mgr.activate(&addr).unwrap();
        mgr.record_equivocation(&addr).unwrap();
        let seed = ember_crypto::Hash::zero();
        assert_eq!(mgr.select_validator(&seed), None);
    }
}
