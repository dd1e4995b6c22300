//! The rPoS consensus engine (§4.7-4.8): validator lifecycle and the
//! single-threaded round state machine that turns mempool transactions
//! into committed blocks. Owns all validator records; every other
//! subsystem reads them only through [`ValidatorManager`]'s public
//! contract.

pub mod engine;
pub mod error;
pub mod validator;

pub use engine::{
    BlockSource, ChainSink, ConsensusEngine, ConsensusInput, ConsensusOutput, ValidatorIdentity, VoteMessage,
};
pub use error::{EngineError, ValidatorError};
pub use validator::{Validator, ValidatorManager, ValidatorManagerConfig, ValidatorState};
