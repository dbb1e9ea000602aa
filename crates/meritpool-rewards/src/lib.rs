//! Reward distribution for the staking-pool core: per-round pool shares
//! by group, member and verifier, owner-configured recipient splits, and
//! burning of unclaimed round pools. Also hosts [`PoolEngine`], the
//! facade wiring every component over the collaborator seams.

pub mod distributor;
pub mod engine;
pub mod error;
pub mod splits;

pub use distributor::RewardDistributor;
pub use engine::PoolEngine;
pub use error::{Result, RewardError};
pub use splits::{RecipientShare, RecipientSplitBook};
