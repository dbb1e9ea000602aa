/*!
# Meritpool Types

Foundation crate for the meritpool workspace: value and identity
primitives, protocol parameters, and the collaborator interfaces the core
ledgers depend on (ownership registry, governance vote weights, round
clock, value custody, reward source).

## Module Structure

- **primitives**: `TokenAmount`, `AccountId`, `GroupId`, fixed-point `Ratio`
- **params**: `ProtocolParams` configuration
- **traits**: collaborator interfaces consumed by the core
- **memory**: in-memory collaborator implementations for tests and embedders
*/

pub mod memory;
pub mod params;
pub mod primitives;
pub mod traits;

pub use memory::{
    ManualRoundClock, MemoryCustody, MemoryRegistry, MemoryRewardSource, MemoryVoteWeights,
};
pub use params::ProtocolParams;
pub use primitives::{AccountId, GroupId, Ratio, TokenAmount, RATIO_SCALE, TOKEN_BASE_UNIT};
pub use traits::{OwnershipRegistry, RewardSource, RoundClock, ValueCustody, VoteWeightSource};
