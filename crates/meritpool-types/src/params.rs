use crate::primitives::{Ratio, TokenAmount};
use serde::{Deserialize, Serialize};

/// Protocol-wide parameters shared by all ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Group capacity per staked token.
    pub capacity_multiplier: u64,
    /// Multiplier for the per-round owner verify budget; may differ from
    /// the join-side multiplier.
    pub verify_capacity_multiplier: u64,
    /// Minimum stake to activate a group.
    pub min_group_stake: TokenAmount,
    /// Minimum owner vote weight as a fraction of total vote weight
    /// required to activate a group.
    pub min_owner_vote_ratio: Ratio,
    /// Per-account join cap as a fraction of total supply. Zero disables
    /// the protocol-level cap.
    pub account_cap_ratio: Ratio,
    /// Upper bound on a verifier-submitted origin score.
    pub max_origin_score: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            capacity_multiplier: 20,
            verify_capacity_multiplier: 20,
            min_group_stake: TokenAmount::from_tokens(1_000.0),
            min_owner_vote_ratio: Ratio::from_ppm(10_000), // 1%
            account_cap_ratio: Ratio::from_ppm(1_000),     // 0.1% of supply
            max_origin_score: 10_000,
        }
    }
}
