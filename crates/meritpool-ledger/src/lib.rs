//! Group staking ledger: stake-backed group activation and capacity,
//! round-indexed membership with lazy per-round snapshots, and
//! sponsor-funded trial admissions.
//!
//! All value movement goes through the [`meritpool_types::ValueCustody`]
//! seam; the ledger itself only tracks who holds what where.

pub mod capacity;
pub mod error;
pub mod membership;
pub mod snapshot;
pub mod trial;

pub use capacity::{CapacityLedger, Group};
pub use error::{LedgerError, Result};
pub use membership::{JoinInfo, MembershipStore};
pub use snapshot::{RoundSnapshot, SnapshotStore};
pub use trial::{TrialBook, WaitlistEntry};
