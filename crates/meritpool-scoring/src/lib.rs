//! Verifier scoring and distrust voting.
//!
//! The score ledger accepts batched, resumable origin-score submissions
//! against a round snapshot and caps each owner's aggregate contribution
//! with a per-round verify budget. The distrust ledger lets governors
//! discount an owner's scores for a round at read time.

pub mod distrust;
pub mod error;
pub mod score;

pub use distrust::{DistrustLedger, DistrustRecord};
pub use error::{Result, ScoringError};
pub use score::{Delegation, ScoreLedger, Submission};
