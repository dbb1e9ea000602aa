use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOKEN_DECIMALS: u32 = 9;
pub const TOKEN_BASE_UNIT: u64 = 1_000_000_000; // 10^9

/// Token value in base units (9 decimals).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_tokens(tokens: f64) -> Self {
        Self((tokens * TOKEN_BASE_UNIT as f64) as u64)
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_tokens(&self) -> f64 {
        self.0 as f64 / TOKEN_BASE_UNIT as f64
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9} MPT", self.to_tokens())
    }
}

/// Opaque account / owner identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

/// Group identity issued by the external ownership registry.
///
/// Id zero is reserved: membership records use `GroupId::NONE` to denote
/// "not a member".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GroupId(u64);

impl GroupId {
    pub const NONE: Self = Self(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const RATIO_SCALE: u32 = 1_000_000; // parts per million

/// Fixed-point ratio in [0, 1], parts-per-million scale.
///
/// Used for recipient splits, the capacity reduction coefficient and
/// parameter fractions. All arithmetic rounds down.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Ratio(u32);

impl Ratio {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(RATIO_SCALE);

    pub fn from_ppm(ppm: u32) -> Self {
        Self(ppm.min(RATIO_SCALE))
    }

    /// Floor of `num / den`, clamped to `ONE`. Zero denominator maps to zero.
    pub fn from_fraction(num: u128, den: u128) -> Self {
        if den == 0 {
            return Self::ZERO;
        }
        let ppm = num.saturating_mul(RATIO_SCALE as u128) / den;
        Self(ppm.min(RATIO_SCALE as u128) as u32)
    }

    pub fn as_ppm(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Floor of `value * self`.
    pub fn apply(&self, value: u128) -> u128 {
        value * self.0 as u128 / RATIO_SCALE as u128
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}%", self.0 as f64 / (RATIO_SCALE as f64 / 100.0))
    }
}
