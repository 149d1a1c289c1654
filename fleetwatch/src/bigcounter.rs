use std::fmt::{self, Display, Formatter};

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;
use serde::{Serialize, Serializer};

/// Non-negative counter that starts as a machine word and widens to an
/// arbitrary precision integer when an addition would overflow.
///
/// Used for address and prefix totals, which routinely exceed `u64` for
/// IPv6 pools. Once widened the counter stays wide; values only grow, so the
/// wide form always holds a value above `u64::MAX`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BigCounter {
    base: u64,
    extended: Option<BigUint>,
}

impl BigCounter {
    pub fn new(value: u64) -> Self {
        Self {
            base: value,
            extended: None,
        }
    }

    pub fn from_u128(value: u128) -> Self {
        match u64::try_from(value) {
            Ok(value) => Self::new(value),
            Err(_) => Self::from_biguint(BigUint::from(value)),
        }
    }

    pub fn from_biguint(value: BigUint) -> Self {
        match value.to_u64() {
            Some(value) => Self::new(value),
            None => Self {
                base: 0,
                extended: Some(value),
            },
        }
    }

    /// `2^exponent`.
    pub fn pow2(exponent: u32) -> Self {
        if exponent < 64 {
            Self::new(1u64 << exponent)
        } else {
            Self::from_biguint(BigUint::from(1u8) << exponent)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.extended.is_none() && self.base == 0
    }

    /// Whether the value no longer fits a machine word.
    pub fn is_extended(&self) -> bool {
        self.extended.is_some()
    }

    pub fn add(&mut self, other: &BigCounter) -> &mut Self {
        let Some(theirs) = &other.extended else {
            return self.add_u64(other.base);
        };
        match &mut self.extended {
            Some(mine) => *mine += theirs,
            None => {
                self.extended = Some(theirs + self.base);
                self.base = 0;
            }
        }
        self
    }

    pub fn add_u64(&mut self, value: u64) -> &mut Self {
        match &mut self.extended {
            Some(mine) => *mine += value,
            None => match self.base.checked_add(value) {
                Some(sum) => self.base = sum,
                None => {
                    self.extended = Some(BigUint::from(self.base) + value);
                    self.base = 0;
                }
            },
        }
        self
    }

    /// Add a signed big integer. Negative values are refused and leave the
    /// counter untouched; the return value tells whether the addition happened.
    pub fn add_bigint(&mut self, value: &BigInt) -> bool {
        match value.sign() {
            Sign::Minus => false,
            Sign::NoSign => true,
            Sign::Plus => {
                let magnitude = value.magnitude().clone();
                self.add(&Self::from_biguint(magnitude));
                true
            }
        }
    }

    /// Ratio of the two counters as floating point. Division by a zero
    /// counter follows IEEE rules.
    pub fn divide_by(&self, divisor: &BigCounter) -> f64 {
        if let (None, None) = (&self.extended, &divisor.extended) {
            return self.base as f64 / divisor.base as f64;
        }
        self.to_f64() / divisor.to_f64()
    }

    /// Like [`BigCounter::divide_by`], returning `0.0` for a zero divisor.
    pub fn divide_safe_by(&self, divisor: &BigCounter) -> f64 {
        if divisor.is_zero() {
            return 0.0;
        }
        self.divide_by(divisor)
    }

    /// The value as `u64`, saturating at `u64::MAX`.
    pub fn to_u64(&self) -> u64 {
        match &self.extended {
            Some(_) => u64::MAX,
            None => self.base,
        }
    }

    /// The value as `i64`, saturating at `i64::MAX`.
    pub fn to_i64(&self) -> i64 {
        i64::try_from(self.to_u64()).unwrap_or(i64::MAX)
    }

    pub fn to_f64(&self) -> f64 {
        match &self.extended {
            Some(value) => value.to_f64().unwrap_or(f64::INFINITY),
            None => self.base as f64,
        }
    }

    pub fn to_biguint(&self) -> BigUint {
        match &self.extended {
            Some(value) => value.clone(),
            None => BigUint::from(self.base),
        }
    }
}

impl From<u64> for BigCounter {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl Display for BigCounter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.extended {
            Some(value) => write!(f, "{value}"),
            None => write!(f, "{}", self.base),
        }
    }
}

// Wide values are emitted as decimal strings so JSON consumers that read
// numbers as doubles do not lose precision.
impl Serialize for BigCounter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.extended {
            Some(value) => serializer.serialize_str(&value.to_string()),
            None => serializer.serialize_u64(self.base),
        }
    }
}
