//! Kubernetes resource quantities.
//!
//! A quantity is a decimal number followed by an optional suffix:
//! binary (`Ki`..`Ei`), decimal SI (`n`, `u`, `m`, `k`..`E`) or a decimal
//! exponent (`e3`, `E-2`). Values are stored as milli-units so that CPU
//! (`250m`) and byte counts share one representation. Fractions below one
//! milli-unit round up, matching how the scheduler compares requests.
//!
//! The API carries quantities as strings; `TryFrom<&ApiQuantity>` is the
//! bridge from `k8s-openapi`'s wrapper.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity as ApiQuantity;

use crate::error::QuantityError;

/// A resource amount in milli-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    milli: i64,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity { milli: 0 };

    pub const fn from_milli(milli: i64) -> Self {
        Self { milli }
    }

    /// Whole units, e.g. bytes for memory or cores for CPU.
    pub const fn from_units(units: i64) -> Self {
        Self {
            milli: units.saturating_mul(1000),
        }
    }

    pub const fn milli_value(&self) -> i64 {
        self.milli
    }

    /// Whole units, rounded up.
    pub const fn value(&self) -> i64 {
        let units = self.milli / 1000;
        if self.milli % 1000 > 0 { units + 1 } else { units }
    }

    pub const fn is_zero(&self) -> bool {
        self.milli == 0
    }

    pub fn saturating_add(self, other: Quantity) -> Quantity {
        Quantity {
            milli: self.milli.saturating_add(other.milli),
        }
    }
}

enum Multiplier {
    /// Power of 1024.
    Binary(u32),
    /// Power of 10.
    Decimal(i32),
}

fn parse_suffix(suffix: &str) -> Result<Multiplier, QuantityError> {
    let multiplier = match suffix {
        "" => Multiplier::Decimal(0),
        "n" => Multiplier::Decimal(-9),
        "u" => Multiplier::Decimal(-6),
        "m" => Multiplier::Decimal(-3),
        "k" => Multiplier::Decimal(3),
        "M" => Multiplier::Decimal(6),
        "G" => Multiplier::Decimal(9),
        "T" => Multiplier::Decimal(12),
        "P" => Multiplier::Decimal(15),
        "E" => Multiplier::Decimal(18),
        "Ki" => Multiplier::Binary(1),
        "Mi" => Multiplier::Binary(2),
        "Gi" => Multiplier::Binary(3),
        "Ti" => Multiplier::Binary(4),
        "Pi" => Multiplier::Binary(5),
        "Ei" => Multiplier::Binary(6),
        exp if exp.len() > 1 && (exp.starts_with('e') || exp.starts_with('E')) => {
            let power: i32 = exp[1..]
                .parse()
                .map_err(|_| QuantityError::UnknownSuffix(suffix.to_string()))?;
            Multiplier::Decimal(power)
        }
        _ => return Err(QuantityError::UnknownSuffix(suffix.to_string())),
    };
    Ok(multiplier)
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let overflow = || QuantityError::Overflow(input.to_string());

        let (negative, rest) = match input.as_bytes().first() {
            None => return Err(QuantityError::Empty),
            Some(b'-') => (true, &input[1..]),
            Some(b'+') => (false, &input[1..]),
            Some(_) => (false, input),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if int_part.is_empty() && frac_part.is_empty() || frac_part.contains('.') {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let digits = format!("{int_part}{frac_part}");
        if digits.len() > 30 {
            return Err(overflow());
        }
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::InvalidNumber(input.to_string()))?;

        let (binary, decimal) = match parse_suffix(suffix)? {
            Multiplier::Binary(power) => (1024i128.pow(power), 0),
            Multiplier::Decimal(power) => (1, power),
        };
        let numerator = mantissa.checked_mul(binary).ok_or_else(overflow)?;

        // milli = numerator * 10^(decimal + 3 - fraction digits)
        let power = i64::from(decimal) + 3 - frac_part.len() as i64;
        let milli = if numerator == 0 {
            0
        } else if power >= 0 {
            let scale = 10i128.checked_pow(power as u32).ok_or_else(overflow)?;
            numerator.checked_mul(scale).ok_or_else(overflow)?
        } else {
            match 10i128.checked_pow((-power) as u32) {
                Some(divisor) => (numerator + divisor - 1) / divisor,
                None => 1,
            }
        };

        let milli = if negative { -milli } else { milli };
        let milli = i64::try_from(milli).map_err(|_| overflow())?;
        Ok(Quantity { milli })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 == 0 {
            write!(f, "{}", self.milli / 1000)
        } else {
            write!(f, "{}m", self.milli)
        }
    }
}

impl TryFrom<&ApiQuantity> for Quantity {
    type Error = QuantityError;

    fn try_from(value: &ApiQuantity) -> Result<Self, Self::Error> {
        value.0.parse()
    }
}
