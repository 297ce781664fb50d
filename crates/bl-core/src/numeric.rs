use crate::{CoreError, CoreResult};

/// Floating point type used throughout the bench
pub type Real = f64;

/// Closed interval used to bound actuator outputs and controller state.
///
/// `minimum <= maximum` always holds; the only way to change the bounds after
/// construction is [`Limit::set_limit`], which re-checks it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limit {
    minimum: Real,
    maximum: Real,
}

impl Limit {
    pub fn new(minimum: Real, maximum: Real) -> CoreResult<Self> {
        check_bounds(minimum, maximum)?;
        Ok(Self { minimum, maximum })
    }

    pub fn minimum(&self) -> Real {
        self.minimum
    }

    pub fn maximum(&self) -> Real {
        self.maximum
    }

    /// Bound `value` to `[minimum, maximum]`.
    ///
    /// NaN maps to the minimum so a broken reading can never drive an
    /// actuator high.
    pub fn clamp(&self, value: Real) -> Real {
        if value.is_nan() {
            self.minimum
        } else if value > self.maximum {
            self.maximum
        } else if value < self.minimum {
            self.minimum
        } else {
            value
        }
    }

    pub fn contains(&self, value: Real) -> bool {
        value >= self.minimum && value <= self.maximum
    }

    pub fn set_limit(&mut self, minimum: Real, maximum: Real) -> CoreResult<()> {
        check_bounds(minimum, maximum)?;
        self.minimum = minimum;
        self.maximum = maximum;
        Ok(())
    }
}

fn check_bounds(minimum: Real, maximum: Real) -> CoreResult<()> {
    ensure_finite(minimum, "limit minimum")?;
    ensure_finite(maximum, "limit maximum")?;
    if minimum > maximum {
        return Err(CoreError::InvalidLimit { minimum, maximum });
    }
    Ok(())
}

pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}
