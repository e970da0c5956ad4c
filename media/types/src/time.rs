/*!
    Rational numbers used for time bases and frame rates.
*/

use std::fmt;
use std::time::Duration;

/**
    A rational number, used for time bases (`1/90000`) and frame rates (`30000/1001`).
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /**
        Returns true if both parts are non-zero.

        Containers report unknown frame rates as `0/0` or `0/1`.
    */
    pub const fn is_valid(self) -> bool {
        self.num != 0 && self.den != 0
    }

    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /**
        Convert `value` expressed in this time base into `to`, rounding to the
        nearest integer (halfway cases away from zero).

        Returns 0 when either time base is degenerate.
    */
    pub fn rescale(self, value: i64, to: Rational) -> i64 {
        let num = value as i128 * self.num as i128 * to.den as i128;
        let den = self.den as i128 * to.num as i128;
        if den == 0 {
            return 0;
        }
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let half = den / 2;
        let rounded = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /**
        Convert a timestamp in this time base into a wall-clock duration.

        Negative timestamps have no duration representation and yield `None`.
    */
    pub fn to_duration(self, value: i64) -> Option<Duration> {
        let nanos = self.rescale(value, Rational::new(1, 1_000_000_000));
        u64::try_from(nanos).ok().map(Duration::from_nanos)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
