//! Black-Scholes pricing for European calls.
//!
//! Implied volatility is solved with Brent's method on a fixed volatility
//! bracket, so a premium that has no root inside the bracket is reported as
//! an error instead of being clamped to the nearest bound.

use std::f64::consts::SQRT_2;
use std::mem::swap;

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use thiserror::Error;

/// Root finder stops once the bracket is narrower than this.
const ROOT_TOLERANCE: f64 = 1e-12;

const MAX_ITERATIONS: usize = 200;

#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PricingError {
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("No root in volatility bracket [{lower}, {upper}]")]
    NoBracket { lower: f64, upper: f64 },

    #[error("Root finder did not converge after {0} iterations")]
    NoConvergence(usize),
}

/// Volatility search interval for implied volatility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolBracket {
    pub lower: f64,
    pub upper: f64,
}

impl Default for VolBracket {
    fn default() -> Self {
        Self {
            lower: 0.001,
            upper: 2.0,
        }
    }
}

/// Black-Scholes calculator for calls on a non-dividend-paying underlying.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Risk-free interest rate (continuously compounded).
    pub rate: f64,
    /// Implied volatility search interval.
    pub bracket: VolBracket,
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self {
            rate: 0.01,
            bracket: VolBracket::default(),
        }
    }
}

impl BlackScholes {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            ..Default::default()
        }
    }

    pub fn with_bracket(mut self, bracket: VolBracket) -> Self {
        self.bracket = bracket;
        self
    }

    fn d1(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let numerator = (spot / strike).ln() + (self.rate + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    fn d2(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        self.d1(spot, strike, time, vol) - vol * time.sqrt()
    }

    /// Standard normal CDF.
    fn norm_cdf(x: f64) -> f64 {
        0.5 * erfc(-x / SQRT_2)
    }

    /// Theoretical call price.
    ///
    /// Degenerate time or volatility collapses to the discounted intrinsic value.
    pub fn call_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if time <= 0.0 {
            return (spot - strike).max(0.0);
        }
        let discount = (-self.rate * time).exp();
        if vol <= 0.0 {
            return (spot - strike * discount).max(0.0);
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        spot * Self::norm_cdf(d1) - strike * discount * Self::norm_cdf(d2)
    }

    /// Call delta, `N(d1)`.
    pub fn delta(&self, spot: f64, strike: f64, time: f64, vol: f64) -> Result<f64, PricingError> {
        require_positive(spot, "spot must be positive")?;
        require_positive(strike, "strike must be positive")?;
        require_positive(time, "time to expiry must be positive")?;
        require_positive(vol, "volatility must be positive")?;
        if !self.rate.is_finite() {
            return Err(PricingError::InvalidInput("rate must be finite"));
        }

        let delta = Self::norm_cdf(self.d1(spot, strike, time, vol));
        if delta.is_finite() {
            Ok(delta)
        } else {
            Err(PricingError::InvalidInput("delta is not finite"))
        }
    }

    /// Volatility at which the theoretical call price equals `premium`.
    pub fn implied_volatility(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        premium: f64,
    ) -> Result<f64, PricingError> {
        require_positive(spot, "spot must be positive")?;
        require_positive(strike, "strike must be positive")?;
        require_positive(time, "time to expiry must be positive")?;
        require_positive(premium, "premium must be positive")?;
        if !self.rate.is_finite() {
            return Err(PricingError::InvalidInput("rate must be finite"));
        }

        let VolBracket { lower, upper } = self.bracket;
        if !(lower > 0.0 && upper > lower && upper.is_finite()) {
            return Err(PricingError::InvalidInput("volatility bracket is empty"));
        }

        brent_root(
            |vol| self.call_price(spot, strike, time, vol) - premium,
            lower,
            upper,
        )
    }
}

fn require_positive(value: f64, message: &'static str) -> Result<(), PricingError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PricingError::InvalidInput(message))
    }
}

/// Brent's method: inverse quadratic interpolation and secant steps,
/// falling back to bisection whenever they would leave the bracket or
/// converge too slowly.
fn brent_root<F>(f: F, lower: f64, upper: f64) -> Result<f64, PricingError>
where
    F: Fn(f64) -> f64,
{
    let (mut a, mut b) = (lower, upper);
    let (mut fa, mut fb) = (f(a), f(b));

    if !fa.is_finite() || !fb.is_finite() {
        return Err(PricingError::InvalidInput("objective is not finite on the bracket"));
    }
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if fa.signum() == fb.signum() {
        return Err(PricingError::NoBracket { lower, upper });
    }

    if fa.abs() < fb.abs() {
        swap(&mut a, &mut b);
        swap(&mut fa, &mut fb);
    }

    let (mut c, mut fc) = (a, fa);
    let mut d = c;
    let mut bisected = true;

    for _ in 0..MAX_ITERATIONS {
        if fb == 0.0 || (b - a).abs() < ROOT_TOLERANCE {
            return Ok(b);
        }

        let mut s = if fa != fc && fb != fc {
            a * fb * fc / ((fa - fb) * (fa - fc))
                + b * fa * fc / ((fb - fa) * (fb - fc))
                + c * fa * fb / ((fc - fa) * (fc - fb))
        } else {
            b - fb * (b - a) / (fb - fa)
        };

        let quarter = (3.0 * a + b) / 4.0;
        let outside = !(s > quarter.min(b) && s < quarter.max(b));
        let (slow, tiny) = if bisected {
            ((s - b).abs() >= (b - c).abs() / 2.0, (b - c).abs() < ROOT_TOLERANCE)
        } else {
            ((s - b).abs() >= (c - d).abs() / 2.0, (c - d).abs() < ROOT_TOLERANCE)
        };

        if outside || slow || tiny {
            s = (a + b) / 2.0;
            bisected = true;
        } else {
            bisected = false;
        }

        let fs = f(s);
        if !fs.is_finite() {
            return Err(PricingError::InvalidInput("objective is not finite inside the bracket"));
        }

        d = c;
        c = b;
        fc = fb;

        if fa * fs < 0.0 {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }

        if fa.abs() < fb.abs() {
            swap(&mut a, &mut b);
            swap(&mut fa, &mut fb);
        }
    }

    Err(PricingError::NoConvergence(MAX_ITERATIONS))
}
