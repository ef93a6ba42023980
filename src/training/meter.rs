//! Exponential moving average of a scalar stream.

use crate::error::{Error, Result};

/// Smooths a diagnostic metric such as iteration time or training loss
#[derive(Debug, Clone, PartialEq)]
pub struct RunningAverageMeter {
    momentum: f64,
    val: Option<f64>,
    avg: f64,
}

impl RunningAverageMeter {
    /// Create a meter; `momentum` must lie in `(0, 1)`
    pub fn new(momentum: f64) -> Result<Self> {
        if !(momentum > 0.0 && momentum < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "meter momentum must be in (0, 1), got {}",
                momentum
            )));
        }
        Ok(Self {
            momentum,
            val: None,
            avg: 0.0,
        })
    }

    pub fn reset(&mut self) {
        self.val = None;
        self.avg = 0.0;
    }

    pub fn update(&mut self, x: f64) {
        self.avg = match self.val {
            None => x,
            Some(_) => self.avg * self.momentum + x * (1.0 - self.momentum),
        };
        self.val = Some(x);
    }

    /// Most recent value
    pub fn val(&self) -> Option<f64> {
        self.val
    }

    pub fn avg(&self) -> f64 {
        self.avg
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }
}

impl Default for RunningAverageMeter {
    fn default() -> Self {
        Self {
            momentum: 0.99,
            val: None,
            avg: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_sets_average() {
        let mut meter = RunningAverageMeter::new(0.97).unwrap();
        assert_eq!(meter.val(), None);
        assert_eq!(meter.avg(), 0.0);

        meter.update(3.5);
        assert_eq!(meter.val(), Some(3.5));
        assert_eq!(meter.avg(), 3.5);
    }

    #[test]
    fn test_second_update_blends() {
        let m = 0.97;
        let mut meter = RunningAverageMeter::new(m).unwrap();
        meter.update(2.0);
        meter.update(5.0);
        assert_eq!(meter.avg(), 2.0 * m + 5.0 * (1.0 - m));
        assert_eq!(meter.val(), Some(5.0));
    }

    #[test]
    fn test_reset() {
        let mut meter = RunningAverageMeter::default();
        meter.update(1.0);
        meter.update(2.0);
        meter.reset();
        assert_eq!(meter.val(), None);
        assert_eq!(meter.avg(), 0.0);

        meter.update(-4.0);
        assert_eq!(meter.avg(), -4.0);
    }

    #[test]
    fn test_invalid_momentum() {
        assert!(RunningAverageMeter::new(0.0).is_err());
        assert!(RunningAverageMeter::new(1.0).is_err());
        assert!(RunningAverageMeter::new(f64::NAN).is_err());
    }
}
