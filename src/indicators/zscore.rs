use super::{sma, stddev, Indicator};
use rust_decimal::Decimal;

/// Rolling Z-score of price against its own trailing mean and standard
/// deviation, used to flag mean-reversion extremes independent of RSI.
#[derive(Debug, Clone)]
pub struct ZScore {
    period: usize,
    values: Vec<Decimal>,
    value: Option<Decimal>,
}

impl ZScore {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: Vec::with_capacity(period + 1),
            value: None,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        self.values.push(price);
        if self.values.len() > self.period {
            self.values.remove(0);
        }

        let mean = sma(&self.values, self.period)?;
        let sd = stddev(&self.values, self.period)?;
        self.value = if sd.is_zero() {
            Some(Decimal::ZERO)
        } else {
            Some((price - mean) / sd)
        };
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn is_extreme(&self, threshold: Decimal) -> bool {
        self.value.map(|v| v.abs() > threshold).unwrap_or(false)
    }
}

impl Indicator for ZScore {
    fn name(&self) -> &'static str {
        "ZScore"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.values.clear();
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn flat_series_has_zero_zscore() {
        let mut z = ZScore::new(5);
        let mut last = None;
        for _ in 0..6 {
            last = z.update(dec!(100));
        }
        assert_eq!(last, Some(Decimal::ZERO));
    }

    #[test]
    fn spike_registers_as_extreme() {
        let mut z = ZScore::new(10);
        for _ in 0..10 {
            z.update(dec!(100));
        }
        let v = z.update(dec!(130)).unwrap();
        assert!(v > Decimal::ZERO);
        assert!(z.is_extreme(dec!(1)));
    }
}
