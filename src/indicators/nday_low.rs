use super::{lowest, Indicator};
use rust_decimal::Decimal;

/// Tracks whether the current close sits at or below the trailing N-day low,
/// a no-buy filter for mean-reversion entries catching a falling knife.
#[derive(Debug, Clone)]
pub struct NDayLow {
    period: usize,
    lows: Vec<Decimal>,
    value: Option<Decimal>,
}

impl NDayLow {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            lows: Vec::with_capacity(period + 1),
            value: None,
        }
    }

    pub fn update(&mut self, low: Decimal) -> Option<Decimal> {
        self.lows.push(low);
        if self.lows.len() > self.period {
            self.lows.remove(0);
        }
        self.value = lowest(&self.lows, self.period);
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn is_new_low(&self, close: Decimal) -> bool {
        self.value.map(|low| close <= low).unwrap_or(false)
    }
}

impl Indicator for NDayLow {
    fn name(&self) -> &'static str {
        "NDayLow"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.lows.clear();
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn detects_new_low_once_window_full() {
        let mut nd = NDayLow::new(3);
        nd.update(dec!(100));
        nd.update(dec!(95));
        nd.update(dec!(98));
        assert_eq!(nd.value(), Some(dec!(95)));
        assert!(nd.is_new_low(dec!(95)));
        assert!(!nd.is_new_low(dec!(96)));
    }
}
