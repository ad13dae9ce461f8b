use super::Indicator;
use rust_decimal::Decimal;

/// Average Directional Index with +DI/-DI, Wilder-smoothed the same way as
/// [`super::atr::ATR`]: a simple average seeds the first `period` bars, then
/// each new bar folds in via `(prev * (period - 1) + new) / period`.
#[derive(Debug, Clone)]
pub struct ADX {
    period: usize,
    prev_high: Option<Decimal>,
    prev_low: Option<Decimal>,
    prev_close: Option<Decimal>,

    true_ranges: Vec<Decimal>,
    plus_dms: Vec<Decimal>,
    minus_dms: Vec<Decimal>,

    smoothed_tr: Option<Decimal>,
    smoothed_plus_dm: Option<Decimal>,
    smoothed_minus_dm: Option<Decimal>,

    plus_di: Option<Decimal>,
    minus_di: Option<Decimal>,

    dx_values: Vec<Decimal>,
    adx: Option<Decimal>,
}

impl ADX {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_high: None,
            prev_low: None,
            prev_close: None,
            true_ranges: Vec::with_capacity(period),
            plus_dms: Vec::with_capacity(period),
            minus_dms: Vec::with_capacity(period),
            smoothed_tr: None,
            smoothed_plus_dm: None,
            smoothed_minus_dm: None,
            plus_di: None,
            minus_di: None,
            dx_values: Vec::with_capacity(period),
            adx: None,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let (prev_high, prev_low, prev_close) = match (self.prev_high, self.prev_low, self.prev_close) {
            (Some(h), Some(l), Some(c)) => (h, l, c),
            _ => {
                self.prev_high = Some(high);
                self.prev_low = Some(low);
                self.prev_close = Some(close);
                return None;
            }
        };

        let up_move = high - prev_high;
        let down_move = prev_low - low;

        let plus_dm = if up_move > down_move && up_move > Decimal::ZERO {
            up_move
        } else {
            Decimal::ZERO
        };
        let minus_dm = if down_move > up_move && down_move > Decimal::ZERO {
            down_move
        } else {
            Decimal::ZERO
        };

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        self.prev_high = Some(high);
        self.prev_low = Some(low);
        self.prev_close = Some(close);

        let period_dec = Decimal::from(self.period as u32);

        if self.smoothed_tr.is_none() {
            self.true_ranges.push(tr);
            self.plus_dms.push(plus_dm);
            self.minus_dms.push(minus_dm);

            if self.true_ranges.len() < self.period {
                return None;
            }

            self.smoothed_tr = Some(self.true_ranges.iter().sum::<Decimal>());
            self.smoothed_plus_dm = Some(self.plus_dms.iter().sum::<Decimal>());
            self.smoothed_minus_dm = Some(self.minus_dms.iter().sum::<Decimal>());
        } else {
            let prev_tr = self.smoothed_tr.unwrap();
            let prev_plus = self.smoothed_plus_dm.unwrap();
            let prev_minus = self.smoothed_minus_dm.unwrap();

            self.smoothed_tr = Some(prev_tr - (prev_tr / period_dec) + tr);
            self.smoothed_plus_dm = Some(prev_plus - (prev_plus / period_dec) + plus_dm);
            self.smoothed_minus_dm = Some(prev_minus - (prev_minus / period_dec) + minus_dm);
        }

        let smoothed_tr = self.smoothed_tr?;
        if smoothed_tr.is_zero() {
            return self.adx;
        }

        let plus_di = (self.smoothed_plus_dm.unwrap() / smoothed_tr) * Decimal::from(100);
        let minus_di = (self.smoothed_minus_dm.unwrap() / smoothed_tr) * Decimal::from(100);
        self.plus_di = Some(plus_di);
        self.minus_di = Some(minus_di);

        let di_sum = plus_di + minus_di;
        let dx = if di_sum.is_zero() {
            Decimal::ZERO
        } else {
            ((plus_di - minus_di).abs() / di_sum) * Decimal::from(100)
        };

        if self.adx.is_none() {
            self.dx_values.push(dx);
            if self.dx_values.len() < self.period {
                return None;
            }
            let seed: Decimal = self.dx_values.iter().sum::<Decimal>() / period_dec;
            self.adx = Some(seed);
        } else {
            let prev_adx = self.adx.unwrap();
            self.adx = Some((prev_adx * (period_dec - Decimal::ONE) + dx) / period_dec);
        }

        self.adx
    }

    pub fn value(&self) -> Option<Decimal> {
        self.adx
    }

    pub fn plus_di(&self) -> Option<Decimal> {
        self.plus_di
    }

    pub fn minus_di(&self) -> Option<Decimal> {
        self.minus_di
    }

    /// True when +DI is above -DI, i.e. directional pressure favors longs.
    pub fn bullish_cross(&self) -> bool {
        matches!((self.plus_di, self.minus_di), (Some(p), Some(m)) if p > m)
    }
}

impl Indicator for ADX {
    fn name(&self) -> &'static str {
        "ADX"
    }

    fn is_ready(&self) -> bool {
        self.adx.is_some()
    }

    fn reset(&mut self) {
        self.prev_high = None;
        self.prev_low = None;
        self.prev_close = None;
        self.true_ranges.clear();
        self.plus_dms.clear();
        self.minus_dms.clear();
        self.smoothed_tr = None;
        self.smoothed_plus_dm = None;
        self.smoothed_minus_dm = None;
        self.plus_di = None;
        self.minus_di = None;
        self.dx_values.clear();
        self.adx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn strong_uptrend_yields_rising_adx_with_plus_di_dominant() {
        let mut adx = ADX::new(14);
        let mut price = dec!(100);
        let mut last = None;
        for _ in 0..60 {
            let high = price + dec!(2);
            let low = price - dec!(0.5);
            let close = price + dec!(1.5);
            last = adx.update(high, low, close);
            price += dec!(1.5);
        }
        assert!(last.is_some());
        assert!(adx.plus_di().unwrap() > adx.minus_di().unwrap());
    }

    #[test]
    fn not_ready_before_period_elapses() {
        let mut adx = ADX::new(14);
        for i in 0..5 {
            let p = Decimal::from(100 + i);
            adx.update(p + Decimal::ONE, p - Decimal::ONE, p);
        }
        assert!(!adx.is_ready());
    }
}
