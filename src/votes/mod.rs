use rust_decimal::Decimal;

use crate::config::{EntrySettings, RuntimeConfig};
use crate::indicators::IndicatorSnapshot;

/// One indicator's opinion on the current candle: +1 casts a BUY vote, -1 a
/// SELL vote, 0 abstains. The aggregator sums these rather than averaging a
/// confidence score, so a single indicator can never dominate the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Buy,
    Sell,
    Abstain,
}

impl Vote {
    fn score(self) -> i32 {
        match self {
            Vote::Buy => 1,
            Vote::Sell => -1,
            Vote::Abstain => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VoteEntry {
    pub name: &'static str,
    pub vote: Vote,
}

/// Tally of every indicator's vote for one closed candle. `delta` is what
/// the signal generator compares against `VoteSettings::min_votes_for_buy`
/// / `min_votes_for_sell` / `transition_min_votes_for_buy`.
#[derive(Debug, Clone)]
pub struct VoteTally {
    pub entries: Vec<VoteEntry>,
    pub buy_votes: i32,
    pub sell_votes: i32,
}

impl VoteTally {
    pub fn delta(&self) -> i32 {
        self.buy_votes - self.sell_votes
    }

    pub fn reasons(&self, vote: Vote) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.vote == vote)
            .map(|e| e.name.to_string())
            .collect()
    }
}

/// Casts one vote per indicator family against the current snapshot. Each
/// function is independent and stateless over the snapshot; ordering only
/// matters for the reasons list, not for the tally itself.
pub fn aggregate_votes(snapshot: &IndicatorSnapshot, config: &RuntimeConfig) -> VoteTally {
    let entry = &config.entry;
    let entries = vec![
        VoteEntry { name: "ema_cross", vote: vote_ema_cross(snapshot) },
        VoteEntry { name: "rsi", vote: vote_rsi(snapshot, entry) },
        VoteEntry { name: "macd", vote: vote_macd(snapshot) },
        VoteEntry { name: "adx_direction", vote: vote_adx_direction(snapshot, entry) },
        VoteEntry { name: "bollinger", vote: vote_bollinger(snapshot) },
        VoteEntry { name: "zscore", vote: vote_zscore(snapshot, entry) },
        VoteEntry { name: "volume_confirmation", vote: vote_volume(snapshot, entry) },
        VoteEntry { name: "trend_filter", vote: vote_trend_filter(snapshot, entry) },
    ];

    let buy_votes = entries.iter().filter(|e| e.vote == Vote::Buy).map(|_| 1).sum();
    let sell_votes = entries.iter().filter(|e| e.vote == Vote::Sell).map(|_| 1).sum();

    VoteTally {
        entries,
        buy_votes,
        sell_votes,
    }
}

fn vote_ema_cross(snapshot: &IndicatorSnapshot) -> Vote {
    if snapshot.ema_fast > snapshot.ema_slow {
        Vote::Buy
    } else if snapshot.ema_fast < snapshot.ema_slow {
        Vote::Sell
    } else {
        Vote::Abstain
    }
}

fn vote_rsi(snapshot: &IndicatorSnapshot, entry: &EntrySettings) -> Vote {
    if snapshot.rsi < entry.mr_rsi_oversold {
        Vote::Buy
    } else if snapshot.rsi > entry.mr_rsi_overbought {
        Vote::Sell
    } else {
        Vote::Abstain
    }
}

fn vote_macd(snapshot: &IndicatorSnapshot) -> Vote {
    if snapshot.macd_histogram > Decimal::ZERO && snapshot.macd_line > snapshot.macd_signal {
        Vote::Buy
    } else if snapshot.macd_histogram < Decimal::ZERO && snapshot.macd_line < snapshot.macd_signal {
        Vote::Sell
    } else {
        Vote::Abstain
    }
}

fn vote_adx_direction(snapshot: &IndicatorSnapshot, entry: &EntrySettings) -> Vote {
    if snapshot.adx < entry.tf_adx_min {
        return Vote::Abstain;
    }
    if snapshot.plus_di > snapshot.minus_di {
        Vote::Buy
    } else if snapshot.minus_di > snapshot.plus_di {
        Vote::Sell
    } else {
        Vote::Abstain
    }
}

fn vote_bollinger(snapshot: &IndicatorSnapshot) -> Vote {
    if snapshot.close <= snapshot.bb_lower {
        Vote::Buy
    } else if snapshot.close >= snapshot.bb_upper {
        Vote::Sell
    } else {
        Vote::Abstain
    }
}

fn vote_zscore(snapshot: &IndicatorSnapshot, entry: &EntrySettings) -> Vote {
    if snapshot.zscore <= -entry.mr_zscore_threshold {
        Vote::Buy
    } else if snapshot.zscore >= entry.mr_zscore_threshold {
        Vote::Sell
    } else {
        Vote::Abstain
    }
}

/// Volume only ever confirms the direction the other indicators already
/// lean, so this never votes SELL on its own — a spike with no
/// directional bias abstains.
fn vote_volume(snapshot: &IndicatorSnapshot, entry: &EntrySettings) -> Vote {
    if !snapshot.is_volume_spike(entry.volume_spike_mult) {
        return Vote::Abstain;
    }
    if snapshot.ema_bullish() {
        Vote::Buy
    } else {
        Vote::Sell
    }
}

/// Long-horizon trend filter: a declining 200-period EMA vetoes BUY votes
/// generated by faster indicators, independent of regime.
fn vote_trend_filter(snapshot: &IndicatorSnapshot, entry: &EntrySettings) -> Vote {
    if snapshot.is_ema_trend_declining(entry.ema200_neg_slope_threshold) {
        Vote::Sell
    } else {
        Vote::Abstain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(overrides: impl FnOnce(&mut IndicatorSnapshot)) -> IndicatorSnapshot {
        let mut snap = IndicatorSnapshot {
            close: dec!(100),
            ema_fast: dec!(101),
            ema_slow: dec!(99),
            ema_trend: dec!(95),
            ema_trend_slope_pct: Some(dec!(0.1)),
            rsi: dec!(50),
            macd_line: dec!(0.5),
            macd_signal: dec!(0.3),
            macd_histogram: dec!(0.2),
            adx: dec!(30),
            plus_di: dec!(25),
            minus_di: dec!(15),
            atr: dec!(2),
            atr_pct: dec!(2),
            bb_upper: dec!(105),
            bb_middle: dec!(100),
            bb_lower: dec!(95),
            bb_percent_b: dec!(0.5),
            zscore: dec!(0),
            volume: dec!(1000),
            avg_volume: dec!(1000),
            relative_volume: dec!(1),
            nday_low: dec!(90),
        };
        overrides(&mut snap);
        snap
    }

    #[test]
    fn bullish_confluence_produces_positive_delta() {
        let snap = snapshot(|_| {});
        let config = RuntimeConfig::default();
        let tally = aggregate_votes(&snap, &config);
        assert!(tally.delta() > 0);
    }

    #[test]
    fn oversold_rsi_casts_a_buy_vote() {
        let snap = snapshot(|s| s.rsi = dec!(20));
        let config = RuntimeConfig::default();
        let tally = aggregate_votes(&snap, &config);
        assert!(tally.entries.iter().any(|e| e.name == "rsi" && e.vote == Vote::Buy));
    }

    #[test]
    fn declining_trend_ema_vetoes_via_sell_vote() {
        let snap = snapshot(|s| s.ema_trend_slope_pct = Some(dec!(-1.0)));
        let config = RuntimeConfig::default();
        let tally = aggregate_votes(&snap, &config);
        assert!(tally.entries.iter().any(|e| e.name == "trend_filter" && e.vote == Vote::Sell));
    }
}
