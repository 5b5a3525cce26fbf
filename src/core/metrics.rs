use super::types::ScenarioMetrics;

const VOLATILITY_EPS: f64 = 1e-12;

/// Risk/return figures of one return sequence, as fractions.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ReturnMetrics {
    pub time_weighted_return: f64,
    pub arithmetic_mean_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

pub fn return_metrics(returns: &[f64]) -> ReturnMetrics {
    let n = returns.len();
    if n == 0 {
        return ReturnMetrics::default();
    }

    let growth = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r));
    let time_weighted_return = growth.powf(1.0 / n as f64) - 1.0;

    let mean = returns.iter().sum::<f64>() / n as f64;
    let denominator = if n > 1 { (n - 1) as f64 } else { 1.0 };
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / denominator;
    // rounding in the mean leaves residue of order 1e-17 on constant sequences
    let raw_volatility = variance.sqrt();
    let volatility = if raw_volatility <= VOLATILITY_EPS * mean.abs().max(1.0) {
        0.0
    } else {
        raw_volatility
    };
    let sharpe = if volatility == 0.0 {
        0.0
    } else {
        mean / volatility
    };

    ReturnMetrics {
        time_weighted_return,
        arithmetic_mean_return: mean,
        volatility,
        sharpe,
        max_drawdown: max_drawdown(returns),
    }
}

/// Largest peak-to-trough fall of the cumulative wealth index, starting from 1.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = 1.0;
    let mut worst = 0.0;
    for r in returns {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        }
        let drawdown = (peak - wealth) / peak;
        if drawdown > worst {
            worst = drawdown;
        }
    }
    worst
}

pub fn scenario_metrics(
    returns: &[f64],
    final_balance: f64,
    max_withdrawal_rate: f64,
) -> ScenarioMetrics {
    let m = return_metrics(returns);
    ScenarioMetrics {
        twr: m.time_weighted_return * 100.0,
        amr: m.arithmetic_mean_return * 100.0,
        volatility: m.volatility * 100.0,
        sharpe: m.sharpe,
        max_drawdown: m.max_drawdown * 100.0,
        final_balance,
        max_withdrawal_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn empty_sequence_yields_zero_metrics() {
        assert_eq!(return_metrics(&[]), ReturnMetrics::default());
    }

    #[test]
    fn single_year_volatility_uses_unit_denominator() {
        let m = return_metrics(&[0.05]);
        assert_approx(m.time_weighted_return, 0.05);
        assert_approx(m.volatility, 0.0);
        assert_approx(m.sharpe, 0.0);
    }

    #[test]
    fn constant_sequence_with_inexact_mean_has_zero_sharpe() {
        // 0.1 * 3 / 3 rounds to 0.10000000000000002
        for returns in [vec![0.1; 3], vec![0.07; 5], vec![-0.3; 11]] {
            let m = return_metrics(&returns);
            assert_eq!(m.volatility, 0.0);
            assert_eq!(m.sharpe, 0.0);
        }
    }

    #[test]
    fn mixed_sequence_matches_hand_calculation() {
        let returns = [0.10, -0.20, 0.05];
        let m = return_metrics(&returns);

        let growth: f64 = 1.10 * 0.80 * 1.05;
        assert_approx(m.time_weighted_return, growth.powf(1.0 / 3.0) - 1.0);
        let mean = (-0.05) / 3.0;
        assert_approx(m.arithmetic_mean_return, mean);
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 2.0;
        assert_approx(m.volatility, variance.sqrt());
        assert_approx(m.sharpe, mean / variance.sqrt());
        // peak 1.10, trough 0.88
        assert_approx(m.max_drawdown, 0.2);
    }

    #[test]
    fn drawdown_tracks_running_peak_across_recoveries() {
        let returns = [-0.5, 1.0, 0.5, -0.4];
        // wealth: 0.5, 1.0, 1.5, 0.9
        assert_approx(max_drawdown(&returns), 0.5);
    }

    #[test]
    fn scenario_metrics_are_reported_in_percent() {
        let m = scenario_metrics(&[0.1, 0.1], 123.0, 4.5);
        assert_approx(m.twr, 10.0);
        assert_approx(m.amr, 10.0);
        assert_approx(m.volatility, 0.0);
        assert_approx(m.sharpe, 0.0);
        assert_approx(m.max_drawdown, 0.0);
        assert_approx(m.final_balance, 123.0);
        assert_approx(m.max_withdrawal_rate, 4.5);
    }

    proptest! {
        #[test]
        fn prop_constant_returns_have_no_risk(r_bp in -5000i32..5000, n in 1usize..60) {
            let r = r_bp as f64 / 10_000.0;
            let returns = vec![r; n];
            let m = return_metrics(&returns);
            prop_assert!((m.time_weighted_return - r).abs() <= 1e-9);
            prop_assert!((m.arithmetic_mean_return - r).abs() <= 1e-9);
            prop_assert!(m.volatility == 0.0);
            prop_assert!(m.sharpe == 0.0);
            if r >= 0.0 {
                prop_assert!(m.max_drawdown == 0.0);
            }
        }
    }
}
