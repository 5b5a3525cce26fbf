use log::debug;

use super::cashflow::CashflowProjection;
use super::types::PlanConfig;

pub const SEARCH_ITERATIONS: u32 = 15;
pub const MAX_WITHDRAWAL_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalSearchIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_rate: f64,
    pub survived: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalSearch {
    /// Highest rate known to survive, as a fraction.
    pub sustainable_rate: f64,
    pub iterations: Vec<WithdrawalSearchIteration>,
}

/// Largest constant post-retirement withdrawal rate, in percent, that keeps total
/// wealth non-negative along the given realized return path.
pub fn max_withdrawal_rate(
    config: &PlanConfig,
    projection: &CashflowProjection,
    returns: &[f64],
) -> f64 {
    search_withdrawal_rate(config, projection, returns).sustainable_rate * 100.0
}

/// Fixed-iteration bisection over [0, MAX_WITHDRAWAL_RATE].
pub fn search_withdrawal_rate(
    config: &PlanConfig,
    projection: &CashflowProjection,
    returns: &[f64],
) -> WithdrawalSearch {
    let mut lo = 0.0;
    let mut hi = MAX_WITHDRAWAL_RATE;
    let mut iterations = Vec::with_capacity(SEARCH_ITERATIONS as usize);

    for iteration in 1..=SEARCH_ITERATIONS {
        let mid = (lo + hi) * 0.5;
        let survived = survives_withdrawal_rate(config, projection, returns, mid);
        iterations.push(WithdrawalSearchIteration {
            iteration,
            lower_bound: lo,
            upper_bound: hi,
            candidate_rate: mid,
            survived,
        });
        if survived {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    debug!(
        "withdrawal search converged to {:.3}% after {SEARCH_ITERATIONS} iterations",
        lo * 100.0
    );
    WithdrawalSearch {
        sustainable_rate: lo,
        iterations,
    }
}

pub fn survives_withdrawal_rate(
    config: &PlanConfig,
    projection: &CashflowProjection,
    returns: &[f64],
    rate: f64,
) -> bool {
    replay_final_total(config, projection, returns, rate).is_some()
}

/// Replays the path with a mechanical withdrawal of `rate * total` after retirement.
/// Returns `None` as soon as total wealth turns negative.
fn replay_final_total(
    config: &PlanConfig,
    projection: &CashflowProjection,
    returns: &[f64],
    rate: f64,
) -> Option<f64> {
    let mut cash = config.initial_cash;
    let mut invest = config.initial_invest;

    for (i, (year, return_rate)) in projection.years.iter().zip(returns).enumerate() {
        invest *= 1.0 + return_rate;
        cash += year.net_balance;
        cash -= year.conditional_expense_for(cash + invest);

        if year.age < config.retirement_age || config.invest_after_retirement {
            let contribution = if i == 0 {
                config.annual_investment * projection.first_year_fraction
            } else {
                config.annual_investment
            };
            if cash >= contribution {
                cash -= contribution;
                invest += contribution;
            }
        }

        if config.max_cash_reserve > 0.0 && cash > config.max_cash_reserve {
            invest += cash - config.max_cash_reserve;
            cash = config.max_cash_reserve;
        }

        if year.age >= config.retirement_age {
            let amount = ((cash + invest) * rate).max(0.0);
            if invest >= amount {
                invest -= amount;
            } else {
                cash -= amount - invest;
                invest = 0.0;
            }
        }

        if cash + invest < 0.0 {
            return None;
        }
    }

    Some(cash + invest)
}
