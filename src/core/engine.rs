use std::f64::consts::PI;

use log::{debug, info};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rayon::prelude::*;

use super::cashflow::{CashflowProjection, YearProjection, project_cashflows};
use super::metrics::scenario_metrics;
use super::portfolio::{YearMarket, annual_market_series};
use super::solver::max_withdrawal_rate;
use super::types::{
    NegativeReturnSkip, PlanConfig, ScenarioBand, SimulationResult, Summary, SurvivalRates,
    TerminalWealth, TrialYear, WithdrawalPolicy, YearRow,
};

const PESSIMISTIC_QUANTILE: f64 = 0.10;
const CENTRAL_QUANTILE: f64 = 0.50;
const OPTIMISTIC_QUANTILE: f64 = 0.90;
const SURVIVAL_AGES: [u32; 3] = [85, 90, 95];

/// One trial's year-by-year record.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialPath {
    pub years: Vec<TrialYear>,
    /// False once any year-end total went negative.
    pub survived: bool,
}

impl TrialPath {
    pub fn returns(&self) -> Vec<f64> {
        self.years.iter().map(|y| y.return_rate).collect()
    }
}

/// Trial indices representing the low, middle and high outcomes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PercentileIndices {
    pub pessimistic: usize,
    pub central: usize,
    pub optimistic: usize,
}

#[derive(Copy, Clone, Debug)]
struct RetirementBase {
    amount: f64,
    inflation_factor: f64,
}

pub fn simulate_seeded(config: &PlanConfig, seed: u64) -> SimulationResult {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    simulate(config, &mut rng)
}

/// Runs every trial and assembles rows and summary.
/// The same config and random stream always reproduce the same result.
pub fn simulate<R: RngCore + ?Sized>(config: &PlanConfig, rng: &mut R) -> SimulationResult {
    let duration = config.duration();
    if duration == 0 || config.trials == 0 {
        debug!(
            "nothing to simulate: duration={duration} trials={}",
            config.trials
        );
        return SimulationResult::default();
    }

    let projection = project_cashflows(config);
    let market = annual_market_series(&config.return_model, &config.assets, duration);
    debug!(
        "simulating {} trials over {duration} years (ages {}..={})",
        config.trials, config.current_age, config.life_expectancy
    );

    let trials = run_trials(config, &projection, &market, rng);
    let result = assemble_result(config, &projection, &trials);
    if let Some(summary) = &result.summary {
        info!(
            "simulation finished: success rate {:.1}% over {} trials",
            summary.success_rate * 100.0,
            trials.len()
        );
    }
    result
}

/// Draws one seed per trial from `rng` in order, then runs the trials in parallel.
pub fn run_trials<R: RngCore + ?Sized>(
    config: &PlanConfig,
    projection: &CashflowProjection,
    market: &[YearMarket],
    rng: &mut R,
) -> Vec<TrialPath> {
    let seeds = (0..config.trials)
        .map(|_| rng.next_u64())
        .collect::<Vec<_>>();
    seeds
        .into_par_iter()
        .map(|seed| {
            let mut trial_rng = Pcg64Mcg::seed_from_u64(seed);
            simulate_trial(config, projection, market, &mut trial_rng)
        })
        .collect()
}

fn unit_uniform<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    const SCALE: f64 = 1.0 / (1_u64 << 53) as f64;
    (rng.next_u64() >> 11) as f64 * SCALE
}

/// Box-Muller transform over two uniforms in (0, 1).
pub fn standard_normal<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    let mut u = 0.0;
    while u == 0.0 {
        u = unit_uniform(rng);
    }
    let mut v = 0.0;
    while v == 0.0 {
        v = unit_uniform(rng);
    }
    (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos()
}

/// Year 0 is one draw over the prorated period; later years compound twelve monthly draws.
fn draw_growth_factor<R: RngCore + ?Sized>(
    market: YearMarket,
    year_index: usize,
    first_year_fraction: f64,
    rng: &mut R,
) -> f64 {
    if year_index == 0 {
        let mean = market.mean * first_year_fraction;
        let stdev = market.stdev * first_year_fraction.sqrt();
        return 1.0 + mean + standard_normal(rng) * stdev;
    }

    let monthly_mean = market.mean / 12.0;
    let monthly_stdev = market.stdev / 12_f64.sqrt();
    (0..12).fold(1.0, |growth, _| {
        growth * (1.0 + monthly_mean + standard_normal(rng) * monthly_stdev)
    })
}

fn skips_withdrawal(config: &PlanConfig, age: u32, return_rate: f64) -> bool {
    if return_rate >= 0.0 {
        return false;
    }
    match config.negative_return_skip {
        NegativeReturnSkip::Never => false,
        NegativeReturnSkip::Always => true,
        NegativeReturnSkip::FirstYears { years } => age - config.retirement_age < years,
    }
}

fn withdrawal_target(
    config: &PlanConfig,
    year: &YearProjection,
    executed_conditional: f64,
    cash: f64,
    invest: f64,
    retirement_base: Option<RetirementBase>,
) -> f64 {
    match config.withdrawal {
        WithdrawalPolicy::None => 0.0,
        WithdrawalPolicy::FixedAmount { amount } => amount,
        WithdrawalPolicy::FixedRate { rate } => {
            let target = invest * rate;
            if config.max_cash_reserve > 0.0 && cash + target > config.max_cash_reserve {
                (config.max_cash_reserve - cash).max(0.0)
            } else {
                target
            }
        }
        WithdrawalPolicy::FixedRateAtRetirement { .. } => retirement_base
            .map(|base| base.amount * year.inflation_factor / base.inflation_factor)
            .unwrap_or(0.0),
        WithdrawalPolicy::Shortfall => (executed_conditional - year.net_balance).max(0.0),
        WithdrawalPolicy::KeepCash => (config.target_cash_at_retirement - cash).max(0.0),
    }
}

fn simulate_trial<R: RngCore + ?Sized>(
    config: &PlanConfig,
    projection: &CashflowProjection,
    market: &[YearMarket],
    rng: &mut R,
) -> TrialPath {
    let mut cash = config.initial_cash;
    let mut invest = config.initial_invest;
    let mut survived = true;
    let mut retirement_base = None;
    let mut years = Vec::with_capacity(projection.years.len());

    for (i, (year, year_market)) in projection.years.iter().zip(market).enumerate() {
        let growth = draw_growth_factor(*year_market, i, projection.first_year_fraction, rng);
        let invest_before = invest;
        invest *= growth;
        let return_rate = if invest_before > 0.0 {
            (invest - invest_before) / invest_before
        } else {
            0.0
        };

        cash += year.net_balance;

        let executed_conditional_expense = year.conditional_expense_for(cash + invest);
        cash -= executed_conditional_expense;

        if year.age == config.retirement_age {
            if cash < config.target_cash_at_retirement {
                let moved = (config.target_cash_at_retirement - cash).min(invest.max(0.0));
                invest -= moved;
                cash += moved;
            }
            if let WithdrawalPolicy::FixedRateAtRetirement { rate } = config.withdrawal {
                retirement_base = Some(RetirementBase {
                    amount: invest * rate,
                    inflation_factor: year.inflation_factor,
                });
            }
        }

        if year.age < config.retirement_age || config.invest_after_retirement {
            let contribution = if i == 0 {
                config.annual_investment * projection.first_year_fraction
            } else {
                config.annual_investment
            };
            cash -= contribution;
            invest += contribution;
        }

        let mut withdrawal = 0.0;
        if year.age >= config.retirement_age && !skips_withdrawal(config, year.age, return_rate)
        {
            let target = withdrawal_target(
                config,
                year,
                executed_conditional_expense,
                cash,
                invest,
                retirement_base,
            );
            withdrawal = target.min(invest).max(0.0);
            invest -= withdrawal;
            cash += withdrawal;
        }

        if cash < 0.0 {
            let shortage = -cash;
            let available = invest.max(0.0);
            if available >= shortage {
                invest -= shortage;
                withdrawal += shortage;
                cash = 0.0;
            } else {
                invest -= available;
                withdrawal += available;
                cash += available;
            }
        }

        let total = cash + invest;
        if total < 0.0 {
            survived = false;
        }
        years.push(TrialYear {
            total,
            cash,
            invest,
            return_rate,
            withdrawal,
            executed_conditional_expense,
        });
    }

    TrialPath { years, survived }
}

fn rank_position(trial_count: usize, quantile: f64) -> usize {
    ((trial_count as f64 * quantile).floor() as usize).min(trial_count.saturating_sub(1))
}

/// Trial indices ordered by their total at `year_index`, lowest first. Ties keep trial order.
fn ranked_at(trials: &[TrialPath], year_index: usize) -> Vec<usize> {
    let mut order = (0..trials.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        trials[a].years[year_index]
            .total
            .total_cmp(&trials[b].years[year_index].total)
    });
    order
}

fn indices_from_ranking(order: &[usize]) -> PercentileIndices {
    let n = order.len();
    let pick = |q| order.get(rank_position(n, q)).copied().unwrap_or(0);
    PercentileIndices {
        pessimistic: pick(PESSIMISTIC_QUANTILE),
        central: pick(CENTRAL_QUANTILE),
        optimistic: pick(OPTIMISTIC_QUANTILE),
    }
}

/// Ranks once on terminal wealth; the chosen trials represent every year.
pub fn final_year_indices(trials: &[TrialPath]) -> PercentileIndices {
    let last = trials
        .first()
        .map(|t| t.years.len().saturating_sub(1))
        .unwrap_or(0);
    indices_from_ranking(&ranked_at(trials, last))
}

/// Re-ranks trials on the total at `year_index` alone.
pub fn yearly_indices(trials: &[TrialPath], year_index: usize) -> PercentileIndices {
    indices_from_ranking(&ranked_at(trials, year_index))
}

fn band_at(trials: &[TrialPath], picks: PercentileIndices, year_index: usize) -> ScenarioBand {
    ScenarioBand {
        pessimistic: trials[picks.pessimistic].years[year_index],
        central: trials[picks.central].years[year_index],
        optimistic: trials[picks.optimistic].years[year_index],
    }
}

fn survival_at(config: &PlanConfig, trials: &[TrialPath], age: u32) -> Option<f64> {
    if age < config.current_age || age > config.life_expectancy {
        return None;
    }
    let index = (age - config.current_age) as usize;
    let alive = trials
        .iter()
        .filter(|t| t.years.get(index).is_some_and(|y| y.total >= 0.0))
        .count();
    Some(alive as f64 / trials.len() as f64)
}

fn assemble_result(
    config: &PlanConfig,
    projection: &CashflowProjection,
    trials: &[TrialPath],
) -> SimulationResult {
    if trials.is_empty() || projection.years.is_empty() {
        return SimulationResult::default();
    }

    let final_picks = final_year_indices(trials);
    let rows = projection
        .years
        .iter()
        .enumerate()
        .map(|(i, year)| {
            let final_year = band_at(trials, final_picks, i);
            let yearly = band_at(trials, yearly_indices(trials, i), i);
            let executed = final_year.central.executed_conditional_expense;
            let expense = year.expense + executed;
            YearRow {
                age: year.age,
                retirement: year.age == config.retirement_age,
                income: year.income,
                expense,
                annual_balance: year.income - expense,
                base_living_cost: year.base_living_cost,
                housing_cost: year.housing_cost,
                education_cost: year.education_cost,
                event_expense: year.event_expense + executed,
                final_year,
                yearly,
            }
        })
        .collect::<Vec<_>>();

    let summary = build_summary(config, projection, trials, final_picks, &rows);
    SimulationResult {
        rows,
        summary: Some(summary),
    }
}

fn build_summary(
    config: &PlanConfig,
    projection: &CashflowProjection,
    trials: &[TrialPath],
    picks: PercentileIndices,
    rows: &[YearRow],
) -> Summary {
    let successes = trials.iter().filter(|t| t.survived).count();
    let terminal = |index: usize| trials[index].years.last().map_or(0.0, |y| y.total);
    let metrics_for = |index: usize| {
        let returns = trials[index].returns();
        let rate = max_withdrawal_rate(config, projection, &returns);
        scenario_metrics(&returns, terminal(index), rate)
    };

    let min_pessimistic_total = rows
        .iter()
        .map(|r| r.final_year.pessimistic.total)
        .fold(f64::INFINITY, f64::min);
    let depletion_age = rows
        .iter()
        .find(|r| r.final_year.pessimistic.total < 0.0)
        .map(|r| r.age);
    let asset_at_retirement = rows
        .iter()
        .find(|r| r.retirement)
        .map_or(0.0, |r| r.final_year.central.total);

    Summary {
        success_rate: successes as f64 / trials.len() as f64,
        survival_rates: SurvivalRates {
            age85: survival_at(config, trials, SURVIVAL_AGES[0]),
            age90: survival_at(config, trials, SURVIVAL_AGES[1]),
            age95: survival_at(config, trials, SURVIVAL_AGES[2]),
        },
        terminal_wealth: TerminalWealth {
            p10: terminal(picks.pessimistic),
            p50: terminal(picks.central),
            p90: terminal(picks.optimistic),
        },
        min_pessimistic_total,
        final_central_total: terminal(picks.central),
        depletion_age,
        asset_at_retirement,
        pessimistic: metrics_for(picks.pessimistic),
        central: metrics_for(picks.central),
        optimistic: metrics_for(picks.optimistic),
    }
}
