use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::core::{
    Allocation, AssetModel, Child, CramWindow, EducationPath, FlowDirection, HousingType,
    LifeEvent, NegativeReturnSkip, PercentileBasis, PlanConfig, PortfolioStats, ReturnModel,
    SimulationResult, SpendingPattern, Spouse, Summary, WithdrawalPolicy, YearRow,
    portfolio_stats, simulate_seeded,
};

const DEFAULT_SEED: u64 = 42;
const MAX_TRIALS: u32 = 100_000;
const MAX_AGE: u32 = 150;

#[derive(Parser, Debug)]
#[command(
    name = "lifeplan",
    about = "Monte Carlo household retirement planner (cash flows, glide path, withdrawal policies)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one simulation and print the JSON result.
    Simulate(SimulateArgs),
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Default)]
pub struct SimulateArgs {
    #[arg(long, help = "JSON plan; omitted keys fall back to the built-in plan")]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub trials: Option<u32>,
    #[arg(long, value_enum)]
    pub basis: Option<CliBasis>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliBasis {
    FinalYear,
    Yearly,
}

impl From<CliBasis> for PercentileBasis {
    fn from(value: CliBasis) -> Self {
        match value {
            CliBasis::FinalYear => PercentileBasis::FinalYear,
            CliBasis::Yearly => PercentileBasis::Yearly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiReturnMode {
    Fixed,
    #[serde(alias = "glidePath", alias = "glide_path", alias = "portfolio")]
    GlidePath,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalType {
    None,
    #[serde(alias = "fixedAmount", alias = "fixed_amount")]
    FixedAmount,
    #[serde(alias = "fixedRate", alias = "fixed_rate")]
    FixedRate,
    #[serde(
        alias = "fixedRateAtRetirement",
        alias = "fixed_rate_retirement_start"
    )]
    FixedRateAtRetirement,
    #[serde(alias = "shortage")]
    Shortfall,
    #[serde(alias = "keepCash", alias = "keep_cash")]
    KeepCash,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSkipRule {
    Never,
    #[serde(alias = "skip_negative")]
    Always,
    #[serde(alias = "firstYears", alias = "skip_negative_limited")]
    FirstYears,
}

/// Sparse request body: every key is optional and overlays the built-in plan.
/// Rates and ratios are percentages here and fractions in `PlanConfig`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    as_of: Option<NaiveDate>,
    current_age: Option<u32>,
    life_expectancy: Option<u32>,
    retirement_age: Option<u32>,
    retirement_lump_sum: Option<f64>,
    pension_start_age: Option<u32>,
    annual_income: Option<f64>,
    annual_pension: Option<f64>,

    has_spouse: Option<bool>,
    spouse_age: Option<u32>,
    spouse_retirement_age: Option<u32>,
    spouse_retirement_lump_sum: Option<f64>,
    spouse_pension_start_age: Option<u32>,
    spouse_income: Option<f64>,
    spouse_pension: Option<f64>,

    children: Option<Vec<Child>>,
    events: Option<Vec<LifeEvent>>,

    initial_cash: Option<f64>,
    initial_invest: Option<f64>,
    return_mode: Option<ApiReturnMode>,
    expected_return: Option<f64>,
    risk: Option<f64>,
    current_portfolio: Option<Allocation>,
    target_portfolio: Option<Allocation>,
    glide_path_years: Option<i32>,
    assets: Option<AssetModel>,

    income_growth: Option<f64>,
    inflation_rate: Option<f64>,
    macro_slide: Option<f64>,

    annual_investment: Option<f64>,
    invest_after_retirement: Option<bool>,
    target_cash_at_retirement: Option<f64>,
    max_cash_reserve: Option<f64>,
    withdrawal_type: Option<ApiWithdrawalType>,
    withdrawal_value: Option<f64>,
    withdrawal_skip: Option<ApiSkipRule>,
    skip_negative_years: Option<u32>,

    housing_type: Option<HousingType>,
    mortgage_balance: Option<f64>,
    mortgage_years: Option<u32>,
    mortgage_rate: Option<f64>,
    housing_expense: Option<f64>,

    monthly_expense: Option<f64>,
    post_retirement_expense_ratio: Option<f64>,
    spending_pattern: Option<SpendingPattern>,
    expense_decay_rate: Option<f64>,
    late_phase_ratio: Option<f64>,
    final_phase_ratio: Option<f64>,

    trials: Option<u32>,
    seed: Option<u64>,
    basis: Option<PercentileBasis>,
}

/// Fully resolved request in surface units, before conversion to `PlanConfig`.
#[derive(Clone, Debug)]
struct PlanRequest {
    as_of: NaiveDate,
    current_age: u32,
    life_expectancy: u32,
    retirement_age: u32,
    retirement_lump_sum: f64,
    pension_start_age: u32,
    annual_income: f64,
    annual_pension: f64,

    has_spouse: bool,
    spouse_age: u32,
    spouse_retirement_age: u32,
    spouse_retirement_lump_sum: f64,
    spouse_pension_start_age: u32,
    spouse_income: f64,
    spouse_pension: f64,

    children: Vec<Child>,
    events: Vec<LifeEvent>,

    initial_cash: f64,
    initial_invest: f64,
    return_mode: ApiReturnMode,
    expected_return_pct: f64,
    risk_pct: f64,
    current_portfolio: Allocation,
    target_portfolio: Allocation,
    glide_path_years: i32,
    assets: AssetModel,

    income_growth_pct: f64,
    inflation_pct: f64,
    macro_slide_pct: f64,

    annual_investment: f64,
    invest_after_retirement: bool,
    target_cash_at_retirement: f64,
    max_cash_reserve: f64,
    withdrawal_type: ApiWithdrawalType,
    withdrawal_value: f64,
    withdrawal_skip: ApiSkipRule,
    skip_negative_years: u32,

    housing_type: HousingType,
    mortgage_balance: f64,
    mortgage_years: u32,
    mortgage_rate_pct: f64,
    housing_expense: f64,

    monthly_expense: f64,
    post_retirement_expense_ratio_pct: f64,
    spending_pattern: SpendingPattern,
    expense_decay_rate_pct: f64,
    late_phase_ratio_pct: f64,
    final_phase_ratio_pct: f64,

    trials: u32,
    seed: u64,
    basis: Option<PercentileBasis>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
    #[error("trials must be > 0")]
    NoTrials,
    #[error("trials must be at most {max}, got {trials}")]
    TooManyTrials { trials: u32, max: u32 },
    #[error("{field} must be at most {max}, got {value}")]
    AgeOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
    #[error("{field} must be greater than -100%")]
    RateTooLow { field: &'static str },
    #[error("correlation between {a} and {b} must be within [-1, 1], got {value}")]
    Correlation { a: String, b: String, value: f64 },
    #[error("child {index}: cram window starts at {start} but ends at {end}")]
    CramWindow { index: usize, start: u32, end: u32 },
    #[error("event '{name}': end age {end} is before start age {start}")]
    EventRange { name: String, start: u32, end: u32 },
    #[error("{portfolio} weight for {asset} must be between 0 and 100, got {weight}")]
    Weight {
        portfolio: &'static str,
        asset: String,
        weight: f64,
    },
}

/// Asset table with the expected return and risk of the default portfolios.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetsResponse {
    #[serde(flatten)]
    model: AssetModel,
    current_portfolio: PortfolioStats,
    target_portfolio: PortfolioStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioPoint {
    age: u32,
    pessimistic: f64,
    central: f64,
    optimistic: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    basis: Option<PercentileBasis>,
    rows: Vec<YearRow>,
    summary: Option<Summary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    scenario: Vec<ScenarioPoint>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn default_request(today: NaiveDate) -> PlanRequest {
    PlanRequest {
        as_of: today,
        current_age: 44,
        life_expectancy: 95,
        retirement_age: 48,
        retirement_lump_sum: 500.0,
        pension_start_age: 60,
        annual_income: 1000.0,
        annual_pension: 150.0,

        has_spouse: true,
        spouse_age: 44,
        spouse_retirement_age: 60,
        spouse_retirement_lump_sum: 2000.0,
        spouse_pension_start_age: 60,
        spouse_income: 580.0,
        spouse_pension: 150.0,

        children: vec![
            default_child(2012, 7, 14, CramWindow { start: 13, end: 18 }),
            default_child(2014, 10, 12, CramWindow { start: 11, end: 18 }),
        ],
        events: default_events(),

        initial_cash: 600.0,
        initial_invest: 12_600.0,
        return_mode: ApiReturnMode::GlidePath,
        expected_return_pct: 10.0,
        risk_pct: 15.0,
        current_portfolio: weights(&[
            ("us_stock", 72.0),
            ("ex_us_stock", 10.0),
            ("emerging_stock", 5.0),
            ("us_agg_bond", 5.0),
            ("gold", 8.0),
        ]),
        target_portfolio: weights(&[
            ("us_stock", 50.0),
            ("ex_us_stock", 10.0),
            ("us_agg_bond", 20.0),
            ("gold", 20.0),
        ]),
        glide_path_years: 1,
        assets: AssetModel::default(),

        income_growth_pct: 2.0,
        inflation_pct: 2.0,
        macro_slide_pct: 0.9,

        annual_investment: 300.0,
        invest_after_retirement: false,
        target_cash_at_retirement: 3000.0,
        max_cash_reserve: 5000.0,
        withdrawal_type: ApiWithdrawalType::FixedRate,
        withdrawal_value: 4.0,
        withdrawal_skip: ApiSkipRule::Always,
        skip_negative_years: 5,

        housing_type: HousingType::Owned,
        mortgage_balance: 2300.0,
        mortgage_years: 20,
        mortgage_rate_pct: 0.78,
        housing_expense: 0.0,

        monthly_expense: 65.0,
        post_retirement_expense_ratio_pct: 100.0,
        spending_pattern: SpendingPattern::UShape,
        expense_decay_rate_pct: 0.5,
        late_phase_ratio_pct: 85.0,
        final_phase_ratio_pct: 95.0,

        trials: 500,
        seed: DEFAULT_SEED,
        basis: None,
    }
}

fn default_child(year: i32, month: u32, day: u32, cram: CramWindow) -> Child {
    Child {
        birth_date: NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default(),
        education: EducationPath::default(),
        cram,
    }
}

fn default_events() -> Vec<LifeEvent> {
    let event = |name: &str, amount, direction, recurring, start_age, end_age| LifeEvent {
        name: name.to_string(),
        amount,
        direction,
        recurring,
        start_age,
        end_age,
        inflation_indexed: true,
        asset_threshold: 0.0,
    };
    vec![
        event("car replacement", 800.0, FlowDirection::Expense, false, 49, 49),
        event("car replacement", 250.0, FlowDirection::Expense, false, 50, 50),
        event("car replacement", 1000.0, FlowDirection::Expense, false, 59, 59),
        event("car replacement", 300.0, FlowDirection::Expense, false, 60, 60),
        LifeEvent {
            inflation_indexed: false,
            ..event("staged gift received", 210.0, FlowDirection::Income, true, 45, 60)
        },
        LifeEvent {
            inflation_indexed: false,
            asset_threshold: 10_000.0,
            ..event("gift to children", 220.0, FlowDirection::Expense, true, 60, 95)
        },
    ]
}

fn weights(entries: &[(&str, f64)]) -> Allocation {
    entries
        .iter()
        .map(|(id, weight)| (id.to_string(), *weight))
        .collect()
}

fn request_from_payload(payload: SimulatePayload, today: NaiveDate) -> PlanRequest {
    let mut request = default_request(today);

    macro_rules! overlay {
        ($($field:ident => $target:ident),* $(,)?) => {
            $(
                if let Some(v) = payload.$field {
                    request.$target = v;
                }
            )*
        };
    }

    overlay!(
        as_of => as_of,
        current_age => current_age,
        life_expectancy => life_expectancy,
        retirement_age => retirement_age,
        retirement_lump_sum => retirement_lump_sum,
        pension_start_age => pension_start_age,
        annual_income => annual_income,
        annual_pension => annual_pension,
        has_spouse => has_spouse,
        spouse_age => spouse_age,
        spouse_retirement_age => spouse_retirement_age,
        spouse_retirement_lump_sum => spouse_retirement_lump_sum,
        spouse_pension_start_age => spouse_pension_start_age,
        spouse_income => spouse_income,
        spouse_pension => spouse_pension,
        children => children,
        events => events,
        initial_cash => initial_cash,
        initial_invest => initial_invest,
        return_mode => return_mode,
        expected_return => expected_return_pct,
        risk => risk_pct,
        current_portfolio => current_portfolio,
        target_portfolio => target_portfolio,
        glide_path_years => glide_path_years,
        assets => assets,
        income_growth => income_growth_pct,
        inflation_rate => inflation_pct,
        macro_slide => macro_slide_pct,
        annual_investment => annual_investment,
        invest_after_retirement => invest_after_retirement,
        target_cash_at_retirement => target_cash_at_retirement,
        max_cash_reserve => max_cash_reserve,
        withdrawal_type => withdrawal_type,
        withdrawal_value => withdrawal_value,
        withdrawal_skip => withdrawal_skip,
        skip_negative_years => skip_negative_years,
        housing_type => housing_type,
        mortgage_balance => mortgage_balance,
        mortgage_years => mortgage_years,
        mortgage_rate => mortgage_rate_pct,
        housing_expense => housing_expense,
        monthly_expense => monthly_expense,
        post_retirement_expense_ratio => post_retirement_expense_ratio_pct,
        spending_pattern => spending_pattern,
        expense_decay_rate => expense_decay_rate_pct,
        late_phase_ratio => late_phase_ratio_pct,
        final_phase_ratio => final_phase_ratio_pct,
        trials => trials,
        seed => seed,
    );
    if payload.basis.is_some() {
        request.basis = payload.basis;
    }

    request
}

fn require_finite(values: &[(&'static str, f64)]) -> Result<(), ConfigError> {
    match values.iter().find(|(_, v)| !v.is_finite()) {
        Some((field, _)) => Err(ConfigError::NonFinite { field: *field }),
        None => Ok(()),
    }
}

fn require_rate_above_total_loss(values: &[(&'static str, f64)]) -> Result<(), ConfigError> {
    match values.iter().find(|(_, pct)| *pct <= -100.0) {
        Some((field, _)) => Err(ConfigError::RateTooLow { field: *field }),
        None => Ok(()),
    }
}

fn validate_weights(portfolio: &'static str, allocation: &Allocation) -> Result<(), ConfigError> {
    for (asset, weight) in allocation {
        if !(0.0..=100.0).contains(weight) {
            return Err(ConfigError::Weight {
                portfolio,
                asset: asset.clone(),
                weight: *weight,
            });
        }
    }
    Ok(())
}

fn require_age_in_range(fields: &[(&'static str, u32)]) -> Result<(), ConfigError> {
    match fields.iter().find(|(_, value)| *value > MAX_AGE) {
        Some((field, value)) => Err(ConfigError::AgeOutOfRange {
            field: *field,
            value: *value,
            max: MAX_AGE,
        }),
        None => Ok(()),
    }
}

fn validate_assets(assets: &AssetModel) -> Result<(), ConfigError> {
    for (a, row) in &assets.correlations {
        for (b, value) in row {
            if !(-1.0..=1.0).contains(value) {
                return Err(ConfigError::Correlation {
                    a: a.clone(),
                    b: b.clone(),
                    value: *value,
                });
            }
        }
    }
    Ok(())
}

/// Validates a resolved request and converts it to core units.
/// An empty horizon is not an error; it simulates to an empty result.
fn build_plan(request: &PlanRequest) -> Result<PlanConfig, ConfigError> {
    require_finite(&[
        ("retirementLumpSum", request.retirement_lump_sum),
        ("annualIncome", request.annual_income),
        ("annualPension", request.annual_pension),
        ("spouseRetirementLumpSum", request.spouse_retirement_lump_sum),
        ("spouseIncome", request.spouse_income),
        ("spousePension", request.spouse_pension),
        ("initialCash", request.initial_cash),
        ("initialInvest", request.initial_invest),
        ("expectedReturn", request.expected_return_pct),
        ("risk", request.risk_pct),
        ("incomeGrowth", request.income_growth_pct),
        ("inflationRate", request.inflation_pct),
        ("macroSlide", request.macro_slide_pct),
        ("annualInvestment", request.annual_investment),
        ("targetCashAtRetirement", request.target_cash_at_retirement),
        ("maxCashReserve", request.max_cash_reserve),
        ("withdrawalValue", request.withdrawal_value),
        ("mortgageBalance", request.mortgage_balance),
        ("mortgageRate", request.mortgage_rate_pct),
        ("housingExpense", request.housing_expense),
        ("monthlyExpense", request.monthly_expense),
        (
            "postRetirementExpenseRatio",
            request.post_retirement_expense_ratio_pct,
        ),
        ("expenseDecayRate", request.expense_decay_rate_pct),
        ("latePhaseRatio", request.late_phase_ratio_pct),
        ("finalPhaseRatio", request.final_phase_ratio_pct),
    ])?;
    for event in &request.events {
        require_finite(&[
            ("events.amount", event.amount),
            ("events.assetThreshold", event.asset_threshold),
        ])?;
    }

    if request.trials == 0 {
        return Err(ConfigError::NoTrials);
    }
    if request.trials > MAX_TRIALS {
        return Err(ConfigError::TooManyTrials {
            trials: request.trials,
            max: MAX_TRIALS,
        });
    }
    require_age_in_range(&[
        ("currentAge", request.current_age),
        ("lifeExpectancy", request.life_expectancy),
        ("spouseAge", request.spouse_age),
    ])?;

    require_rate_above_total_loss(&[
        ("expectedReturn", request.expected_return_pct),
        ("incomeGrowth", request.income_growth_pct),
        ("inflationRate", request.inflation_pct),
        ("mortgageRate", request.mortgage_rate_pct),
    ])?;

    validate_assets(&request.assets)?;
    validate_weights("currentPortfolio", &request.current_portfolio)?;
    validate_weights("targetPortfolio", &request.target_portfolio)?;

    for (index, child) in request.children.iter().enumerate() {
        if child.cram.start > child.cram.end {
            return Err(ConfigError::CramWindow {
                index,
                start: child.cram.start,
                end: child.cram.end,
            });
        }
    }
    for event in &request.events {
        if event.recurring && event.end_age < event.start_age {
            return Err(ConfigError::EventRange {
                name: event.name.clone(),
                start: event.start_age,
                end: event.end_age,
            });
        }
    }

    let return_model = match request.return_mode {
        ApiReturnMode::Fixed => ReturnModel::Fixed {
            expected_return: request.expected_return_pct / 100.0,
            risk: request.risk_pct / 100.0,
        },
        ApiReturnMode::GlidePath => ReturnModel::GlidePath {
            current: request.current_portfolio.clone(),
            target: request.target_portfolio.clone(),
            years: request.glide_path_years,
        },
    };

    let withdrawal_rate = request.withdrawal_value / 100.0;
    let withdrawal = match request.withdrawal_type {
        ApiWithdrawalType::None => WithdrawalPolicy::None,
        ApiWithdrawalType::FixedAmount => WithdrawalPolicy::FixedAmount {
            amount: request.withdrawal_value,
        },
        ApiWithdrawalType::FixedRate => WithdrawalPolicy::FixedRate {
            rate: withdrawal_rate,
        },
        ApiWithdrawalType::FixedRateAtRetirement => WithdrawalPolicy::FixedRateAtRetirement {
            rate: withdrawal_rate,
        },
        ApiWithdrawalType::Shortfall => WithdrawalPolicy::Shortfall,
        ApiWithdrawalType::KeepCash => WithdrawalPolicy::KeepCash,
    };

    let negative_return_skip = match request.withdrawal_skip {
        ApiSkipRule::Never => NegativeReturnSkip::Never,
        ApiSkipRule::Always => NegativeReturnSkip::Always,
        ApiSkipRule::FirstYears => NegativeReturnSkip::FirstYears {
            years: request.skip_negative_years,
        },
    };

    let spouse = request.has_spouse.then(|| Spouse {
        current_age: request.spouse_age,
        retirement_age: request.spouse_retirement_age,
        retirement_lump_sum: request.spouse_retirement_lump_sum,
        pension_start_age: request.spouse_pension_start_age,
        annual_income: request.spouse_income,
        annual_pension: request.spouse_pension,
    });

    Ok(PlanConfig {
        as_of: request.as_of,
        current_age: request.current_age,
        life_expectancy: request.life_expectancy,
        retirement_age: request.retirement_age,
        retirement_lump_sum: request.retirement_lump_sum,
        pension_start_age: request.pension_start_age,
        annual_income: request.annual_income,
        annual_pension: request.annual_pension,
        spouse,
        children: request.children.clone(),
        events: request.events.clone(),
        initial_cash: request.initial_cash,
        initial_invest: request.initial_invest,
        return_model,
        assets: request.assets.clone(),
        income_growth_rate: request.income_growth_pct / 100.0,
        inflation_rate: request.inflation_pct / 100.0,
        macro_slide: request.macro_slide_pct / 100.0,
        annual_investment: request.annual_investment,
        invest_after_retirement: request.invest_after_retirement,
        target_cash_at_retirement: request.target_cash_at_retirement,
        max_cash_reserve: request.max_cash_reserve,
        withdrawal,
        negative_return_skip,
        housing_type: request.housing_type,
        mortgage_balance: request.mortgage_balance,
        mortgage_years: request.mortgage_years,
        mortgage_rate: request.mortgage_rate_pct / 100.0,
        monthly_housing_expense: request.housing_expense,
        monthly_expense: request.monthly_expense,
        post_retirement_expense_ratio: request.post_retirement_expense_ratio_pct / 100.0,
        spending_pattern: request.spending_pattern,
        expense_decay_rate: request.expense_decay_rate_pct / 100.0,
        late_phase_ratio: request.late_phase_ratio_pct / 100.0,
        final_phase_ratio: request.final_phase_ratio_pct / 100.0,
        trials: request.trials,
    })
}

fn scenario_points(result: &SimulationResult, basis: PercentileBasis) -> Vec<ScenarioPoint> {
    result
        .rows
        .iter()
        .map(|row| {
            let band = row.band(basis);
            ScenarioPoint {
                age: row.age,
                pessimistic: band.pessimistic.total,
                central: band.central.total,
                optimistic: band.optimistic.total,
            }
        })
        .collect()
}

fn run_request(request: &PlanRequest) -> Result<SimulateResponse, ConfigError> {
    let plan = build_plan(request)?;
    let result = simulate_seeded(&plan, request.seed);
    let scenario = request
        .basis
        .map(|basis| scenario_points(&result, basis))
        .unwrap_or_default();
    Ok(SimulateResponse {
        seed: request.seed,
        basis: request.basis,
        rows: result.rows,
        summary: result.summary,
        scenario,
    })
}

/// Runs the `simulate` subcommand and returns the pretty-printed JSON result.
pub fn run_simulate_command(args: &SimulateArgs) -> anyhow::Result<String> {
    let payload = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<SimulatePayload>(&raw).map_err(ConfigError::from)?
        }
        None => SimulatePayload::default(),
    };

    let mut request = request_from_payload(payload, Local::now().date_naive());
    if let Some(seed) = args.seed {
        request.seed = seed;
    }
    if let Some(trials) = args.trials {
        request.trials = trials;
    }
    if let Some(basis) = args.basis {
        request.basis = Some(basis.into());
    }

    let response = run_request(&request)?;
    Ok(serde_json::to_string_pretty(&response)?)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/assets", get(assets_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("lifeplan HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn assets_handler() -> Response {
    let request = default_request(Local::now().date_naive());
    json_response(StatusCode::OK, assets_response(&request))
}

fn assets_response(request: &PlanRequest) -> AssetsResponse {
    AssetsResponse {
        model: request.assets.clone(),
        current_portfolio: portfolio_stats(&request.current_portfolio, &request.assets),
        target_portfolio: portfolio_stats(&request.target_portfolio, &request.assets),
    }
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = request_from_payload(payload, Local::now().date_naive());
    match run_request(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            warn!("rejected simulate request: {err}");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn request_from_json(json: &str, today: NaiveDate) -> Result<PlanRequest, ConfigError> {
    let payload = serde_json::from_str::<SimulatePayload>(json)?;
    Ok(request_from_payload(payload, today))
}
