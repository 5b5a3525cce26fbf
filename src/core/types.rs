use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::portfolio::AssetModel;

/// Weight percentage per asset id. Weights are not required to sum to 100.
pub type Allocation = BTreeMap<String, f64>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HousingType {
    Rent,
    Owned,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpendingPattern {
    Flat,
    Linear,
    UShape,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WithdrawalPolicy {
    None,
    FixedAmount { amount: f64 },
    /// Rate of the current invested balance, optionally capped by the max cash reserve.
    FixedRate { rate: f64 },
    /// Rate of the invested balance frozen at retirement, re-indexed by inflation.
    FixedRateAtRetirement { rate: f64 },
    Shortfall,
    KeepCash,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NegativeReturnSkip {
    Never,
    Always,
    FirstYears { years: u32 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchoolTrack {
    Public,
    Private,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniversityTrack {
    National,
    PrivateHumanities,
    PrivateSciences,
    None,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationPath {
    pub nursery: SchoolTrack,
    pub elementary: SchoolTrack,
    pub middle: SchoolTrack,
    pub high: SchoolTrack,
    pub university: UniversityTrack,
}

impl Default for EducationPath {
    fn default() -> Self {
        Self {
            nursery: SchoolTrack::Public,
            elementary: SchoolTrack::Public,
            middle: SchoolTrack::Public,
            high: SchoolTrack::Public,
            university: UniversityTrack::PrivateHumanities,
        }
    }
}

/// Inclusive age window in which cram-school costs apply.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CramWindow {
    pub start: u32,
    pub end: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub education: EducationPath,
    pub cram: CramWindow,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Income,
    Expense,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeEvent {
    pub name: String,
    pub amount: f64,
    pub direction: FlowDirection,
    pub recurring: bool,
    pub start_age: u32,
    pub end_age: u32,
    pub inflation_indexed: bool,
    /// Total wealth required for an expense to execute; 0 means unconditional.
    #[serde(default)]
    pub asset_threshold: f64,
}

impl LifeEvent {
    pub fn is_conditional(&self) -> bool {
        self.direction == FlowDirection::Expense && self.asset_threshold > 0.0
    }

    pub fn is_active_at(&self, age: u32) -> bool {
        if self.recurring {
            self.start_age <= age && age <= self.end_age
        } else {
            self.start_age == age
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spouse {
    pub current_age: u32,
    pub retirement_age: u32,
    pub retirement_lump_sum: f64,
    pub pension_start_age: u32,
    pub annual_income: f64,
    pub annual_pension: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReturnModel {
    /// Annual mean and standard deviation as fractions.
    Fixed { expected_return: f64, risk: f64 },
    /// Linear glide from `current` to `target` over `years`; `years <= 0` never moves.
    GlidePath {
        current: Allocation,
        target: Allocation,
        years: i32,
    },
}

/// A household plan. Rates are fractions (0.02 = 2%), money amounts share one currency unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    pub as_of: NaiveDate,
    pub current_age: u32,
    pub life_expectancy: u32,
    pub retirement_age: u32,
    pub retirement_lump_sum: f64,
    pub pension_start_age: u32,
    pub annual_income: f64,
    pub annual_pension: f64,
    pub spouse: Option<Spouse>,
    #[serde(default)]
    pub children: Vec<Child>,
    #[serde(default)]
    pub events: Vec<LifeEvent>,

    pub initial_cash: f64,
    pub initial_invest: f64,
    pub return_model: ReturnModel,
    #[serde(default)]
    pub assets: AssetModel,

    pub income_growth_rate: f64,
    pub inflation_rate: f64,
    pub macro_slide: f64,

    pub annual_investment: f64,
    pub invest_after_retirement: bool,
    pub target_cash_at_retirement: f64,
    /// Cash ceiling for fixed-rate withdrawals and solver reinvestment; 0 disables it.
    pub max_cash_reserve: f64,
    pub withdrawal: WithdrawalPolicy,
    pub negative_return_skip: NegativeReturnSkip,

    pub housing_type: HousingType,
    pub mortgage_balance: f64,
    pub mortgage_years: u32,
    pub mortgage_rate: f64,
    pub monthly_housing_expense: f64,

    pub monthly_expense: f64,
    pub post_retirement_expense_ratio: f64,
    pub spending_pattern: SpendingPattern,
    pub expense_decay_rate: f64,
    /// Spending ratio for ages [75, 85) under the U-shape pattern.
    pub late_phase_ratio: f64,
    /// Spending ratio for ages 85 and above under the U-shape pattern.
    pub final_phase_ratio: f64,

    pub trials: u32,
}

impl PlanConfig {
    /// Number of simulated years including the current one; 0 when the horizon is empty.
    pub fn duration(&self) -> usize {
        if self.life_expectancy < self.current_age {
            0
        } else {
            (u64::from(self.life_expectancy) - u64::from(self.current_age) + 1) as usize
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PercentileBasis {
    FinalYear,
    Yearly,
}

/// One trial's state at the end of one simulated year.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialYear {
    pub total: f64,
    pub cash: f64,
    pub invest: f64,
    pub return_rate: f64,
    pub withdrawal: f64,
    pub executed_conditional_expense: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioBand {
    pub pessimistic: TrialYear,
    pub central: TrialYear,
    pub optimistic: TrialYear,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRow {
    pub age: u32,
    pub retirement: bool,
    pub income: f64,
    /// Deterministic expense plus the central final-year trial's executed conditional expense.
    pub expense: f64,
    pub annual_balance: f64,
    pub base_living_cost: f64,
    pub housing_cost: f64,
    pub education_cost: f64,
    pub event_expense: f64,
    pub final_year: ScenarioBand,
    pub yearly: ScenarioBand,
}

impl YearRow {
    pub fn band(&self, basis: PercentileBasis) -> &ScenarioBand {
        match basis {
            PercentileBasis::FinalYear => &self.final_year,
            PercentileBasis::Yearly => &self.yearly,
        }
    }
}

/// Return metrics in percent, except the unscaled Sharpe ratio.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioMetrics {
    pub twr: f64,
    pub amr: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub final_balance: f64,
    pub max_withdrawal_rate: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct SurvivalRates {
    pub age85: Option<f64>,
    pub age90: Option<f64>,
    pub age95: Option<f64>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct TerminalWealth {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub success_rate: f64,
    pub survival_rates: SurvivalRates,
    pub terminal_wealth: TerminalWealth,
    pub min_pessimistic_total: f64,
    pub final_central_total: f64,
    pub depletion_age: Option<u32>,
    pub asset_at_retirement: f64,
    pub pessimistic: ScenarioMetrics,
    pub central: ScenarioMetrics,
    pub optimistic: ScenarioMetrics,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub rows: Vec<YearRow>,
    pub summary: Option<Summary>,
}

impl SimulationResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
