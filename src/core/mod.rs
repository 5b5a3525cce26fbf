mod cashflow;
mod engine;
mod metrics;
mod portfolio;
mod solver;
#[cfg(test)]
mod testing;
mod types;

pub use cashflow::{
    CashflowProjection, ConditionalExpense, YearProjection, age_on, education_cost,
    first_year_fraction, monthly_mortgage_payment, project_cashflows,
};
pub use engine::{
    PercentileIndices, TrialPath, final_year_indices, run_trials, simulate, simulate_seeded,
    standard_normal, yearly_indices,
};
pub use metrics::{ReturnMetrics, max_drawdown, return_metrics, scenario_metrics};
pub use portfolio::{
    AssetClass, AssetModel, PortfolioStats, YearMarket, annual_market_series, blend_allocation,
    glide_path_stats, glide_progress, portfolio_stats,
};
pub use solver::{
    MAX_WITHDRAWAL_RATE, SEARCH_ITERATIONS, WithdrawalSearch, WithdrawalSearchIteration,
    max_withdrawal_rate, search_withdrawal_rate, survives_withdrawal_rate,
};
pub use types::{
    Allocation, Child, CramWindow, EducationPath, FlowDirection, HousingType, LifeEvent,
    NegativeReturnSkip, PercentileBasis, PlanConfig, ReturnModel, ScenarioBand, ScenarioMetrics,
    SchoolTrack, SimulationResult, SpendingPattern, Spouse, Summary, SurvivalRates,
    TerminalWealth, TrialYear, UniversityTrack, WithdrawalPolicy, YearRow,
};
