use chrono::NaiveDate;

use super::portfolio::AssetModel;
use super::types::{
    Allocation, HousingType, NegativeReturnSkip, PlanConfig, ReturnModel, SpendingPattern,
    WithdrawalPolicy,
};

/// One-year-step plan with every flow zeroed, starting on Jan 1 so nothing is prorated.
pub(crate) fn deterministic_config() -> PlanConfig {
    PlanConfig {
        as_of: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
        current_age: 45,
        life_expectancy: 46,
        retirement_age: 65,
        retirement_lump_sum: 0.0,
        pension_start_age: 65,
        annual_income: 0.0,
        annual_pension: 0.0,
        spouse: None,
        children: Vec::new(),
        events: Vec::new(),
        initial_cash: 1000.0,
        initial_invest: 0.0,
        return_model: ReturnModel::Fixed {
            expected_return: 0.0,
            risk: 0.0,
        },
        assets: AssetModel::default(),
        income_growth_rate: 0.0,
        inflation_rate: 0.0,
        macro_slide: 0.0,
        annual_investment: 0.0,
        invest_after_retirement: false,
        target_cash_at_retirement: 0.0,
        max_cash_reserve: 0.0,
        withdrawal: WithdrawalPolicy::None,
        negative_return_skip: NegativeReturnSkip::Never,
        housing_type: HousingType::Rent,
        mortgage_balance: 0.0,
        mortgage_years: 0,
        mortgage_rate: 0.0,
        monthly_housing_expense: 0.0,
        monthly_expense: 0.0,
        post_retirement_expense_ratio: 1.0,
        spending_pattern: SpendingPattern::Flat,
        expense_decay_rate: 0.0,
        late_phase_ratio: 1.0,
        final_phase_ratio: 1.0,
        trials: 20,
    }
}

/// A realistic household with a glide path, mortgage, events and a retirement phase.
pub(crate) fn sample_config() -> PlanConfig {
    let mut config = deterministic_config();
    config.as_of = NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date");
    config.current_age = 44;
    config.life_expectancy = 95;
    config.retirement_age = 55;
    config.retirement_lump_sum = 500.0;
    config.pension_start_age = 65;
    config.annual_income = 1000.0;
    config.annual_pension = 150.0;
    config.initial_cash = 600.0;
    config.initial_invest = 12_600.0;
    config.return_model = ReturnModel::GlidePath {
        current: allocation(&[
            ("us_stock", 72.0),
            ("ex_us_stock", 10.0),
            ("emerging_stock", 5.0),
            ("us_agg_bond", 5.0),
            ("gold", 8.0),
        ]),
        target: allocation(&[
            ("us_stock", 50.0),
            ("ex_us_stock", 10.0),
            ("us_agg_bond", 20.0),
            ("gold", 20.0),
        ]),
        years: 10,
    };
    config.income_growth_rate = 0.02;
    config.inflation_rate = 0.02;
    config.macro_slide = 0.009;
    config.annual_investment = 300.0;
    config.target_cash_at_retirement = 3000.0;
    config.max_cash_reserve = 5000.0;
    config.withdrawal = WithdrawalPolicy::FixedRate { rate: 0.04 };
    config.negative_return_skip = NegativeReturnSkip::Always;
    config.housing_type = HousingType::Owned;
    config.mortgage_balance = 2300.0;
    config.mortgage_years = 20;
    config.mortgage_rate = 0.0078;
    config.monthly_expense = 40.0;
    config.spending_pattern = SpendingPattern::UShape;
    config.late_phase_ratio = 0.85;
    config.final_phase_ratio = 0.95;
    config.trials = 200;
    config
}

pub(crate) fn allocation(entries: &[(&str, f64)]) -> Allocation {
    entries
        .iter()
        .map(|(id, weight)| (id.to_string(), *weight))
        .collect()
}
