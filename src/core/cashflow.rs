use chrono::{Datelike, NaiveDate};

use super::types::{
    Child, CramWindow, EducationPath, FlowDirection, HousingType, PlanConfig, SchoolTrack,
    SpendingPattern, UniversityTrack,
};

/// Deterministic flows for one simulated year, shared read-only by every trial.
#[derive(Clone, Debug, PartialEq)]
pub struct YearProjection {
    pub age: u32,
    pub inflation_factor: f64,
    pub income: f64,
    /// Excludes conditional events.
    pub expense: f64,
    pub base_living_cost: f64,
    pub housing_cost: f64,
    pub education_cost: f64,
    pub event_income: f64,
    pub event_expense: f64,
    pub net_balance: f64,
    pub conditional_events: Vec<ConditionalExpense>,
}

/// An expense that only executes when live total wealth reaches `threshold`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalExpense {
    pub amount: f64,
    pub threshold: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CashflowProjection {
    pub first_year_fraction: f64,
    pub years: Vec<YearProjection>,
}

impl YearProjection {
    /// Total conditional expense executed against `wealth`, in listed order.
    /// Each executed event reduces the wealth seen by the next one.
    pub fn conditional_expense_for(&self, wealth: f64) -> f64 {
        let mut remaining = wealth;
        let mut executed = 0.0;
        for event in &self.conditional_events {
            if remaining >= event.threshold {
                executed += event.amount;
                remaining -= event.amount;
            }
        }
        executed
    }
}

/// Remaining share of the calendar year, counting `as_of` itself.
pub fn first_year_fraction(as_of: NaiveDate) -> f64 {
    let days_in_year = if NaiveDate::from_ymd_opt(as_of.year(), 2, 29).is_some() {
        366
    } else {
        365
    };
    let days_remaining = days_in_year - as_of.ordinal() + 1;
    (days_remaining as f64 / days_in_year as f64).clamp(0.0, 1.0)
}

pub fn age_on(birth_date: NaiveDate, on: NaiveDate) -> i32 {
    let mut age = on.year() - birth_date.year();
    if (on.month(), on.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

/// Fixed monthly payment for an amortizing loan; straight-line when the rate is not positive.
pub fn monthly_mortgage_payment(principal: f64, years: u32, annual_rate: f64) -> f64 {
    if principal <= 0.0 || years == 0 {
        return 0.0;
    }
    let n = (years * 12) as i32;
    if annual_rate <= 0.0 {
        return principal / n as f64;
    }
    let r = annual_rate / 12.0;
    let growth = (1.0 + r).powi(n);
    principal * r * growth / (growth - 1.0)
}

const NURSERY_COST: (f64, f64) = (25.0, 50.0);
const ELEMENTARY_COST: (f64, f64) = (35.0, 160.0);
const MIDDLE_COST: (f64, f64) = (54.0, 144.0);
const HIGH_COST: (f64, f64) = (51.0, 105.0);

fn school_cost(track: SchoolTrack, (public, private): (f64, f64)) -> f64 {
    match track {
        SchoolTrack::Public => public,
        SchoolTrack::Private => private,
    }
}

fn university_cost(track: UniversityTrack) -> f64 {
    match track {
        UniversityTrack::National => 82.0,
        UniversityTrack::PrivateHumanities => 120.0,
        UniversityTrack::PrivateSciences => 160.0,
        UniversityTrack::None => 0.0,
    }
}

fn cram_cost_for_age(age: i32) -> f64 {
    match age {
        6..=8 => 20.0,
        9..=11 => 40.0,
        12..=13 => 40.0,
        14 => 60.0,
        15..=16 => 50.0,
        17 => 70.0,
        _ => 0.0,
    }
}

/// Annual cost for a child of `age` in today's money.
pub fn education_cost(age: i32, path: &EducationPath, cram: CramWindow) -> f64 {
    let school = match age {
        3..=5 => school_cost(path.nursery, NURSERY_COST),
        6..=11 => school_cost(path.elementary, ELEMENTARY_COST),
        12..=14 => school_cost(path.middle, MIDDLE_COST),
        15..=17 => school_cost(path.high, HIGH_COST),
        18..=21 => university_cost(path.university),
        _ => 0.0,
    };
    let in_cram_window = age >= cram.start as i32 && age <= cram.end as i32;
    let cram_cost = if in_cram_window {
        cram_cost_for_age(age)
    } else {
        0.0
    };
    school + cram_cost
}

#[derive(Copy, Clone)]
struct Earner {
    age: u32,
    retirement_age: u32,
    pension_start_age: u32,
    annual_income: f64,
    annual_pension: f64,
}

fn earned_income(earner: Earner, years_elapsed: i32, config: &PlanConfig) -> f64 {
    if earner.age < earner.retirement_age {
        earner.annual_income * (1.0 + config.income_growth_rate).powi(years_elapsed)
    } else if earner.age >= earner.pension_start_age {
        let indexation = 1.0 + config.inflation_rate - config.macro_slide;
        earner.annual_pension * indexation.powi(years_elapsed)
    } else {
        0.0
    }
}

fn spending_decay(config: &PlanConfig, age: u32) -> f64 {
    match config.spending_pattern {
        SpendingPattern::Flat => 1.0,
        SpendingPattern::Linear => {
            (1.0 - config.expense_decay_rate).powi((age - config.retirement_age) as i32)
        }
        SpendingPattern::UShape => {
            if age >= 85 {
                config.final_phase_ratio
            } else if age >= 75 {
                config.late_phase_ratio
            } else {
                1.0
            }
        }
    }
}

fn base_living_cost(config: &PlanConfig, age: u32, inflation_factor: f64) -> f64 {
    let base = config.monthly_expense * 12.0 * inflation_factor;
    if age >= config.retirement_age {
        base * spending_decay(config, age) * config.post_retirement_expense_ratio
    } else {
        base
    }
}

fn housing_cost(
    config: &PlanConfig,
    year_index: usize,
    monthly_mortgage: f64,
    inflation_factor: f64,
) -> f64 {
    let upkeep = config.monthly_housing_expense * 12.0 * inflation_factor;
    match config.housing_type {
        HousingType::Rent => upkeep,
        HousingType::Owned => {
            let mortgage = if year_index < config.mortgage_years as usize {
                monthly_mortgage * 12.0
            } else {
                0.0
            };
            mortgage + upkeep
        }
    }
}

fn children_education_cost(
    children: &[Child],
    as_of: NaiveDate,
    years_elapsed: i32,
    inflation_factor: f64,
) -> f64 {
    children
        .iter()
        .map(|child| {
            let age = age_on(child.birth_date, as_of) + years_elapsed;
            education_cost(age, &child.education, child.cram) * inflation_factor
        })
        .sum()
}

/// Projects every year of the horizon. Empty when `life_expectancy < current_age`.
pub fn project_cashflows(config: &PlanConfig) -> CashflowProjection {
    let duration = config.duration();
    let fraction_first = first_year_fraction(config.as_of);
    let monthly_mortgage = match config.housing_type {
        HousingType::Owned => monthly_mortgage_payment(
            config.mortgage_balance,
            config.mortgage_years,
            config.mortgage_rate,
        ),
        HousingType::Rent => 0.0,
    };

    let mut years = Vec::with_capacity(duration);
    for i in 0..duration {
        let years_elapsed = i as i32;
        let age = config.current_age + i as u32;
        let inflation_factor = (1.0 + config.inflation_rate).powi(years_elapsed);
        let fraction = if i == 0 { fraction_first } else { 1.0 };

        let user = Earner {
            age,
            retirement_age: config.retirement_age,
            pension_start_age: config.pension_start_age,
            annual_income: config.annual_income,
            annual_pension: config.annual_pension,
        };
        let mut salary_and_pension = earned_income(user, years_elapsed, config);
        let mut lump_sums = if age == config.retirement_age {
            config.retirement_lump_sum
        } else {
            0.0
        };
        if let Some(spouse) = &config.spouse {
            let spouse_age = spouse.current_age + i as u32;
            let earner = Earner {
                age: spouse_age,
                retirement_age: spouse.retirement_age,
                pension_start_age: spouse.pension_start_age,
                annual_income: spouse.annual_income,
                annual_pension: spouse.annual_pension,
            };
            salary_and_pension += earned_income(earner, years_elapsed, config);
            if spouse_age == spouse.retirement_age {
                lump_sums += spouse.retirement_lump_sum;
            }
        }
        let salary_and_pension = salary_and_pension * fraction;

        let base_living = base_living_cost(config, age, inflation_factor) * fraction;
        let housing = housing_cost(config, i, monthly_mortgage, inflation_factor) * fraction;
        let education = children_education_cost(
            &config.children,
            config.as_of,
            years_elapsed,
            inflation_factor,
        ) * fraction;

        let mut event_income = 0.0;
        let mut event_expense = 0.0;
        let mut conditional_events = Vec::new();
        for event in config.events.iter().filter(|e| e.is_active_at(age)) {
            let mut amount = if event.inflation_indexed {
                event.amount * inflation_factor
            } else {
                event.amount
            };
            if event.recurring && i == 0 {
                amount *= fraction;
            }

            if event.is_conditional() {
                conditional_events.push(ConditionalExpense {
                    amount,
                    threshold: event.asset_threshold,
                });
                continue;
            }
            match event.direction {
                FlowDirection::Income => event_income += amount,
                FlowDirection::Expense => event_expense += amount,
            }
        }

        let income = salary_and_pension + lump_sums + event_income;
        let expense = base_living + housing + education + event_expense;
        years.push(YearProjection {
            age,
            inflation_factor,
            income,
            expense,
            base_living_cost: base_living,
            housing_cost: housing,
            education_cost: education,
            event_income,
            event_expense,
            net_balance: income - expense,
            conditional_events,
        });
    }

    CashflowProjection {
        first_year_fraction: fraction_first,
        years,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::deterministic_config;
    use crate::core::types::{LifeEvent, Spouse};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn event(
        direction: FlowDirection,
        amount: f64,
        recurring: bool,
        start: u32,
        end: u32,
    ) -> LifeEvent {
        LifeEvent {
            name: "event".to_string(),
            amount,
            direction,
            recurring,
            start_age: start,
            end_age: end,
            inflation_indexed: true,
            asset_threshold: 0.0,
        }
    }

    #[test]
    fn first_year_fraction_counts_today_and_is_leap_aware() {
        assert_approx(first_year_fraction(date(2023, 1, 1)), 1.0);
        assert_approx(first_year_fraction(date(2023, 12, 31)), 1.0 / 365.0);
        assert_approx(first_year_fraction(date(2024, 12, 31)), 1.0 / 366.0);
        assert_approx(first_year_fraction(date(2023, 7, 1)), 184.0 / 365.0);
        assert_approx(first_year_fraction(date(2024, 7, 1)), 184.0 / 366.0);
    }

    #[test]
    fn age_on_accounts_for_birthday_not_yet_reached() {
        assert_eq!(age_on(date(2012, 7, 14), date(2025, 7, 13)), 12);
        assert_eq!(age_on(date(2012, 7, 14), date(2025, 7, 14)), 13);
        assert_eq!(age_on(date(2030, 1, 1), date(2025, 1, 1)), -5);
    }

    #[test]
    fn mortgage_payment_matches_annuity_formula() {
        let payment = monthly_mortgage_payment(2300.0, 20, 0.0078);
        assert!((payment - 10.353368395124564).abs() <= 1e-9, "got {payment}");
    }

    #[test]
    fn mortgage_payment_edge_cases() {
        assert_approx(monthly_mortgage_payment(2400.0, 20, 0.0), 10.0);
        assert_approx(monthly_mortgage_payment(0.0, 20, 0.01), 0.0);
        assert_approx(monthly_mortgage_payment(2400.0, 0, 0.01), 0.0);
    }

    #[test]
    fn education_cost_uses_stage_tracks_and_cram_window() {
        let path = EducationPath {
            nursery: SchoolTrack::Private,
            elementary: SchoolTrack::Public,
            middle: SchoolTrack::Private,
            high: SchoolTrack::Public,
            university: UniversityTrack::PrivateSciences,
        };
        let cram = CramWindow { start: 12, end: 14 };
        assert_approx(education_cost(2, &path, cram), 0.0);
        assert_approx(education_cost(4, &path, cram), 50.0);
        assert_approx(education_cost(8, &path, cram), 35.0);
        assert_approx(education_cost(12, &path, cram), 144.0 + 40.0);
        assert_approx(education_cost(14, &path, cram), 144.0 + 60.0);
        assert_approx(education_cost(15, &path, cram), 51.0);
        assert_approx(education_cost(20, &path, cram), 160.0);
        assert_approx(education_cost(22, &path, cram), 0.0);
    }

    #[test]
    fn empty_horizon_projects_nothing() {
        let mut config = deterministic_config();
        config.life_expectancy = config.current_age - 1;
        assert!(project_cashflows(&config).years.is_empty());
    }

    #[test]
    fn salary_grows_until_retirement_then_pension_applies_macro_slide() {
        let mut config = deterministic_config();
        config.current_age = 58;
        config.life_expectancy = 63;
        config.retirement_age = 60;
        config.pension_start_age = 62;
        config.annual_income = 1000.0;
        config.annual_pension = 100.0;
        config.income_growth_rate = 0.02;
        config.inflation_rate = 0.03;
        config.macro_slide = 0.01;

        let years = project_cashflows(&config).years;
        assert_approx(years[0].income, 1000.0);
        assert_approx(years[1].income, 1000.0 * 1.02);
        assert_approx(years[2].income, 0.0);
        assert_approx(years[3].income, 0.0);
        assert_approx(years[4].income, 100.0 * 1.02_f64.powi(4));
        assert_approx(years[5].income, 100.0 * 1.02_f64.powi(5));
    }

    #[test]
    fn lump_sum_is_paid_once_and_never_prorated() {
        let mut config = deterministic_config();
        config.as_of = date(2023, 7, 1);
        config.current_age = 60;
        config.life_expectancy = 62;
        config.retirement_age = 60;
        config.pension_start_age = 90;
        config.retirement_lump_sum = 2000.0;

        let years = project_cashflows(&config).years;
        assert_approx(years[0].income, 2000.0);
        assert_approx(years[1].income, 0.0);
    }

    #[test]
    fn spouse_uses_own_age_for_income_and_lump_sum() {
        let mut config = deterministic_config();
        config.current_age = 50;
        config.life_expectancy = 53;
        config.retirement_age = 50;
        config.pension_start_age = 90;
        config.spouse = Some(Spouse {
            current_age: 58,
            retirement_age: 60,
            retirement_lump_sum: 500.0,
            pension_start_age: 61,
            annual_income: 300.0,
            annual_pension: 50.0,
        });

        let years = project_cashflows(&config).years;
        assert_approx(years[0].income, 300.0);
        assert_approx(years[1].income, 300.0);
        assert_approx(years[2].income, 500.0);
        assert_approx(years[3].income, 50.0);
    }

    #[test]
    fn continuous_flows_are_prorated_in_first_year_only() {
        let mut config = deterministic_config();
        config.as_of = date(2023, 7, 1);
        config.annual_income = 365.0;
        config.monthly_expense = 10.0;
        config.events = vec![
            event(FlowDirection::Income, 100.0, true, 45, 50),
            event(FlowDirection::Expense, 40.0, false, 45, 45),
        ];

        let projection = project_cashflows(&config);
        let fraction = 184.0 / 365.0;
        assert_approx(projection.first_year_fraction, fraction);
        let first = &projection.years[0];
        assert_approx(first.income, 365.0 * fraction + 100.0 * fraction);
        assert_approx(first.base_living_cost, 120.0 * fraction);
        assert_approx(first.event_expense, 40.0);
        assert_approx(first.net_balance, first.income - first.expense);

        let second = &projection.years[1];
        assert_approx(second.income, 365.0 + 100.0);
        assert_approx(second.base_living_cost, 120.0);
    }

    #[test]
    fn spending_patterns_scale_post_retirement_expense() {
        let mut config = deterministic_config();
        config.current_age = 74;
        config.life_expectancy = 86;
        config.retirement_age = 70;
        config.monthly_expense = 10.0;
        config.post_retirement_expense_ratio = 0.8;
        config.late_phase_ratio = 0.85;
        config.final_phase_ratio = 0.95;

        config.spending_pattern = SpendingPattern::UShape;
        let years = project_cashflows(&config).years;
        assert_approx(years[0].base_living_cost, 120.0 * 0.8);
        assert_approx(years[1].base_living_cost, 120.0 * 0.85 * 0.8);
        assert_approx(years[11].base_living_cost, 120.0 * 0.95 * 0.8);

        config.spending_pattern = SpendingPattern::Linear;
        config.expense_decay_rate = 0.01;
        let years = project_cashflows(&config).years;
        assert_approx(years[0].base_living_cost, 120.0 * 0.99_f64.powi(4) * 0.8);

        config.spending_pattern = SpendingPattern::Flat;
        let years = project_cashflows(&config).years;
        assert_approx(years[5].base_living_cost, 120.0 * 0.8);
    }

    #[test]
    fn owned_housing_adds_mortgage_for_remaining_term() {
        let mut config = deterministic_config();
        config.current_age = 40;
        config.life_expectancy = 43;
        config.housing_type = HousingType::Owned;
        config.mortgage_balance = 2400.0;
        config.mortgage_years = 2;
        config.mortgage_rate = 0.0;
        config.monthly_housing_expense = 1.0;
        config.inflation_rate = 0.1;

        let years = project_cashflows(&config).years;
        assert_approx(years[0].housing_cost, 1200.0 + 12.0);
        assert_approx(years[1].housing_cost, 1200.0 + 12.0 * 1.1);
        assert_approx(years[2].housing_cost, 12.0 * 1.21);

        config.housing_type = HousingType::Rent;
        let years = project_cashflows(&config).years;
        assert_approx(years[0].housing_cost, 12.0);
    }

    #[test]
    fn children_costs_are_summed_and_inflated() {
        let mut config = deterministic_config();
        config.as_of = date(2025, 1, 1);
        config.inflation_rate = 0.1;
        config.children = vec![
            Child {
                birth_date: date(2019, 6, 1),
                education: EducationPath::default(),
                cram: CramWindow { start: 30, end: 30 },
            },
            Child {
                birth_date: date(2021, 6, 1),
                education: EducationPath::default(),
                cram: CramWindow { start: 0, end: 30 },
            },
        ];

        let years = project_cashflows(&config).years;
        // ages 5 and 3 in year 0, 6 and 4 in year 1
        assert_approx(years[0].education_cost, 25.0 + 25.0);
        assert_approx(years[1].education_cost, (35.0 + 25.0) * 1.1);
    }

    #[test]
    fn conditional_events_are_deferred_and_indexed() {
        let mut config = deterministic_config();
        config.inflation_rate = 0.1;
        let mut gift = event(FlowDirection::Expense, 220.0, true, 45, 46);
        gift.asset_threshold = 5000.0;
        gift.inflation_indexed = false;
        let mut windfall = event(FlowDirection::Income, 10.0, false, 46, 46);
        windfall.asset_threshold = 5000.0;
        config.events = vec![gift, windfall];

        let years = project_cashflows(&config).years;
        assert_eq!(years[0].conditional_events.len(), 1);
        assert_approx(years[0].event_expense, 0.0);
        assert_approx(years[0].conditional_events[0].amount, 220.0);
        assert_approx(years[1].event_income, 11.0);
        assert_approx(years[1].conditional_expense_for(4999.0), 0.0);
        assert_approx(years[1].conditional_expense_for(5000.0), 220.0);
    }
}
