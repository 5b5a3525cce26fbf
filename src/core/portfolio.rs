use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Allocation, ReturnModel};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetClass {
    pub id: String,
    pub name: String,
    pub annual_return_pct: f64,
    pub annual_risk_pct: f64,
    #[serde(default)]
    pub color: String,
}

/// Asset table plus pairwise correlations keyed by asset id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetModel {
    pub assets: BTreeMap<String, AssetClass>,
    pub correlations: BTreeMap<String, BTreeMap<String, f64>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioStats {
    pub expected_return_pct: f64,
    pub risk_pct: f64,
}

/// Annual return distribution for one simulated year, as fractions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct YearMarket {
    pub mean: f64,
    pub stdev: f64,
}

const BUILTIN_ASSETS: [(&str, &str, f64, f64, &str); 9] = [
    ("domestic_stock", "Domestic stocks", 4.0, 20.0, "#f87171"),
    ("us_stock", "US stocks", 11.0, 19.0, "#ef4444"),
    ("ex_us_stock", "Developed ex-US stocks", 7.5, 21.0, "#fb923c"),
    ("emerging_stock", "Emerging stocks", 5.6, 25.0, "#fbbf24"),
    ("domestic_bond", "Domestic bonds", 1.0, 3.0, "#60a5fa"),
    ("us_agg_bond", "US aggregate bonds", 3.5, 11.0, "#818cf8"),
    ("reit", "REIT", 6.0, 18.0, "#a78bfa"),
    ("gold", "Gold", 5.0, 15.0, "#fcd34d"),
    ("cash", "Cash", 0.01, 0.0, "#9ca3af"),
];

// Upper triangle, row order matches BUILTIN_ASSETS. Cash is uncorrelated.
const BUILTIN_CORRELATIONS: [(&str, &str, f64); 28] = [
    ("domestic_stock", "us_stock", 0.6),
    ("domestic_stock", "ex_us_stock", 0.7),
    ("domestic_stock", "emerging_stock", 0.6),
    ("domestic_stock", "domestic_bond", -0.1),
    ("domestic_stock", "us_agg_bond", 0.2),
    ("domestic_stock", "reit", 0.5),
    ("domestic_stock", "gold", 0.1),
    ("us_stock", "ex_us_stock", 0.9),
    ("us_stock", "emerging_stock", 0.7),
    ("us_stock", "domestic_bond", -0.2),
    ("us_stock", "us_agg_bond", 0.3),
    ("us_stock", "reit", 0.6),
    ("us_stock", "gold", 0.1),
    ("ex_us_stock", "emerging_stock", 0.8),
    ("ex_us_stock", "domestic_bond", -0.1),
    ("ex_us_stock", "us_agg_bond", 0.5),
    ("ex_us_stock", "reit", 0.6),
    ("ex_us_stock", "gold", 0.2),
    ("emerging_stock", "domestic_bond", -0.1),
    ("emerging_stock", "us_agg_bond", 0.4),
    ("emerging_stock", "reit", 0.5),
    ("emerging_stock", "gold", 0.3),
    ("domestic_bond", "us_agg_bond", 0.3),
    ("domestic_bond", "reit", 0.1),
    ("domestic_bond", "gold", 0.2),
    ("us_agg_bond", "reit", 0.3),
    ("us_agg_bond", "gold", 0.3),
    ("reit", "gold", 0.2),
];

impl Default for AssetModel {
    fn default() -> Self {
        let assets = BUILTIN_ASSETS
            .iter()
            .map(|&(id, name, ret, risk, color)| {
                (
                    id.to_string(),
                    AssetClass {
                        id: id.to_string(),
                        name: name.to_string(),
                        annual_return_pct: ret,
                        annual_risk_pct: risk,
                        color: color.to_string(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let mut model = Self {
            assets,
            correlations: BTreeMap::new(),
        };
        for (id, ..) in BUILTIN_ASSETS {
            model.set_correlation(id, id, 1.0);
        }
        for (a, b, rho) in BUILTIN_CORRELATIONS {
            model.set_correlation(a, b, rho);
        }
        model
    }
}

impl AssetModel {
    /// Sets both (a, b) and (b, a).
    pub fn set_correlation(&mut self, a: &str, b: &str, rho: f64) {
        self.correlations
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), rho);
        self.correlations
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), rho);
    }

    /// Missing entries read as 0.
    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        self.correlations
            .get(a)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Mean-variance aggregation of an allocation. Unknown asset ids are skipped.
pub fn portfolio_stats(allocation: &Allocation, model: &AssetModel) -> PortfolioStats {
    let known = allocation
        .iter()
        .filter_map(|(id, weight)| model.assets.get(id).map(|asset| (asset, weight / 100.0)))
        .collect::<Vec<_>>();

    let expected_return_pct = known
        .iter()
        .map(|(asset, w)| w * asset.annual_return_pct)
        .sum::<f64>();

    let mut variance = 0.0;
    for (asset_i, w_i) in &known {
        for (asset_j, w_j) in &known {
            let rho = model.correlation(&asset_i.id, &asset_j.id);
            variance += w_i * w_j * asset_i.annual_risk_pct * asset_j.annual_risk_pct * rho;
        }
    }

    PortfolioStats {
        expected_return_pct,
        risk_pct: variance.max(0.0).sqrt(),
    }
}

pub fn glide_progress(year_index: usize, glide_years: i32) -> f64 {
    if glide_years > 0 {
        (year_index as f64 / glide_years as f64).min(1.0)
    } else {
        0.0
    }
}

/// Per-asset linear blend over the union of both allocations' ids.
pub fn blend_allocation(current: &Allocation, target: &Allocation, progress: f64) -> Allocation {
    current
        .keys()
        .chain(target.keys())
        .map(|id| {
            let start = current.get(id).copied().unwrap_or(0.0);
            let end = target.get(id).copied().unwrap_or(0.0);
            (id.clone(), start + (end - start) * progress)
        })
        .collect()
}

pub fn glide_path_stats(
    current: &Allocation,
    target: &Allocation,
    glide_years: i32,
    duration: usize,
    model: &AssetModel,
) -> Vec<PortfolioStats> {
    (0..duration)
        .map(|i| {
            let allocation = blend_allocation(current, target, glide_progress(i, glide_years));
            portfolio_stats(&allocation, model)
        })
        .collect()
}

pub fn annual_market_series(
    return_model: &ReturnModel,
    model: &AssetModel,
    duration: usize,
) -> Vec<YearMarket> {
    match return_model {
        ReturnModel::Fixed {
            expected_return,
            risk,
        } => vec![
            YearMarket {
                mean: *expected_return,
                stdev: *risk,
            };
            duration
        ],
        ReturnModel::GlidePath {
            current,
            target,
            years,
        } => glide_path_stats(current, target, *years, duration, model)
            .into_iter()
            .map(|stats| YearMarket {
                mean: stats.expected_return_pct / 100.0,
                stdev: stats.risk_pct / 100.0,
            })
            .collect(),
    }
}
