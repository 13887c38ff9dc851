use std::sync::Arc;

use crate::agents::{AnalysisAgent, KeyRatios, MarketDataSource, StepContext, clamp_score};
use crate::models::{
    FundamentalAnalysis, FundamentalScores, Rating, StepPayload, UnitResult,
};

pub struct FundamentalAgent {
    source: Arc<dyn MarketDataSource>,
}

impl FundamentalAgent {
    pub const NAME: &'static str = "fundamental_agent";

    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }
}

impl AnalysisAgent for FundamentalAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Valuation, profitability, growth, and balance-sheet health"
    }

    fn execute(&self, context: &StepContext) -> UnitResult<StepPayload> {
        let parameters = context.stock_parameters()?;
        let profile = self.source.company_profile(&parameters.symbol)?;
        let ratios = self.source.key_ratios(&parameters.symbol)?;

        let scores = score_ratios(&ratios);
        let (strengths, weaknesses) = strengths_and_weaknesses(&scores);

        Ok(StepPayload::Fundamental(FundamentalAnalysis {
            company_name: Some(profile.name).filter(|name| !name.is_empty()),
            sector: profile.sector,
            pe_trailing: ratios.pe_trailing,
            revenue_growth: ratios.revenue_growth,
            profit_margin: ratios.profit_margin,
            debt_to_equity: ratios.debt_to_equity,
            rating: rating_for(scores.overall),
            scores,
            strengths,
            weaknesses,
        }))
    }
}

pub fn score_ratios(ratios: &KeyRatios) -> FundamentalScores {
    let valuation = score_valuation(ratios);
    let profitability = score_profitability(ratios);
    let growth = score_growth(ratios);
    let financial_health = score_financial_health(ratios);
    let overall = clamp_score((valuation + profitability + growth + financial_health) / 4.0);

    FundamentalScores {
        valuation,
        profitability,
        growth,
        financial_health,
        overall,
    }
}

/// Cheaper multiples score higher.
fn score_valuation(ratios: &KeyRatios) -> f64 {
    let mut score = 5.0;

    if let Some(pe) = ratios.pe_trailing {
        score += match pe {
            pe if pe < 0.0 => -2.0,
            pe if pe < 10.0 => 2.5,
            pe if pe < 15.0 => 1.5,
            pe if pe < 25.0 => 0.0,
            pe if pe < 40.0 => -1.0,
            _ => -2.0,
        };
    }
    if let Some(peg) = ratios.peg_ratio {
        score += match peg {
            peg if peg > 0.0 && peg < 1.0 => 1.5,
            peg if (1.0..2.0).contains(&peg) => 0.5,
            peg if peg >= 2.0 => -1.0,
            _ => 0.0,
        };
    }
    if let Some(pb) = ratios.price_to_book {
        score += match pb {
            pb if pb > 0.0 && pb < 1.0 => 1.0,
            pb if pb > 0.0 && pb < 3.0 => 0.5,
            pb if pb > 10.0 => -1.0,
            _ => 0.0,
        };
    }

    clamp_score(score)
}

fn score_profitability(ratios: &KeyRatios) -> f64 {
    let mut score = 5.0;

    if let Some(margin) = ratios.profit_margin {
        score += match margin {
            m if m > 0.20 => 2.0,
            m if m > 0.10 => 1.0,
            m if m > 0.0 => 0.0,
            _ => -2.0,
        };
    }
    if let Some(roe) = ratios.roe {
        score += match roe {
            r if r > 0.20 => 2.0,
            r if r > 0.10 => 1.0,
            r if r > 0.0 => 0.0,
            _ => -1.5,
        };
    }
    if let Some(operating) = ratios.operating_margin {
        if operating > 0.25 {
            score += 1.0;
        } else if operating < 0.0 {
            score -= 1.0;
        }
    }

    clamp_score(score)
}

fn score_growth(ratios: &KeyRatios) -> f64 {
    let mut score = 5.0;

    if let Some(revenue) = ratios.revenue_growth {
        score += match revenue {
            g if g > 0.25 => 2.5,
            g if g > 0.10 => 1.5,
            g if g > 0.0 => 0.5,
            _ => -1.5,
        };
    }
    if let Some(earnings) = ratios.earnings_growth {
        score += match earnings {
            g if g > 0.25 => 2.0,
            g if g > 0.10 => 1.0,
            g if g > 0.0 => 0.0,
            _ => -1.5,
        };
    }

    clamp_score(score)
}

fn score_financial_health(ratios: &KeyRatios) -> f64 {
    let mut score = 5.0;

    if let Some(current) = ratios.current_ratio {
        score += match current {
            c if c > 2.0 => 2.0,
            c if c > 1.5 => 1.0,
            c if c > 1.0 => 0.0,
            _ => -2.0,
        };
    }
    if let Some(debt) = ratios.debt_to_equity {
        score += match debt {
            d if d < 0.3 => 2.0,
            d if d < 0.5 => 1.5,
            d if d < 1.0 => 0.5,
            d if d < 2.0 => -0.5,
            _ => -2.0,
        };
    }
    if let Some(quick) = ratios.quick_ratio {
        if quick > 1.5 {
            score += 1.0;
        } else if quick < 0.5 {
            score -= 1.0;
        }
    }

    clamp_score(score)
}

fn rating_for(overall: f64) -> Rating {
    if overall >= 8.0 {
        Rating::StrongBuy
    } else if overall >= 6.5 {
        Rating::Buy
    } else if overall >= 5.0 {
        Rating::Hold
    } else if overall >= 3.5 {
        Rating::Sell
    } else {
        Rating::StrongSell
    }
}

fn strengths_and_weaknesses(scores: &FundamentalScores) -> (Vec<String>, Vec<String>) {
    let categories = [
        ("Valuation", scores.valuation),
        ("Profitability", scores.profitability),
        ("Growth", scores.growth),
        ("Financial Health", scores.financial_health),
    ];

    let strengths = categories
        .iter()
        .filter(|(_, score)| *score >= 7.0)
        .map(|(name, _)| name.to_string())
        .collect();
    let weaknesses = categories
        .iter()
        .filter(|(_, score)| *score < 4.0)
        .map(|(name, _)| name.to_string())
        .collect();

    (strengths, weaknesses)
}
