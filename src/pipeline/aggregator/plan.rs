//! Structured description of each derived table: which validated tables it reads, what it
//! writes, and the parameters of its grouping and ranking. Both the in-process evaluator and
//! the SQL renderer work from these plans.

use serde::Serialize;
use std::fmt;

use crate::config::SegmentationConfig;
use crate::constants::*;

/// The four derived tables of the gold layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    AovByProductCategory,
    CustomerSegmentation,
    PeakDayHourByChannel,
    AgentInteractionSummary,
}

impl Derivation {
    pub const ALL: [Derivation; 4] = [
        Derivation::AovByProductCategory,
        Derivation::CustomerSegmentation,
        Derivation::PeakDayHourByChannel,
        Derivation::AgentInteractionSummary,
    ];

    /// Short name used on the command line.
    pub fn slug(&self) -> &'static str {
        match self {
            Derivation::AovByProductCategory => "aov",
            Derivation::CustomerSegmentation => "segmentation",
            Derivation::PeakDayHourByChannel => "peak",
            Derivation::AgentInteractionSummary => "agent_summary",
        }
    }

    pub fn output_table(&self) -> &'static str {
        match self {
            Derivation::AovByProductCategory => AOV_PRODUCT_CATEGORY_LOCATION,
            Derivation::CustomerSegmentation => CUSTOMER_SEGMENTATION,
            Derivation::PeakDayHourByChannel => PEAK_DAY_HOUR_BY_CHANNEL,
            Derivation::AgentInteractionSummary => AGENT_INTERACTION_SUMMARY,
        }
    }

    /// Look up by slug or by output table name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| {
            d.slug().eq_ignore_ascii_case(name) || d.output_table().eq_ignore_ascii_case(name)
        })
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Products with their online orders joined on; products without orders are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AovPlan {
    pub products: String,
    pub orders: String,
    pub output: String,
}

/// Union of both transaction channels, ranked into spend buckets and labeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentationPlan {
    pub transaction_sources: Vec<String>,
    pub loyalty_accounts: String,
    pub output: String,
    pub buckets: u32,
    pub champion_tiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSource {
    pub channel: String,
    pub table: String,
    pub timestamp_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeakPlan {
    pub channels: Vec<ChannelSource>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummaryPlan {
    pub interactions: String,
    pub agents: String,
    pub output: String,
    pub resolved_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "derivation", rename_all = "snake_case")]
pub enum DerivationPlan {
    Aov(AovPlan),
    Segmentation(SegmentationPlan),
    Peak(PeakPlan),
    AgentSummary(AgentSummaryPlan),
}

impl DerivationPlan {
    pub fn build(derivation: Derivation, segmentation: &SegmentationConfig) -> Self {
        match derivation {
            Derivation::AovByProductCategory => DerivationPlan::Aov(AovPlan {
                products: PRODUCTS.to_string(),
                orders: ONLINE_TRANSACTIONS.to_string(),
                output: AOV_PRODUCT_CATEGORY_LOCATION.to_string(),
            }),
            Derivation::CustomerSegmentation => DerivationPlan::Segmentation(SegmentationPlan {
                transaction_sources: vec![
                    ONLINE_TRANSACTIONS.to_string(),
                    IN_STORE_TRANSACTIONS.to_string(),
                ],
                loyalty_accounts: LOYALTY_ACCOUNTS.to_string(),
                output: CUSTOMER_SEGMENTATION.to_string(),
                buckets: segmentation.buckets,
                champion_tiers: segmentation.champion_tiers.clone(),
            }),
            Derivation::PeakDayHourByChannel => DerivationPlan::Peak(PeakPlan {
                channels: vec![
                    ChannelSource {
                        channel: CHANNEL_ONLINE.to_string(),
                        table: ONLINE_TRANSACTIONS.to_string(),
                        timestamp_column: "DateTime".to_string(),
                    },
                    ChannelSource {
                        channel: CHANNEL_IN_STORE.to_string(),
                        table: IN_STORE_TRANSACTIONS.to_string(),
                        timestamp_column: "DateTime".to_string(),
                    },
                ],
                output: PEAK_DAY_HOUR_BY_CHANNEL.to_string(),
            }),
            Derivation::AgentInteractionSummary => DerivationPlan::AgentSummary(AgentSummaryPlan {
                interactions: CUSTOMER_SERVICE_INTERACTIONS.to_string(),
                agents: AGENTS.to_string(),
                output: AGENT_INTERACTION_SUMMARY.to_string(),
                resolved_status: RESOLVED_STATUS.to_string(),
            }),
        }
    }

    pub fn derivation(&self) -> Derivation {
        match self {
            DerivationPlan::Aov(_) => Derivation::AovByProductCategory,
            DerivationPlan::Segmentation(_) => Derivation::CustomerSegmentation,
            DerivationPlan::Peak(_) => Derivation::PeakDayHourByChannel,
            DerivationPlan::AgentSummary(_) => Derivation::AgentInteractionSummary,
        }
    }

    /// Validated tables this plan reads, without duplicates.
    pub fn inputs(&self) -> Vec<&str> {
        let mut inputs: Vec<&str> = match self {
            DerivationPlan::Aov(p) => vec![p.products.as_str(), p.orders.as_str()],
            DerivationPlan::Segmentation(p) => p
                .transaction_sources
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(p.loyalty_accounts.as_str()))
                .collect(),
            DerivationPlan::Peak(p) => p.channels.iter().map(|c| c.table.as_str()).collect(),
            DerivationPlan::AgentSummary(p) => vec![p.interactions.as_str(), p.agents.as_str()],
        };
        let mut seen = std::collections::HashSet::new();
        inputs.retain(|t| seen.insert(*t));
        inputs
    }

    pub fn output(&self) -> &str {
        match self {
            DerivationPlan::Aov(p) => &p.output,
            DerivationPlan::Segmentation(p) => &p.output,
            DerivationPlan::Peak(p) => &p.output,
            DerivationPlan::AgentSummary(p) => &p.output,
        }
    }
}

/// Plans for every derivation, in gold-layer order.
pub fn default_plans(segmentation: &SegmentationConfig) -> Vec<DerivationPlan> {
    Derivation::ALL
        .into_iter()
        .map(|d| DerivationPlan::build(d, segmentation))
        .collect()
}
