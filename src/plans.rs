//! Subscription plan catalog.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Prefix used for codes whose plan type is not in the catalog.
pub const DEFAULT_CODE_PREFIX: &str = "ANIMES";

/// A named subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Display name ("1 Mes")
    pub name: String,
    /// Display price including currency symbol ("$2.99")
    pub price: String,
    /// Duration of the premium period in days
    pub days: u32,
    /// Plan identifier at the payment provider
    pub provider_plan_id: String,
    /// Leading segment of activation codes issued for this plan
    pub code_prefix: String,
}

/// Plans keyed by plan type ("mensual", "3meses", "year").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCatalog {
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
    pub plans: BTreeMap<String, PlanConfig>,
}

fn default_prefix() -> String {
    DEFAULT_CODE_PREFIX.to_string()
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= 8
        && prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl PlanCatalog {
    /// Load a catalog from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CheckoutError::configuration(format!(
                "Failed to read plans file {}: {}",
                path.display(),
                e
            ))
        })?;
        let catalog: Self = serde_json::from_str(&contents)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reject prefixes that would produce codes a user cannot transcribe.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_prefix(&self.default_prefix) {
            return Err(CheckoutError::configuration(format!(
                "Invalid default code prefix: {:?}",
                self.default_prefix
            )));
        }
        if self.plans.is_empty() {
            return Err(CheckoutError::configuration("Plan catalog is empty"));
        }
        for (plan_type, plan) in &self.plans {
            if !is_valid_prefix(&plan.code_prefix) {
                return Err(CheckoutError::configuration(format!(
                    "Invalid code prefix {:?} for plan {}",
                    plan.code_prefix, plan_type
                )));
            }
            if plan.days == 0 {
                return Err(CheckoutError::configuration(format!(
                    "Plan {} must last at least one day",
                    plan_type
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, plan_type: &str) -> Option<&PlanConfig> {
        self.plans.get(plan_type)
    }

    /// Code prefix for a plan type, falling back to the default prefix.
    pub fn prefix_for(&self, plan_type: &str) -> &str {
        self.plans
            .get(plan_type)
            .map(|p| p.code_prefix.as_str())
            .unwrap_or(&self.default_prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlanConfig)> {
        self.plans.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let plans = [
            (
                "mensual",
                PlanConfig {
                    name: "1 Mes".to_string(),
                    price: "$2.99".to_string(),
                    days: 30,
                    provider_plan_id: "P-18381349AF867540CNEVSH5I".to_string(),
                    code_prefix: "ANIM1M".to_string(),
                },
            ),
            (
                "3meses",
                PlanConfig {
                    name: "3 Meses".to_string(),
                    price: "$7.99".to_string(),
                    days: 90,
                    provider_plan_id: "P-5PP81994FM215525RNEVSJFA".to_string(),
                    code_prefix: "ANIM3M".to_string(),
                },
            ),
            (
                "year",
                PlanConfig {
                    name: "1 Año".to_string(),
                    price: "$24.99".to_string(),
                    days: 365,
                    provider_plan_id: "P-3E203769WC9540323NEVSJ5Q".to_string(),
                    code_prefix: "ANIM1Y".to_string(),
                },
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            default_prefix: default_prefix(),
            plans,
        }
    }
}
