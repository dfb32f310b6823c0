//! Bucket lifecycle rules
//!
//! Rules are edited read-modify-write: the current list is fetched, changed
//! locally and written back as a whole. Changes made by another client between
//! the fetch and the write are lost.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::ObjectStore;

/// Whether a lifecycle rule is applied by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RuleStatus {
    #[default]
    Enabled,
    Disabled,
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleStatus::Enabled => write!(f, "Enabled"),
            RuleStatus::Disabled => write!(f, "Disabled"),
        }
    }
}

impl std::str::FromStr for RuleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enabled" => Ok(RuleStatus::Enabled),
            "disabled" => Ok(RuleStatus::Disabled),
            _ => Err(format!("Invalid rule status: {s}")),
        }
    }
}

/// When objects matched by a rule expire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expiration {
    /// Number of days after creation
    Days(u32),
    /// Fixed date (midnight UTC)
    Date(Date),
}

impl std::fmt::Display for Expiration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expiration::Days(days) => write!(f, "{days} day(s)"),
            Expiration::Date(date) => write!(f, "on {date}"),
        }
    }
}

/// A bucket lifecycle rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    /// Rule identifier, unique within the bucket
    pub id: String,

    /// Key prefix the rule applies to (empty for the whole bucket)
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub status: RuleStatus,

    /// Expiration action; rules created elsewhere may carry only other actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
}

impl LifecycleRule {
    /// Create an enabled expiration rule
    pub fn new(id: impl Into<String>, prefix: impl Into<String>, expiration: Expiration) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            status: RuleStatus::Enabled,
            expiration: Some(expiration),
        }
    }

    /// Check the rule can be accepted by a store
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::MissingArgument("id".to_string()));
        }
        match self.expiration {
            Some(Expiration::Days(0)) => {
                Err(Error::Config("expiration days must be at least 1".to_string()))
            }
            None => Err(Error::MissingArgument("days or date".to_string())),
            _ => Ok(()),
        }
    }
}

/// Generate an identifier for a rule created without one
pub fn generate_rule_id() -> String {
    format!("rule-{}", jiff::Timestamp::now().as_second())
}

/// Read-modify-write editor for the configured bucket's lifecycle rules
pub struct LifecycleEditor<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ObjectStore + ?Sized> LifecycleEditor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Current rules of the bucket
    pub async fn list_rules(&self) -> Result<Vec<LifecycleRule>> {
        self.store.get_bucket_lifecycle().await
    }

    /// Append a rule, returning the rule list that was written
    pub async fn add_rule(&self, rule: LifecycleRule) -> Result<Vec<LifecycleRule>> {
        rule.validate()?;

        let mut rules = self.store.get_bucket_lifecycle().await?;
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(Error::Conflict(format!(
                "lifecycle rule '{}' already exists",
                rule.id
            )));
        }

        tracing::debug!(id = %rule.id, existing = rules.len(), "Adding lifecycle rule");
        rules.push(rule);
        self.store.put_bucket_lifecycle(rules.clone()).await?;
        Ok(rules)
    }

    /// Remove the rule with `id`, returning the remaining rules
    pub async fn remove_rule(&self, id: &str) -> Result<Vec<LifecycleRule>> {
        let mut rules = self.store.get_bucket_lifecycle().await?;
        let before = rules.len();
        rules.retain(|r| r.id != id);

        if rules.len() == before {
            return Err(Error::NotFound(format!("lifecycle rule '{id}'")));
        }

        tracing::debug!(id, remaining = rules.len(), "Removing lifecycle rule");
        if rules.is_empty() {
            self.store.delete_bucket_lifecycle().await?;
        } else {
            self.store.put_bucket_lifecycle(rules.clone()).await?;
        }
        Ok(rules)
    }
}
