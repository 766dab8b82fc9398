use serde::{Deserialize, Serialize};

/// Selection criterion restricting which products a price adjustment applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Collection(String),
    Tag(String),
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::Collection(_) => "collection",
            Scope::Tag(_) => "tag",
        }
    }
}

/// Whether the percentage is added to or subtracted from the current price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }
}

/// Subscription lifecycle status as reported by the billing API.
///
/// Remote statuses outside the known set are preserved verbatim so a sync
/// never loses information. Serializes as the bare status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
    Other(String),
}

impl Serialize for SubscriptionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubscriptionStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SubscriptionStatus::parse(&s))
    }
}

impl SubscriptionStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => SubscriptionStatus::Pending,
            "ACTIVE" => SubscriptionStatus::Active,
            "CANCELLED" => SubscriptionStatus::Cancelled,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Pending => "PENDING",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

/// Aggregate outcome of one price adjustment run.
///
/// `updated_count` is computed from the operations that were submitted, not
/// confirmed per-variant against the remote side. `errors` holds best-effort
/// message text for operations that failed without aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentReport {
    pub updated_count: u32,
    pub total_seen: u32,
    pub errors: Vec<String>,
}
