//! Fundamental types shared by the session manager, service client and views.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Profile of the signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Subject identifier issued by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Display picture URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl UserProfile {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    /// Whether the profile carries an email usable as the research identity.
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

/// Kind of research the backend workflow should run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResearchType {
    #[default]
    #[serde(rename = "Market Analysis")]
    MarketAnalysis,
    #[serde(rename = "Competitor Analysis")]
    CompetitorAnalysis,
    #[serde(rename = "Technology Trends")]
    TechnologyTrends,
    #[serde(rename = "Consumer Behavior")]
    ConsumerBehavior,
    #[serde(rename = "Product Viability")]
    ProductViability,
}

impl ResearchType {
    pub const ALL: [ResearchType; 5] = [
        ResearchType::MarketAnalysis,
        ResearchType::CompetitorAnalysis,
        ResearchType::TechnologyTrends,
        ResearchType::ConsumerBehavior,
        ResearchType::ProductViability,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ResearchType::MarketAnalysis => "Market Analysis",
            ResearchType::CompetitorAnalysis => "Competitor Analysis",
            ResearchType::TechnologyTrends => "Technology Trends",
            ResearchType::ConsumerBehavior => "Consumer Behavior",
            ResearchType::ProductViability => "Product Viability",
        }
    }
}

impl fmt::Display for ResearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResearchType {
    type Err = String;

    /// Accepts the label in any case, with spaces, dashes or underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_choice(s);
        Self::ALL
            .into_iter()
            .find(|t| normalize_choice(t.label()) == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown research type '{}' (expected one of: {})",
                    s,
                    join_labels(Self::ALL.iter().map(|t| t.label()))
                )
            })
    }
}

/// How quickly the requester needs the research.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Urgency {
    #[default]
    Standard,
    High,
    Low,
}

impl Urgency {
    pub const ALL: [Urgency; 3] = [Urgency::Standard, Urgency::High, Urgency::Low];

    pub fn label(&self) -> &'static str {
        match self {
            Urgency::Standard => "Standard",
            Urgency::High => "High",
            Urgency::Low => "Low",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_choice(s);
        Self::ALL
            .into_iter()
            .find(|u| normalize_choice(u.label()) == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown urgency '{}' (expected one of: {})",
                    s,
                    join_labels(Self::ALL.iter().map(|u| u.label()))
                )
            })
    }
}

fn normalize_choice(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn join_labels<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels.collect::<Vec<_>>().join(", ")
}

/// Research depth from 1 (overview) to 5 (in-depth).
///
/// Travels over the wire as a string numeral, e.g. `"3"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Depth(u8);

impl Depth {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Result<Self, String> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(format!(
                "depth must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                level
            ))
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for Depth {
    fn default() -> Self {
        Self(3)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("depth must be a numeral from 1 to 5, got '{}'", s))?;
        Self::new(level)
    }
}

impl TryFrom<String> for Depth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Depth> for String {
    fn from(depth: Depth) -> Self {
        depth.to_string()
    }
}

/// The request form's local draft. Carries everything but the requester's email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResearchDraft {
    pub topic: String,
    pub research_type: ResearchType,
    pub depth: Depth,
    pub urgency: Urgency,
}

impl ResearchDraft {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Whether the topic holds anything besides whitespace.
    pub fn has_topic(&self) -> bool {
        !self.topic.trim().is_empty()
    }

    /// Put every field back to its initial value.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Attach the requester's email, producing the wire payload.
    pub fn into_payload(self, email: impl Into<String>) -> ResearchRequestPayload {
        ResearchRequestPayload {
            email: email.into(),
            topic: self.topic,
            research_type: self.research_type,
            depth: self.depth,
            urgency: self.urgency,
        }
    }
}

/// Body posted to the submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResearchRequestPayload {
    pub email: String,
    pub topic: String,
    #[serde(rename = "type")]
    pub research_type: ResearchType,
    pub depth: Depth,
    pub urgency: Urgency,
}

/// Backend processing status of a research request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResearchStatus {
    Completed,
    #[serde(rename = "In Progress")]
    InProgress,
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchStatus::Completed => write!(f, "Completed"),
            ResearchStatus::InProgress => write!(f, "In Progress"),
        }
    }
}

/// Status record for a previously submitted request, as returned by the results endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub id: String,
    pub topic: String,
    pub status: ResearchStatus,
    /// Percentage complete, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl ResearchResult {
    pub fn is_completed(&self) -> bool {
        self.status == ResearchStatus::Completed
    }

    /// Progress clamped into 0..=100; a missing value counts as 0.
    pub fn progress_percent(&self) -> u8 {
        self.progress.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8
    }
}

/// Body posted to the results endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultsQuery {
    pub email: String,
}
