use crate::error::IdeaforgeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of project an idea describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Scanners, auditors, hardening helpers.
    SecurityTool,
    /// Tooling for developers.
    DevelopmentTool,
    /// Data processing and reporting.
    DataAnalysis,
    /// Job and workflow automation.
    Automation,
    /// Command-line application.
    CliApp,
    /// Browser-facing application.
    WebApp,
    /// Network API service.
    ApiService,
    /// Reusable library.
    Library,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 8] = [
        Category::SecurityTool,
        Category::DevelopmentTool,
        Category::DataAnalysis,
        Category::Automation,
        Category::CliApp,
        Category::WebApp,
        Category::ApiService,
        Category::Library,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SecurityTool => "security_tool",
            Category::DevelopmentTool => "development_tool",
            Category::DataAnalysis => "data_analysis",
            Category::Automation => "automation",
            Category::CliApp => "cli_app",
            Category::WebApp => "web_app",
            Category::ApiService => "api_service",
            Category::Library => "library",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = IdeaforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| IdeaforgeError::Config(format!("Unknown category '{s}'")))
    }
}

/// Deterministic dedup key for an idea.
///
/// Derived from the normalized title and source: lower-cased, non-alphanumeric
/// runs collapsed to `-`, joined with a newline, SHA-256 hashed, first 12 bytes
/// hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a title/source pair after normalization.
    pub fn compute(title: &str, source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize(title).as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize(source).as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..12]))
    }

    /// Wrap an existing fingerprint string (e.g. from the command line).
    ///
    /// Rejects anything that is not 24 lowercase hex characters so it can be
    /// used safely as a file name.
    pub fn parse(raw: &str) -> Result<Self, IdeaforgeError> {
        let valid = raw.len() == 24
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(IdeaforgeError::Config(format!("Invalid fingerprint '{raw}'")))
        }
    }

    /// Hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-case and collapse every run of non-alphanumeric characters into `-`.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// A candidate project produced by a discovery provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    /// Unique per discovery, unlike the fingerprint.
    pub id: Uuid,
    /// Short human title.
    pub title: String,
    /// Where the idea came from (`github_trending`, `manual`, ...).
    pub source: String,
    /// Kind of project.
    pub category: Category,
    /// Ranking weight; higher goes first.
    pub score: f64,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Link to the source material.
    #[serde(default)]
    pub reference_url: Option<String>,
    /// When the provider produced it.
    pub discovered_at: DateTime<Utc>,
}

impl Idea {
    /// Fresh idea discovered now.
    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        category: Category,
        score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            source: source.into(),
            category,
            score,
            description: None,
            reference_url: None,
            discovered_at: Utc::now(),
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a link to the source material.
    pub fn with_reference_url(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    /// Override the discovery time.
    pub fn discovered_at(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = at;
        self
    }

    /// Dedup key of this idea.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.title, &self.source)
    }

    /// Repository-safe project name derived from the title.
    ///
    /// Capped at 40 characters; never ends with a dash.
    pub fn project_name(&self) -> String {
        let mut name = normalize(&self.title);
        if name.is_empty() {
            name = format!("project-{}", &self.fingerprint().as_str()[..8]);
        }
        name.chars()
            .take(40)
            .collect::<String>()
            .trim_end_matches('-')
            .to_string()
    }

    /// Description sent to the development service; falls back to the title.
    pub fn brief(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.title)
    }
}
