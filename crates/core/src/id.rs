//! Identifiers for sepcheck entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A Stellar Ecosystem Proposal covered by the test catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Sep {
    /// SEP-1: stellar.toml
    Sep1,
    /// SEP-6: deposit and withdrawal API
    Sep6,
    /// SEP-10: web authentication
    Sep10,
    /// SEP-12: KYC API
    Sep12,
    /// SEP-24: hosted deposit and withdrawal
    Sep24,
    /// SEP-31: cross-border payments
    Sep31,
    /// SEP-38: anchor RFQ API
    Sep38,
}

impl Sep {
    /// Every supported SEP, in ascending order.
    pub const ALL: [Sep; 7] = [
        Sep::Sep1,
        Sep::Sep6,
        Sep::Sep10,
        Sep::Sep12,
        Sep::Sep24,
        Sep::Sep31,
        Sep::Sep38,
    ];

    /// The proposal number.
    pub fn number(self) -> u16 {
        match self {
            Sep::Sep1 => 1,
            Sep::Sep6 => 6,
            Sep::Sep10 => 10,
            Sep::Sep12 => 12,
            Sep::Sep24 => 24,
            Sep::Sep31 => 31,
            Sep::Sep38 => 38,
        }
    }

    /// Look up a SEP by its proposal number.
    pub fn from_number(number: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|sep| sep.number() == number)
    }
}

impl From<Sep> for u16 {
    fn from(sep: Sep) -> Self {
        sep.number()
    }
}

impl TryFrom<u16> for Sep {
    type Error = String;

    fn try_from(number: u16) -> Result<Self, Self::Error> {
        Sep::from_number(number).ok_or_else(|| format!("unsupported SEP: {}", number))
    }
}

impl std::fmt::Display for Sep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SEP-{}", self.number())
    }
}

impl std::str::FromStr for Sep {
    type Err = String;

    /// Accepts `10`, `sep10`, `SEP-10` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let digits = lowered
            .strip_prefix("sep")
            .map(|rest| rest.trim_start_matches(['-', '_']))
            .unwrap_or(&lowered);
        let number: u16 = digits
            .parse()
            .map_err(|_| format!("invalid SEP identifier: {}", s))?;
        Sep::try_from(number)
    }
}

/// Identity of a test: the SEP it belongs to, its group, and the assertion text.
///
/// Two tests with equal ids are the same test for deduplication and cycle
/// detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestId {
    /// Protocol the test exercises
    pub sep: Sep,

    /// Group (category) name
    pub group: String,

    /// Assertion text
    pub assertion: String,
}

impl TestId {
    /// Create a new TestId
    pub fn new(sep: Sep, group: impl Into<String>, assertion: impl Into<String>) -> Self {
        Self {
            sep,
            group: group.into(),
            assertion: assertion.into(),
        }
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.sep, self.group, self.assertion)
    }
}

/// Unique identifier for one run of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a new RunId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
