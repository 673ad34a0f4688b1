use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An exchange-qualified stock symbol, e.g. `RELIANCE.NS`.
///
/// Always trimmed and uppercased; never empty; never contains whitespace or
/// commas since ticker lists travel as a CSV query value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticker(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickerError {
    #[error("ticker must not be empty")]
    Empty,
    #[error("ticker contains invalid character {0:?}")]
    InvalidCharacter(char),
}

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TickerError::Empty);
        }
        if let Some(c) = trimmed.chars().find(|c| c.is_whitespace() || *c == ',') {
            return Err(TickerError::InvalidCharacter(c));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol without the exchange suffix (`RELIANCE.NS` -> `RELIANCE`).
    pub fn base_symbol(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((base, _)) if !base.is_empty() => base,
            _ => &self.0,
        }
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = TickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticker::parse(s)
    }
}

impl Serialize for Ticker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ticker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ticker::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Ordered, de-duplicated set of tickers. Insertion order is the display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TickerSet(Vec<Ticker>);

impl TickerSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parses raw symbols, skipping duplicates. Fails on the first invalid symbol.
    pub fn parse<I, S>(raw: I) -> Result<Self, TickerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for symbol in raw {
            set.insert(Ticker::parse(symbol.as_ref())?);
        }
        Ok(set)
    }

    /// Returns false when the ticker was already present.
    pub fn insert(&mut self, ticker: Ticker) -> bool {
        if self.0.contains(&ticker) {
            return false;
        }
        self.0.push(ticker);
        true
    }

    pub fn remove(&mut self, ticker: &Ticker) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != ticker);
        before != self.0.len()
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.0.contains(ticker)
    }

    pub fn extend<I: IntoIterator<Item = Ticker>>(&mut self, tickers: I) {
        for ticker in tickers {
            self.insert(ticker);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticker> {
        self.0.iter()
    }

    pub fn to_csv(&self) -> String {
        self.0.iter().map(Ticker::as_str).collect::<Vec<_>>().join(",")
    }
}

impl FromIterator<Ticker> for TickerSet {
    fn from_iter<I: IntoIterator<Item = Ticker>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Serialize for TickerSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TickerSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tickers = Vec::<Ticker>::deserialize(deserializer)?;
        Ok(tickers.into_iter().collect())
    }
}

/// Chart time range. The wire form is the label shown on the range buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeRange {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "YTD")]
    YearToDate,
    #[default]
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "5Y")]
    FiveYears,
    #[serde(rename = "MAX")]
    Max,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::OneDay => "1D",
            TimeRange::OneMonth => "1M",
            TimeRange::ThreeMonths => "3M",
            TimeRange::SixMonths => "6M",
            TimeRange::YearToDate => "YTD",
            TimeRange::OneYear => "1Y",
            TimeRange::FiveYears => "5Y",
            TimeRange::Max => "MAX",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1D" => Ok(TimeRange::OneDay),
            "1M" => Ok(TimeRange::OneMonth),
            "3M" => Ok(TimeRange::ThreeMonths),
            "6M" => Ok(TimeRange::SixMonths),
            "YTD" => Ok(TimeRange::YearToDate),
            "1Y" => Ok(TimeRange::OneYear),
            "5Y" => Ok(TimeRange::FiveYears),
            "MAX" => Ok(TimeRange::Max),
            other => Err(format!("unknown time range: {}", other)),
        }
    }
}
