use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use time::macros::format_description;
use time::Date;

use crate::WarehouseError;

/// Calendar date (`YYYY-MM-DD`) with no time zone attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoDate(Date);

impl IsoDate {
    pub fn parse(input: &str) -> Result<Self, WarehouseError> {
        let format = format_description!("[year]-[month]-[day]");
        Date::parse(input.trim(), &format)
            .map(Self)
            .map_err(|_| WarehouseError::InvalidData(format!("'{input}' is not a YYYY-MM-DD date")))
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub const fn into_inner(self) -> Date {
        self.0
    }

    pub fn format_iso(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl Display for IsoDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_iso())
    }
}

impl Serialize for IsoDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_iso())
    }
}

impl<'de> Deserialize<'de> for IsoDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

/// Tickers are stored trimmed and upper-cased.
pub fn normalize_ticker(raw: &str) -> Result<String, WarehouseError> {
    let ticker = raw.trim().to_ascii_uppercase();
    if ticker.is_empty() {
        return Err(WarehouseError::InvalidData(String::from(
            "ticker must not be empty",
        )));
    }
    Ok(ticker)
}

/// Identity of a filing summary row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilingKey {
    pub ticker: String,
    pub filing_type: String,
    pub filing_date: IsoDate,
}

impl FilingKey {
    pub fn new(
        ticker: &str,
        filing_type: impl Into<String>,
        filing_date: IsoDate,
    ) -> Result<Self, WarehouseError> {
        let filing_type = filing_type.into().trim().to_ascii_uppercase();
        if filing_type.is_empty() {
            return Err(WarehouseError::InvalidData(String::from(
                "filing type must not be empty",
            )));
        }
        Ok(Self {
            ticker: normalize_ticker(ticker)?,
            filing_type,
            filing_date,
        })
    }

    /// Re-apply the constructor's normalization to a key built field by field.
    pub fn normalized(&self) -> Result<Self, WarehouseError> {
        Self::new(&self.ticker, self.filing_type.as_str(), self.filing_date)
    }
}

/// Generated filing summary as handed over by the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingSummaryDraft {
    pub key: FilingKey,
    pub summary: String,
    pub key_points: Vec<String>,
    pub sentiment_score: Option<f64>,
    /// Model identifier that produced the text.
    pub generated_by: String,
    pub data_version: i64,
}

/// Stored filing summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingSummary {
    pub key: FilingKey,
    pub summary: String,
    pub key_points: Vec<String>,
    pub sentiment_score: Option<f64>,
    pub generated_at_ms: i64,
    pub generated_by: String,
    pub data_version: i64,
    pub expires_at_ms: i64,
}

/// Aggregated company profile as assembled from upstream calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfileDraft {
    pub ticker: String,
    pub profile: Value,
    /// Number of upstream responses merged into `profile`.
    pub source_count: u32,
    pub data_version: i64,
}

/// Stored company profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    pub profile: Value,
    pub source_count: u32,
    pub data_version: i64,
    pub expires_at_ms: i64,
    pub last_verified_ms: i64,
}

/// Sentiment classification of one news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSentimentDraft {
    pub ticker: String,
    pub news_date: IsoDate,
    pub news_url: String,
    pub headline: Option<String>,
    /// -1.0 (bearish) to 1.0 (bullish).
    pub sentiment_score: f64,
    pub sentiment_label: String,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub ai_summary: Option<String>,
}

/// Stored news sentiment row. Rows are never updated or expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSentimentRecord {
    pub ticker: String,
    pub news_date: IsoDate,
    pub news_url: String,
    pub headline: Option<String>,
    pub sentiment_score: f64,
    pub sentiment_label: String,
    pub confidence: f64,
    pub ai_summary: Option<String>,
    pub created_at_ms: i64,
}

pub(crate) fn validate_version(data_version: i64) -> Result<(), WarehouseError> {
    if data_version < 1 {
        return Err(WarehouseError::InvalidData(format!(
            "data_version must be >= 1, got {data_version}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_news(draft: &NewsSentimentDraft) -> Result<(), WarehouseError> {
    if draft.news_url.trim().is_empty() {
        return Err(WarehouseError::InvalidData(String::from(
            "news_url must not be empty",
        )));
    }
    if !(-1.0..=1.0).contains(&draft.sentiment_score) {
        return Err(WarehouseError::InvalidData(format!(
            "sentiment_score {} is outside [-1, 1]",
            draft.sentiment_score
        )));
    }
    if !(0.0..=1.0).contains(&draft.confidence) {
        return Err(WarehouseError::InvalidData(format!(
            "confidence {} is outside [0, 1]",
            draft.confidence
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_dates_round_trip_through_text() {
        let date = IsoDate::parse("2026-03-07").expect("valid date");
        assert_eq!(date.format_iso(), "2026-03-07");
        assert!(IsoDate::parse("03/07/2026").is_err());
    }

    #[test]
    fn filing_keys_are_normalized() {
        let key = FilingKey::new(" aapl ", "10-k", IsoDate::parse("2025-11-01").expect("date"))
            .expect("key");
        assert_eq!(key.ticker, "AAPL");
        assert_eq!(key.filing_type, "10-K");
    }

    #[test]
    fn news_scores_outside_range_are_rejected() {
        let draft = NewsSentimentDraft {
            ticker: String::from("AAPL"),
            news_date: IsoDate::parse("2026-01-02").expect("date"),
            news_url: String::from("https://news.test/a"),
            headline: None,
            sentiment_score: 1.5,
            sentiment_label: String::from("bullish"),
            confidence: 0.9,
            ai_summary: None,
        };
        assert!(matches!(
            validate_news(&draft),
            Err(WarehouseError::InvalidData(_))
        ));
    }
}
