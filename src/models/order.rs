//! The order domain model: a purchase receipt with its payment charge.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

/// The format charge dates are scraped in, e.g. "March 3, 2024".
const CHARGE_DATE_FORMAT: &[BorrowedFormatItem] =
    format_description!("[month repr:long] [day padding:none], [year]");

/// A purchase receipt scraped from an e-commerce account.
///
/// The `id` is the vendor's order number and identifies the order across
/// repeated submissions. `items` has set semantics: duplicates are dropped
/// when the order is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// The vendor's order number.
    pub id: String,
    /// A link back to the order page.
    pub href: String,
    /// The line item descriptions.
    pub items: Vec<String>,
    /// The order total.
    pub price: f64,
    /// The payment charge for the order.
    pub charge: Charge,
}

/// The payment sub-record of an [Order].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    /// The label of the card that was charged, e.g. "Visa ending in 1234".
    pub card: String,
    /// The amount charged to the card.
    pub amount: f64,
    /// The date the charge was made.
    pub date: ChargeDate,
}

/// The date a charge was made, as scraped from the order page.
///
/// Keeps the original string so persisted rows round-trip byte for byte,
/// alongside the parsed calendar date when the string is well-formed.
/// A date that does not parse is tolerated: it is logged once here and
/// sorts before every real date via [ChargeDate::sort_key].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChargeDate {
    raw: String,
    parsed: Option<Date>,
}

impl ChargeDate {
    /// Wrap a scraped date string, parsing it as "Month D, YYYY".
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let parsed = Date::parse(&raw, &CHARGE_DATE_FORMAT).ok();

        if parsed.is_none() {
            tracing::warn!("could not parse charge date {raw:?}");
        }

        Self { raw, parsed }
    }

    /// The original date string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The calendar date, if the string was well-formed.
    pub fn date(&self) -> Option<Date> {
        self.parsed
    }

    /// The key to order charges by date with.
    ///
    /// Unparseable dates compare as [Date::MIN] so they come last when
    /// sorting most recent first.
    pub fn sort_key(&self) -> Date {
        self.parsed.unwrap_or(Date::MIN)
    }
}

impl From<String> for ChargeDate {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<ChargeDate> for String {
    fn from(date: ChargeDate) -> Self {
        date.raw
    }
}

impl Display for ChargeDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
