//! `POST /incoming` payload.
//!
//! Field names are the short keys the scrapers send: `c` source, `t` time,
//! `s` store, `p` product, `v` value.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use pricing::{Observation, ProductId, SourceId, StoreId};

use crate::error::ValidationError;

#[derive(Debug, Default, Deserialize)]
pub struct IncomingPrice {
    pub c: Option<SourceId>,
    pub t: Option<String>,
    pub s: Option<StoreId>,
    pub p: Option<ProductId>,
    pub v: Option<f64>,
}

impl IncomingPrice {
    /// Ids must be present and non-zero and the timestamp non-empty. The
    /// price only has to be present, so a zero price is accepted.
    pub fn into_observation(self) -> Result<Observation, ValidationError> {
        let source_id = nonzero(self.c)?;
        let store_id = nonzero(self.s)?;
        let product_id = nonzero(self.p)?;
        let price = self.v.ok_or(ValidationError::MissingFields)?;

        let raw_time = self
            .t
            .filter(|t| !t.trim().is_empty())
            .ok_or(ValidationError::MissingFields)?;
        let observed_at = parse_timestamp(&raw_time)?;

        Ok(Observation {
            source_id,
            observed_at,
            store_id,
            product_id,
            price,
        })
    }
}

fn nonzero(id: Option<i64>) -> Result<i64, ValidationError> {
    id.filter(|id| *id != 0).ok_or(ValidationError::MissingFields)
}

/// RFC 3339, or a bare `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidTimestamp(raw.to_string()))
}
