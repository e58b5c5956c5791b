//! Request cost estimation from request shape alone.

use serde::{Deserialize, Serialize};

use adaptor_common::{count_dates, Request};
use definitions::ProductType;

use crate::error::{AdaptorError, Result};

/// Fields that multiply the number of retrieved fields.
pub const DIMENSION_KEYS: [&str; 7] = ["variable", "model", "type", "level", "date", "time", "step"];

/// Estimated size of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Number of fields the request addresses.
    pub fields: u64,
    /// Estimated download size in bytes.
    pub size: u64,
    /// Estimated processing time in seconds, zero when unknown.
    #[serde(default)]
    pub time: u64,
}

fn overflow() -> AdaptorError {
    AdaptorError::Estimation("field count overflows".to_string())
}

/// Number of values selected for `key`, one when absent.
fn value_count(request: &Request, key: &str) -> Result<u64> {
    let values = request
        .values(key)
        .map_err(|e| AdaptorError::Estimation(e.to_string()))?;
    match values {
        None => Ok(1),
        Some(values) if key == "date" => {
            count_dates(&values).map_err(|e| AdaptorError::Estimation(e.to_string()))
        }
        Some(values) => Ok(values.len() as u64),
    }
}

/// Number of fields `request` addresses.
///
/// Analysis products have no lead time and count one step whatever the
/// `step` selection.
pub fn count_fields(request: &Request) -> Result<u64> {
    let steps = value_count(request, "step")?;
    let type_steps = match request
        .values("type")
        .map_err(|e| AdaptorError::Estimation(e.to_string()))?
    {
        None => steps,
        Some(types) => types.iter().try_fold(0u64, |total, t| {
            let per_type = match ProductType::from_request_value(t) {
                Some(ProductType::Analysis) => 1,
                _ => steps,
            };
            total.checked_add(per_type).ok_or_else(overflow)
        })?,
    };

    DIMENSION_KEYS
        .iter()
        .filter(|key| !matches!(**key, "type" | "step"))
        .try_fold(type_steps, |fields, key| {
            fields.checked_mul(value_count(request, key)?).ok_or_else(overflow)
        })
}

/// Estimate the cost of `request`.
///
/// Absent dimensions count once. `max_fields`, when set, caps the number of
/// fields a single request may address.
pub fn estimate(request: &Request, granule_size: u64, max_fields: Option<u64>) -> Result<CostEstimate> {
    let fields = count_fields(request)?;

    if let Some(max) = max_fields {
        if fields > max {
            return Err(AdaptorError::Estimation(format!(
                "request addresses {} fields, the limit is {}",
                fields, max
            )));
        }
    }

    let size = fields
        .checked_mul(granule_size)
        .ok_or_else(|| AdaptorError::Estimation("size overflows".to_string()))?;

    Ok(CostEstimate {
        fields,
        size,
        time: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_of_dimensions() {
        let request = Request::new()
            .with("variable", json!(["O3_USI", "NO2_USI"]))
            .with("model", "ENS")
            .with("date", "2024-03-01/2024-03-03")
            .with("step", json!(["0", "1", "2", "3"]))
            .with("area", json!([70, -25, 30, 45]));
        let cost = estimate(&request, 100, None).unwrap();
        assert_eq!(cost.fields, 2 * 3 * 4);
        assert_eq!(cost.size, 2400);
    }

    #[test]
    fn test_analysis_counts_one_step() {
        let steps = json!(["0", "1", "2", "3"]);
        let analysis = Request::new().with("type", "analysis").with("step", steps.clone());
        assert_eq!(estimate(&analysis, 1, None).unwrap().fields, 1);

        let both = Request::new()
            .with("type", json!(["forecast", "analysis"]))
            .with("step", steps)
            .with("date", "2024-03-01/2024-03-02");
        assert_eq!(estimate(&both, 1, None).unwrap().fields, 2 * (4 + 1));
    }

    #[test]
    fn test_long_date_range_is_counted() {
        let request = Request::new().with("date", "1900-01-01/2399-12-31");
        let cost = estimate(&request, 1, None).unwrap();
        assert!(cost.fields > 100_000);
        assert!(matches!(
            estimate(&request, 1, Some(1000)),
            Err(AdaptorError::Estimation(_))
        ));
    }

    #[test]
    fn test_max_fields() {
        let request = Request::new().with("step", json!(["0", "1", "2"]));
        assert!(estimate(&request, 1, Some(3)).is_ok());
        assert!(matches!(
            estimate(&request, 1, Some(2)),
            Err(AdaptorError::Estimation(_))
        ));
    }

    #[test]
    fn test_bad_date_and_overflow() {
        let request = Request::new().with("date", "not-a-date");
        assert!(matches!(estimate(&request, 1, None), Err(AdaptorError::Estimation(_))));

        let request = Request::new().with("step", json!(["0", "1"]));
        assert!(matches!(
            estimate(&request, u64::MAX, None),
            Err(AdaptorError::Estimation(_))
        ));
    }
}
