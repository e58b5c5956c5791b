//! Product types (forecast vs analysis) and their GRIB encodings.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::signature::GribSignature;

/// Kind of product a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    Forecast,
    Analysis,
}

impl ProductType {
    /// All product types in matching order.
    pub const ALL: [ProductType; 2] = [ProductType::Forecast, ProductType::Analysis];

    /// Request value used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Forecast => "FORECAST",
            ProductType::Analysis => "ANALYSIS",
        }
    }

    pub fn from_request_value(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "FORECAST" => Some(ProductType::Forecast),
            "ANALYSIS" => Some(ProductType::Analysis),
            _ => None,
        }
    }

    /// GRIB encoding of the product type.
    pub fn signature(&self) -> GribSignature {
        match self {
            ProductType::Forecast => GribSignature::new().with("typeOfProcessedData", "fc"),
            ProductType::Analysis => GribSignature::new()
                .with("typeOfProcessedData", "an")
                .with("forecastTime", 0),
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
