//! Receipt shipped alongside a successful retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adaptor_common::Request;

use crate::licence::Licence;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Receipt {
    pub collection_id: String,
    /// The request exactly as the caller submitted it.
    pub request: Request,
    pub request_timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub download_size: u64,
    pub filenames: Vec<String>,
    #[serde(rename = "licence")]
    pub licences: Vec<Licence>,
}

impl Receipt {
    pub fn new(
        collection_id: impl Into<String>,
        request: Request,
        download_size: u64,
        filenames: Vec<String>,
        licences: Vec<Licence>,
    ) -> Self {
        Self {
            collection_id: collection_id.into(),
            request,
            request_timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
            download_size,
            filenames,
            licences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_keys() {
        let receipt = Receipt::new(
            "cams-europe-air-quality-forecasts",
            Request::new().with("variable", "ozone"),
            1024,
            vec!["data.grib".to_string()],
            vec![Licence::new("licence-to-use-copernicus-products", 12)],
        );
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["collection-id"], "cams-europe-air-quality-forecasts");
        assert_eq!(json["download-size"], 1024);
        assert_eq!(json["request"]["variable"], "ozone");
        assert_eq!(json["licence"][0]["revision"], 12);
        assert!(json["request-id"].is_string());
    }
}
