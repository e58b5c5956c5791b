//! Generators for decoded field headers and fake GRIB payloads.

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::fixtures::grib;

/// Header of one decoded chemical-constituent message.
///
/// `product` is `"fc"` or `"an"`; `date` is `YYYYMMDD`; `time` is `HHMM`.
pub fn chemical_header(
    constituent: i64,
    model: (i64, i64),
    product: &str,
    date: i64,
    time: i64,
    step: i64,
    level: i64,
) -> Value {
    json!({
        "discipline": 0,
        "parameterCategory": 20,
        "parameterNumber": 0,
        "constituentType": constituent,
        "productDefinitionTemplateNumber": grib::CHEMICAL_TEMPLATE,
        "centre": model.0,
        "subCentre": model.1,
        "typeOfProcessedData": product,
        "dataDate": date,
        "dataTime": time,
        "forecastTime": step,
        "level": level,
    })
}

/// Surface ozone forecast from the ensemble median.
pub fn ozone_forecast_header(date: i64, step: i64) -> Value {
    chemical_header(grib::OZONE, grib::ENSEMBLE, "fc", date, 0, step, 0)
}

/// A byte string shaped like a GRIB message: `GRIB`, padding, `7777`.
pub fn fake_grib_message(tag: u8, len: usize) -> Vec<u8> {
    let len = len.max(8);
    let mut bytes = Vec::with_capacity(len);
    bytes.extend_from_slice(b"GRIB");
    bytes.resize(len - 4, tag);
    bytes.extend_from_slice(b"7777");
    bytes
}

/// Gzip-compress a payload.
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .expect("Failed to write to gzip encoder");
    encoder.finish().expect("Failed to finish gzip stream")
}

/// Write `<name>.grib` and its `<name>.json` header sidecar into `dir`.
pub fn write_field(dir: &Path, name: &str, header: &Value, payload: &[u8]) {
    fs::write(dir.join(format!("{}.grib", name)), payload).expect("Failed to write payload");
    fs::write(
        dir.join(format!("{}.json", name)),
        serde_json::to_vec_pretty(header).expect("Failed to serialize header"),
    )
    .expect("Failed to write header sidecar");
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_fake_grib_message_framing() {
        let msg = fake_grib_message(1, 32);
        assert_eq!(msg.len(), 32);
        assert!(msg.starts_with(b"GRIB"));
        assert!(msg.ends_with(b"7777"));
    }

    #[test]
    fn test_gzip_roundtrip() {
        let msg = fake_grib_message(2, 64);
        let mut decoded = Vec::new();
        GzDecoder::new(gzip(&msg).as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_ozone_header_keys() {
        let header = ozone_forecast_header(20240301, 3);
        assert_eq!(header["constituentType"], 0);
        assert_eq!(header["typeOfProcessedData"], "fc");
        assert_eq!(header["forecastTime"], 3);
    }
}
