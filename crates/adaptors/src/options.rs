//! Adaptor-level options carried inside the generic request mapping.
//!
//! The output format and the reduction directive are not backend fields: they
//! are taken out of the request before it is forwarded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use adaptor_common::{Request, DOWNLOAD_FORMAT_KEY, FORMAT_KEYS, POST_PROCESS_KEY};

use crate::error::{AdaptorError, Result};

/// Upper bound on alias expansions of one reduction method.
const MAX_ALIAS_EXPANSIONS: usize = 16;

/// Output file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Grib,
    Netcdf,
    /// Unrecognised value, kept for the adaptor to accept or reject.
    #[serde(untagged)]
    Other(String),
}

impl DataFormat {
    /// File extension of results in this format.
    pub fn extension(&self) -> &str {
        match self {
            DataFormat::Grib => "grib",
            DataFormat::Netcdf => "nc",
            DataFormat::Other(other) => other,
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Grib => f.write_str("grib"),
            DataFormat::Netcdf => f.write_str("netcdf"),
            DataFormat::Other(other) => f.write_str(other),
        }
    }
}

/// How result files are packaged for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadFormat {
    AsSource,
    Zip,
    Tgz,
}

impl DownloadFormat {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "as_source" => Ok(DownloadFormat::AsSource),
            "zip" => Ok(DownloadFormat::Zip),
            "tgz" => Ok(DownloadFormat::Tgz),
            other => Err(AdaptorError::Validation(format!(
                "download_format must be one of as_source, zip, tgz; got '{}'",
                other
            ))),
        }
    }
}

/// A reduction/aggregation directive with its aliases expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceSpec {
    pub method: String,
    /// Remaining directive parameters (`how`, `frequency`, ...).
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl ReduceSpec {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Options extracted from a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptorOptions {
    pub data_format: DataFormat,
    pub download_format: DownloadFormat,
    pub reduce: Option<ReduceSpec>,
}

impl Default for AdaptorOptions {
    fn default() -> Self {
        Self {
            data_format: DataFormat::Grib,
            download_format: DownloadFormat::AsSource,
            reduce: None,
        }
    }
}

/// Remove the format directives from `request`.
///
/// `data_format` takes precedence over `format`; both are removed.
pub fn extract_format(request: &mut Request) -> Result<(DataFormat, DownloadFormat)> {
    let mut raw = None;
    for key in FORMAT_KEYS.iter().rev() {
        if let Some(value) = request.remove(key) {
            raw = Some(value);
        }
    }

    let mut download_format = request
        .remove(DOWNLOAD_FORMAT_KEY)
        .map(|value| single_string(DOWNLOAD_FORMAT_KEY, value))
        .transpose()?
        .map(|s| DownloadFormat::parse(&s))
        .transpose()?;

    let data_format = match raw {
        None => DataFormat::Grib,
        Some(value) => {
            let value = single_string("data_format", value)?;
            match value.to_ascii_lowercase().as_str() {
                "grib" | "grib2" | "grb" | "grb2" => DataFormat::Grib,
                "netcdf" | "netcdf4" | "nc" => DataFormat::Netcdf,
                "netcdf.zip" | "netcdf_zip" | "netcdf4.zip" => {
                    download_format.get_or_insert(DownloadFormat::Zip);
                    DataFormat::Netcdf
                }
                _ => DataFormat::Other(value),
            }
        }
    };

    Ok((data_format, download_format.unwrap_or(DownloadFormat::AsSource)))
}

/// Remove the reduction directive from `request`, expanding method aliases.
pub fn extract_reduce(request: &mut Request) -> Result<Option<ReduceSpec>> {
    let Some(value) = request.remove(POST_PROCESS_KEY) else {
        return Ok(None);
    };

    let mut params: Map<String, Value> = match value {
        Value::Null => return Ok(None),
        Value::String(method) => {
            let mut params = Map::new();
            params.insert("method".to_string(), Value::String(method));
            params
        }
        Value::Object(map) => map,
        Value::Array(mut items) if items.len() == 1 => match items.remove(0) {
            Value::Object(map) => map,
            Value::String(method) => {
                let mut params = Map::new();
                params.insert("method".to_string(), Value::String(method));
                params
            }
            _ => return Err(invalid_post_process()),
        },
        _ => return Err(invalid_post_process()),
    };

    let mut expansions = 0;
    loop {
        let method = match params.get("method") {
            Some(Value::String(method)) => method.clone(),
            _ => {
                return Err(AdaptorError::Validation(
                    "post_process requires a string 'method'".to_string(),
                ))
            }
        };
        let Some(alias) = method_alias(&method) else {
            params.remove("method");
            return Ok(Some(ReduceSpec {
                method,
                params: params.into_iter().collect(),
            }));
        };
        expansions += 1;
        if expansions > MAX_ALIAS_EXPANSIONS {
            return Err(AdaptorError::Validation(format!(
                "post_process method '{}' does not resolve",
                method
            )));
        }
        for (key, value) in alias {
            params.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
}

/// Shorthand methods and the parameters they stand for.
fn method_alias(method: &str) -> Option<&'static [(&'static str, &'static str)]> {
    let alias: &'static [(&'static str, &'static str)] = match method {
        "daily_statistics" => &[("method", "temporal_reduction"), ("frequency", "day")],
        "monthly_statistics" => &[("method", "temporal_reduction"), ("frequency", "month")],
        "daily_mean" => &[("method", "daily_statistics"), ("how", "mean")],
        "daily_median" => &[("method", "daily_statistics"), ("how", "median")],
        "daily_min" => &[("method", "daily_statistics"), ("how", "min")],
        "daily_max" => &[("method", "daily_statistics"), ("how", "max")],
        "monthly_mean" => &[("method", "monthly_statistics"), ("how", "mean")],
        "monthly_median" => &[("method", "monthly_statistics"), ("how", "median")],
        "monthly_min" => &[("method", "monthly_statistics"), ("how", "min")],
        "monthly_max" => &[("method", "monthly_statistics"), ("how", "max")],
        _ => return None,
    };
    Some(alias)
}

fn invalid_post_process() -> AdaptorError {
    AdaptorError::Validation("post_process must be a method name or a mapping".to_string())
}

/// A directive given as a string or a one-element list of strings.
fn single_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Array(items) if items.len() > 1 => Err(AdaptorError::Validation(format!(
            "Only one value of {} is allowed",
            key
        ))),
        Value::Array(mut items) if items.len() == 1 => match items.remove(0) {
            Value::String(s) => Ok(s),
            _ => Err(AdaptorError::Validation(format!("{} must be a string", key))),
        },
        _ => Err(AdaptorError::Validation(format!("{} must be a string", key))),
    }
}
