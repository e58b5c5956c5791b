//! Frontend → backend request translation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use adaptor_common::Request;
use definitions::{DefinitionKind, Registry};

use crate::error::{AdaptorError, Result};
use crate::options::{extract_format, extract_reduce, AdaptorOptions};

/// Backend-shaped request plus the options taken out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub backend: Request,
    pub options: AdaptorOptions,
}

/// Translate a caller request into its backend form.
///
/// Variable and model values are replaced by their backend codes; every other
/// field is forwarded untouched. The input request is never modified, and the
/// result depends only on the request and the registry.
pub fn normalize(raw: &Request, registry: &Registry) -> Result<NormalizedRequest> {
    let mut backend = raw.clone();

    let (data_format, download_format) = extract_format(&mut backend)?;
    let reduce = extract_reduce(&mut backend)?;

    for kind in [DefinitionKind::Variable, DefinitionKind::Model] {
        let key = kind.request_key();
        let Some(values) = backend.values(key)? else {
            continue;
        };

        let mut translated: Vec<Value> = Vec::with_capacity(values.len());
        let mut unknown = Vec::new();
        for value in &values {
            match registry.lookup_by_frontend_name(kind, value) {
                Ok(definition) => {
                    let code = Value::String(definition.backend_name().to_string());
                    if !translated.contains(&code) {
                        translated.push(code);
                    }
                }
                Err(_) => unknown.push(value.clone()),
            }
        }

        if !unknown.is_empty() {
            return Err(match kind {
                DefinitionKind::Variable => AdaptorError::UnknownVariable(unknown),
                DefinitionKind::Model => AdaptorError::UnknownModel(unknown),
            });
        }
        backend.set(key, Value::Array(translated));
    }

    debug!(
        fields = backend.len(),
        data_format = %data_format,
        reduce = reduce.is_some(),
        "Normalized request"
    );

    Ok(NormalizedRequest {
        backend,
        options: AdaptorOptions {
            data_format,
            download_format,
            reduce,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DataFormat;
    use serde_json::json;
    use test_utils::{definitions as docs, requests};

    fn registry() -> Registry {
        Registry::load(docs::SHIPPED).unwrap()
    }

    #[test]
    fn test_ozone_translates_to_backend_code() {
        let raw = Request::new().with("variable", "ozone");
        let normalized = normalize(&raw, &registry()).unwrap();
        assert_eq!(normalized.backend.get("variable"), Some(&json!(["O3_USI"])));
        assert_eq!(normalized.options, AdaptorOptions::default());
    }

    #[test]
    fn test_other_fields_pass_through() {
        let raw = Request::from_json_str(requests::OZONE_FORECAST).unwrap();
        let normalized = normalize(&raw, &registry()).unwrap();
        let backend = &normalized.backend;

        assert_eq!(backend.get("variable"), Some(&json!(["O3_USI", "NO2_USI"])));
        assert_eq!(backend.get("model"), Some(&json!(["ENS"])));
        assert_eq!(backend.get("date"), raw.get("date"));
        assert_eq!(backend.get("step"), raw.get("step"));
        assert!(!backend.contains_key("data_format"));
        assert_eq!(normalized.options.data_format, DataFormat::Grib);
    }

    #[test]
    fn test_normalize_is_pure() {
        let registry = registry();
        let raw = Request::from_json_str(requests::DAILY_MEAN).unwrap();
        let before = raw.clone();

        let first = normalize(&raw, &registry).unwrap();
        let second = normalize(&raw, &registry).unwrap();

        assert_eq!(raw, before);
        assert_eq!(
            first.backend.to_canonical_json(),
            second.backend.to_canonical_json()
        );
        assert_eq!(
            serde_json::to_string(&first.options).unwrap(),
            serde_json::to_string(&second.options).unwrap()
        );
    }

    #[test]
    fn test_unknown_variable_fails_whole_request() {
        let raw = Request::from_json_str(requests::UNKNOWN_VARIABLE).unwrap();
        assert_eq!(
            normalize(&raw, &registry()).unwrap_err(),
            AdaptorError::UnknownVariable(vec!["unobtainium".to_string()])
        );
    }

    #[test]
    fn test_unknown_model() {
        let raw = Request::new()
            .with("variable", "ozone")
            .with("model", json!(["ensemble", "hirlam"]));
        assert_eq!(
            normalize(&raw, &registry()).unwrap_err(),
            AdaptorError::UnknownModel(vec!["hirlam".to_string()])
        );
    }

    #[test]
    fn test_nested_values_rejected() {
        let raw = Request::new().with("variable", json!([["ozone"]]));
        assert!(matches!(
            normalize(&raw, &registry()),
            Err(AdaptorError::Request(_))
        ));
    }
}
