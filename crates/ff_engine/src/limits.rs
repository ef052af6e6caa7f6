//! Runtime caps.
//!
//! No silent defaults: absence of an override means the fixed defaults
//! apply, and an exceeded cap fails before the offending work starts.

use serde_json::Value;

use crate::EngineError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RuntimeLimits {
    pub max_canonical_records: usize,
    pub max_findings: usize,
    pub max_report_findings: usize,
}

pub const DEFAULT_LIMITS: RuntimeLimits = RuntimeLimits {
    max_canonical_records: 100_000,
    max_findings: 50_000,
    max_report_findings: 10_000,
};

/// Optional explicit overrides for tests / controlled environments.
pub fn limits_from_parameters(
    parameters: &serde_json::Map<String, Value>,
) -> Result<RuntimeLimits, EngineError> {
    Ok(RuntimeLimits {
        max_canonical_records: maybe_limit(parameters, "max_canonical_records")?
            .unwrap_or(DEFAULT_LIMITS.max_canonical_records),
        max_findings: maybe_limit(parameters, "max_findings")?
            .unwrap_or(DEFAULT_LIMITS.max_findings),
        max_report_findings: maybe_limit(parameters, "max_report_findings")?
            .unwrap_or(DEFAULT_LIMITS.max_report_findings),
    })
}

fn maybe_limit(
    parameters: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<usize>, EngineError> {
    let value = match parameters.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let parsed: Option<u64> = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n > 0 => Ok(Some(n as usize)),
        _ => Err(EngineError::RuntimeLimitInvalid(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_absent() {
        let limits = limits_from_parameters(&serde_json::Map::new()).unwrap();
        assert_eq!(limits, DEFAULT_LIMITS);
    }

    #[test]
    fn overrides_parse_from_number_or_string() {
        let params = json!({"max_canonical_records": 5, "max_findings": "7"})
            .as_object()
            .unwrap()
            .clone();
        let limits = limits_from_parameters(&params).unwrap();
        assert_eq!(limits.max_canonical_records, 5);
        assert_eq!(limits.max_findings, 7);
        assert_eq!(limits.max_report_findings, DEFAULT_LIMITS.max_report_findings);
    }

    #[test]
    fn zero_and_garbage_are_invalid() {
        for bad in [json!({"max_findings": 0}), json!({"max_findings": "x"})] {
            let params = bad.as_object().unwrap().clone();
            assert!(matches!(
                limits_from_parameters(&params).unwrap_err(),
                EngineError::RuntimeLimitInvalid(_)
            ));
        }
    }
}
