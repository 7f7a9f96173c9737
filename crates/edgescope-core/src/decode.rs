//! Payload decoders for proxy store values.
//!
//! The orchestrator mirrors its internal structures into the proxy store as
//! loosely-structured text:
//!
//! ```text
//! instance:{logical}          {"Function": [{..., "workflow_id": W, "spec": {"id": C}},
//!                                          ["InstanceId(node_id: N, function_id: P)", ...]]}
//! node:health:{node}          sorted set of JSON health readings scored by timestamp
//! performance:{physical}:*    sorted set of "{timestamp}:{value}" scored by timestamp
//! ```
//!
//! Every decoder is pure. Malformed input is reported as
//! [`DecodeError::Malformed`] and never panics.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::DecodeError;
use crate::types::{HealthMetrics, Identifier, InstanceRecord};

static PLACEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"node_id:\s*([\w-]+),\s*function_id:\s*([\w-]+)").expect("static placement pattern")
});

/// Where one replica of a function runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub node_uuid: Identifier,
    pub physical_uuid: Identifier,
}

/// The fields of a function instance entity that the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntity {
    pub workflow_id: Identifier,
    pub class_id: Identifier,
    pub placements: Vec<Placement>,
    /// Placement strings that did not match the expected shape.
    pub rejected_placements: usize,
}

impl FunctionEntity {
    /// One [`InstanceRecord`] per physical placement.
    pub fn records(&self, logical_uuid: &str) -> Vec<InstanceRecord> {
        self.placements
            .iter()
            .map(|p| InstanceRecord {
                logical_uuid: logical_uuid.to_string(),
                physical_uuid: p.physical_uuid.clone(),
                node_uuid: p.node_uuid.clone(),
                workflow_uuid: self.workflow_id.clone(),
                class_id: self.class_id.clone(),
            })
            .collect()
    }
}

/// A decoded `instance:*` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInstanceEntity {
    Function(FunctionEntity),
    /// Resource instances and anything else without function metadata.
    NonFunction,
}

fn malformed(msg: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(msg.into())
}

/// Decode an instance entity.
///
/// Objects without a `Function` field decode to [`RawInstanceEntity::NonFunction`]
/// so callers can skip them silently.
pub fn decode_instance(raw: &str) -> Result<RawInstanceEntity, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("instance payload is not a JSON object"))?;

    let Some(function) = object.get("Function") else {
        return Ok(RawInstanceEntity::NonFunction);
    };

    let parts = function
        .as_array()
        .ok_or_else(|| malformed("Function field is not an array"))?;
    let (request, placements) = match parts.as_slice() {
        [request, placements, ..] => (request, placements),
        _ => return Err(malformed("Function field has fewer than two elements")),
    };

    let workflow_id = request
        .get("workflow_id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("function request without workflow_id"))?;
    let class_id = request
        .pointer("/spec/id")
        .or_else(|| request.pointer("/code/function_class_id"))
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("function request without class id"))?;

    let placements = placements
        .as_array()
        .ok_or_else(|| malformed("function placements are not an array"))?;

    let mut entity = FunctionEntity {
        workflow_id: workflow_id.to_string(),
        class_id: class_id.to_string(),
        placements: Vec::with_capacity(placements.len()),
        rejected_placements: 0,
    };
    for placement in placements {
        match placement.as_str().and_then(parse_placement) {
            Some(p) => entity.placements.push(p),
            None => entity.rejected_placements += 1,
        }
    }
    Ok(RawInstanceEntity::Function(entity))
}

/// Parse `InstanceId(node_id: N, function_id: P)`.
pub fn parse_placement(s: &str) -> Option<Placement> {
    let caps = PLACEMENT_RE.captures(s)?;
    Some(Placement {
        node_uuid: caps[1].to_string(),
        physical_uuid: caps[2].to_string(),
    })
}

/// Decode one node health reading into an open metric map.
///
/// Doubled double-quotes are collapsed before parsing. Non-numeric fields
/// are ignored.
pub fn decode_node_health(raw: &str) -> Result<HealthMetrics, DecodeError> {
    let normalized = raw.replace("\"\"", "\"");
    let value: Value = serde_json::from_str(&normalized).map_err(|e| malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("health payload is not a JSON object"))?;

    Ok(object
        .iter()
        .filter_map(|(name, v)| v.as_f64().map(|n| (name.clone(), n)))
        .collect())
}

/// Decode a `{discriminant}:{value}` performance entry and return the value.
///
/// The discriminant (a timestamp duplicating the member's score) is checked
/// for being numeric and then discarded. `,` is accepted as delimiter too.
pub fn decode_performance_entry(raw: &str) -> Result<f64, DecodeError> {
    let fields: Vec<&str> = raw.split([':', ',']).collect();
    let [discriminant, value] = fields.as_slice() else {
        return Err(malformed(format!(
            "expected 2 fields in performance entry, found {}",
            fields.len()
        )));
    };

    parse_finite(discriminant)?;
    parse_finite(value)
}

fn parse_finite(field: &str) -> Result<f64, DecodeError> {
    let n: f64 = field
        .trim()
        .parse()
        .map_err(|_| malformed(format!("non-numeric field {field:?}")))?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(malformed(format!("non-finite field {field:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_payload(placements: &[&str]) -> String {
        serde_json::json!({
            "Function": [
                {
                    "spec": { "id": "C1", "function_type": "RUST_WASM", "version": "0.1" },
                    "annotations": {},
                    "workflow_id": "W1",
                    "replication_factor": null
                },
                placements
            ]
        })
        .to_string()
    }

    #[test]
    fn instance_with_one_placement_yields_one_record() {
        let raw = function_payload(&["InstanceId(node_id: N1, function_id: P1)"]);
        let RawInstanceEntity::Function(entity) = decode_instance(&raw).unwrap() else {
            panic!("expected a function entity");
        };
        let records = entity.records("L1");
        assert_eq!(
            records,
            vec![InstanceRecord {
                logical_uuid: "L1".into(),
                physical_uuid: "P1".into(),
                node_uuid: "N1".into(),
                workflow_uuid: "W1".into(),
                class_id: "C1".into(),
            }]
        );
    }

    #[test]
    fn replicas_yield_one_record_each() {
        let raw = function_payload(&[
            "InstanceId(node_id: N1, function_id: P1)",
            "InstanceId(node_id: N2, function_id: P2)",
        ]);
        let RawInstanceEntity::Function(entity) = decode_instance(&raw).unwrap() else {
            panic!("expected a function entity");
        };
        let records = entity.records("L1");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].node_uuid, "N2");
        assert_eq!(records[1].logical_uuid, "L1");
    }

    #[test]
    fn bad_placements_are_counted_not_fatal() {
        let raw = function_payload(&["garbage", "InstanceId(node_id: N1, function_id: P1)"]);
        let RawInstanceEntity::Function(entity) = decode_instance(&raw).unwrap() else {
            panic!("expected a function entity");
        };
        assert_eq!(entity.placements.len(), 1);
        assert_eq!(entity.rejected_placements, 1);
    }

    #[test]
    fn legacy_class_id_location_is_accepted() {
        let raw = serde_json::json!({
            "Function": [
                { "code": { "function_class_id": "legacy" }, "workflow_id": "W" },
                []
            ]
        })
        .to_string();
        let RawInstanceEntity::Function(entity) = decode_instance(&raw).unwrap() else {
            panic!("expected a function entity");
        };
        assert_eq!(entity.class_id, "legacy");
        assert!(entity.placements.is_empty());
    }

    #[test]
    fn resource_entity_is_non_function() {
        let raw = r#"{"Resource": [{"class_type": "http-ingress"}, "InstanceId(node_id: N, function_id: R)"]}"#;
        assert_eq!(decode_instance(raw).unwrap(), RawInstanceEntity::NonFunction);
    }

    #[test]
    fn invalid_instance_json_is_malformed() {
        assert!(matches!(decode_instance("{not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode_instance("[1, 2]"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode_instance(r#"{"Function": [{"spec": {"id": "C"}}, []]}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn node_health_keeps_numeric_metrics_only() {
        let metrics =
            decode_node_health(r#"{"proc_cpu_usage": 42, "mem_free": 1024.5, "label": "x"}"#)
                .unwrap();
        assert_eq!(metrics.get("proc_cpu_usage"), Some(&42.0));
        assert_eq!(metrics.get("mem_free"), Some(&1024.5));
        assert!(!metrics.contains_key("label"));
        assert!(!metrics.contains_key("gpu_load_perc"));
    }

    #[test]
    fn node_health_normalizes_doubled_quotes() {
        let metrics = decode_node_health(r#"{""mem_used"": 7}"#).unwrap();
        assert_eq!(metrics.get("mem_used"), Some(&7.0));
    }

    #[test]
    fn node_health_rejects_non_objects() {
        assert!(decode_node_health("[1]").is_err());
        assert!(decode_node_health("").is_err());
    }

    #[test]
    fn performance_entry_returns_value() {
        assert_eq!(decode_performance_entry("1700000000.25:0.0042").unwrap(), 0.0042);
        assert_eq!(decode_performance_entry("100,12.0").unwrap(), 12.0);
    }

    #[test]
    fn performance_entry_requires_two_numeric_fields() {
        assert!(decode_performance_entry("12.0").is_err());
        assert!(decode_performance_entry("1:2:3").is_err());
        assert!(decode_performance_entry("abc:1.0").is_err());
        assert!(decode_performance_entry("1.0:fast").is_err());
        assert!(decode_performance_entry("1.0:NaN").is_err());
    }
}
