//! Tests for request and response envelopes.
//!
//! Validates the wire format both sides agree on and the typed query
//! conversions.

use serde_json::{Value, json};

use spotbridge::protocol::{
    FormulaParams, OPERATIONS, Query, Rejection, RequestEnvelope, ResponseEnvelope, StatusCode,
};

// =============================================================================
// Request Tests
// =============================================================================

#[test]
fn test_request_wire_format() {
    let envelope = Query::MpClass(FormulaParams {
        formula: "G(a -> Fb)".to_string(),
    })
    .to_envelope()
    .unwrap();
    let wire: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

    assert_eq!(
        wire,
        json!({"query": "spot.mp_class", "params": {"formula": "G(a -> Fb)"}})
    );
}

#[test]
fn test_request_without_params_parses() {
    let envelope: RequestEnvelope = serde_json::from_str(r#"{"query":"spot.ping"}"#).unwrap();
    assert!(envelope.params.is_empty());
    assert!(Query::from_envelope(&envelope).is_ok());
}

#[test]
fn test_request_display_is_json() {
    let envelope = RequestEnvelope::new("spot.getAP").with_param("formula", "Fa & Gb");
    let shown = envelope.to_string();
    let parsed: Value = serde_json::from_str(&shown).unwrap();
    assert_eq!(parsed["params"]["formula"], json!("Fa & Gb"));
}

#[test]
fn test_numeric_params_as_strings_rejected() {
    let envelope = RequestEnvelope::new("spot.randLtl")
        .with_param("numAP", "three")
        .with_param("seed", 1);
    let rejection = Query::from_envelope(&envelope).unwrap_err();
    assert!(matches!(rejection, Rejection::InvalidParams { ref query, .. } if query == "spot.randLtl"));
}

#[test]
fn test_operations_are_namespaced() {
    for name in OPERATIONS {
        assert!(name.starts_with("spot."), "{name} is not namespaced");
        assert!(Query::is_supported(name));
    }
    assert!(!Query::is_supported("spot.nonexistent"));
    assert!(!Query::is_supported("mp_class"));
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_response_decodes_from_wire() {
    let wire = br#"{"response":{"query":"spot.contains","params":{"formula1":"Fa","formula2":"Ga"}},"status-code":200,"result":true}"#;
    let response = ResponseEnvelope::from_bytes(wire).unwrap();

    assert!(response.is_ok());
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.result, json!(true));
    assert_eq!(response.request["params"]["formula2"], json!("Ga"));
}

#[test]
fn test_unknown_status_code_rejected() {
    let wire = br#"{"response":null,"status-code":404,"result":"gone"}"#;
    assert!(ResponseEnvelope::from_bytes(wire).is_err());
}

#[test]
fn test_missing_result_is_null() {
    let wire = br#"{"response":null,"status-code":500}"#;
    let response = ResponseEnvelope::from_bytes(wire).unwrap();
    assert_eq!(response.result, Value::Null);
    assert_eq!(response.diagnostic(), "");
}

#[test]
fn test_error_responses_carry_diagnostic() {
    let request = json!({"query": "spot.translate", "params": {"formula": "G(a ->"}});

    let invalid = ResponseEnvelope::invalid_query(request.clone(), "bad params");
    assert_eq!(invalid.status.as_u16(), 400);
    assert_eq!(invalid.diagnostic(), "bad params");

    let failed = ResponseEnvelope::execution_error(request.clone(), "");
    assert_eq!(failed.status.as_u16(), 500);
    assert!(!failed.diagnostic().is_empty());
    assert_eq!(failed.request, request);
}
