//! FHIR 资源到核心数据模型的映射

use chrono::{DateTime, SecondsFormat, Utc};
use nmdose_core::utils::{generate_record_id, parse_fhir_datetime};
use nmdose_core::{DoseError, OrderContext, ProcedureCoding, Result, WeightObservation};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

pub const LOINC_SYSTEM: &str = "http://loinc.org";
pub const BODY_WEIGHT_CODE: &str = "29463-7";
const OBSERVATION_CATEGORY_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/observation-category";
const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// 已撤回的 Observation 状态，不能作为体重来源
const RETRACTED_STATUSES: [&str; 2] = ["entered-in-error", "cancelled"];

/// 从 ServiceRequest 提取检查申请上下文
pub fn order_from_service_request(resource: &Value) -> Result<OrderContext> {
    if let Some(resource_type) = resource.get("resourceType").and_then(Value::as_str) {
        if resource_type != "ServiceRequest" {
            return Err(DoseError::Fhir(format!(
                "期望 ServiceRequest, 实际为 {}",
                resource_type
            )));
        }
    }

    let order_id = resource
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| DoseError::Fhir("ServiceRequest.id 缺失".to_string()))?;

    let patient_reference = resource
        .pointer("/subject/reference")
        .and_then(Value::as_str)
        .ok_or_else(|| DoseError::Fhir("ServiceRequest.subject.reference 缺失".to_string()))?;

    let coding = resource
        .pointer("/code/coding/0")
        .ok_or_else(|| DoseError::MissingOrderCoding(format!("ServiceRequest/{}", order_id)))?;

    let code = coding
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| DoseError::MissingOrderCoding(format!("ServiceRequest/{}", order_id)))?;

    Ok(OrderContext::new(
        order_id,
        patient_reference,
        ProcedureCoding {
            system: coding
                .get("system")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            code: code.to_string(),
            display: coding
                .get("display")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
    ))
}

/// 从 Bundle / Observation 数组 / 单个 Observation 中提取该患者的体重测量
///
/// 数值不做正数校验，由体重解析负责拒绝。
pub fn weights_for_patient(resources: &Value, patient_reference: &str) -> Vec<WeightObservation> {
    let candidates: Vec<&Value> = match resources {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) if resources.get("resourceType").and_then(Value::as_str) == Some("Bundle") => resources
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(|e| e.get("resource")).collect())
            .unwrap_or_default(),
        Value::Object(_) => vec![resources],
        _ => Vec::new(),
    };

    let weights: Vec<WeightObservation> = candidates
        .into_iter()
        .filter(|obs| belongs_to(obs, patient_reference))
        .filter_map(weight_from_observation)
        .collect();

    debug!("Extracted {} weight observations for {}", weights.len(), patient_reference);
    weights
}

/// 将单个体重 Observation 转换为体重测量
///
/// 时间取 effectiveDateTime，其次 issued，最后 meta.lastUpdated。
/// 状态为 entered-in-error / cancelled 的测量被丢弃。
pub fn weight_from_observation(observation: &Value) -> Option<WeightObservation> {
    if !is_body_weight(observation) {
        return None;
    }

    let id = observation.get("id").and_then(Value::as_str);
    if let Some(status) = observation.get("status").and_then(Value::as_str) {
        if RETRACTED_STATUSES.contains(&status) {
            warn!("Ignoring weight observation {:?} with status {}", id, status);
            return None;
        }
    }

    let quantity = observation.get("valueQuantity")?;
    let value_kg = quantity.get("value").and_then(Value::as_f64)?;
    if !is_kilograms(quantity) {
        debug!("Skipping weight observation with non-kg unit: {}", quantity);
        return None;
    }

    let timestamp = ["/effectiveDateTime", "/issued", "/meta/lastUpdated"]
        .iter()
        .filter_map(|path| observation.pointer(path).and_then(Value::as_str))
        .find_map(parse_fhir_datetime);

    let observed_at = match timestamp {
        Some(at) => at,
        None => {
            warn!("Dropping weight observation {:?} without a usable timestamp", id);
            return None;
        }
    };

    Some(WeightObservation {
        value_kg,
        observed_at,
        source_id: id.map(str::to_string),
        recorded_at: observation
            .pointer("/meta/lastUpdated")
            .and_then(Value::as_str)
            .and_then(parse_fhir_datetime),
    })
}

/// 构建新的体重 Observation（vital-signs, LOINC 29463-7, kg）
///
/// 患者引用可为 `Patient/xxx` 或裸ID。
pub fn weight_observation(
    patient_reference: &str,
    value_kg: f64,
    effective: DateTime<Utc>,
) -> Result<Value> {
    let weight = WeightObservation::new(value_kg, effective)?;
    let subject = normalize_patient_reference(patient_reference);
    if subject.ends_with('/') {
        return Err(DoseError::Fhir("患者引用不能为空".to_string()));
    }

    let id = generate_record_id();
    info!(
        "Created weight observation {} for {}: {} kg",
        id, subject, weight.value_kg
    );

    Ok(json!({
        "resourceType": "Observation",
        "id": id.to_string(),
        "status": "final",
        "category": [{
            "coding": [{
                "system": OBSERVATION_CATEGORY_SYSTEM,
                "code": "vital-signs",
                "display": "Vital Signs"
            }]
        }],
        "code": {
            "coding": [{ "system": LOINC_SYSTEM, "code": BODY_WEIGHT_CODE, "display": "Body weight" }],
            "text": "Body weight"
        },
        "subject": { "reference": subject },
        "effectiveDateTime": weight.observed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        "valueQuantity": {
            "value": weight.value_kg,
            "unit": "kg",
            "system": UCUM_SYSTEM,
            "code": "kg"
        }
    }))
}

fn is_body_weight(observation: &Value) -> bool {
    observation
        .pointer("/code/coding")
        .and_then(Value::as_array)
        .map(|codings| {
            codings.iter().any(|c| {
                c.get("system").and_then(Value::as_str) == Some(LOINC_SYSTEM)
                    && c.get("code").and_then(Value::as_str) == Some(BODY_WEIGHT_CODE)
            })
        })
        .unwrap_or(false)
}

fn is_kilograms(quantity: &Value) -> bool {
    let unit = quantity.get("unit").and_then(Value::as_str).unwrap_or_default();
    let code = quantity.get("code").and_then(Value::as_str).unwrap_or_default();
    unit.eq_ignore_ascii_case("kg") || unit.to_ascii_lowercase().contains("kilogram") || code == "kg"
}

fn normalize_patient_reference(reference: &str) -> String {
    let reference = reference.trim();
    if reference.contains('/') {
        reference.to_string()
    } else {
        format!("Patient/{}", reference)
    }
}

/// 主体引用须指向同一资源类型和ID（允许绝对 URL 形式）
fn belongs_to(observation: &Value, patient_reference: &str) -> bool {
    let subject = match observation.pointer("/subject/reference").and_then(Value::as_str) {
        Some(subject) => subject,
        None => {
            debug!(
                "Skipping observation {:?} without subject",
                observation.get("id")
            );
            return false;
        }
    };
    let expected = normalize_patient_reference(patient_reference);
    subject == expected || subject.ends_with(&format!("/{}", expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn weight_obs(id: &str, value: f64, effective: &str) -> Value {
        json!({
            "resourceType": "Observation",
            "id": id,
            "status": "final",
            "code": { "coding": [{ "system": LOINC_SYSTEM, "code": BODY_WEIGHT_CODE, "display": "Body weight" }] },
            "subject": { "reference": "Patient/p1" },
            "effectiveDateTime": effective,
            "valueQuantity": { "value": value, "unit": "kg", "system": "http://unitsofmeasure.org", "code": "kg" }
        })
    }

    #[test]
    fn test_order_from_service_request() {
        let sr = json!({
            "resourceType": "ServiceRequest",
            "id": "sr-9",
            "status": "active",
            "intent": "order",
            "code": { "coding": [{ "system": "http://example.org/nuclear-medicine", "code": "MAG3", "display": "Renal Scan (99mTc-MAG3)" }] },
            "subject": { "reference": "Patient/p1" }
        });
        let order = order_from_service_request(&sr).unwrap();
        assert_eq!(order.order_id, "sr-9");
        assert_eq!(order.patient_reference, "Patient/p1");
        assert_eq!(order.coding.code, "MAG3");
        assert_eq!(order.coding.system, "http://example.org/nuclear-medicine");
        assert_eq!(order.coding.display.as_deref(), Some("Renal Scan (99mTc-MAG3)"));
    }

    #[test]
    fn test_service_request_without_coding() {
        let sr = json!({
            "resourceType": "ServiceRequest",
            "id": "sr-9",
            "code": { "text": "bone scan" },
            "subject": { "reference": "Patient/p1" }
        });
        assert!(matches!(
            order_from_service_request(&sr),
            Err(DoseError::MissingOrderCoding(_))
        ));
    }

    #[test]
    fn test_wrong_resource_type() {
        let obs = weight_obs("o1", 20.0, "2024-01-01");
        assert!(matches!(order_from_service_request(&obs), Err(DoseError::Fhir(_))));
    }

    #[test]
    fn test_weights_from_bundle() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                { "resource": weight_obs("o1", 20.5, "2024-05-01T08:00:00Z") },
                { "resource": {
                    "resourceType": "Observation",
                    "id": "bp",
                    "code": { "coding": [{ "system": LOINC_SYSTEM, "code": "8480-6" }] },
                    "subject": { "reference": "Patient/p1" },
                    "effectiveDateTime": "2024-05-01",
                    "valueQuantity": { "value": 120, "unit": "mmHg" }
                } },
                { "resource": weight_obs("other", 70.0, "2024-05-02") }
            ]
        });
        let mut bundle = bundle;
        bundle["entry"][2]["resource"]["subject"]["reference"] = json!("Patient/p2");

        let weights = weights_for_patient(&bundle, "Patient/p1");
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].value_kg, 20.5);
        assert_eq!(weights[0].source_id.as_deref(), Some("o1"));
        assert_eq!(
            weights[0].observed_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_timestamp_fallback_order() {
        let mut obs = weight_obs("o1", 12.0, "");
        obs.as_object_mut().unwrap().remove("effectiveDateTime");
        obs["issued"] = json!("2024-02-03T04:05:06Z");
        obs["meta"] = json!({ "lastUpdated": "2024-03-01T00:00:00Z" });
        let weight = weight_from_observation(&obs).unwrap();
        assert_eq!(weight.observed_at, Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap());

        obs.as_object_mut().unwrap().remove("issued");
        let weight = weight_from_observation(&obs).unwrap();
        assert_eq!(weight.observed_at, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        obs.as_object_mut().unwrap().remove("meta");
        assert!(weight_from_observation(&obs).is_none());
    }

    #[test]
    fn test_non_kilogram_unit_is_skipped() {
        let mut obs = weight_obs("o1", 44.0, "2024-01-01");
        obs["valueQuantity"] = json!({ "value": 44.0, "unit": "lb", "code": "[lb_av]" });
        assert!(weight_from_observation(&obs).is_none());
    }

    #[test]
    fn test_retracted_observations_are_dropped() {
        for status in ["entered-in-error", "cancelled"] {
            let mut obs = weight_obs("typo", 200.0, "2024-06-29");
            obs["status"] = json!(status);
            assert!(weight_from_observation(&obs).is_none());
        }

        let mut amended = weight_obs("amended", 20.0, "2024-06-29");
        amended["status"] = json!("amended");
        assert!(weight_from_observation(&amended).is_some());
    }

    #[test]
    fn test_retracted_latest_does_not_shadow_valid_weight() {
        let mut typo = weight_obs("typo", 200.0, "2024-06-29");
        typo["status"] = json!("entered-in-error");
        let weights = weights_for_patient(&json!([weight_obs("good", 20.0, "2024-06-20"), typo]), "Patient/p1");
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].source_id.as_deref(), Some("good"));
    }

    #[test]
    fn test_recorded_at_from_last_updated() {
        let mut obs = weight_obs("corrected", 20.0, "2024-06-28");
        obs["meta"] = json!({ "lastUpdated": "2024-06-29T10:00:00Z" });
        let weight = weight_from_observation(&obs).unwrap();
        assert_eq!(weight.observed_at, Utc.with_ymd_and_hms(2024, 6, 28, 0, 0, 0).unwrap());
        assert_eq!(
            weight.recorded_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 29, 10, 0, 0).unwrap())
        );

        let plain = weight_from_observation(&weight_obs("plain", 20.0, "2024-06-28")).unwrap();
        assert!(plain.recorded_at.is_none());
    }

    #[test]
    fn test_subject_must_match_type_and_id() {
        let mut group = weight_obs("g", 30.0, "2024-06-29");
        group["subject"]["reference"] = json!("Group/p1");
        let mut orphan = weight_obs("orphan", 31.0, "2024-06-29");
        orphan.as_object_mut().unwrap().remove("subject");
        let mut absolute = weight_obs("abs", 32.0, "2024-06-29");
        absolute["subject"]["reference"] = json!("https://fhir.example.org/r4/Patient/p1");

        let weights = weights_for_patient(&json!([group, orphan, absolute]), "Patient/p1");
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].source_id.as_deref(), Some("abs"));

        let by_bare_id = weights_for_patient(&json!([weight_obs("w", 20.0, "2024-06-29")]), "p1");
        assert_eq!(by_bare_id.len(), 1);
    }

    #[test]
    fn test_new_weight_observation_is_read_back() {
        let effective = Utc.with_ymd_and_hms(2024, 6, 30, 9, 15, 0).unwrap();
        let resource = weight_observation("p1", 21.4, effective).unwrap();

        assert_eq!(resource["status"], "final");
        assert_eq!(resource["category"][0]["coding"][0]["code"], "vital-signs");
        assert_eq!(resource["subject"]["reference"], "Patient/p1");
        assert_eq!(resource["effectiveDateTime"], "2024-06-30T09:15:00Z");

        let weight = weight_from_observation(&resource).unwrap();
        assert_eq!(weight.value_kg, 21.4);
        assert_eq!(weight.observed_at, effective);
        assert_eq!(weight.source_id.as_deref(), resource["id"].as_str());
        assert_eq!(weights_for_patient(&resource, "Patient/p1").len(), 1);
    }

    #[test]
    fn test_new_weight_observation_rejects_non_positive() {
        let now = Utc::now();
        for value in [0.0, -3.0, f64::NAN] {
            assert!(matches!(
                weight_observation("Patient/p1", value, now),
                Err(DoseError::InvalidWeight { .. })
            ));
        }
        assert!(matches!(
            weight_observation("  ", 20.0, now),
            Err(DoseError::Fhir(_))
        ));
    }

    #[test]
    fn test_non_positive_values_are_passed_through() {
        let weights = weights_for_patient(&json!([weight_obs("o1", 0.0, "2024-01-01")]), "Patient/p1");
        assert_eq!(weights.len(), 1);
        assert!(!weights[0].is_valid());
    }
}
