//! 决策记录 → FHIR MedicationRequest

use nmdose_core::utils::round_to;
use nmdose_engine::DecisionRecord;
use serde_json::{json, Value};

pub const RADIOPHARM_SYSTEM: &str = "http://example.org/radiopharm";
pub const OVERRIDE_REASON_EXTENSION: &str =
    "http://example.org/fhir/StructureDefinition/override-reason";
const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// 将决策记录渲染为 MedicationRequest
///
/// 活度保留一位小数；人工调整时附加理由扩展和备注。
pub fn medication_request(record: &DecisionRecord) -> Value {
    let recommendation = &record.recommendation;
    let radiopharm = &recommendation.radiopharmaceutical;

    let mut notes = Vec::new();
    if let Some(note) = &record.note {
        notes.push(json!({ "text": note }));
    }
    if let Some(reason) = record.override_reason() {
        notes.push(json!({ "text": format!("Override reason: {}", reason) }));
    }

    let mut resource = json!({
        "resourceType": "MedicationRequest",
        "id": record.id.to_string(),
        "identifier": [{ "system": "urn:ietf:rfc:3986", "value": format!("urn:uuid:{}", record.id) }],
        "status": "active",
        "intent": "order",
        "subject": { "reference": record.order.patient_reference },
        "basedOn": [{ "reference": format!("ServiceRequest/{}", record.order.order_id) }],
        "authoredOn": record.decided_at.to_rfc3339(),
        "medicationCodeableConcept": {
            "coding": [{
                "system": RADIOPHARM_SYSTEM,
                "code": radiopharm.code,
                "display": radiopharm.display
            }],
            "text": radiopharm.display
        },
        "dosageInstruction": [{
            "text": format!("{} for {}", radiopharm.display, recommendation.study_type),
            "doseAndRate": [{
                "doseQuantity": {
                    "value": round_to(record.final_activity_mbq(), 1),
                    "unit": "MBq",
                    "system": UCUM_SYSTEM,
                    "code": "MBq"
                }
            }]
        }]
    });

    if !notes.is_empty() {
        resource["note"] = Value::Array(notes);
    }
    if let Some(reason) = record.override_reason() {
        resource["extension"] = json!([{
            "url": OVERRIDE_REASON_EXTENSION,
            "valueString": reason
        }]);
    }
    if let Some(previous) = record.supersedes {
        resource["priorPrescription"] = json!({
            "reference": format!("MedicationRequest/{}", previous)
        });
    }

    resource
}
