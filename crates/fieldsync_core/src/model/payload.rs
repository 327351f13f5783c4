//! Form-specific observation payloads and their validation rules.
//!
//! # Responsibility
//! - Define one typed payload per `FormType`.
//! - Validate user input and report every offending field at once.
//!
//! # Invariants
//! - Temperatures are finite and within `[-50, 50]` °C.
//! - Humidity is finite and within `[0, 100]` %.
//! - A payload is only valid for the form type it belongs to.

use crate::model::record::FormType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MIN_TEMPERATURE_C: f64 = -50.0;
pub const MAX_TEMPERATURE_C: f64 = 50.0;
pub const MIN_HUMIDITY_PCT: f64 = 0.0;
pub const MAX_HUMIDITY_PCT: f64 = 100.0;

/// One invalid input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// User-correctable validation failure listing every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError::new(field, message)],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of the offending fields, in report order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|err| err.field.as_str()).collect()
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed:")?;
        for err in &self.fields {
            write!(f, " {}: {};", err.field, err.message)?;
        }
        Ok(())
    }
}

impl Error for ValidationErrors {}

/// Leftover food portion recorded by the food monitoring sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodPortion {
    #[serde(rename = "All")]
    All,
    #[serde(rename = "3/4")]
    ThreeQuarters,
    #[serde(rename = "1/2")]
    Half,
    #[serde(rename = "1/4")]
    Quarter,
    #[serde(rename = "None")]
    None,
}

impl FoodPortion {
    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::ThreeQuarters => "3/4",
            Self::Half => "1/2",
            Self::Quarter => "1/4",
            Self::None => "None",
        }
    }
}

/// Prey type offered in enclosure monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodType {
    Chicks,
    Rats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodMonitoringObservation {
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leftover_food: Option<FoodPortion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedingObservation {
    pub feeding_details: String,
    pub health_status: String,
}

/// Daily health checklist ticked during enclosure rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthChecklist {
    pub regurgitating: bool,
    pub faeces: bool,
    pub in_blue: bool,
    pub shed: bool,
    pub clean: bool,
    pub urine: bool,
    pub water: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnclosureObservation {
    pub temperature: f64,
    pub humidity: f64,
    pub health: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_offered_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_type: Option<FoodType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_taken: Option<String>,
    #[serde(default)]
    pub checklist: HealthChecklist,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

/// Structured fields of one daily record, one variant per form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "kebab-case")]
pub enum FormPayload {
    FoodMonitoring(FoodMonitoringObservation),
    Feeding(FeedingObservation),
    EnclosureMonitoring(EnclosureObservation),
}

impl FormPayload {
    /// Form type this payload belongs to.
    pub fn form_type(&self) -> FormType {
        match self {
            Self::FoodMonitoring(_) => FormType::FoodMonitoring,
            Self::Feeding(_) => FormType::Feeding,
            Self::EnclosureMonitoring(_) => FormType::EnclosureMonitoring,
        }
    }

    /// Ambient temperature carried by the payload, if the form records one.
    pub fn temperature(&self) -> Option<f64> {
        match self {
            Self::FoodMonitoring(obs) => Some(obs.temperature),
            Self::EnclosureMonitoring(obs) => Some(obs.temperature),
            Self::Feeding(_) => None,
        }
    }

    /// Decodes the untagged JSON object a form UI produces.
    ///
    /// Fields are read one by one so every missing or mistyped field is
    /// reported by name. `payload` is only used when `value` is not an object.
    pub fn from_json(form_type: FormType, value: Value) -> Result<Self, ValidationErrors> {
        let Value::Object(object) = value else {
            return Err(ValidationErrors::single("payload", "must be a JSON object"));
        };
        let mut fields = JsonFields::new(&object);
        let decoded = match form_type {
            FormType::FoodMonitoring => {
                let temperature = fields.required("temperature");
                let leftover_food = fields.optional("leftoverFood");
                let notes = fields.optional("notes");
                temperature.map(|temperature| {
                    Self::FoodMonitoring(FoodMonitoringObservation {
                        temperature,
                        leftover_food,
                        notes,
                    })
                })
            }
            FormType::Feeding => {
                let feeding_details = fields.required("feedingDetails");
                let health_status = fields.required("healthStatus");
                feeding_details.zip(health_status).map(|(feeding_details, health_status)| {
                    Self::Feeding(FeedingObservation {
                        feeding_details,
                        health_status,
                    })
                })
            }
            FormType::EnclosureMonitoring => {
                let temperature = fields.required("temperature");
                let humidity = fields.required("humidity");
                let health = fields.required("health");
                let food_offered_quantity = fields.optional("foodOfferedQuantity");
                let food_type = fields.optional("foodType");
                let food_taken = fields.optional("foodTaken");
                let checklist: HealthChecklist = fields.optional("checklist").unwrap_or_default();
                let observation = fields.optional("observation");
                match (temperature, humidity, health) {
                    (Some(temperature), Some(humidity), Some(health)) => {
                        Some(Self::EnclosureMonitoring(EnclosureObservation {
                            temperature,
                            humidity,
                            health,
                            food_offered_quantity,
                            food_type,
                            food_taken,
                            checklist,
                            observation,
                        }))
                    }
                    _ => None,
                }
            }
        };
        match decoded {
            Some(payload) if fields.errors.is_empty() => Ok(payload),
            _ => Err(fields.errors),
        }
    }

    /// Validates this payload for submission under `expected` form type.
    ///
    /// # Errors
    /// - Returns every offending field; never stops at the first one.
    pub fn validate(&self, expected: FormType) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.form_type() != expected {
            errors.push(
                "payload",
                format!("payload is `{}` but form is `{expected}`", self.form_type()),
            );
            return Err(errors);
        }

        match self {
            Self::FoodMonitoring(obs) => {
                check_temperature(&mut errors, obs.temperature);
            }
            Self::Feeding(obs) => {
                check_required(&mut errors, "feedingDetails", &obs.feeding_details);
                check_required(&mut errors, "healthStatus", &obs.health_status);
            }
            Self::EnclosureMonitoring(obs) => {
                check_temperature(&mut errors, obs.temperature);
                check_range(
                    &mut errors,
                    "humidity",
                    obs.humidity,
                    MIN_HUMIDITY_PCT,
                    MAX_HUMIDITY_PCT,
                    "%",
                );
                check_required(&mut errors, "health", &obs.health);
                match obs.food_offered_quantity {
                    Some(quantity) if !quantity.is_finite() || quantity < 0.0 => {
                        errors.push("foodOfferedQuantity", "must be a non-negative number");
                    }
                    None if obs.food_taken.as_deref().is_some_and(|v| !v.trim().is_empty()) => {
                        errors.push("foodTaken", "requires foodOfferedQuantity");
                    }
                    _ => {}
                }
            }
        }

        errors.into_result()
    }
}

fn check_temperature(errors: &mut ValidationErrors, value: f64) {
    check_range(
        errors,
        "temperature",
        value,
        MIN_TEMPERATURE_C,
        MAX_TEMPERATURE_C,
        "°C",
    );
}

fn check_range(
    errors: &mut ValidationErrors,
    field: &str,
    value: f64,
    min: f64,
    max: f64,
    unit: &str,
) {
    if !value.is_finite() || value < min || value > max {
        errors.push(field, format!("must be between {min}{unit} and {max}{unit}"));
    }
}

/// Field-by-field reader over a UI object; collects decode failures.
struct JsonFields<'a> {
    object: &'a Map<String, Value>,
    errors: ValidationErrors,
}

impl<'a> JsonFields<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            errors: ValidationErrors::default(),
        }
    }

    /// Absent and `null` both read as `None`.
    fn optional<T: DeserializeOwned>(&mut self, name: &str) -> Option<T> {
        let value = self.object.get(name).filter(|value| !value.is_null())?;
        match T::deserialize(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                self.errors.push(name, format!("invalid value: {err}"));
                None
            }
        }
    }

    fn required<T: DeserializeOwned>(&mut self, name: &str) -> Option<T> {
        if self.object.get(name).map_or(true, Value::is_null) {
            self.errors.push(name, "is required");
            return None;
        }
        self.optional(name)
    }
}

fn check_required(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(field, "is required");
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EnclosureObservation, FeedingObservation, FoodMonitoringObservation, FoodPortion,
        FormPayload, HealthChecklist,
    };
    use crate::model::record::FormType;
    use serde_json::json;

    fn enclosure(temperature: f64, humidity: f64) -> EnclosureObservation {
        EnclosureObservation {
            temperature,
            humidity,
            health: "alert".to_string(),
            food_offered_quantity: None,
            food_type: None,
            food_taken: None,
            checklist: HealthChecklist::default(),
            observation: None,
        }
    }

    #[test]
    fn temperature_bounds_are_inclusive() {
        for temperature in [-50.0, 0.0, 50.0] {
            let payload = FormPayload::FoodMonitoring(FoodMonitoringObservation {
                temperature,
                leftover_food: Some(FoodPortion::Half),
                notes: None,
            });
            assert!(payload.validate(FormType::FoodMonitoring).is_ok());
        }
    }

    #[test]
    fn reports_every_offending_field() {
        let payload = FormPayload::EnclosureMonitoring(EnclosureObservation {
            health: "  ".to_string(),
            ..enclosure(61.0, f64::NAN)
        });
        let err = payload
            .validate(FormType::EnclosureMonitoring)
            .expect_err("three fields are invalid");
        assert_eq!(err.field_names(), vec!["temperature", "humidity", "health"]);
    }

    #[test]
    fn food_taken_requires_offered_quantity() {
        let payload = FormPayload::EnclosureMonitoring(EnclosureObservation {
            food_taken: Some("2".to_string()),
            ..enclosure(24.0, 40.0)
        });
        let err = payload
            .validate(FormType::EnclosureMonitoring)
            .expect_err("food taken without offered quantity");
        assert_eq!(err.field_names(), vec!["foodTaken"]);
    }

    #[test]
    fn rejects_payload_for_other_form() {
        let payload = FormPayload::Feeding(FeedingObservation {
            feeding_details: "fruit".to_string(),
            health_status: "ok".to_string(),
        });
        let err = payload
            .validate(FormType::FoodMonitoring)
            .expect_err("mismatched form");
        assert_eq!(err.field_names(), vec!["payload"]);
    }

    #[test]
    fn from_json_accepts_ui_shape_and_reports_decode_errors() {
        let payload = FormPayload::from_json(
            FormType::FoodMonitoring,
            json!({ "temperature": 24, "leftoverFood": "3/4" }),
        )
        .expect("valid ui payload");
        assert_eq!(payload.temperature(), Some(24.0));

        let minimal = FormPayload::from_json(FormType::FoodMonitoring, json!({ "temperature": 24 }))
            .expect("leftover food is optional");
        assert!(minimal.validate(FormType::FoodMonitoring).is_ok());

        let err = FormPayload::from_json(FormType::Feeding, json!({ "feedingDetails": "fruit" }))
            .expect_err("missing healthStatus");
        assert_eq!(err.field_names(), vec!["healthStatus"]);
    }

    #[test]
    fn from_json_names_each_missing_required_field() {
        let err = FormPayload::from_json(FormType::EnclosureMonitoring, json!({}))
            .expect_err("empty object");
        assert_eq!(err.field_names(), vec!["temperature", "humidity", "health"]);
    }

    #[test]
    fn from_json_names_mistyped_fields_alongside_missing_ones() {
        let err = FormPayload::from_json(
            FormType::EnclosureMonitoring,
            json!({ "temperature": "warm", "health": "ok", "foodType": "mice" }),
        )
        .expect_err("mistyped and missing fields");
        assert_eq!(err.field_names(), vec!["temperature", "humidity", "foodType"]);

        let err = FormPayload::from_json(
            FormType::FoodMonitoring,
            json!({ "temperature": null, "leftoverFood": "2/3" }),
        )
        .expect_err("null temperature and unknown portion");
        assert_eq!(err.field_names(), vec!["temperature", "leftoverFood"]);
    }

    #[test]
    fn from_json_rejects_non_object_as_payload() {
        let err = FormPayload::from_json(FormType::Feeding, json!([1, 2]))
            .expect_err("array payload");
        assert_eq!(err.field_names(), vec!["payload"]);
    }
}
