//! Name-based skill dispatch with a no-fail contract.
//!
//! The registry owns the shared stores and maps wire-level function names
//! to handlers. `dispatch` never surfaces an error to the caller: bad
//! parameters, unknown names, and even panicking handlers all collapse to
//! a spoken-language fallback sentence.

use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::appointments::{
    self, AppointmentBook, BookAppointmentParams, CancelAppointmentParams,
    CheckAppointmentParams, RequestCallbackParams, SlotsParams, VisaInfoParams,
};
use crate::pharmacy::{DrugInfoParams, OrderStatusParams, PharmacyStore, PlaceOrderParams};

/// Spoken fallback when the agent asks for a skill we never registered.
pub const UNKNOWN_SKILL_REPLY: &str =
    "I'm not sure how to help with that. Would you like to speak with a consultant?";

/// Spoken fallback when parameters are missing, malformed, or mistyped.
pub const MISSING_INFO_REPLY: &str =
    "I need a bit more information. Could you please provide the missing details?";

/// Spoken fallback when a handler fails outright.
pub const TECHNICAL_ISSUE_REPLY: &str =
    "I'm having a technical issue. Let me arrange a callback from our team.";

/// Why a handler could not produce a real answer. Never leaves the
/// registry; `dispatch` translates it into a fallback sentence.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("invalid parameters: {0}")]
    Params(#[from] serde_json::Error),
}

/// Mutable state shared by every skill.
#[derive(Debug, Default)]
pub struct SkillStore {
    pub pharmacy: PharmacyStore,
    pub appointments: AppointmentBook,
}

type Handler = fn(&mut SkillStore, Value) -> Result<String, SkillError>;

/// Registered skills plus the store they operate on. One registry serves
/// every concurrent call, so the store sits behind a mutex.
pub struct SkillRegistry {
    store: Mutex<SkillStore>,
    handlers: HashMap<&'static str, Handler>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
        handlers.insert("get_drug_info", get_drug_info);
        handlers.insert("place_order", place_order);
        handlers.insert("check_order_status", check_order_status);
        handlers.insert("get_available_slots", get_available_slots);
        handlers.insert("book_appointment", book_appointment);
        handlers.insert("get_visa_info", get_visa_info);
        handlers.insert("check_appointment", check_appointment);
        handlers.insert("cancel_appointment", cancel_appointment);
        handlers.insert("request_callback", request_callback);

        Self {
            store: Mutex::new(SkillStore::default()),
            handlers,
        }
    }

    /// Registered skill names, sorted for stable logs.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Runs the named skill and always hands back a sentence to speak.
    pub fn dispatch(&self, name: &str, params: Value) -> String {
        let Some(handler) = self.handlers.get(name) else {
            warn!(skill = %name, "unknown skill requested");
            return UNKNOWN_SKILL_REPLY.to_string();
        };

        info!(skill = %name, "dispatching skill");
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            handler(&mut store, params)
        }));

        match outcome {
            Ok(Ok(reply)) => {
                info!(skill = %name, reply_len = reply.len(), "skill completed");
                reply
            }
            Ok(Err(err)) => {
                error!(skill = %name, %err, "skill rejected parameters");
                MISSING_INFO_REPLY.to_string()
            }
            Err(_) => {
                error!(skill = %name, "skill panicked");
                TECHNICAL_ISSUE_REPLY.to_string()
            }
        }
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn get_drug_info(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: DrugInfoParams = serde_json::from_value(params)?;
    Ok(store.pharmacy.drug_info(&p.drug_name))
}

fn place_order(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: PlaceOrderParams = serde_json::from_value(params)?;
    Ok(store
        .pharmacy
        .place_order(&p.drug_name, p.quantity, &p.customer_name))
}

fn check_order_status(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: OrderStatusParams = serde_json::from_value(params)?;
    Ok(store.pharmacy.order_status(&p.order_id))
}

fn get_available_slots(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: SlotsParams = serde_json::from_value(params)?;
    Ok(store
        .appointments
        .available_slots(&p.date, p.visa_type.as_deref()))
}

fn book_appointment(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: BookAppointmentParams = serde_json::from_value(params)?;
    Ok(store.appointments.book(
        &p.customer_name,
        &p.phone_number,
        &p.date,
        &p.time,
        &p.visa_type,
    ))
}

fn get_visa_info(_store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: VisaInfoParams = serde_json::from_value(params)?;
    Ok(appointments::visa_info(
        &p.visa_type,
        p.destination_country.as_deref(),
    ))
}

fn check_appointment(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: CheckAppointmentParams = serde_json::from_value(params)?;
    Ok(store
        .appointments
        .check(p.confirmation_code.as_deref(), p.phone_number.as_deref()))
}

fn cancel_appointment(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: CancelAppointmentParams = serde_json::from_value(params)?;
    Ok(store
        .appointments
        .cancel(&p.confirmation_code, p.reason.as_deref()))
}

fn request_callback(store: &mut SkillStore, params: Value) -> Result<String, SkillError> {
    let p: RequestCallbackParams = serde_json::from_value(params)?;
    Ok(store.appointments.request_callback(
        &p.customer_name,
        &p.phone_number,
        p.inquiry_type.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn panicking_skill(_: &mut SkillStore, _: Value) -> Result<String, SkillError> {
        panic!("boom");
    }

    #[test]
    fn test_all_skills_registered() {
        let registry = SkillRegistry::new();
        assert_eq!(
            registry.names(),
            vec![
                "book_appointment",
                "cancel_appointment",
                "check_appointment",
                "check_order_status",
                "get_available_slots",
                "get_drug_info",
                "get_visa_info",
                "place_order",
                "request_callback",
            ]
        );
    }

    #[test]
    fn test_dispatch_known_skill() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch("get_drug_info", json!({"drug_name": "aspirin"}));
        assert!(reply.contains("$5.99"));
    }

    #[test]
    fn test_dispatch_unknown_skill() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch("launch_rocket", json!({}));
        assert_eq!(reply, UNKNOWN_SKILL_REPLY);
    }

    #[test]
    fn test_dispatch_missing_parameter() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch("place_order", json!({"drug_name": "aspirin"}));
        assert_eq!(reply, MISSING_INFO_REPLY);
    }

    #[test]
    fn test_dispatch_unexpected_parameter() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch(
            "get_drug_info",
            json!({"drug_name": "aspirin", "flavor": "cherry"}),
        );
        assert_eq!(reply, MISSING_INFO_REPLY);
    }

    #[test]
    fn test_dispatch_mistyped_parameter() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch(
            "place_order",
            json!({"drug_name": "aspirin", "quantity": "two", "customer_name": "Jane"}),
        );
        assert_eq!(reply, MISSING_INFO_REPLY);
    }

    #[test]
    fn test_dispatch_null_parameters() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch("get_drug_info", Value::Null);
        assert_eq!(reply, MISSING_INFO_REPLY);
    }

    #[test]
    fn test_dispatch_survives_panicking_handler() {
        let mut registry = SkillRegistry::new();
        registry.handlers.insert("explode", panicking_skill);

        assert_eq!(registry.dispatch("explode", json!({})), TECHNICAL_ISSUE_REPLY);
        // The store must stay usable after an unwind.
        let reply = registry.dispatch("get_drug_info", json!({"drug_name": "tums"}));
        assert!(reply.contains("$4.99"));
    }

    #[test]
    fn test_state_persists_across_dispatches() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch(
            "place_order",
            json!({"drug_name": "ibuprofen", "quantity": 2, "customer_name": "John Smith"}),
        );
        assert!(reply.starts_with("Order confirmed!"));

        let marker = "Order ID: ";
        let start = reply.find(marker).unwrap() + marker.len();
        let order_id = &reply[start..start + 6];

        let status = registry.dispatch("check_order_status", json!({"order_id": order_id}));
        assert!(status.contains(order_id));
        assert!(status.contains("processing"));
    }

    #[test]
    fn test_appointment_flow_through_registry() {
        let registry = SkillRegistry::new();
        let reply = registry.dispatch(
            "book_appointment",
            json!({
                "customer_name": "John Doe",
                "phone_number": "+15551234567",
                "date": "tomorrow",
                "time": "10:00 AM",
                "visa_type": "student",
            }),
        );
        // Tomorrow can land on a Sunday, when the office is closed.
        if reply.contains("closed on Sundays") {
            return;
        }
        assert!(reply.contains("Student Visa consultation"));

        let marker = "confirmation code is ";
        let start = reply.find(marker).unwrap() + marker.len();
        let code = &reply[start..start + 6];

        let check = registry.dispatch("check_appointment", json!({"confirmation_code": code}));
        assert!(check.contains("John Doe"));
    }
}
