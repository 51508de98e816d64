//! Pharmacy skills: drug lookups, orders, and order status.
//!
//! The inventory and order book are plain in-memory tables seeded with
//! demo data. Result strings are spoken-language sentences, since they
//! are read aloud to a caller verbatim.

use chrono::{Duration, Local};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

const SALES_TAX_RATE: f64 = 0.08;
const PICKUP_LEAD_MINUTES: i64 = 30;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One stocked drug.
#[derive(Debug, Clone)]
pub struct DrugRecord {
    pub price: f64,
    pub stock: u32,
    pub requires_prescription: bool,
}

/// A placed order, kept until the process exits.
#[derive(Debug, Clone)]
pub struct Order {
    pub customer_name: String,
    pub drug_name: String,
    pub quantity: u32,
    pub total: f64,
    pub status: &'static str,
    pub pickup_time: String,
}

/// In-memory pharmacy state: what we stock and what has been ordered.
#[derive(Debug)]
pub struct PharmacyStore {
    inventory: HashMap<String, DrugRecord>,
    orders: HashMap<String, Order>,
}

/// Parameters for the `get_drug_info` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrugInfoParams {
    pub drug_name: String,
}

/// Parameters for the `place_order` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceOrderParams {
    pub drug_name: String,
    pub quantity: u32,
    pub customer_name: String,
}

/// Parameters for the `check_order_status` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderStatusParams {
    pub order_id: String,
}

impl Default for PharmacyStore {
    fn default() -> Self {
        let inventory = [
            ("aspirin", 5.99, 50, false),
            ("ibuprofen", 7.99, 20, false),
            ("acetaminophen", 6.49, 35, false),
            ("tylenol", 8.99, 40, false),
            ("advil", 9.49, 25, false),
            ("benadryl", 11.99, 15, false),
            ("zyrtec", 14.99, 30, false),
            ("claritin", 12.99, 28, false),
            ("pepto bismol", 8.49, 22, false),
            ("tums", 4.99, 60, false),
            ("amoxicillin", 15.99, 10, true),
            ("lisinopril", 12.49, 8, true),
            ("metformin", 9.99, 12, true),
        ]
        .into_iter()
        .map(|(name, price, stock, requires_prescription)| {
            (
                name.to_string(),
                DrugRecord {
                    price,
                    stock,
                    requires_prescription,
                },
            )
        })
        .collect();

        Self {
            inventory,
            orders: HashMap::new(),
        }
    }
}

impl PharmacyStore {
    /// Resolves a spoken drug name to an inventory key: exact match first,
    /// then a substring match in either direction.
    fn resolve(&self, drug_name: &str) -> Option<String> {
        let key = drug_name.to_lowercase().trim().to_string();
        if self.inventory.contains_key(&key) {
            return Some(key);
        }
        self.inventory
            .keys()
            .find(|name| name.contains(&key) || key.contains(name.as_str()))
            .cloned()
    }

    /// Price and availability of a drug.
    pub fn drug_info(&self, drug_name: &str) -> String {
        let Some(key) = self.resolve(drug_name) else {
            return format!(
                "Sorry, we don't carry {drug_name}. Would you like me to suggest an alternative?"
            );
        };
        let drug = &self.inventory[&key];
        if drug.stock == 0 {
            return format!("Sorry, {} is currently out of stock.", title_case(&key));
        }
        let prescription_note = if drug.requires_prescription {
            " (requires prescription)"
        } else {
            ""
        };
        format!(
            "{} is ${:.2} and we have {} units in stock{}.",
            title_case(&key),
            drug.price,
            drug.stock,
            prescription_note
        )
    }

    /// Places an order, decrementing stock on success.
    pub fn place_order(&mut self, drug_name: &str, quantity: u32, customer_name: &str) -> String {
        let Some(key) = self.resolve(drug_name) else {
            return format!("Sorry, we don't carry {drug_name}. Cannot place order.");
        };
        let drug = &self.inventory[&key];

        if drug.requires_prescription {
            return format!(
                "{} requires a prescription. Please bring your prescription to the pharmacy to complete this order.",
                title_case(&key)
            );
        }
        if drug.stock < quantity {
            return format!(
                "Sorry, we only have {} units of {} in stock. Would you like to order {} instead?",
                drug.stock,
                title_case(&key),
                drug.stock
            );
        }

        let order_id = order_code();
        let subtotal = drug.price * f64::from(quantity);
        let total = subtotal * (1.0 + SALES_TAX_RATE);
        let pickup_time = (Local::now() + Duration::minutes(PICKUP_LEAD_MINUTES))
            .format("%I:%M %p")
            .to_string();

        self.orders.insert(
            order_id.clone(),
            Order {
                customer_name: customer_name.to_string(),
                drug_name: key.clone(),
                quantity,
                total,
                status: "processing",
                pickup_time: pickup_time.clone(),
            },
        );
        if let Some(record) = self.inventory.get_mut(&key) {
            record.stock -= quantity;
        }
        info!(order_id = %order_id, drug = %key, quantity, "order placed");

        format!(
            "Order confirmed! Order ID: {order_id}. {quantity} units of {} for {customer_name}. \
             Total: ${total:.2} including tax. Ready for pickup at {pickup_time}.",
            title_case(&key)
        )
    }

    /// Looks up an existing order by its confirmation code.
    pub fn order_status(&self, order_id: &str) -> String {
        let key = order_id.to_uppercase().trim().to_string();
        let Some(order) = self.orders.get(&key) else {
            return format!(
                "I couldn't find an order with ID {order_id}. \
                 Please double-check the order number and try again."
            );
        };
        format!(
            "Order {key} for {}: {} units of {}. Status: {}. Ready for pickup at {}. Total: ${:.2}.",
            order.customer_name,
            order.quantity,
            title_case(&order.drug_name),
            order.status,
            order.pickup_time,
            order.total
        )
    }
}

/// Capitalizes each word of a lowercase inventory key for speech.
fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A six-character uppercase alphanumeric order code.
fn order_code() -> String {
    let mut rng = rand::rng();
    (0..6)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drug_info_known_drug() {
        let store = PharmacyStore::default();
        let reply = store.drug_info("aspirin");
        assert!(reply.contains("Aspirin"));
        assert!(reply.contains("$5.99"));
        assert!(reply.contains("50 units in stock"));
    }

    #[test]
    fn test_drug_info_partial_match() {
        let store = PharmacyStore::default();
        let reply = store.drug_info("pepto");
        assert!(reply.contains("Pepto Bismol"));
        assert!(reply.contains("$8.49"));
    }

    #[test]
    fn test_drug_info_is_case_insensitive() {
        let store = PharmacyStore::default();
        let reply = store.drug_info("  TYLENOL ");
        assert!(reply.contains("Tylenol"));
    }

    #[test]
    fn test_drug_info_prescription_note() {
        let store = PharmacyStore::default();
        let reply = store.drug_info("amoxicillin");
        assert!(reply.contains("(requires prescription)"));
    }

    #[test]
    fn test_drug_info_unknown_drug() {
        let store = PharmacyStore::default();
        let reply = store.drug_info("unobtainium");
        assert!(reply.contains("we don't carry unobtainium"));
    }

    #[test]
    fn test_drug_info_out_of_stock() {
        let mut store = PharmacyStore::default();
        store.inventory.get_mut("tums").unwrap().stock = 0;
        let reply = store.drug_info("tums");
        assert!(reply.contains("currently out of stock"));
    }

    #[test]
    fn test_place_order_decrements_stock() {
        let mut store = PharmacyStore::default();
        let reply = store.place_order("ibuprofen", 2, "John Smith");
        assert!(reply.starts_with("Order confirmed!"));
        assert!(reply.contains("2 units of Ibuprofen for John Smith"));
        assert_eq!(store.inventory["ibuprofen"].stock, 18);
        assert_eq!(store.orders.len(), 1);
    }

    #[test]
    fn test_place_order_includes_tax() {
        let mut store = PharmacyStore::default();
        store.place_order("aspirin", 1, "Jane");
        let order = store.orders.values().next().unwrap();
        assert!((order.total - 5.99 * 1.08).abs() < 1e-9);
    }

    #[test]
    fn test_place_order_prescription_required() {
        let mut store = PharmacyStore::default();
        let reply = store.place_order("lisinopril", 1, "Jane");
        assert!(reply.contains("requires a prescription"));
        assert_eq!(store.inventory["lisinopril"].stock, 8);
        assert!(store.orders.is_empty());
    }

    #[test]
    fn test_place_order_insufficient_stock() {
        let mut store = PharmacyStore::default();
        let reply = store.place_order("tums", 1000, "Jane");
        assert!(reply.contains("we only have 60 units"));
        assert_eq!(store.inventory["tums"].stock, 60);
    }

    #[test]
    fn test_place_order_unknown_drug() {
        let mut store = PharmacyStore::default();
        let reply = store.place_order("unobtainium", 1, "Jane");
        assert!(reply.contains("Cannot place order"));
    }

    #[test]
    fn test_order_status_round_trip() {
        let mut store = PharmacyStore::default();
        store.place_order("advil", 3, "Ada Lovelace");
        let order_id = store.orders.keys().next().unwrap().clone();

        let reply = store.order_status(&order_id.to_lowercase());
        assert!(reply.contains(&order_id));
        assert!(reply.contains("Ada Lovelace"));
        assert!(reply.contains("3 units of Advil"));
        assert!(reply.contains("processing"));
    }

    #[test]
    fn test_order_status_unknown_id() {
        let store = PharmacyStore::default();
        let reply = store.order_status("ZZZZZZ");
        assert!(reply.contains("couldn't find an order"));
    }

    #[test]
    fn test_order_code_shape() {
        let code = order_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_title_case_multi_word() {
        assert_eq!(title_case("pepto bismol"), "Pepto Bismol");
        assert_eq!(title_case("aspirin"), "Aspirin");
    }
}
