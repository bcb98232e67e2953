//! Conversation and order data carried by a session.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// When the message was appended, serialized as Unix milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One line of an order in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl OrderItem {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            size: None,
            price,
            quantity: None,
            special_instructions: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.special_instructions = Some(instructions.into());
        self
    }
}

/// Partial update for the scalar fields of an [`OrderContext`].
///
/// Each field has three states: absent (`None`) keeps the stored value,
/// `Some(None)` (JSON `null`) unsets it, and `Some(Some(v))` overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderContextUpdate {
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<Option<String>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<Option<String>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<Option<String>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub delivery_preference: Option<Option<String>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<Option<String>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<Option<String>>,
}

// Only called for keys present in the input, so `null` becomes `Some(None)`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Order in progress for a session.
///
/// `order_total` is derived from `current_order` and is only reachable through
/// the item operations, so it always equals the sum of line-item prices.
/// Quantity is not factored in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderContext {
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub delivery_address: Option<String>,
    pub delivery_preference: Option<String>,
    pub payment_method: Option<String>,
    pub special_instructions: Option<String>,
    current_order: Vec<OrderItem>,
    order_total: f64,
}

impl OrderContext {
    pub fn items(&self) -> &[OrderItem] {
        &self.current_order
    }

    pub fn total(&self) -> f64 {
        self.order_total
    }

    /// Shallow merge: only fields present in `update` overwrite.
    pub fn apply(&mut self, update: OrderContextUpdate) {
        let OrderContextUpdate {
            customer_name,
            phone_number,
            delivery_address,
            delivery_preference,
            payment_method,
            special_instructions,
        } = update;
        merge(&mut self.customer_name, customer_name);
        merge(&mut self.phone_number, phone_number);
        merge(&mut self.delivery_address, delivery_address);
        merge(&mut self.delivery_preference, delivery_preference);
        merge(&mut self.payment_method, payment_method);
        merge(&mut self.special_instructions, special_instructions);
    }

    pub(crate) fn push_item(&mut self, item: OrderItem) {
        self.current_order.push(item);
        self.recompute_total();
    }

    /// Remove the item at `index`. Leaves the order untouched on failure.
    pub(crate) fn remove_item(&mut self, index: usize) -> Result<OrderItem> {
        let len = self.current_order.len();
        if index >= len {
            return Err(StateError::OutOfRange { index, len });
        }
        let removed = self.current_order.remove(index);
        self.recompute_total();
        Ok(removed)
    }

    pub(crate) fn clear_items(&mut self) {
        self.current_order.clear();
        self.order_total = 0.0;
    }

    fn recompute_total(&mut self) {
        self.order_total = self.current_order.iter().map(|item| item.price).sum();
    }

    /// Render customer details and line items as upstream prompt context.
    ///
    /// Returns `None` when nothing has been recorded yet.
    pub fn format_for_prompt(&self) -> Option<String> {
        let details = [
            ("Customer", &self.customer_name),
            ("Phone", &self.phone_number),
            ("Address", &self.delivery_address),
            ("Delivery", &self.delivery_preference),
            ("Payment", &self.payment_method),
            ("Instructions", &self.special_instructions),
        ];

        let mut lines = Vec::new();
        for (label, value) in details {
            if let Some(value) = value {
                lines.push(format!("{}: {}", label, value));
            }
        }
        if !self.current_order.is_empty() {
            lines.push("Current order:".to_string());
            for (i, item) in self.current_order.iter().enumerate() {
                let mut line = format!("{}. {}", i + 1, item.name);
                if let Some(size) = &item.size {
                    line.push_str(&format!(" ({})", size));
                }
                if let Some(quantity) = item.quantity {
                    line.push_str(&format!(" x{}", quantity));
                }
                line.push_str(&format!(" - {:.2}", item.price));
                if let Some(note) = &item.special_instructions {
                    line.push_str(&format!(" [{}]", note));
                }
                lines.push(line);
            }
            lines.push(format!("Order total: {:.2}", self.order_total));
        }

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

fn merge(slot: &mut Option<String>, value: Option<Option<String>>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Snapshot of a session returned by
/// [`SessionStore::get_summary`](super::SessionStore::get_summary).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub order_context: OrderContext,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Aggregate counters across all live sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub total_messages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pizza() -> OrderItem {
        OrderItem::new("Peri Peri Pizza", 1200.0)
            .with_size("Large")
            .with_quantity(1)
            .with_instructions("Extra spicy")
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), r#""assistant""#);
        let role: Role = serde_json::from_str(r#""user""#).unwrap();
        assert_eq!(role, Role::User);
        assert_eq!(Role::System.to_string(), "system");
    }

    #[test]
    fn test_message_timestamp_serializes_as_millis() {
        let msg = Message::new(Role::User, "hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["timestamp"], msg.timestamp.timestamp_millis());
        assert_eq!(value["role"], "user");
    }

    #[test]
    fn test_order_item_deserialize_optional_fields() {
        let item: OrderItem =
            serde_json::from_str(r#"{"name": "BBQ Wings", "price": 450.0}"#).unwrap();
        assert_eq!(item.name, "BBQ Wings");
        assert_eq!(item.size, None);
        assert_eq!(item.quantity, None);
    }

    #[test]
    fn test_apply_is_shallow_merge() {
        let mut ctx = OrderContext::default();
        ctx.apply(OrderContextUpdate {
            customer_name: Some(Some("Ahmed Khan".into())),
            phone_number: Some(Some("+92-300-1234567".into())),
            ..Default::default()
        });
        ctx.apply(OrderContextUpdate {
            payment_method: Some(Some("cash_on_delivery".into())),
            ..Default::default()
        });
        assert_eq!(ctx.customer_name.as_deref(), Some("Ahmed Khan"));
        assert_eq!(ctx.phone_number.as_deref(), Some("+92-300-1234567"));
        assert_eq!(ctx.payment_method.as_deref(), Some("cash_on_delivery"));
        assert_eq!(ctx.delivery_address, None);
    }

    #[test]
    fn test_update_distinguishes_absent_null_and_value() {
        let update: OrderContextUpdate = serde_json::from_str(
            r#"{"customer_name": "Sara", "special_instructions": null}"#,
        )
        .unwrap();
        assert_eq!(update.customer_name, Some(Some("Sara".to_string())));
        assert_eq!(update.special_instructions, Some(None));
        assert_eq!(update.phone_number, None);

        let mut ctx = OrderContext::default();
        ctx.phone_number = Some("+92-300-1234567".into());
        ctx.special_instructions = Some("Ring twice".into());
        ctx.apply(update);
        assert_eq!(ctx.customer_name.as_deref(), Some("Sara"));
        assert_eq!(ctx.special_instructions, None);
        assert_eq!(ctx.phone_number.as_deref(), Some("+92-300-1234567"));
    }

    #[test]
    fn test_total_tracks_items_and_ignores_quantity() {
        let mut ctx = OrderContext::default();
        ctx.push_item(pizza());
        ctx.push_item(OrderItem::new("BBQ Wings", 450.0).with_quantity(3));
        assert_eq!(ctx.total(), 1650.0);

        let removed = ctx.remove_item(0).unwrap();
        assert_eq!(removed.name, "Peri Peri Pizza");
        assert_eq!(ctx.total(), 450.0);

        ctx.clear_items();
        assert!(ctx.items().is_empty());
        assert_eq!(ctx.total(), 0.0);
    }

    #[test]
    fn test_remove_item_out_of_range_leaves_order() {
        let mut ctx = OrderContext::default();
        ctx.push_item(pizza());
        let err = ctx.remove_item(1).unwrap_err();
        assert!(matches!(err, StateError::OutOfRange { index: 1, len: 1 }));
        assert_eq!(ctx.items().len(), 1);
        assert_eq!(ctx.total(), 1200.0);
    }

    #[test]
    fn test_format_for_prompt_empty() {
        assert_eq!(OrderContext::default().format_for_prompt(), None);
    }

    #[test]
    fn test_format_for_prompt_lists_details_and_items() {
        let mut ctx = OrderContext::default();
        ctx.apply(OrderContextUpdate {
            customer_name: Some(Some("Ahmed Khan".into())),
            ..Default::default()
        });
        ctx.push_item(pizza());

        let text = ctx.format_for_prompt().unwrap();
        assert!(text.starts_with("Customer: Ahmed Khan"));
        assert!(text.contains("1. Peri Peri Pizza (Large) x1 - 1200.00 [Extra spicy]"));
        assert!(text.ends_with("Order total: 1200.00"));
    }

    #[test]
    fn test_order_context_serializes_items_and_total() {
        let mut ctx = OrderContext::default();
        ctx.push_item(OrderItem::new("Fries", 250.0));
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["order_total"], 250.0);
        assert_eq!(value["current_order"][0]["name"], "Fries");
        assert!(value["customer_name"].is_null());
    }
}
