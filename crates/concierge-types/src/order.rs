//! Order summary model, its default template, and staff order records.

use serde::{Deserialize, Serialize};

/// Requested delivery window for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryTime {
    /// As soon as possible.
    #[default]
    #[serde(rename = "asap")]
    Asap,
    /// Within thirty minutes.
    #[serde(rename = "30min")]
    ThirtyMinutes,
    /// Within one hour.
    #[serde(rename = "1hour")]
    OneHour,
    /// A specific time given in the special instructions.
    #[serde(rename = "specific")]
    Specific,
}

impl DeliveryTime {
    /// Returns the wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asap => "asap",
            Self::ThirtyMinutes => "30min",
            Self::OneHour => "1hour",
            Self::Specific => "specific",
        }
    }

    /// Parses a wire label.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "asap" => Some(Self::Asap),
            "30min" => Some(Self::ThirtyMinutes),
            "1hour" => Some(Self::OneHour),
            "specific" => Some(Self::Specific),
            _ => None,
        }
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub quantity: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

impl OrderItem {
    /// `price × quantity` for this line.
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// Structured order derived from a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_type: String,
    pub delivery_time: DeliveryTime,
    #[serde(default)]
    pub room_number: String,
    #[serde(default)]
    pub guest_name: String,
    #[serde(default)]
    pub guest_email: String,
    #[serde(default)]
    pub guest_phone: String,
    #[serde(default)]
    pub special_instructions: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
}

impl OrderSummary {
    /// The order shown before anything has been extracted from a call.
    pub fn default_template() -> Self {
        Self {
            order_type: "Room Service".to_string(),
            delivery_time: DeliveryTime::Asap,
            room_number: String::new(),
            guest_name: String::new(),
            guest_email: String::new(),
            guest_phone: String::new(),
            special_instructions: String::new(),
            items: vec![
                OrderItem {
                    id: "1".to_string(),
                    name: "Club Sandwich".to_string(),
                    description: "Served with french fries and side salad".to_string(),
                    quantity: 1,
                    price: 15.00,
                    service_type: None,
                },
                OrderItem {
                    id: "2".to_string(),
                    name: "Fresh Orange Juice".to_string(),
                    description: "Large size".to_string(),
                    quantity: 1,
                    price: 8.00,
                    service_type: None,
                },
            ],
            total_amount: 23.00,
        }
    }

    /// Sum of `price × quantity` over all items.
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

/// An order as filed with hotel staff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub reference: String,
    pub call_id: String,
    pub room_number: String,
    pub order_type: String,
    pub delivery_time: DeliveryTime,
    pub special_instructions: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for creating a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderParams {
    pub call_id: String,
    pub room_number: String,
    pub order_type: String,
    pub delivery_time: DeliveryTime,
    #[serde(default)]
    pub special_instructions: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_total_matches_items() {
        let template = OrderSummary::default_template();
        assert_eq!(template.items.len(), 2);
        assert!((template.items_total() - template.total_amount).abs() < f64::EPSILON);
    }

    #[test]
    fn create_order_params_read_the_http_body() {
        let params: CreateOrderParams = serde_json::from_value(serde_json::json!({
            "callId": "call-1",
            "roomNumber": "204",
            "orderType": "Room Service",
            "deliveryTime": "asap",
            "items": [{
                "id": "1",
                "name": "Club Sandwich",
                "description": "",
                "quantity": 2,
                "price": 15.0
            }],
            "totalAmount": 30.0
        }))
        .unwrap();
        assert_eq!(params.room_number, "204");
        assert_eq!(params.special_instructions, None);
        assert_eq!(params.items[0].line_total(), 30.0);
    }

    #[test]
    fn delivery_time_wire_labels() {
        assert_eq!(
            serde_json::to_value(DeliveryTime::ThirtyMinutes).unwrap(),
            "30min"
        );
        assert_eq!(
            serde_json::from_str::<DeliveryTime>("\"1hour\"").unwrap(),
            DeliveryTime::OneHour
        );
        for t in [
            DeliveryTime::Asap,
            DeliveryTime::ThirtyMinutes,
            DeliveryTime::OneHour,
            DeliveryTime::Specific,
        ] {
            assert_eq!(DeliveryTime::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn order_summary_serializes_camel_case() {
        let json = serde_json::to_value(OrderSummary::default_template()).unwrap();
        assert_eq!(json["orderType"], "Room Service");
        assert_eq!(json["deliveryTime"], "asap");
        assert_eq!(json["totalAmount"], 23.0);
    }
}
