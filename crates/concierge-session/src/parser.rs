//! Free-text extraction of order details and service requests from a call
//! summary.
//!
//! Extraction is pattern and keyword based. Every field is optional; a
//! summary that mentions nothing recognizable yields an empty
//! [`ParsedOrder`].

use std::sync::LazyLock;

use concierge_types::{DeliveryTime, OrderItem, ServiceRequest, ServiceRequestDetails};
use regex::Regex;

/// Fields recognized in a summary. `None` and an empty item list mean
/// "not mentioned".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOrder {
    pub order_type: Option<String>,
    pub delivery_time: Option<DeliveryTime>,
    pub room_number: Option<String>,
    pub special_instructions: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_amount: Option<f64>,
}

impl ParsedOrder {
    pub fn is_empty(&self) -> bool {
        self.order_type.is_none()
            && self.delivery_time.is_none()
            && self.room_number.is_none()
            && self.special_instructions.is_none()
            && self.items.is_empty()
            && self.total_amount.is_none()
    }
}

struct MenuEntry {
    name: &'static str,
    pattern: &'static str,
    description: &'static str,
    price: f64,
}

const MENU: &[MenuEntry] = &[
    MenuEntry {
        name: "Club Sandwich",
        pattern: r"club\s+sandwich(?:es)?",
        description: "Served with french fries and side salad",
        price: 15.00,
    },
    MenuEntry {
        name: "Fresh Orange Juice",
        pattern: r"(?:fresh\s+)?orange\s+juices?",
        description: "Large size",
        price: 8.00,
    },
    MenuEntry {
        name: "Caesar Salad",
        pattern: r"caesar\s+salads?",
        description: "Romaine, parmesan and croutons",
        price: 12.00,
    },
    MenuEntry {
        name: "Beef Pho",
        pattern: r"(?:beef\s+)?pho(?:\s+bo)?",
        description: "Rice noodle soup with sliced beef",
        price: 14.00,
    },
    MenuEntry {
        name: "Cheeseburger",
        pattern: r"(?:cheese)?burgers?",
        description: "Served with french fries",
        price: 16.00,
    },
    MenuEntry {
        name: "Coffee",
        pattern: r"(?:vietnamese\s+)?coffees?",
        description: "Hot or iced",
        price: 4.00,
    },
    MenuEntry {
        name: "Mineral Water",
        pattern: r"(?:mineral\s+|bottled\s+)water",
        description: "500ml bottle",
        price: 3.00,
    },
];

const QUANTITY: &str = r"(\d{1,2}|a|an|one|two|three|four|five|six|seven|eight|nine|ten)";

static MENU_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    MENU.iter()
        .map(|entry| {
            Regex::new(&format!(
                r"(?i)(?:\b{QUANTITY}\s+(?:x\s+)?)?\b{}\b",
                entry.pattern
            ))
            .expect("menu pattern is valid")
        })
        .collect()
});

static ROOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\broom\s*(?:number|no\.?|#)?\s*:?\s*(\d{1,5})\b").expect("room pattern is valid")
});

static ITEM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?:[-*•]|\d+\.)?\s*(\d{1,2})\s*(?:x|×)\s*([A-Za-z][A-Za-z '&-]*?)\s*(?:[-:@(]\s*)?\$\s*(\d+(?:\.\d{1,2})?)",
    )
    .expect("item line pattern is valid")
});

static TOTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btotal(?:\s+amount)?\s*(?:is|of|:|=)?\s*\$?\s*(\d+(?:\.\d{1,2})?)")
        .expect("total pattern is valid")
});

static SPECIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:special\s+instructions?|notes?)\s*:\s*([^\n]+?)\s*(?:\.\s|\.$|\n|$)")
        .expect("special instructions pattern is valid")
});

static ASAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:asap|as soon as possible|immediately|right away)\b").expect("asap pattern is valid")
});

static THIRTY_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:30\s*(?:min|mins|minutes)|thirty\s+minutes|half\s+an\s+hour)\b")
        .expect("30min pattern is valid")
});

static ONE_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:1\s*hours?|one\s+hour|an\s+hour|60\s*minutes)\b").expect("1hour pattern is valid")
});

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}(?::\d{2})?\s*(?:am|pm|a\.m\.|p\.m\.))").expect("clock pattern is valid")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(today|tomorrow|tonight|(?:mon|tues|wednes|thurs|fri|satur|sun)day|\d{1,2}/\d{1,2}(?:/\d{2,4})?)\b",
    )
    .expect("date pattern is valid")
});

static PEOPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfor\s+(\d{1,2})\s*(?:people|persons|guests|adults|pax)\b").expect("people pattern is valid")
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\$\s*\d+(?:\.\d{1,2})?|\d+(?:[.,]\d{3})*\s*(?:VND|USD|dong))").expect("amount pattern is valid")
});

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:to|at)\s+(?:the\s+)?((?:airport|beach|lobby|pool|spa|restaurant|city center|old town|[A-Z][a-z]+\s+(?:Market|Bridge|Beach|Museum|Tower)))")
        .expect("location pattern is valid")
});

/// Service categories with the order type they map to and their keywords.
const CATEGORIES: &[(&str, &str, &[&str])] = &[
    (
        "room-service",
        "Room Service",
        &["room service", "food", "breakfast", "lunch", "dinner", "sandwich", "juice", "drink", "meal", "coffee", "order"],
    ),
    (
        "housekeeping",
        "Housekeeping",
        &["housekeeping", "towel", "clean", "laundry", "pillow", "blanket", "sheets", "toiletries"],
    ),
    (
        "transportation",
        "Transportation",
        &["taxi", "airport", "shuttle", "car", "transport", "pickup", "pick-up", "ride"],
    ),
    ("spa", "Spa", &["spa", "massage", "sauna", "facial"]),
    (
        "tours-activities",
        "Tours & Activities",
        &["tour", "excursion", "trip", "sightseeing", "activity", "snorkel"],
    ),
    (
        "restaurant",
        "Restaurant Reservation",
        &["restaurant", "reservation", "table for", "book a table"],
    ),
];

fn words_to_quantity(word: &str) -> Option<u32> {
    match word.to_ascii_lowercase().as_str() {
        "a" | "an" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        "eight" => Some(8),
        "nine" => Some(9),
        "ten" => Some(10),
        other => other.parse().ok(),
    }
}

fn contains_keyword(haystack_lower: &str, keyword: &str) -> bool {
    haystack_lower.match_indices(keyword).any(|(idx, _)| {
        let before_ok = haystack_lower[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after = idx + keyword.len();
        let after_ok = haystack_lower[after..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric() || c == 's');
        before_ok && after_ok
    })
}

/// Maps summary text to the first service category whose keywords appear.
fn detect_category(text: &str) -> Option<(&'static str, &'static str)> {
    let lower = text.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, _, keywords)| keywords.iter().any(|k| contains_keyword(&lower, k)))
        .map(|(service_type, order_type, _)| (*service_type, *order_type))
}

fn parse_delivery_time(text: &str) -> Option<DeliveryTime> {
    if ASAP.is_match(text) {
        Some(DeliveryTime::Asap)
    } else if THIRTY_MINUTES.is_match(text) {
        Some(DeliveryTime::ThirtyMinutes)
    } else if ONE_HOUR.is_match(text) {
        Some(DeliveryTime::OneHour)
    } else if CLOCK_TIME.is_match(text) {
        Some(DeliveryTime::Specific)
    } else {
        None
    }
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

fn parse_items(text: &str) -> Vec<OrderItem> {
    let mut items: Vec<OrderItem> = ITEM_LINE
        .captures_iter(text)
        .filter_map(|caps| {
            let quantity = caps[1].parse::<u32>().ok().filter(|q| *q > 0)?;
            let name = caps[2].trim().to_string();
            let price = parse_price(&caps[3])?;
            Some((quantity, name, price))
        })
        .enumerate()
        .map(|(i, (quantity, name, price))| OrderItem {
            id: (i + 1).to_string(),
            name,
            description: String::new(),
            quantity,
            price,
            service_type: None,
        })
        .collect();

    if !items.is_empty() {
        return items;
    }

    for (entry, pattern) in MENU.iter().zip(MENU_PATTERNS.iter()) {
        let mut quantity = 0;
        for caps in pattern.captures_iter(text) {
            quantity += caps
                .get(1)
                .and_then(|m| words_to_quantity(m.as_str()))
                .unwrap_or(1);
        }
        if quantity > 0 {
            items.push(OrderItem {
                id: (items.len() + 1).to_string(),
                name: entry.name.to_string(),
                description: entry.description.to_string(),
                quantity,
                price: entry.price,
                service_type: Some("room-service".to_string()),
            });
        }
    }
    items
}

/// Extracts whatever order details `summary` mentions.
pub fn parse_order_details(summary: &str) -> ParsedOrder {
    let room_number = ROOM.captures(summary).map(|caps| caps[1].to_string());
    let total_amount = TOTAL
        .captures(summary)
        .and_then(|caps| parse_price(&caps[1]));
    let special_instructions = SPECIAL
        .captures(summary)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty());

    ParsedOrder {
        order_type: detect_category(summary).map(|(_, order_type)| order_type.to_string()),
        delivery_time: parse_delivery_time(summary),
        room_number,
        special_instructions,
        items: parse_items(summary),
        total_amount,
    }
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\n', '.', ';'])
        .map(str::trim)
        .map(|s| s.trim_start_matches(['-', '*', '•']).trim())
        .filter(|s| !s.is_empty())
}

/// Extracts one service request per category mentioned in `summary`.
///
/// The request text is the first sentence mentioning the category; details
/// are drawn from that sentence, falling back to the whole summary for the
/// room number.
pub fn extract_service_requests(summary: &str) -> Vec<ServiceRequest> {
    let room_number = ROOM.captures(summary).map(|caps| caps[1].to_string());
    let mut requests: Vec<ServiceRequest> = Vec::new();

    for sentence in sentences(summary) {
        let Some((service_type, _)) = detect_category(sentence) else {
            continue;
        };
        if requests.iter().any(|r| r.service_type == service_type) {
            continue;
        }
        let details = ServiceRequestDetails {
            date: DATE.captures(sentence).map(|c| c[1].to_string()),
            time: CLOCK_TIME
                .captures(sentence)
                .map(|c| c[1].to_string())
                .or_else(|| parse_delivery_time(sentence).map(|t| t.as_str().to_string())),
            location: LOCATION.captures(sentence).map(|c| c[1].to_string()),
            people: PEOPLE.captures(sentence).and_then(|c| c[1].parse().ok()),
            amount: AMOUNT.captures(sentence).map(|c| c[1].trim().to_string()),
            room_number: ROOM
                .captures(sentence)
                .map(|c| c[1].to_string())
                .or_else(|| room_number.clone()),
            other_details: None,
        };
        requests.push(ServiceRequest {
            service_type: service_type.to_string(),
            request_text: sentence.to_string(),
            details,
        });
    }
    requests
}
