//! Orders and executed trades.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub leverage: u32,
    /// Assigned by the venue on placement.
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Order {
    pub fn market(symbol: &str, side: OrderSide, size: f64, leverage: u32) -> Self {
        Order {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            size,
            price: None,
            stop_price: None,
            leverage: leverage.max(1),
            id: None,
            timestamp: None,
        }
    }

    pub fn limit(symbol: &str, side: OrderSide, size: f64, price: f64, leverage: u32) -> Self {
        Order {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Order::market(symbol, side, size, leverage)
        }
    }
}

/// Immutable execution record.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
    pub commission: f64,
    /// Zero for trades that open or add to a position.
    pub realized_pnl: f64,
}
