//! Order request value objects.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Trade direction offered by the order ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
	Buy,
	Sell,
	Short,
	Cover,
}

impl Action {
	pub const ALL: [Action; 4] = [Action::Buy, Action::Sell, Action::Short, Action::Cover];
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Action::Buy => "Buy",
			Action::Sell => "Sell",
			Action::Short => "Short",
			Action::Cover => "Cover",
		};
		f.write_str(name)
	}
}

impl FromStr for Action {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"buy" => Ok(Action::Buy),
			"sell" => Ok(Action::Sell),
			"short" => Ok(Action::Short),
			"cover" => Ok(Action::Cover),
			_ => Err(Error::UnsupportedAction(s.to_string())),
		}
	}
}

/// Pricing mode of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderType {
	Market,
	Limit,
	Stop,
}

impl OrderType {
	pub const ALL: [OrderType; 3] = [OrderType::Market, OrderType::Limit, OrderType::Stop];
}

impl fmt::Display for OrderType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			OrderType::Market => "Market",
			OrderType::Limit => "Limit",
			OrderType::Stop => "Stop",
		};
		f.write_str(name)
	}
}

impl FromStr for OrderType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"market" => Ok(OrderType::Market),
			"limit" => Ok(OrderType::Limit),
			"stop" => Ok(OrderType::Stop),
			_ => Err(Error::UnsupportedOrderType(s.to_string())),
		}
	}
}

/// One order request.
///
/// Fields are private: a `TradeOrder` can only be obtained through
/// [`TradeOrder::new`] or [`TradeOrder::parse`], which enforce a non-empty
/// symbol and a positive quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTradeOrder")]
pub struct TradeOrder {
	symbol: String,
	action: Action,
	quantity: NonZeroU32,
	order_type: OrderType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTradeOrder {
	symbol: String,
	action: Action,
	quantity: i64,
	order_type: OrderType,
}

impl TryFrom<RawTradeOrder> for TradeOrder {
	type Error = Error;

	fn try_from(raw: RawTradeOrder) -> Result<Self> {
		TradeOrder::new(raw.symbol, raw.action, raw.quantity, raw.order_type)
	}
}

impl TradeOrder {
	/// Validates and builds an order. The symbol is trimmed and upper-cased.
	pub fn new(symbol: impl Into<String>, action: Action, quantity: i64, order_type: OrderType) -> Result<Self> {
		let symbol = symbol.into().trim().to_ascii_uppercase();
		if symbol.is_empty() {
			return Err(Error::InvalidOrder("symbol must not be empty".into()));
		}
		if symbol.chars().any(char::is_whitespace) {
			return Err(Error::InvalidOrder(format!("symbol {symbol:?} contains whitespace")));
		}

		let quantity = u32::try_from(quantity)
			.ok()
			.and_then(NonZeroU32::new)
			.ok_or_else(|| Error::InvalidOrder(format!("quantity must be a positive integer, got {quantity}")))?;

		Ok(Self {
			symbol,
			action,
			quantity,
			order_type,
		})
	}

	/// Builds an order from loosely typed input, e.g. CLI arguments.
	pub fn parse(symbol: &str, action: &str, quantity: i64, order_type: &str) -> Result<Self> {
		let action = action.parse()?;
		let order_type = order_type.parse()?;
		Self::new(symbol, action, quantity, order_type)
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	pub fn action(&self) -> Action {
		self.action
	}

	pub fn quantity(&self) -> NonZeroU32 {
		self.quantity
	}

	pub fn order_type(&self) -> OrderType {
		self.order_type
	}
}

impl fmt::Display for TradeOrder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {} {} @ {}", self.action, self.quantity, self.symbol, self.order_type)
	}
}
