//! Order-entry state machine.
//!
//! The ticket is filled in a fixed, one-way order:
//!
//! ```text
//! Idle --select_symbol--> SymbolEntered --select_action--> ActionSelected
//!   --enter_quantity--> QuantityEntered --select_order_type--> OrderTypeSelected
//!   --review--> Reviewed --confirm--> Confirmed
//! ```
//!
//! Each step checks that the machine sits in the state right before it, waits
//! for its UI signal with a bounded timeout, and only then advances. Any
//! failure moves the machine to [`WorkflowState::Failed`], which rejects every
//! further step. A workflow places at most one order.

use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::driver::{Page, WaitState};
use crate::error::{Error, Result};
use crate::order::{Action, OrderType, TradeOrder};
use crate::site::{ControlBinding, OrderSelectors, SiteProfile, StepTimeouts};

/// Extra time granted on top of a step's budget before the workflow stops
/// waiting on a driver that ignores its own timeout.
const SIGNAL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
	Idle,
	SymbolEntered,
	ActionSelected,
	QuantityEntered,
	OrderTypeSelected,
	Reviewed,
	Confirmed,
	Failed,
}

impl WorkflowState {
	pub fn as_str(self) -> &'static str {
		match self {
			WorkflowState::Idle => "idle",
			WorkflowState::SymbolEntered => "symbol_entered",
			WorkflowState::ActionSelected => "action_selected",
			WorkflowState::QuantityEntered => "quantity_entered",
			WorkflowState::OrderTypeSelected => "order_type_selected",
			WorkflowState::Reviewed => "reviewed",
			WorkflowState::Confirmed => "confirmed",
			WorkflowState::Failed => "failed",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, WorkflowState::Confirmed | WorkflowState::Failed)
	}
}

impl fmt::Display for WorkflowState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One transition of the order-entry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
	SelectSymbol,
	SelectAction,
	EnterQuantity,
	SelectOrderType,
	Review,
	Confirm,
}

impl WorkflowStep {
	pub const ALL: [WorkflowStep; 6] = [
		WorkflowStep::SelectSymbol,
		WorkflowStep::SelectAction,
		WorkflowStep::EnterQuantity,
		WorkflowStep::SelectOrderType,
		WorkflowStep::Review,
		WorkflowStep::Confirm,
	];

	/// State the machine must be in for this step to start.
	pub fn requires(self) -> WorkflowState {
		match self {
			WorkflowStep::SelectSymbol => WorkflowState::Idle,
			WorkflowStep::SelectAction => WorkflowState::SymbolEntered,
			WorkflowStep::EnterQuantity => WorkflowState::ActionSelected,
			WorkflowStep::SelectOrderType => WorkflowState::QuantityEntered,
			WorkflowStep::Review => WorkflowState::OrderTypeSelected,
			WorkflowStep::Confirm => WorkflowState::Reviewed,
		}
	}

	/// State entered when this step succeeds.
	pub fn produces(self) -> WorkflowState {
		match self {
			WorkflowStep::SelectSymbol => WorkflowState::SymbolEntered,
			WorkflowStep::SelectAction => WorkflowState::ActionSelected,
			WorkflowStep::EnterQuantity => WorkflowState::QuantityEntered,
			WorkflowStep::SelectOrderType => WorkflowState::OrderTypeSelected,
			WorkflowStep::Review => WorkflowState::Reviewed,
			WorkflowStep::Confirm => WorkflowState::Confirmed,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			WorkflowStep::SelectSymbol => "select_symbol",
			WorkflowStep::SelectAction => "select_action",
			WorkflowStep::EnterQuantity => "enter_quantity",
			WorkflowStep::SelectOrderType => "select_order_type",
			WorkflowStep::Review => "review",
			WorkflowStep::Confirm => "confirm",
		}
	}
}

impl fmt::Display for WorkflowStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Outcome of a confirmed order.
///
/// The platform shows no structured confirmation, so the receipt echoes the
/// order and records that the confirm control was invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
	pub symbol: String,
	pub action: Action,
	pub quantity: u32,
	pub order_type: OrderType,
	pub placed: bool,
	/// Unix seconds.
	pub confirmed_at: u64,
	/// Page URL after confirmation, when the driver could report it.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

/// Values entered so far, echoed into the [`Receipt`].
#[derive(Debug, Default)]
struct Ticket {
	symbol: Option<String>,
	action: Option<Action>,
	quantity: Option<NonZeroU32>,
	order_type: Option<OrderType>,
}

/// Drives one order through the ticket on a borrowed, authenticated page.
pub struct OrderWorkflow<'p> {
	page: &'p dyn Page,
	selectors: OrderSelectors,
	timeouts: StepTimeouts,
	cancel: Option<CancelSignal>,
	state: WorkflowState,
	trail: Vec<WorkflowState>,
	ticket: Ticket,
}

impl<'p> OrderWorkflow<'p> {
	pub fn new(page: &'p dyn Page, selectors: OrderSelectors, timeouts: StepTimeouts) -> Self {
		Self {
			page,
			selectors,
			timeouts,
			cancel: None,
			state: WorkflowState::Idle,
			trail: vec![WorkflowState::Idle],
			ticket: Ticket::default(),
		}
	}

	pub fn from_profile(page: &'p dyn Page, site: &SiteProfile) -> Self {
		Self::new(page, site.order.clone(), site.timeouts)
	}

	/// Checks `signal` before every step of [`execute`](Self::execute).
	pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
		self.cancel = Some(signal);
		self
	}

	pub fn state(&self) -> WorkflowState {
		self.state
	}

	/// Every state entered so far, starting with `Idle`.
	pub fn trail(&self) -> &[WorkflowState] {
		&self.trail
	}

	/// Runs all six steps for `order` and returns the receipt.
	///
	/// Errors come back as [`Error::Workflow`] naming the failing step and the
	/// trail up to and including `Failed`.
	pub async fn execute(&mut self, order: &TradeOrder) -> Result<Receipt> {
		info!(target = "tradeflow", order = %order, "placing order");

		let mut receipt = None;
		for step in WorkflowStep::ALL {
			self.checkpoint(step)?;
			receipt = self.perform(step, order).await.map_err(|err| self.annotate(step, err))?;
		}

		let receipt = receipt.ok_or(Error::InvalidWorkflowTransition {
			step: WorkflowStep::Confirm,
			state: self.state,
		})?;
		info!(target = "tradeflow", order = %order, url = ?receipt.url, "order confirmed");
		Ok(receipt)
	}

	/// Writes the symbol into the ticket. Whether the platform recognised it
	/// only becomes visible at [`review`](Self::review).
	pub async fn select_symbol(&mut self, symbol: &str) -> Result<()> {
		let step = WorkflowStep::SelectSymbol;
		self.begin(step)?;

		let result = self.write_symbol(symbol).await;
		self.settle(step, result)?;
		self.ticket.symbol = Some(symbol.to_string());
		Ok(())
	}

	pub async fn select_action(&mut self, action: Action) -> Result<()> {
		let step = WorkflowStep::SelectAction;
		self.begin(step)?;

		let Some(binding) = self.selectors.actions.get(&action).cloned() else {
			warn!(target = "tradeflow", action = %action, "no control bound to action");
			self.fail();
			return Err(Error::UnsupportedAction(action.to_string()));
		};

		let result = self.apply(step, &binding).await;
		self.settle(step, result)?;
		self.ticket.action = Some(action);
		Ok(())
	}

	/// Clears the quantity field, types the value, commits it with Enter and
	/// blurs the field so the ticket revalidates.
	pub async fn enter_quantity(&mut self, quantity: NonZeroU32) -> Result<()> {
		let step = WorkflowStep::EnterQuantity;
		self.begin(step)?;

		let result = self.write_quantity(quantity).await;
		self.settle(step, result)?;
		self.ticket.quantity = Some(quantity);
		Ok(())
	}

	pub async fn select_order_type(&mut self, order_type: OrderType) -> Result<()> {
		let step = WorkflowStep::SelectOrderType;
		self.begin(step)?;

		let Some(binding) = self.selectors.order_types.get(&order_type).cloned() else {
			warn!(target = "tradeflow", order_type = %order_type, "no control bound to order type");
			self.fail();
			return Err(Error::UnsupportedOrderType(order_type.to_string()));
		};

		let result = self.apply(step, &binding).await;
		self.settle(step, result)?;
		self.ticket.order_type = Some(order_type);
		Ok(())
	}

	/// Waits for the review control to become interactable, then opens the
	/// order preview.
	pub async fn review(&mut self) -> Result<()> {
		let step = WorkflowStep::Review;
		self.begin(step)?;
		let button = self.selectors.review_button.clone();
		let result = self.press_when_ready(step, &button).await;
		self.settle(step, result)
	}

	/// Waits for the confirm control, places the order and returns the receipt.
	pub async fn confirm(&mut self) -> Result<Receipt> {
		let step = WorkflowStep::Confirm;
		self.begin(step)?;
		let button = self.selectors.confirm_button.clone();
		let result = self.press_when_ready(step, &button).await;
		self.settle(step, result)?;

		let url = self.page.url().await.ok();
		let ticket = &self.ticket;
		match (&ticket.symbol, ticket.action, ticket.quantity, ticket.order_type) {
			(Some(symbol), Some(action), Some(quantity), Some(order_type)) => Ok(Receipt {
				symbol: symbol.clone(),
				action,
				quantity: quantity.get(),
				order_type,
				placed: true,
				confirmed_at: crate::unix_now(),
				url,
			}),
			_ => Err(Error::InvalidWorkflowTransition {
				step,
				state: WorkflowState::Confirmed,
			}),
		}
	}

	fn begin(&mut self, step: WorkflowStep) -> Result<()> {
		if self.state == step.requires() {
			debug!(target = "tradeflow", step = %step, "step started");
			return Ok(());
		}

		let state = self.state;
		warn!(target = "tradeflow", step = %step, state = %state, "out-of-order workflow step");
		self.fail();
		Err(Error::InvalidWorkflowTransition { step, state })
	}

	fn settle(&mut self, step: WorkflowStep, result: Result<()>) -> Result<()> {
		match result {
			Ok(()) => {
				self.state = step.produces();
				self.trail.push(self.state);
				debug!(target = "tradeflow", step = %step, state = %self.state, "step completed");
				Ok(())
			}
			Err(err) => {
				warn!(target = "tradeflow", step = %step, error = %err, "step failed");
				self.fail();
				Err(err)
			}
		}
	}

	fn fail(&mut self) {
		if self.state != WorkflowState::Failed {
			self.state = WorkflowState::Failed;
			self.trail.push(WorkflowState::Failed);
		}
	}

	fn checkpoint(&mut self, step: WorkflowStep) -> Result<()> {
		if self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
			warn!(target = "tradeflow", step = %step, "order cancelled");
			self.fail();
			return Err(self.annotate(step, Error::Cancelled(step.to_string())));
		}
		Ok(())
	}

	fn annotate(&self, step: WorkflowStep, source: Error) -> Error {
		Error::Workflow {
			step,
			trail: self.trail.clone(),
			source: Box::new(source),
		}
	}

	async fn perform(&mut self, step: WorkflowStep, order: &TradeOrder) -> Result<Option<Receipt>> {
		match step {
			WorkflowStep::SelectSymbol => self.select_symbol(order.symbol()).await.map(|()| None),
			WorkflowStep::SelectAction => self.select_action(order.action()).await.map(|()| None),
			WorkflowStep::EnterQuantity => self.enter_quantity(order.quantity()).await.map(|()| None),
			WorkflowStep::SelectOrderType => self.select_order_type(order.order_type()).await.map(|()| None),
			WorkflowStep::Review => self.review().await.map(|()| None),
			WorkflowStep::Confirm => self.confirm().await.map(Some),
		}
	}

	async fn write_symbol(&self, symbol: &str) -> Result<()> {
		let field = &self.selectors.symbol_input;
		self.await_signal(WorkflowStep::SelectSymbol, field, WaitState::Attached).await?;
		self.page.fill(field, symbol).await?;
		self.page.click(&self.selectors.defocus).await?;
		Ok(())
	}

	async fn write_quantity(&self, quantity: NonZeroU32) -> Result<()> {
		let field = &self.selectors.quantity_input;
		self.await_signal(WorkflowStep::EnterQuantity, field, WaitState::Attached).await?;
		self.page.fill(field, "").await?;
		self.page.type_text(field, &quantity.to_string()).await?;
		self.page.press(field, "Enter").await?;
		self.page.click(&self.selectors.defocus).await?;
		Ok(())
	}

	async fn apply(&self, step: WorkflowStep, binding: &ControlBinding) -> Result<()> {
		match binding {
			ControlBinding::Default => {
				debug!(target = "tradeflow", step = %step, "default selection, nothing to click");
				Ok(())
			}
			ControlBinding::Click(selector) => self.press_when_ready(step, selector).await,
		}
	}

	async fn press_when_ready(&self, step: WorkflowStep, selector: &str) -> Result<()> {
		self.await_signal(step, selector, WaitState::Interactable).await?;
		self.page.click(selector).await?;
		Ok(())
	}

	/// Waits for the step's UI signal. Driver timeouts surface as
	/// [`Error::StepTimeout`] carrying the measured wait.
	async fn await_signal(&self, step: WorkflowStep, selector: &str, state: WaitState) -> Result<()> {
		let limit = self.timeouts.for_step(step);
		let started = Instant::now();
		let outcome = tokio::time::timeout(limit + SIGNAL_GRACE, self.page.wait_for(selector, state, limit)).await;
		let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

		match outcome {
			Ok(Ok(())) => Ok(()),
			Ok(Err(err)) if !err.is_timeout() => Err(err.into()),
			Ok(Err(_)) | Err(_) => {
				warn!(target = "tradeflow", step = %step, selector, elapsed_ms, "step signal did not appear");
				Err(Error::StepTimeout { step, elapsed_ms })
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cancel::CancelHandle;
	use crate::testing::FakeSite;

	fn order(symbol: &str, action: Action, quantity: i64, order_type: OrderType) -> TradeOrder {
		TradeOrder::new(symbol, action, quantity, order_type).unwrap()
	}

	fn workflow<'p>(page: &'p dyn Page) -> OrderWorkflow<'p> {
		OrderWorkflow::from_profile(page, &SiteProfile::default())
	}

	#[tokio::test]
	async fn aapl_market_buy_reaches_confirmed() {
		let site = FakeSite::new();
		let page = site.page();
		let mut wf = workflow(&page);

		let receipt = wf.execute(&order("AAPL", Action::Buy, 10, OrderType::Market)).await.unwrap();

		assert!(receipt.placed);
		assert_eq!(receipt.symbol, "AAPL");
		assert_eq!(receipt.quantity, 10);
		assert_eq!(wf.state(), WorkflowState::Confirmed);
		assert_eq!(
			wf.trail(),
			[
				WorkflowState::Idle,
				WorkflowState::SymbolEntered,
				WorkflowState::ActionSelected,
				WorkflowState::QuantityEntered,
				WorkflowState::OrderTypeSelected,
				WorkflowState::Reviewed,
				WorkflowState::Confirmed,
			]
		);
	}

	#[tokio::test]
	async fn every_valid_order_visits_seven_states_in_order() {
		for action in Action::ALL {
			for order_type in OrderType::ALL {
				let site = FakeSite::new();
				let page = site.page();
				let mut wf = workflow(&page);

				wf.execute(&order("MSFT", action, 3, order_type)).await.unwrap();

				let expected: Vec<_> = std::iter::once(WorkflowState::Idle)
					.chain(WorkflowStep::ALL.into_iter().map(WorkflowStep::produces))
					.collect();
				assert_eq!(wf.trail(), expected, "{action} {order_type}");
			}
		}
	}

	#[tokio::test]
	async fn buy_market_clicks_only_review_and_confirm() {
		let site = FakeSite::new();
		let page = site.page();
		workflow(&page).execute(&order("AAPL", Action::Buy, 10, OrderType::Market)).await.unwrap();

		let clicks: Vec<_> = site.events().into_iter().filter(|e| e.starts_with("click ") && e != "click body").collect();
		assert_eq!(clicks, ["click #btnPreviewOrder", "click #btnPlaceOrder"]);
	}

	#[tokio::test]
	async fn sell_limit_clicks_bound_controls() {
		let site = FakeSite::new();
		let page = site.page();
		workflow(&page).execute(&order("TSLA", Action::Sell, 2, OrderType::Limit)).await.unwrap();

		let events = site.events();
		assert!(events.contains(&"click #sell-order".to_string()));
		assert!(events.contains(&"click input[type='radio'][value='limit']".to_string()));
	}

	#[tokio::test]
	async fn quantity_is_cleared_typed_committed_and_blurred() {
		let site = FakeSite::new();
		let page = site.page();
		workflow(&page).execute(&order("AAPL", Action::Buy, 25, OrderType::Market)).await.unwrap();

		let events = site.events();
		let start = events.iter().position(|e| e == "fill #tbQuantity=").unwrap();
		assert_eq!(events[start + 1..start + 4], ["type #tbQuantity=25", "press #tbQuantity Enter", "click body"]);
	}

	#[tokio::test(start_paused = true)]
	async fn review_signal_missing_times_out_after_budget() {
		let site = FakeSite::new().with(|s| {
			s.missing.insert("#btnPreviewOrder".into());
		});
		let page = site.page();
		let mut wf = workflow(&page);

		let err = wf.execute(&order("AAPL", Action::Buy, 10, OrderType::Market)).await.unwrap_err();

		assert_eq!(err.step(), Some(WorkflowStep::Review));
		match err.root() {
			Error::StepTimeout { step, elapsed_ms } => {
				assert_eq!(*step, WorkflowStep::Review);
				assert!(*elapsed_ms >= 5000, "elapsed {elapsed_ms}");
			}
			other => panic!("expected StepTimeout, got {other:?}"),
		}
		assert_eq!(wf.state(), WorkflowState::Failed);
		assert_eq!(err.trail().last(), Some(&WorkflowState::Failed));
		assert_eq!(err.trail()[err.trail().len() - 2], WorkflowState::OrderTypeSelected);
	}

	#[tokio::test]
	async fn confirm_before_review_is_invalid_and_fails() {
		let site = FakeSite::new();
		let page = site.page();
		let mut wf = workflow(&page);
		wf.select_symbol("AAPL").await.unwrap();

		let err = wf.confirm().await.unwrap_err();

		assert!(matches!(
			err,
			Error::InvalidWorkflowTransition {
				step: WorkflowStep::Confirm,
				state: WorkflowState::SymbolEntered
			}
		));
		assert_eq!(wf.state(), WorkflowState::Failed);
		assert!(!site.events().iter().any(|e| e == "click #btnPlaceOrder"));
	}

	#[tokio::test]
	async fn failed_workflow_rejects_further_steps() {
		let site = FakeSite::new();
		let page = site.page();
		let mut wf = workflow(&page);
		let _ = wf.review().await;
		assert_eq!(wf.state(), WorkflowState::Failed);

		let err = wf.select_symbol("AAPL").await.unwrap_err();
		assert!(matches!(err, Error::InvalidWorkflowTransition { state: WorkflowState::Failed, .. }));
		assert_eq!(wf.trail(), [WorkflowState::Idle, WorkflowState::Failed]);
	}

	#[tokio::test]
	async fn unbound_action_fails_before_touching_page() {
		let site = FakeSite::new();
		let page = site.page();
		let mut selectors = OrderSelectors::default();
		selectors.actions.remove(&Action::Short);
		let mut wf = OrderWorkflow::new(&page, selectors, StepTimeouts::default());
		wf.select_symbol("AAPL").await.unwrap();
		let before = site.events().len();

		let err = wf.select_action(Action::Short).await.unwrap_err();

		assert!(matches!(err, Error::UnsupportedAction(ref a) if a == "Short"));
		assert_eq!(wf.state(), WorkflowState::Failed);
		assert_eq!(site.events().len(), before);
	}

	#[tokio::test]
	async fn unbound_order_type_fails_with_unsupported_order_type() {
		let site = FakeSite::new();
		let page = site.page();
		let mut selectors = OrderSelectors::default();
		selectors.order_types.remove(&OrderType::Stop);
		let mut wf = OrderWorkflow::new(&page, selectors, StepTimeouts::default());

		let err = wf.execute(&order("AAPL", Action::Buy, 1, OrderType::Stop)).await.unwrap_err();

		assert!(matches!(err.root(), Error::UnsupportedOrderType(t) if t == "Stop"));
		assert_eq!(err.step(), Some(WorkflowStep::SelectOrderType));
	}

	#[tokio::test]
	async fn missing_element_surfaces_driver_error() {
		let site = FakeSite::new().with(|s| {
			s.missing.insert("body".into());
		});
		let page = site.page();
		let mut wf = workflow(&page);

		let err = wf.execute(&order("AAPL", Action::Buy, 1, OrderType::Market)).await.unwrap_err();

		assert!(matches!(err.root(), Error::Driver(crate::DriverError::ElementNotFound(_))));
		assert_eq!(err.step(), Some(WorkflowStep::SelectSymbol));
		assert_eq!(wf.state(), WorkflowState::Failed);
	}

	#[tokio::test]
	async fn cancellation_stops_between_steps() {
		let site = FakeSite::new();
		let page = site.page();
		let handle = CancelHandle::new();
		let mut wf = workflow(&page).with_cancel(handle.signal());

		wf.select_symbol("AAPL").await.unwrap();
		handle.cancel();
		let err = wf.execute(&order("AAPL", Action::Buy, 1, OrderType::Market)).await.unwrap_err();

		assert!(err.is_cancelled());
		assert_eq!(err.step(), Some(WorkflowStep::SelectSymbol));
		assert_eq!(wf.state(), WorkflowState::Failed);
	}

	#[tokio::test]
	async fn cancelled_before_start_never_touches_page() {
		let site = FakeSite::new();
		let page = site.page();
		let handle = CancelHandle::new();
		handle.cancel();
		let mut wf = workflow(&page).with_cancel(handle.signal());

		let err = wf.execute(&order("AAPL", Action::Buy, 1, OrderType::Market)).await.unwrap_err();

		assert!(err.is_cancelled());
		assert!(site.events().is_empty());
		assert_eq!(wf.trail(), [WorkflowState::Idle, WorkflowState::Failed]);
	}

	#[test]
	fn steps_chain_without_gaps() {
		for pair in WorkflowStep::ALL.windows(2) {
			assert_eq!(pair[0].produces(), pair[1].requires());
		}
		assert_eq!(WorkflowStep::ALL[0].requires(), WorkflowState::Idle);
		assert!(WorkflowStep::Confirm.produces().is_terminal());
	}

	#[test]
	fn states_serialize_snake_case() {
		assert_eq!(serde_json::to_value(WorkflowState::OrderTypeSelected).unwrap(), "order_type_selected");
		assert_eq!(WorkflowStep::SelectOrderType.to_string(), "select_order_type");
	}
}
