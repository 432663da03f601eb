use serde::Serialize;
use tracing::debug;

use crate::domain::{
    AgentEvent, AgentStage, EventType, PendingApproval, VendorKey, VendorPatch, VendorStatus,
};

use super::view::{ActivityEntry, OrderView};

pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Input to the fold: a feed event, or a command result confirmed by the
/// backend.
#[derive(Clone, Debug, PartialEq)]
pub enum Fact {
    Event(AgentEvent),
    ApprovalConfirmed { order_id: String },
}

impl From<AgentEvent> for Fact {
    fn from(event: AgentEvent) -> Self {
        Self::Event(event)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "order_id", rename_all = "snake_case")]
pub enum ApprovalChange {
    Added(String),
    DuplicateIgnored(String),
    AlreadyResolved(String),
    Removed(String),
    NothingToRemove(String),
}

/// One-time terminal transition requested by a completed order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TerminalTransition {
    pub order_id: Option<String>,
}

/// What a single fold changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FoldOutcome {
    pub phase_changed: bool,
    pub logged: bool,
    pub vendor: Option<VendorKey>,
    pub approval: Option<ApprovalChange>,
    pub terminal: Option<TerminalTransition>,
}

#[derive(Clone, Debug)]
pub struct Reconciler {
    log_capacity: usize,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl Reconciler {
    pub fn new(log_capacity: usize) -> Self {
        Self { log_capacity: log_capacity.max(1) }
    }

    /// Fold by value, returning the next view.
    pub fn fold(&self, mut view: OrderView, fact: &Fact) -> (OrderView, FoldOutcome) {
        let outcome = self.apply(&mut view, fact);
        (view, outcome)
    }

    /// Fold `fact` into `view` in place.
    pub fn apply(&self, view: &mut OrderView, fact: &Fact) -> FoldOutcome {
        view.facts_applied += 1;
        match fact {
            Fact::Event(event) => self.apply_event(view, event),
            Fact::ApprovalConfirmed { order_id } => FoldOutcome {
                approval: Some(remove_approval(view, order_id)),
                ..FoldOutcome::default()
            },
        }
    }

    fn apply_event(&self, view: &mut OrderView, event: &AgentEvent) -> FoldOutcome {
        let mut outcome = FoldOutcome::default();

        if let Some(order_id) = &event.order_id {
            view.order_id = Some(order_id.clone());
        }

        // delivery order wins over embedded timestamps
        if let Some(stage) = &event.stage {
            let phase = stage.phase();
            outcome.phase_changed = phase != view.phase;
            view.phase = phase;
            view.failed = *stage == AgentStage::Failed;
            view.stage = Some(stage.clone());
        }

        if !event.message.trim().is_empty() {
            outcome.logged = self.log(view, ActivityEntry::from_event(event));
        }

        match event.event_type {
            EventType::CallUpdate => {
                outcome.vendor = VendorPatch::from_call_update(event)
                    .map(|patch| upsert_vendor(view, patch, VendorStatus::Calling));
            }
            EventType::VendorUpdate => {
                outcome.vendor = VendorPatch::from_vendor_update(event)
                    .map(|patch| upsert_vendor(view, patch, VendorStatus::Found));
            }
            EventType::EvaluationUpdate => {
                outcome.vendor = apply_evaluation(view, event);
            }
            EventType::ApprovalRequired => {
                outcome.approval = PendingApproval::from_event(event)
                    .map(|approval| insert_approval(view, approval));
            }
            EventType::OrderUpdate if event.stage == Some(AgentStage::Approved) => {
                outcome.approval =
                    event.correlated_order_id().map(|order_id| remove_approval(view, &order_id));
            }
            _ => {}
        }

        if event.stage.as_ref().is_some_and(AgentStage::is_terminal_success) {
            let order_key = event.order_id.clone().unwrap_or_default();
            if view.terminal_orders.insert(order_key) {
                outcome.terminal = Some(TerminalTransition { order_id: event.order_id.clone() });
            }
        }

        outcome
    }

    fn log(&self, view: &mut OrderView, entry: ActivityEntry) -> bool {
        if view.activity.iter().any(|existing| existing.same_event(&entry)) {
            debug!(entry = %entry.message, "skipping already logged event");
            return false;
        }
        view.activity.push_front(entry);
        view.activity.truncate(self.log_capacity);
        true
    }
}

fn upsert_vendor(
    view: &mut OrderView,
    patch: VendorPatch,
    default_status: VendorStatus,
) -> VendorKey {
    let key = patch.key();
    match view.vendors.iter_mut().find(|vendor| vendor.key == key) {
        Some(existing) => existing.merge(patch),
        None => view.vendors.push(patch.into_vendor(default_status)),
    }
    key
}

fn apply_evaluation(view: &mut OrderView, event: &AgentEvent) -> Option<VendorKey> {
    let selected = event.data_str(&["selected_vendor"])?;
    view.selected_vendor = Some(selected.clone());

    let key = VendorKey::derive(event.order_id.as_deref(), &selected);
    let final_score = event.data_f64(&["final_score"]);
    let vendor = view.vendors.iter_mut().find(|vendor| vendor.key == key)?;
    if final_score.is_some() {
        vendor.final_score = final_score;
    }
    Some(key)
}

/// First-wins: an approval already surfaced to the operator is never
/// replaced by a later duplicate, and a confirmed one is never re-added by a
/// replayed request.
fn insert_approval(view: &mut OrderView, approval: PendingApproval) -> ApprovalChange {
    if view.resolved_approvals.contains(&approval.order_id) {
        debug!(order_id = %approval.order_id, "approval request for resolved order ignored");
        return ApprovalChange::AlreadyResolved(approval.order_id);
    }
    if view.pending_approval(&approval.order_id).is_some() {
        debug!(order_id = %approval.order_id, "duplicate approval request ignored");
        return ApprovalChange::DuplicateIgnored(approval.order_id);
    }
    let order_id = approval.order_id.clone();
    view.pending_approvals.push(approval);
    ApprovalChange::Added(order_id)
}

fn remove_approval(view: &mut OrderView, order_id: &str) -> ApprovalChange {
    view.resolved_approvals.insert(order_id.to_owned());
    let before = view.pending_approvals.len();
    view.pending_approvals.retain(|approval| approval.order_id != order_id);
    if view.pending_approvals.len() < before {
        ApprovalChange::Removed(order_id.to_owned())
    } else {
        ApprovalChange::NothingToRemove(order_id.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use crate::domain::{AgentEvent, AgentStage, EventType, Phase, VendorStatus};
    use crate::reconciler::view::{LogLevel, OrderView};

    use super::{ApprovalChange, Fact, Reconciler, TerminalTransition};

    fn event(event_type: EventType, stage: AgentStage, message: &str) -> AgentEvent {
        AgentEvent::new(event_type, Some(stage), message).with_order("O1")
    }

    fn approval_required(price: f64) -> AgentEvent {
        event(EventType::ApprovalRequired, AgentStage::ApprovalPending, "Approval needed")
            .with_data("vendor_name", "Acme")
            .with_data("price", json!(price))
            .with_data("product", "Flour")
            .with_data("quantity", json!(100))
            .with_data("unit", "lb")
    }

    fn fold_all(reconciler: &Reconciler, events: Vec<AgentEvent>) -> OrderView {
        events.into_iter().fold(OrderView::default(), |view, event| {
            reconciler.fold(view, &Fact::Event(event)).0
        })
    }

    #[test]
    fn concrete_order_scenario_reaches_payment_with_answered_vendor() {
        let view = fold_all(
            &Reconciler::default(),
            vec![
                event(EventType::StageChange, AgentStage::Sourcing, "Sourcing flour"),
                event(EventType::CallUpdate, AgentStage::Calling, "Calling Acme")
                    .with_data("vendor", "Acme")
                    .with_data("status", "initiated"),
                event(EventType::CallUpdate, AgentStage::Negotiating, "Call with Acme ended")
                    .with_data("vendor", "Acme")
                    .with_data("status", "completed")
                    .with_data("price", json!(4.25)),
                approval_required(4.25),
                event(EventType::OrderUpdate, AgentStage::Approved, "Order approved"),
            ],
        );

        assert_eq!(view.phase, Phase::Payment);
        let acme = view.vendor_named("Acme").expect("acme tracked");
        assert_eq!(acme.status, VendorStatus::Answered);
        assert_eq!(acme.price_per_unit, Some(Decimal::new(425, 2)));
        assert!(view.pending_approvals.is_empty());
        assert_eq!(view.vendors.len(), 1);
    }

    #[test]
    fn duplicate_approval_keeps_the_first_price() {
        let reconciler = Reconciler::default();
        let mut view = OrderView::default();

        let first = reconciler.apply(&mut view, &Fact::Event(approval_required(4.25)));
        let second = reconciler.apply(&mut view, &Fact::Event(approval_required(3.99)));

        assert_eq!(first.approval, Some(ApprovalChange::Added("O1".to_owned())));
        assert_eq!(second.approval, Some(ApprovalChange::DuplicateIgnored("O1".to_owned())));
        assert_eq!(view.pending_approvals.len(), 1);
        assert_eq!(view.pending_approvals[0].price, Decimal::new(425, 2));
    }

    #[test]
    fn same_approval_event_twice_yields_one_pending_approval() {
        let reconciler = Reconciler::default();
        let approval = approval_required(4.25);
        let view = fold_all(&reconciler, vec![approval.clone(), approval]);

        assert_eq!(view.pending_approvals.len(), 1);
        assert_eq!(view.activity.len(), 1, "identical event is logged once");
    }

    #[test]
    fn approved_without_pending_approval_is_a_no_op() {
        let reconciler = Reconciler::default();
        let mut view = fold_all(&reconciler, vec![approval_required(4.25)]);
        view.pending_approvals.clear();
        let before = view.clone();

        let outcome = reconciler.apply(&mut view, &Fact::ApprovalConfirmed { order_id: "O1".into() });

        assert_eq!(outcome.approval, Some(ApprovalChange::NothingToRemove("O1".to_owned())));
        assert_eq!(view.pending_approvals, before.pending_approvals);
        assert_eq!(view.phase, before.phase);
        assert_eq!(view.activity, before.activity);
    }

    #[test]
    fn confirmed_command_removes_pending_approval_without_touching_phase() {
        let reconciler = Reconciler::default();
        let mut view = fold_all(&reconciler, vec![approval_required(4.25)]);

        let outcome =
            reconciler.apply(&mut view, &Fact::ApprovalConfirmed { order_id: "O1".to_owned() });

        assert_eq!(outcome.approval, Some(ApprovalChange::Removed("O1".to_owned())));
        assert!(view.pending_approvals.is_empty());
        assert_eq!(view.phase, Phase::Approval);
    }

    #[test]
    fn replayed_approval_request_stays_cleared_in_any_arrival_order() {
        let reconciler = Reconciler::default();
        let mut request = approval_required(4.25);
        request.timestamp = Some("2026-01-01T00:00:00Z".to_owned());
        let live = Fact::Event(request.clone());
        let backfill = Fact::Event(request);
        let confirmed = Fact::ApprovalConfirmed { order_id: "O1".to_owned() };

        let mut backfill_first = OrderView::default();
        for fact in [&live, &backfill, &confirmed] {
            reconciler.apply(&mut backfill_first, fact);
        }

        let mut confirmed_first = OrderView::default();
        reconciler.apply(&mut confirmed_first, &live);
        reconciler.apply(&mut confirmed_first, &confirmed);
        let replay = reconciler.apply(&mut confirmed_first, &backfill);

        assert!(backfill_first.pending_approvals.is_empty());
        assert!(confirmed_first.pending_approvals.is_empty());
        assert_eq!(replay.approval, Some(ApprovalChange::AlreadyResolved("O1".to_owned())));
    }

    #[test]
    fn approved_order_update_clears_approval_after_replay() {
        let reconciler = Reconciler::default();
        let view = fold_all(
            &reconciler,
            vec![
                approval_required(4.25),
                event(EventType::OrderUpdate, AgentStage::Approved, "Order approved"),
                approval_required(4.25),
            ],
        );

        assert!(view.pending_approvals.is_empty());
        assert!(view.resolved_approvals.contains("O1"));
    }

    #[test]
    fn approval_keyed_by_payload_order_id_is_cleared_by_matching_order_update() {
        let reconciler = Reconciler::default();
        let request =
            AgentEvent::new(EventType::ApprovalRequired, Some(AgentStage::ApprovalPending), "")
                .with_data("order_id", "O9")
                .with_data("price", json!(4.25))
                .with_data("quantity", json!(100));
        let approved = AgentEvent::new(EventType::OrderUpdate, Some(AgentStage::Approved), "")
            .with_data("order_id", "O9");

        let mut view = OrderView::default();
        reconciler.apply(&mut view, &Fact::Event(request));
        assert!(view.pending_approval("O9").is_some());

        let outcome = reconciler.apply(&mut view, &Fact::Event(approved));
        assert_eq!(outcome.approval, Some(ApprovalChange::Removed("O9".to_owned())));
        assert!(view.pending_approvals.is_empty());
    }

    #[test]
    fn later_delivery_overrides_phase_even_with_earlier_timestamp() {
        let reconciler = Reconciler::default();
        let mut late = event(EventType::StageChange, AgentStage::Sourcing, "Back to sourcing");
        late.timestamp = Some("2000-01-01T00:00:00Z".to_owned());

        let view = fold_all(
            &reconciler,
            vec![event(EventType::StageChange, AgentStage::Evaluating, "Evaluating"), late],
        );

        assert_eq!(view.phase, Phase::Sourcing);
    }

    #[test]
    fn unknown_stage_folds_to_sourcing() {
        let view = fold_all(
            &Reconciler::default(),
            vec![
                event(EventType::StageChange, AgentStage::Evaluating, "Evaluating"),
                event(EventType::System, AgentStage::from("warp_drive"), "Unknown stage"),
            ],
        );
        assert_eq!(view.phase, Phase::Sourcing);
    }

    #[test]
    fn failed_stage_is_complete_but_flagged() {
        let view = fold_all(
            &Reconciler::default(),
            vec![event(EventType::PaymentUpdate, AgentStage::Failed, "Payment failed")
                .with_data("level", "error")],
        );

        assert_eq!(view.phase, Phase::Complete);
        assert!(view.failed);
        assert_eq!(view.activity[0].level, LogLevel::Error);
    }

    #[test]
    fn log_levels_follow_level_then_event_type() {
        let view = fold_all(
            &Reconciler::default(),
            vec![
                event(EventType::Log, AgentStage::Calling, "warn").with_data("level", "warning"),
                event(EventType::StageChange, AgentStage::Calling, "stage"),
                event(EventType::VendorUpdate, AgentStage::Sourcing, "found vendor"),
                event(EventType::Log, AgentStage::Calling, "").with_data("level", "error"),
            ],
        );

        let levels: Vec<LogLevel> = view.activity.iter().map(|entry| entry.level).collect();
        assert_eq!(levels, vec![LogLevel::Success, LogLevel::Info, LogLevel::Warning]);
    }

    #[test]
    fn activity_log_is_bounded_and_newest_first() {
        let reconciler = Reconciler::new(3);
        let events = (0..5)
            .map(|index| {
                let mut entry = event(EventType::Log, AgentStage::Sourcing, &format!("entry {index}"));
                entry.timestamp = Some(format!("2026-01-01T00:00:0{index}Z"));
                entry
            })
            .collect();

        let view = fold_all(&reconciler, events);

        let messages: Vec<&str> = view.activity.iter().map(|entry| entry.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 4", "entry 3", "entry 2"]);
    }

    #[test]
    fn unrecognised_call_status_preserves_existing_status() {
        let view = fold_all(
            &Reconciler::default(),
            vec![
                event(EventType::CallUpdate, AgentStage::Calling, "dial")
                    .with_data("vendor_name", "Acme")
                    .with_data("call_status", "failed"),
                event(EventType::CallUpdate, AgentStage::Calling, "ringing")
                    .with_data("vendor_name", "Acme")
                    .with_data("call_status", "ringing")
                    .with_data("transcript", "..."),
            ],
        );

        let acme = view.vendor_named("Acme").expect("acme");
        assert_eq!(acme.status, VendorStatus::Declined);
        assert_eq!(acme.transcript.as_deref(), Some("..."));
    }

    #[test]
    fn vendor_update_registers_found_vendor_and_evaluation_selects_it() {
        let view = fold_all(
            &Reconciler::default(),
            vec![
                event(EventType::VendorUpdate, AgentStage::Sourcing, "Found Mill Co")
                    .with_data("vendor_name", "Mill Co"),
                event(EventType::EvaluationUpdate, AgentStage::Evaluating, "Mill Co selected")
                    .with_data("selected_vendor", "Mill Co")
                    .with_data("final_score", json!(81.5)),
            ],
        );

        let mill = view.vendor_named("Mill Co").expect("mill");
        assert_eq!(mill.status, VendorStatus::Found);
        assert_eq!(mill.final_score, Some(81.5));
        assert_eq!(view.selected_vendor.as_deref(), Some("Mill Co"));
        assert_eq!(view.phase, Phase::Evaluating);
    }

    #[test]
    fn terminal_transition_is_requested_once_per_order() {
        let reconciler = Reconciler::default();
        let mut view = OrderView::default();

        let first = reconciler.apply(
            &mut view,
            &Fact::Event(event(EventType::PaymentUpdate, AgentStage::PaymentComplete, "Paid")),
        );
        let second = reconciler.apply(
            &mut view,
            &Fact::Event(event(EventType::StageChange, AgentStage::Completed, "Done")),
        );

        assert_eq!(first.terminal, Some(TerminalTransition { order_id: Some("O1".to_owned()) }));
        assert_eq!(second.terminal, None);
        assert_eq!(view.phase, Phase::Complete);
    }

    #[test]
    fn events_without_stage_leave_phase_alone() {
        let reconciler = Reconciler::default();
        let mut view = fold_all(
            &reconciler,
            vec![event(EventType::StageChange, AgentStage::Negotiating, "Negotiating")],
        );

        let stageless = AgentEvent::new(EventType::Log, None, "note");
        let outcome = reconciler.apply(&mut view, &Fact::Event(stageless));

        assert!(!outcome.phase_changed);
        assert_eq!(view.phase, Phase::Negotiating);
    }
}
