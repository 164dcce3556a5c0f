// src/pipeline.rs

use crate::apportion::{self, ApportionError, LineItem};
use crate::extract::{ExtractionError, InvoiceExtractor};
use crate::parser::{self, ParseError};
use crate::roster::{Roster, RosterError};
use crate::settlement::{self, Assignment, Settlement};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Where a session is in the single-pass flow. Transitions only move
/// forward; there is no path back to revise the roster or re-upload an
/// invoice once it parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    CollectingParticipants,
    PayerSelected,
    AwaitingInvoice,
    InvoiceParsed,
    AssigningSplits,
    Settled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CollectingParticipants => "collecting-participants",
            Stage::PayerSelected => "payer-selected",
            Stage::AwaitingInvoice => "awaiting-invoice",
            Stage::InvoiceParsed => "invoice-parsed",
            Stage::AssigningSplits => "assigning-splits",
            Stage::Settled => "settled",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("could not read invoice: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Apportion(#[from] ApportionError),
    #[error("no line item named {0:?} on this invoice")]
    UnknownItem(String),
    #[error("{command} is not valid while the session is {stage}")]
    WrongStage { command: &'static str, stage: Stage },
}

/// The whole of one splitting session: roster, parsed invoice,
/// assignments, and the settlement once computed.
///
/// This is a plain serializable value. The driving front-end owns one
/// instance per session, advances it through the command methods, and
/// persists it between interactions; concurrent sessions never share an
/// instance. A failed command returns the error and leaves the state
/// exactly as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    stage: Stage,
    roster: Roster,
    items: Vec<LineItem>,
    assignments: IndexMap<String, Assignment>,
    settlement: Option<Settlement>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            stage: Stage::CollectingParticipants,
            roster: Roster::new(),
            items: Vec::new(),
            assignments: IndexMap::new(),
            settlement: None,
        }
    }

    // -- read-only snapshot --------------------------------------------------

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn payer(&self) -> Option<&str> {
        self.roster.payer()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.values()
    }

    pub fn assignment_for(&self, item: &str) -> Option<&Assignment> {
        self.assignments.get(item)
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    // -- commands ------------------------------------------------------------

    /// Add a participant to the roster.
    pub fn add_participant(&mut self, name: &str) -> Result<(), PipelineError> {
        self.ensure_stage("add-participant", &[Stage::CollectingParticipants])?;
        self.roster.add(name)?;
        info!(participant = %name, count = self.roster.len(), "Participant added");
        Ok(())
    }

    /// Designate who fronted the bill. Allowed until an invoice has
    /// been submitted; re-selecting before that point replaces the
    /// previous choice.
    pub fn set_payer(&mut self, name: &str) -> Result<(), PipelineError> {
        self.ensure_stage(
            "set-payer",
            &[Stage::CollectingParticipants, Stage::PayerSelected],
        )?;
        self.roster.set_payer(name)?;
        self.stage = Stage::PayerSelected;
        info!(payer = %name, "Payer selected");
        Ok(())
    }

    /// Run an invoice photo through the extraction collaborator and
    /// ingest the result.
    ///
    /// Extraction, parse, and apportionment failures all leave the
    /// session at `AwaitingInvoice` with the roster untouched, so the
    /// upload can simply be retried.
    pub async fn submit_invoice_image(
        &mut self,
        image: &[u8],
        extractor: &dyn InvoiceExtractor,
    ) -> Result<(), PipelineError> {
        self.ensure_stage(
            "submit-invoice",
            &[Stage::PayerSelected, Stage::AwaitingInvoice],
        )?;
        self.stage = Stage::AwaitingInvoice;

        let raw = extractor.extract(image).await?;
        self.ingest_extraction(&raw)
    }

    /// Parse and apportion one extraction response. Split out of
    /// `submit_invoice_image` so the text path is testable without a
    /// network collaborator.
    fn ingest_extraction(&mut self, raw: &str) -> Result<(), PipelineError> {
        let (parsed, summary) = parser::parse(raw)?;
        let items = apportion::apportion(parsed, &summary)?;

        info!(
            items = items.len(),
            before_tax = %summary.total_before_tax,
            tax = %summary.total_tax,
            after_tax = %summary.total_after_tax,
            "Invoice parsed and tax apportioned"
        );

        self.items = items;
        self.assignments.clear();
        self.settlement = None;
        self.stage = Stage::InvoiceParsed;
        Ok(())
    }

    /// Record which participants share a line item, replacing any
    /// previous assignment for it. An empty participant list clears
    /// the assignment, leaving the item out of the settlement.
    pub fn assign_participants(
        &mut self,
        item: &str,
        participants: &[&str],
    ) -> Result<(), PipelineError> {
        self.ensure_stage(
            "assign-participants",
            &[Stage::InvoiceParsed, Stage::AssigningSplits],
        )?;

        let line_item = self
            .items
            .iter()
            .find(|i| i.name == item)
            .ok_or_else(|| PipelineError::UnknownItem(item.to_string()))?;

        let mut assigned: IndexSet<String> = IndexSet::new();
        for participant in participants {
            if !self.roster.contains(participant) {
                return Err(RosterError::NotFound(participant.to_string()).into());
            }
            assigned.insert(participant.to_string());
        }

        if assigned.is_empty() {
            self.assignments.shift_remove(item);
        } else {
            self.assignments.insert(
                item.to_string(),
                Assignment {
                    item: line_item.name.clone(),
                    price_incl_tax: line_item.price_incl_tax,
                    participants: assigned,
                },
            );
        }

        self.settlement = None;
        self.stage = Stage::AssigningSplits;
        Ok(())
    }

    /// Derive who owes the payer what. Terminal: the session is
    /// settled afterwards and accepts no further commands.
    pub fn compute_settlement(&mut self) -> Result<&Settlement, PipelineError> {
        self.ensure_stage(
            "compute-settlement",
            &[Stage::InvoiceParsed, Stage::AssigningSplits],
        )?;
        let Some(payer) = self.roster.payer() else {
            return Err(PipelineError::WrongStage {
                command: "compute-settlement",
                stage: self.stage,
            });
        };

        let settlement = settlement::settle(self.assignments.values(), &self.roster, payer);
        info!(
            debtors = settlement.debts().count(),
            self_spend = %settlement.self_spend,
            "Settlement computed"
        );

        self.stage = Stage::Settled;
        Ok(self.settlement.insert(settlement))
    }

    fn ensure_stage(
        &self,
        command: &'static str,
        allowed: &[Stage],
    ) -> Result<(), PipelineError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(PipelineError::WrongStage {
                command,
                stage: self.stage,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    /// Extraction collaborator scripted for tests: either a canned
    /// response or a service failure.
    struct StubExtractor {
        response: Option<String>,
    }

    impl StubExtractor {
        fn returning(text: &str) -> Self {
            Self {
                response: Some(text.to_string()),
            }
        }

        fn failing() -> Self {
            Self { response: None }
        }
    }

    #[async_trait]
    impl InvoiceExtractor for StubExtractor {
        async fn extract(&self, _image: &[u8]) -> Result<String, ExtractionError> {
            match &self.response {
                Some(text) => Ok(text.clone()),
                None => Err(ExtractionError::EmptyResponse),
            }
        }
    }

    fn state_with_roster() -> PipelineState {
        let mut state = PipelineState::new();
        state.add_participant("Alice").unwrap();
        state.add_participant("Bob").unwrap();
        state.add_participant("Carol").unwrap();
        state.set_payer("Alice").unwrap();
        state
    }

    // Two items whose tax-inclusive prices come out to 30.00 and 20.00
    // (46.30 subtotal is irrelevant; tax rate applies per line).
    const RESPONSE: &str =
        "[ItemA, 2, 13.64; ItemB, 1, 18.18][45.46, 4.54, 50.00]";

    async fn state_with_invoice() -> PipelineState {
        let mut state = state_with_roster();
        state
            .submit_invoice_image(b"jpeg-bytes", &StubExtractor::returning(RESPONSE))
            .await
            .unwrap();
        state
    }

    #[tokio::test]
    async fn full_flow_reaches_the_expected_settlement() {
        let mut state = state_with_invoice().await;
        assert_eq!(state.stage(), Stage::InvoiceParsed);
        assert_eq!(state.items()[0].price_incl_tax, dec!(30.00));
        assert_eq!(state.items()[1].price_incl_tax, dec!(20.00));

        state.assign_participants("ItemA", &["Alice", "Bob"]).unwrap();
        state.assign_participants("ItemB", &["Carol"]).unwrap();

        let settlement = state.compute_settlement().unwrap();
        assert_eq!(settlement.owed["Bob"], dec!(15.00));
        assert_eq!(settlement.owed["Carol"], dec!(20.00));
        assert_eq!(settlement.self_spend, dec!(15.00));
        assert_eq!(state.stage(), Stage::Settled);
    }

    #[test]
    fn participants_cannot_be_added_after_payer_selection() {
        let mut state = state_with_roster();
        let err = state.add_participant("Dave").unwrap_err();
        assert!(matches!(err, PipelineError::WrongStage { .. }));
        assert_eq!(state.roster().len(), 3);
    }

    #[tokio::test]
    async fn invoice_requires_a_payer_first() {
        let mut state = PipelineState::new();
        state.add_participant("Alice").unwrap();

        let err = state
            .submit_invoice_image(b"jpeg", &StubExtractor::returning(RESPONSE))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::WrongStage { .. }));
        assert_eq!(state.stage(), Stage::CollectingParticipants);
    }

    #[tokio::test]
    async fn extraction_failure_leaves_the_session_retryable() {
        let mut state = state_with_roster();

        let err = state
            .submit_invoice_image(b"jpeg", &StubExtractor::failing())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
        assert_eq!(state.stage(), Stage::AwaitingInvoice);
        assert_eq!(state.roster().len(), 3);

        state
            .submit_invoice_image(b"jpeg", &StubExtractor::returning(RESPONSE))
            .await
            .unwrap();
        assert_eq!(state.stage(), Stage::InvoiceParsed);
    }

    #[tokio::test]
    async fn malformed_response_is_a_parse_error_and_retryable() {
        let mut state = state_with_roster();

        let err = state
            .submit_invoice_image(b"jpeg", &StubExtractor::returning("[A,1,2;B,2,3]"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert_eq!(state.stage(), Stage::AwaitingInvoice);
        assert!(state.items().is_empty());
    }

    #[tokio::test]
    async fn zero_subtotal_invoice_is_an_apportion_error() {
        let mut state = state_with_roster();

        let err = state
            .submit_invoice_image(
                b"jpeg",
                &StubExtractor::returning("[A, 1, 0; B, 2, 0][0, 1.00, 1.00]"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Apportion(ApportionError::ZeroSubtotal)));
        assert_eq!(state.stage(), Stage::AwaitingInvoice);
    }

    #[tokio::test]
    async fn no_second_invoice_after_a_successful_parse() {
        let mut state = state_with_invoice().await;
        let err = state
            .submit_invoice_image(b"jpeg", &StubExtractor::returning(RESPONSE))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::WrongStage { .. }));
    }

    #[tokio::test]
    async fn assignment_validates_item_and_participants() {
        let mut state = state_with_invoice().await;

        let err = state.assign_participants("Nachos", &["Alice"]).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownItem(_)));

        let err = state.assign_participants("ItemA", &["Mallory"]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Roster(RosterError::NotFound(_))
        ));
        assert!(state.assignment_for("ItemA").is_none());
    }

    #[tokio::test]
    async fn reassignment_replaces_and_empty_clears() {
        let mut state = state_with_invoice().await;

        state.assign_participants("ItemA", &["Alice", "Bob"]).unwrap();
        state.assign_participants("ItemA", &["Carol"]).unwrap();
        let assignment = state.assignment_for("ItemA").unwrap();
        assert_eq!(assignment.participants.len(), 1);
        assert!(assignment.participants.contains("Carol"));

        state.assign_participants("ItemA", &[]).unwrap();
        assert!(state.assignment_for("ItemA").is_none());
    }

    #[tokio::test]
    async fn unassigned_items_are_excluded_from_settlement() {
        let mut state = state_with_invoice().await;
        state.assign_participants("ItemA", &["Bob"]).unwrap();
        // ItemB never assigned

        let settlement = state.compute_settlement().unwrap();
        assert_eq!(settlement.owed["Bob"], dec!(30.00));
        assert_eq!(settlement.owed["Carol"], dec!(0));
        assert_eq!(settlement.self_spend, dec!(0));
    }

    #[tokio::test]
    async fn settled_sessions_accept_no_further_commands() {
        let mut state = state_with_invoice().await;
        state.assign_participants("ItemA", &["Bob"]).unwrap();
        state.compute_settlement().unwrap();

        assert!(matches!(
            state.assign_participants("ItemB", &["Carol"]),
            Err(PipelineError::WrongStage { .. })
        ));
        assert!(matches!(
            state.compute_settlement(),
            Err(PipelineError::WrongStage { .. })
        ));
    }

    #[test]
    fn duplicate_participant_is_surfaced_not_swallowed() {
        let mut state = PipelineState::new();
        state.add_participant("Alice").unwrap();
        let err = state.add_participant("Alice").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Roster(RosterError::AlreadyExists(_))
        ));
        assert_eq!(state.roster().len(), 1);
    }

    #[test]
    fn state_round_trips_through_serde() {
        let state = state_with_roster();
        let json = serde_json::to_string(&state).unwrap();
        let restored: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
