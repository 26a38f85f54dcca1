//! Every state-changing command stays inert until its dialog is confirmed.

mod common;

use common::Harness;
use nirmaan::{
    commands::{
        procurement_requests::CustomPrApproval,
        purchaseorders::{
            AmendSession, CancelPurchaseOrderCommand, DeletePurchaseOrderCommand, MergeSelection,
        },
        service_requests::{ApproveServiceRequestCommand, RejectServiceRequestCommand},
        Command, ConfirmationDialog,
    },
    models::{ProcurementOrder, ProcurementRequest},
    store::{doctypes, DocumentStoreExt},
};
use rstest::rstest;
use rust_decimal_macros::dec;
use serde_json::Value;

fn seeded() -> Harness {
    let h = Harness::new();
    h.seed_po("PO/2024/00100", "VEN-A", Some("PR-000200"), &[("I1", 4, 250), ("I2", 2, 80)]);
    h.seed_po("PO/2024/00101", "VEN-A", Some("PR-000201"), &[("I3", 1, 900)]);
    h.seed_po("PO/2024/00102", "VEN-A", None, &[("I4", 1, 50)]);
    h.seed_custom_pr("PR-000300");
    h.seed_sr("SR-000001", "Vendor Selected");
    h
}

fn snapshot(h: &Harness) -> Vec<Vec<Value>> {
    [
        doctypes::PROCUREMENT_ORDERS,
        doctypes::PROCUREMENT_REQUESTS,
        doctypes::SERVICE_REQUESTS,
        doctypes::SENT_BACK_CATEGORY,
        doctypes::COMMENTS,
    ]
    .iter()
    .map(|doctype| h.store.snapshot(doctype))
    .collect()
}

fn assert_cancel_is_inert<C: Command>(h: &mut Harness, dialog: ConfirmationDialog<C>, heading: &str) {
    let before = snapshot(h);
    assert_eq!(dialog.heading(), heading);
    let _command = dialog.cancel();
    assert_eq!(h.store.mutation_count(), 0);
    assert_eq!(snapshot(h), before);
    assert!(h.drain_events().is_empty());
}

#[rstest]
#[case::cancel_po("cancel_po")]
#[case::delete_po("delete_po")]
#[case::approve_sr("approve_sr")]
#[case::reject_sr("reject_sr")]
#[tokio::test]
async fn cancelling_the_dialog_changes_nothing(#[case] action: &str) {
    let mut h = seeded();
    match action {
        "cancel_po" => assert_cancel_is_inert(
            &mut h,
            ConfirmationDialog::open(CancelPurchaseOrderCommand::new("PO/2024/00100")),
            "Cancel PO/2024/00100?",
        ),
        "delete_po" => assert_cancel_is_inert(
            &mut h,
            ConfirmationDialog::open(DeletePurchaseOrderCommand::new("PO/2024/00102")),
            "Delete PO/2024/00102?",
        ),
        "approve_sr" => assert_cancel_is_inert(
            &mut h,
            ConfirmationDialog::open(ApproveServiceRequestCommand::new("SR-000001")),
            "Approve SR-000001?",
        ),
        "reject_sr" => assert_cancel_is_inert(
            &mut h,
            ConfirmationDialog::open(RejectServiceRequestCommand::new("SR-000001", "Too costly")),
            "Reject SR-000001?",
        ),
        other => unreachable!("unknown action {}", other),
    }
}

#[tokio::test]
async fn cancelling_amendment_confirmation_changes_nothing() {
    let mut h = seeded();
    let po: ProcurementOrder = h.store.fetch("PO/2024/00100").await.unwrap();
    let mut session = AmendSession::start(po).unwrap();
    session.set_quantity("I1", dec!(3)).unwrap();
    session.delete_line("I2").unwrap();
    let dialog = session.submit("Revised BOQ").unwrap();
    assert_cancel_is_inert(&mut h, dialog, "Confirm PO Amendment?");
}

#[tokio::test]
async fn both_merge_dialogs_can_be_backed_out_of() {
    let mut h = seeded();
    let mut selection = MergeSelection::load(h.store.as_ref(), "PO/2024/00100", h.timeouts.clone())
        .await
        .unwrap();
    selection.toggle("PO/2024/00101").unwrap();

    let selection = selection.open_dialog().unwrap().cancel();
    assert_eq!(h.store.mutation_count(), 0);

    let dialog = selection.open_dialog().unwrap().proceed();
    assert_cancel_is_inert(&mut h, dialog, "Confirm Merge?");
}

#[tokio::test]
async fn cancelling_custom_pr_approval_changes_nothing() {
    let mut h = seeded();
    let pr: ProcurementRequest = h.store.fetch("PR-000300").await.unwrap();
    let mut approval = CustomPrApproval::new(pr).unwrap();
    for vendor in ["VEN-A", "VEN-B"] {
        approval.expand(vendor).unwrap();
    }
    approval.check("VEN-A", "CI-1").unwrap();
    approval.check("VEN-A", "CI-3").unwrap();
    approval.check("VEN-B", "CI-2").unwrap();

    let dialog = approval.approve().unwrap();
    assert_cancel_is_inert(&mut h, dialog, "Confirm Approval?");
}
