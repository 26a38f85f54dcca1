mod common;

use assert_matches::assert_matches;
use common::{Harness, MERGED_PO_NAME};
use nirmaan::{
    commands::{
        purchaseorders::{
            AmendSession, CancelPurchaseOrderCommand, DeletePurchaseOrderCommand, MergeSelection,
        },
        ConfirmationDialog, SentBackId,
    },
    errors::ServiceError,
    events::Event,
    models::{ProcurementOrder, SentBackCategory},
    store::{doctypes, memory::Mutation, DocumentStore, DocumentStoreExt},
    workflow::{PoStatus, PoView},
};
use rust_decimal_macros::dec;

#[tokio::test]
async fn amended_quantity_is_shown_after_confirm() {
    let mut h = Harness::new();
    h.seed_po("PO/2024/00007", "VEN-A", Some("PR-000101"), &[("I1", 10, 450)]);

    let po: ProcurementOrder = h.store.fetch("PO/2024/00007").await.unwrap();
    let mut session = AmendSession::start(po).unwrap();
    assert!(!session.can_delete());
    assert_matches!(session.delete_line("I1"), Err(ServiceError::InvalidOperation(_)));

    session.set_quantity("I1", dec!(6)).unwrap();
    let result = session
        .submit("Site needs fewer units")
        .unwrap()
        .confirm_and_execute(h.store(), h.events.clone())
        .await
        .unwrap();

    assert_eq!(result.po.item("I1").map(|line| line.quantity), Some(dec!(6)));
    assert_eq!(result.po.status, PoStatus::PoAmendment);

    let sent_back = result.sent_back.expect("sent-back id for the lowered quantity");
    let sb: SentBackCategory = h.store.fetch(&sent_back.name).await.unwrap();
    assert_eq!(sb.item_list.len(), 1);
    assert_eq!(sb.item_list.list[0].name, "I1");
    assert_eq!(sb.item_list.list[0].quantity, dec!(4));
    assert_eq!(
        h.drain_events(),
        vec![Event::PurchaseOrderAmended {
            po: "PO/2024/00007".to_string(),
            sent_back: Some(sent_back.name.clone())
        }]
    );
}

#[tokio::test]
async fn lowered_quantity_without_sent_back_id_is_an_error() {
    let mut h = Harness::new();
    h.seed_po("PO/2024/00009", "VEN-A", Some("PR-000101"), &[("I1", 10, 450)]);
    h.store.register_method(nirmaan::commands::methods::AMEND_PO, |_, _| {
        Ok(serde_json::json!({"status": 200, "message": "PO amended"}))
    });

    let po: ProcurementOrder = h.store.fetch("PO/2024/00009").await.unwrap();
    let mut session = AmendSession::start(po).unwrap();
    session.set_quantity("I1", dec!(6)).unwrap();
    let dialog = session.submit("Site needs fewer units").unwrap();
    assert_eq!(dialog.command().removed_items.len(), 1);
    assert_eq!(dialog.command().removed_items[0].quantity, dec!(4));

    let result = dialog.confirm_and_execute(h.store(), h.events.clone()).await;
    assert_matches!(result, Err(ServiceError::ExtractionError(_)));
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn raising_a_quantity_sends_nothing_back() {
    let mut h = Harness::new();
    h.seed_po("PO/2024/00010", "VEN-A", Some("PR-000101"), &[("I1", 10, 450)]);

    let po: ProcurementOrder = h.store.fetch("PO/2024/00010").await.unwrap();
    let mut session = AmendSession::start(po).unwrap();
    session.set_quantity("I1", dec!(12)).unwrap();
    let result = session
        .submit("Additional floor slab")
        .unwrap()
        .confirm_and_execute(h.store(), h.events.clone())
        .await
        .unwrap();

    assert!(result.sent_back.is_none());
    assert!(h.store.snapshot(doctypes::SENT_BACK_CATEGORY).is_empty());
    assert_eq!(
        h.drain_events(),
        vec![Event::PurchaseOrderAmended {
            po: "PO/2024/00010".to_string(),
            sent_back: None
        }]
    );
}

#[tokio::test]
async fn removing_a_line_sends_its_value_back() {
    let h = Harness::new();
    h.seed_po(
        "PO/2024/00008",
        "VEN-A",
        Some("PR-000101"),
        &[("I1", 10, 450), ("I2", 4, 1200)],
    );

    let po: ProcurementOrder = h.store.fetch("PO/2024/00008").await.unwrap();
    let mut session = AmendSession::start(po).unwrap();
    session.delete_line("I2").unwrap();
    assert!(!session.can_delete());

    let result = session
        .submit("Vendor cannot supply switchgear")
        .unwrap()
        .confirm_and_execute(h.store(), h.events.clone())
        .await
        .unwrap();

    let sent_back = result.sent_back.expect("sent-back id");
    let sb: SentBackCategory = h.store.fetch(&sent_back.name).await.unwrap();
    assert_eq!(sb.item_list.len(), 1);
    assert_eq!(sb.item_list.list[0].name, "I2");
    assert_eq!(result.po.order_list.len(), 1);
}

#[tokio::test]
async fn cancelled_po_shows_up_in_rejected_list() {
    let mut h = Harness::new();
    h.seed_po("PO/2024/00011", "VEN-B", Some("PR-000102"), &[("I1", 3, 100)]);

    let result = ConfirmationDialog::open(
        CancelPurchaseOrderCommand::new("PO/2024/00011").with_comment("Duplicate order"),
    )
    .confirm_and_execute(h.store(), h.events.clone())
    .await
    .unwrap();

    assert_eq!(SentBackId::parse(&result.sent_back.name), Some(result.sent_back.clone()));
    assert_eq!(result.sent_back.suffix.len(), 5);

    let row = result
        .await_rejected_listing(h.store.as_ref(), &h.timeouts)
        .await
        .unwrap();
    assert_eq!(
        PoView::Rejected.cell_id(&row).as_deref(),
        Some(result.sent_back.suffix.as_str())
    );
    assert_eq!(row["type"], "Cancelled");

    let po: ProcurementOrder = h.store.fetch("PO/2024/00011").await.unwrap();
    assert_eq!(po.status, PoStatus::Cancelled);
    assert_matches!(h.drain_events().as_slice(), [Event::PurchaseOrderCancelled { .. }]);
}

#[tokio::test]
async fn custom_po_offers_delete_not_cancel() {
    let h = Harness::new();
    h.seed_po("PO/2024/00012", "VEN-B", None, &[("I1", 1, 999)]);

    let cancel = ConfirmationDialog::open(CancelPurchaseOrderCommand::new("PO/2024/00012"))
        .confirm_and_execute(h.store(), h.events.clone())
        .await;
    assert_matches!(cancel, Err(ServiceError::InvalidOperation(_)));
    assert_eq!(h.store.mutation_count(), 0);

    ConfirmationDialog::open(DeletePurchaseOrderCommand::new("PO/2024/00012"))
        .confirm_and_execute(h.store(), h.events.clone())
        .await
        .unwrap();
    assert!(h.store.find(doctypes::PROCUREMENT_ORDERS, "PO/2024/00012").is_none());
    assert_eq!(
        h.store.mutations(),
        vec![Mutation::Delete {
            doctype: doctypes::PROCUREMENT_ORDERS.to_string(),
            name: "PO/2024/00012".to_string()
        }]
    );
}

#[tokio::test]
async fn dispatched_po_has_no_destructive_action() {
    let h = Harness::new();
    h.seed_po("PO/2024/00013", "VEN-B", Some("PR-000102"), &[("I1", 1, 10)]);
    h.store
        .patch(doctypes::PROCUREMENT_ORDERS, "PO/2024/00013", serde_json::json!({"status": "Dispatched"}))
        .unwrap();

    let result = ConfirmationDialog::open(CancelPurchaseOrderCommand::new("PO/2024/00013"))
        .confirm_and_execute(h.store(), h.events.clone())
        .await;
    assert_matches!(result, Err(ServiceError::PreconditionFailed(_)));
}

#[tokio::test]
async fn merged_po_is_listed_among_approved() {
    let mut h = Harness::new();
    h.seed_po("PO/2024/00020", "VEN-A", Some("PR-000103"), &[("I1", 2, 100)]);
    h.seed_po("PO/2024/00021", "VEN-A", Some("PR-000104"), &[("I2", 1, 300)]);
    h.seed_po("PO/2024/00022", "VEN-A", Some("PR-000105"), &[("I3", 5, 20)]);
    h.seed_po("PO/2024/00023", "VEN-C", Some("PR-000106"), &[("I4", 5, 20)]);

    let mut selection = MergeSelection::load(h.store.as_ref(), "PO/2024/00020", h.timeouts.clone())
        .await
        .unwrap();
    let candidates: Vec<_> = selection.candidates().iter().map(|po| po.name.as_str()).collect();
    assert_eq!(candidates, vec!["PO/2024/00021", "PO/2024/00022"]);

    selection.toggle("PO/2024/00021").unwrap();
    let dialog = selection.open_dialog().unwrap();
    assert_eq!(dialog.preview().totals.excl_gst, dec!(500));

    let result = dialog
        .proceed()
        .confirm_and_execute(h.store(), h.events.clone())
        .await
        .unwrap();

    assert_eq!(result.new_po_name, MERGED_PO_NAME);
    assert_eq!(PoView::Approved.cell_id(&result.listing).as_deref(), Some(MERGED_PO_NAME));

    let merged: ProcurementOrder = h.store.fetch(MERGED_PO_NAME).await.unwrap();
    assert_eq!(merged.order_list.len(), 2);
    let source: ProcurementOrder = h.store.fetch("PO/2024/00021").await.unwrap();
    assert_eq!(source.status, PoStatus::Merged);
    let untouched: ProcurementOrder = h.store.fetch("PO/2024/00022").await.unwrap();
    assert_eq!(untouched.status, PoStatus::PoApproved);

    assert_eq!(
        h.drain_events(),
        vec![Event::PurchaseOrdersMerged {
            sources: vec!["PO/2024/00020".to_string(), "PO/2024/00021".to_string()],
            new_po: MERGED_PO_NAME.to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn merge_fails_when_new_po_never_appears() {
    let mut h = Harness::with_unlisted_merge();
    h.seed_po("PO/2024/00030", "VEN-A", Some("PR-000107"), &[("I1", 2, 100)]);
    h.seed_po("PO/2024/00031", "VEN-A", Some("PR-000108"), &[("I2", 1, 300)]);

    let mut selection = MergeSelection::load(h.store.as_ref(), "PO/2024/00030", h.timeouts.clone())
        .await
        .unwrap();
    selection.toggle("PO/2024/00031").unwrap();
    let result = selection
        .open_dialog()
        .unwrap()
        .proceed()
        .confirm_and_execute(h.store(), h.events.clone())
        .await;

    assert_matches!(result, Err(ServiceError::Timeout(_)));
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn extraction_failure_is_reported() {
    let h = Harness::new();
    h.seed_po("PO/2024/00040", "VEN-A", Some("PR-000109"), &[("I1", 2, 100)]);
    h.store.register_method(nirmaan::commands::methods::CANCEL_PO, |_, _| {
        Ok(serde_json::json!({"status": 200, "message": "Cancelled"}))
    });

    let result = ConfirmationDialog::open(CancelPurchaseOrderCommand::new("PO/2024/00040"))
        .confirm_and_execute(h.store(), h.events.clone())
        .await;
    let err = result.unwrap_err();
    assert_matches!(err, ServiceError::ExtractionError(_));
    assert_eq!(err.toast().title, "Unexpected Response");

    let count = h
        .store
        .count(doctypes::SENT_BACK_CATEGORY, &[])
        .await
        .unwrap();
    assert_eq!(count, 0);
}
