#![allow(dead_code)]

use std::sync::Arc;

use nirmaan::{
    commands::methods,
    config::FlowTimeouts,
    errors::ServiceError,
    events::{Event, EventSender},
    store::{doctypes, memory::InMemoryStore, DocumentStore},
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Name the merge handler gives the new PO.
pub const MERGED_PO_NAME: &str = "PO/2024/00042";

/// An in-memory Frappe site with the workflow methods a real server whitelists.
///
/// Method handlers return the unwrapped `message` payload, which is what
/// `FrappeClient::call` hands back.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub events: Arc<EventSender>,
    rx: mpsc::Receiver<Event>,
    pub timeouts: FlowTimeouts,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        register_workflow_methods(&store, true);
        Self::with_store(store)
    }

    /// A site whose merge handler reports a name but never lists the new PO.
    pub fn with_unlisted_merge() -> Self {
        let store = Arc::new(InMemoryStore::new());
        register_workflow_methods(&store, false);
        Self::with_store(store)
    }

    fn with_store(store: Arc<InMemoryStore>) -> Self {
        let (sender, rx) = EventSender::channel(64);
        Self {
            store,
            events: Arc::new(sender),
            rx,
            timeouts: FlowTimeouts {
                list_lookup_ms: 2_000,
                mutation_ms: 1_000,
                poll_interval_ms: 50,
            },
        }
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn seed_po(&self, name: &str, vendor: &str, pr: Option<&str>, lines: &[(&str, u32, u32)]) {
        let list: Vec<Value> = lines
            .iter()
            .map(|(id, quantity, quote)| {
                json!({
                    "name": id,
                    "item": format!("Item {}", id),
                    "unit": "Nos",
                    "quantity": quantity,
                    "quote": quote,
                    "tax": 18,
                    "category": "Electrical"
                })
            })
            .collect();
        let mut doc = json!({
            "name": name,
            "project": "PROJ-0001",
            "project_name": "Tower A",
            "vendor": vendor,
            "vendor_name": format!("{} Traders", vendor),
            "status": "PO Approved",
            "order_list": {"list": list}
        });
        match pr {
            Some(pr) => doc["procurement_request"] = json!(pr),
            None => doc["custom"] = json!("true"),
        }
        self.store.seed(doctypes::PROCUREMENT_ORDERS, doc);
    }

    pub fn seed_custom_pr(&self, name: &str) {
        self.store.seed(
            doctypes::PROCUREMENT_REQUESTS,
            json!({
                "name": name,
                "project": "PROJ-0001",
                "work_package": "Electrical",
                "workflow_state": "Vendor Selected",
                "procurement_list": {"list": [
                    {"name": "CI-1", "item": "Cable 4sqmm", "quantity": 100, "quote": 42, "vendor": "VEN-A", "status": "Pending"},
                    {"name": "CI-2", "item": "MCB 32A", "quantity": 12, "quote": 310, "vendor": "VEN-B", "status": "Pending"},
                    {"name": "CI-3", "item": "Conduit 25mm", "quantity": 40, "quote": 55, "vendor": "VEN-A", "status": "Pending"}
                ]}
            }),
        );
    }

    pub fn seed_sr(&self, name: &str, state: &str) {
        self.store.seed(
            doctypes::SERVICE_REQUESTS,
            json!({
                "name": name,
                "project": "PROJ-0001",
                "vendor": "VEN-S",
                "gst": "true",
                "workflow_state": state,
                "service_order_list": {"list": [
                    {"id": "S1", "category": "Civil", "description": "Plastering", "uom": "sqft", "quantity": 200, "rate": 35}
                ]}
            }),
        );
    }

    pub fn doc(&self, doctype: &str, name: &str) -> Value {
        self.store
            .find(doctype, name)
            .unwrap_or_else(|| panic!("{} {} missing", doctype, name))
    }
}

fn sent_back_name(store: &InMemoryStore) -> String {
    format!("SB-00001-000123-{:05}", store.next_sequence())
}

fn create_sent_back(store: &InMemoryStore, po: &Value, sb_type: &str, items: Value) -> String {
    let name = sent_back_name(store);
    store.put(
        doctypes::SENT_BACK_CATEGORY,
        json!({
            "name": name,
            "procurement_request": po["procurement_request"],
            "project": po["project"],
            "item_list": {"list": items},
            "workflow_state": "Pending",
            "type": sb_type
        }),
    );
    name
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ServiceError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::ValidationError(format!("missing {}", key)))
}

fn register_workflow_methods(store: &InMemoryStore, list_merged: bool) {
    store.register_method(methods::AMEND_PO, |store, args| {
        let po_name = arg_str(&args, "po_name")?;
        let po = store
            .find(doctypes::PROCUREMENT_ORDERS, po_name)
            .ok_or_else(|| ServiceError::NotFound(po_name.to_string()))?;
        store.patch(
            doctypes::PROCUREMENT_ORDERS,
            po_name,
            json!({ "order_list": args["order_list"], "status": "PO Amendment" }),
        )?;
        let removed = args["removed_items"].as_array().cloned().unwrap_or_default();
        if removed.is_empty() {
            return Ok(json!({"status": 200, "message": "PO amended"}));
        }
        let sent_back = create_sent_back(store, &po, "Rejected", Value::Array(removed));
        Ok(json!({
            "status": 200,
            "message": format!("PO amended. New Rejected Type Sent Back {} created", sent_back),
            "sent_back_id": sent_back
        }))
    });

    store.register_method(methods::CANCEL_PO, |store, args| {
        let po_name = arg_str(&args, "po_name")?;
        let po = store
            .find(doctypes::PROCUREMENT_ORDERS, po_name)
            .ok_or_else(|| ServiceError::NotFound(po_name.to_string()))?;
        store.patch(doctypes::PROCUREMENT_ORDERS, po_name, json!({"status": "Cancelled"}))?;
        let sent_back = create_sent_back(store, &po, "Cancelled", po["order_list"]["list"].clone());
        // Prose only, like the production method.
        Ok(json!({
            "status": 200,
            "message": format!("New Cancelled Type Sent Back {} created successfully.", sent_back)
        }))
    });

    store.register_method(methods::MERGE_POS, move |store, args| {
        let target_name = arg_str(&args, "po_id")?;
        let target = store
            .find(doctypes::PROCUREMENT_ORDERS, target_name)
            .ok_or_else(|| ServiceError::NotFound(target_name.to_string()))?;
        let sources: Vec<String> = args["merged_items"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        for name in std::iter::once(target_name.to_string()).chain(sources) {
            store.patch(
                doctypes::PROCUREMENT_ORDERS,
                &name,
                json!({"status": "Merged", "merged": MERGED_PO_NAME}),
            )?;
        }
        if list_merged {
            store.put(
                doctypes::PROCUREMENT_ORDERS,
                json!({
                    "name": MERGED_PO_NAME,
                    "project": target["project"],
                    "vendor": target["vendor"],
                    "procurement_request": target["procurement_request"],
                    "status": "PO Approved",
                    "order_list": args["order_data"]
                }),
            );
        }
        Ok(json!({"status": 200, "new_po_name": MERGED_PO_NAME}))
    });

    store.register_method(methods::APPROVE_CUSTOM_PR, |store, args| {
        let pr_name = arg_str(&args, "pr_name")?;
        store.patch(
            doctypes::PROCUREMENT_REQUESTS,
            pr_name,
            json!({"workflow_state": "Approved"}),
        )?;
        let vendors = args["selected_vendors"].as_array().cloned().unwrap_or_default();
        let names: Vec<String> = vendors
            .iter()
            .filter_map(Value::as_str)
            .map(|vendor| {
                let name = format!("PO/2024/{:05}", store.next_sequence());
                store.put(
                    doctypes::PROCUREMENT_ORDERS,
                    json!({
                        "name": name,
                        "project": args["project_id"],
                        "vendor": vendor,
                        "procurement_request": pr_name,
                        "custom": "true",
                        "status": "PO Approved"
                    }),
                );
                name
            })
            .collect();
        Ok(json!({"status": 200, "po_names": names}))
    });
}
