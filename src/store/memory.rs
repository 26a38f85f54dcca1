use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use super::{DocumentStore, FileUpload, Filter, ListQuery, SortOrder, UploadedFile};
use crate::errors::ServiceError;

/// Server-side behavior registered for a whitelisted method.
pub type MethodHandler =
    Arc<dyn Fn(&InMemoryStore, Value) -> Result<Value, ServiceError> + Send + Sync>;

/// A recorded mutation, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create { doctype: String, name: String },
    Update { doctype: String, name: String },
    Delete { doctype: String, name: String },
    Call { method: String, args: Value },
    Upload { doctype: String, docname: String },
}

/// Process-local document store. Documents keep insertion order per doctype.
#[derive(Default)]
pub struct InMemoryStore {
    docs: DashMap<String, Vec<Value>>,
    methods: DashMap<String, MethodHandler>,
    journal: Mutex<Vec<Mutation>>,
    sequence: AtomicU64,
    fail_updates: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document without recording a mutation.
    pub fn seed(&self, doctype: &str, doc: Value) {
        let doc = self.stamp(doctype, doc);
        self.docs.entry(doctype.to_string()).or_default().push(doc);
    }

    pub fn register_method<F>(&self, method: &str, handler: F)
    where
        F: Fn(&InMemoryStore, Value) -> Result<Value, ServiceError> + Send + Sync + 'static,
    {
        self.methods.insert(method.to_string(), Arc::new(handler));
    }

    /// Makes every subsequent `update` fail until reset.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn mutation_count(&self) -> usize {
        self.journal.lock().map(|j| j.len()).unwrap_or(0)
    }

    pub fn snapshot(&self, doctype: &str) -> Vec<Value> {
        self.docs
            .get(doctype)
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    pub fn find(&self, doctype: &str, name: &str) -> Option<Value> {
        self.docs.get(doctype).and_then(|docs| {
            docs.iter()
                .find(|doc| doc_name(doc) == Some(name))
                .cloned()
        })
    }

    /// Inserts directly, for use from method handlers.
    pub fn put(&self, doctype: &str, doc: Value) -> Value {
        let doc = self.stamp(doctype, doc);
        let mut docs = self.docs.entry(doctype.to_string()).or_default();
        if let Some(name) = doc_name(&doc).map(str::to_string) {
            docs.retain(|existing| doc_name(existing) != Some(name.as_str()));
        }
        docs.push(doc.clone());
        doc
    }

    /// Merges `patch` into an existing document, for use from method handlers.
    pub fn patch(&self, doctype: &str, name: &str, patch: Value) -> Result<Value, ServiceError> {
        let mut docs = self
            .docs
            .get_mut(doctype)
            .ok_or_else(|| not_found(doctype, name))?;
        let doc = docs
            .iter_mut()
            .find(|doc| doc_name(doc) == Some(name))
            .ok_or_else(|| not_found(doctype, name))?;

        if let (Value::Object(target), Value::Object(changes)) = (&mut *doc, patch) {
            for (key, value) in changes {
                target.insert(key, value);
            }
            target.insert("modified".to_string(), Value::String(now_stamp()));
        }
        Ok(doc.clone())
    }

    pub fn remove(&self, doctype: &str, name: &str) -> Result<Value, ServiceError> {
        let mut docs = self
            .docs
            .get_mut(doctype)
            .ok_or_else(|| not_found(doctype, name))?;
        let index = docs
            .iter()
            .position(|doc| doc_name(doc) == Some(name))
            .ok_or_else(|| not_found(doctype, name))?;
        Ok(docs.remove(index))
    }

    /// Next value of the store-wide naming sequence.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    fn record(&self, mutation: Mutation) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(mutation);
        }
    }

    fn stamp(&self, doctype: &str, doc: Value) -> Value {
        let mut map = match doc {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        if !map.contains_key("name") {
            let prefix: String = doctype
                .split_whitespace()
                .filter_map(|word| word.chars().next())
                .collect::<String>()
                .to_uppercase();
            map.insert(
                "name".to_string(),
                Value::String(format!("{}-{:05}", prefix, self.next_sequence())),
            );
        }
        let stamp = now_stamp();
        map.entry("creation".to_string())
            .or_insert_with(|| Value::String(stamp.clone()));
        map.entry("modified".to_string())
            .or_insert_with(|| Value::String(stamp));
        Value::Object(map)
    }
}

fn doc_name(doc: &Value) -> Option<&str> {
    doc.get("name").and_then(Value::as_str)
}

fn not_found(doctype: &str, name: &str) -> ServiceError {
    ServiceError::NotFound(format!("{} {} not found", doctype, name))
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn project(doc: &Value, fields: &[String]) -> Value {
    if fields.is_empty() || fields.iter().any(|f| f == "*") {
        return doc.clone();
    }
    let mut map = Map::new();
    for field in fields {
        if let Some(value) = doc.get(field) {
            map.insert(field.clone(), value.clone());
        }
    }
    Value::Object(map)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list(&self, doctype: &str, query: &ListQuery) -> Result<Vec<Value>, ServiceError> {
        let mut rows: Vec<Value> = self
            .snapshot(doctype)
            .into_iter()
            .filter(|doc| query.matches(doc))
            .collect();

        if let Some(order_by) = &query.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order_by.field), b.get(&order_by.field));
                match order_by.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit.filter(|l| *l > 0) {
            rows.truncate(limit as usize);
        }

        Ok(rows.iter().map(|doc| project(doc, &query.fields)).collect())
    }

    async fn get(&self, doctype: &str, name: &str) -> Result<Value, ServiceError> {
        self.find(doctype, name)
            .ok_or_else(|| not_found(doctype, name))
    }

    async fn create(&self, doctype: &str, doc: Value) -> Result<Value, ServiceError> {
        let created = self.put(doctype, doc);
        self.record(Mutation::Create {
            doctype: doctype.to_string(),
            name: doc_name(&created).unwrap_or_default().to_string(),
        });
        Ok(created)
    }

    async fn update(&self, doctype: &str, name: &str, patch: Value) -> Result<Value, ServiceError> {
        if self.fail_updates.load(AtomicOrdering::SeqCst) {
            return Err(ServiceError::ExternalApiError(format!(
                "update of {} {} rejected",
                doctype, name
            )));
        }
        let updated = self.patch(doctype, name, patch)?;
        self.record(Mutation::Update {
            doctype: doctype.to_string(),
            name: name.to_string(),
        });
        Ok(updated)
    }

    async fn delete(&self, doctype: &str, name: &str) -> Result<(), ServiceError> {
        self.remove(doctype, name)?;
        self.record(Mutation::Delete {
            doctype: doctype.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn count(&self, doctype: &str, filters: &[Filter]) -> Result<u64, ServiceError> {
        Ok(self
            .snapshot(doctype)
            .iter()
            .filter(|doc| filters.iter().all(|f| f.matches(doc)))
            .count() as u64)
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, ServiceError> {
        // Clone the handler out so it can re-enter the store.
        let handler = self
            .methods
            .get(method)
            .map(|h| h.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("method {} not registered", method)))?;
        self.record(Mutation::Call {
            method: method.to_string(),
            args: args.clone(),
        });
        handler(self, args)
    }

    async fn upload(&self, file: FileUpload) -> Result<UploadedFile, ServiceError> {
        self.record(Mutation::Upload {
            doctype: file.doctype.clone(),
            docname: file.docname.clone(),
        });
        let folder = if file.is_private { "private/files" } else { "files" };
        Ok(UploadedFile {
            file_url: format!("/{}/{}", folder, file.file_name),
        })
    }
}
