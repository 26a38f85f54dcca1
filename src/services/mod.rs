// Aggregations over fetched documents
pub mod categories;
pub mod invoices;
pub mod totals;

// Client-side state backed by the document store or the local cache
pub mod drafts;
pub mod lists;

// Binary exports
pub mod downloads;
