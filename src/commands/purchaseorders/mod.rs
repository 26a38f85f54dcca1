pub mod amend_purchase_order_command;
pub mod cancel_purchase_order_command;
pub mod delete_purchase_order_command;
pub mod merge_purchase_orders_command;

pub use amend_purchase_order_command::{
    AmendPurchaseOrderCommand, AmendPurchaseOrderResult, AmendSession,
};
pub use cancel_purchase_order_command::{CancelPurchaseOrderCommand, CancelPurchaseOrderResult};
pub use delete_purchase_order_command::DeletePurchaseOrderCommand;
pub use merge_purchase_orders_command::{
    MergeDialog, MergePreview, MergePurchaseOrdersCommand, MergePurchaseOrdersResult,
    MergeSelection,
};
