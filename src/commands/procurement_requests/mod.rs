pub mod approve_custom_pr_command;

pub use approve_custom_pr_command::{
    ApproveCustomPrCommand, ApproveCustomPrResult, BlockState, CustomPrApproval, VendorBlock,
};
