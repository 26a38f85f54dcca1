pub mod approve_service_request_command;
pub mod reject_service_request_command;

pub use approve_service_request_command::ApproveServiceRequestCommand;
pub use reject_service_request_command::RejectServiceRequestCommand;
