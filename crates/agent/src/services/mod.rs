mod approval;

pub use approval::{ApprovalPolicy, RsvpApprovalPolicy};
