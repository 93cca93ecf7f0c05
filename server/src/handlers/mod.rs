//! HTTP handlers, one file per operation for the allocation core and one
//! per entity group for the administrative surface. Handlers parse the
//! request, call the domain layer, and wrap results in the response
//! envelope; no business rules live here.

mod allocate;
mod claim;
mod conversations;
mod deallocate;
mod inboxes;
mod labels;
mod list_conversations;
mod move_inbox;
mod operator_status;
mod operators;
mod reassign;
mod resolve;
mod tenants;

pub use allocate::allocate;
pub use claim::claim;
pub use conversations::{create_conversation, get_conversation, message_received};
pub use deallocate::deallocate;
pub use inboxes::{create_inbox, list_inboxes};
pub use labels::{attach_label, create_label, delete_label, detach_label, list_labels};
pub use list_conversations::list_conversations;
pub use move_inbox::move_inbox;
pub use operator_status::set_operator_status;
pub use operators::{create_operator, create_subscription, delete_subscription};
pub use reassign::reassign;
pub use resolve::resolve;
pub use tenants::{create_tenant, get_tenant, update_tenant_weights};
