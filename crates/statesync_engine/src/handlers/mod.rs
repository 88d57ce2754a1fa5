//! Built-in RPC handlers.

mod attach_existing;
mod event;
mod method_invoke;
mod property_sync;

pub use attach_existing::AttachExistingHandler;
pub use event::EventHandler;
pub use method_invoke::MethodInvokeHandler;
pub use property_sync::PropertySyncHandler;
