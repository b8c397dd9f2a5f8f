//! Backend IPC.
//!
//! The application backend answers named commands with JSON. The session
//! controller issues exactly one request per initialization: the icon base
//! command, which takes no arguments and has no side effects.

use std::future::Future;

use serde_json::Value;

use crate::error::{BackendError, InitError};
use crate::icon_base::IconBase;

/// Default command name answered with the folder icon base.
pub const ICON_BASE_COMMAND: &str = "get_folder_icon_base";

/// A request/response channel to the application backend.
pub trait Backend: Send + Sync {
    fn invoke(&self, command: &str) -> impl Future<Output = Result<Value, BackendError>> + Send;
}

/// Requests the icon base and decodes the response.
pub async fn fetch_icon_base<B: Backend>(backend: &B, command: &str) -> Result<IconBase, InitError> {
    let value = backend.invoke(command).await?;
    Ok(IconBase::from_value(value)?)
}
