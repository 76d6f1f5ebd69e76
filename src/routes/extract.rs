use axum::extract::FromRequest;

use crate::error::Error;

/// `axum::Json`, except a body that does not parse is a 400 in the
/// service's own error shape instead of axum's plain-text rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);
