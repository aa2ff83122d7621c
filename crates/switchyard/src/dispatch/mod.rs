//! Frame dispatch shared by every transport.
//!
//! A transport hands raw bytes to [`InboundFrame::read`], which decodes the
//! header chunk and keeps the rest of the payload undecoded. The
//! [`HandlerRouter`] then resolves the addressed handler in the registry and
//! either starts a subscription (returning a stream of encoded values for the
//! session's push loop) or runs a one-shot invocation to completion.
//!
//! ## Routing
//!
//! | action               | registry     | result                    |
//! |----------------------|--------------|---------------------------|
//! | `client:subscribe`   | subscription | stream of updates         |
//! | `client:once`        | subscription | current value             |
//! | `client:mutate`      | mutation     | single result             |
//! | anything else        | n/a          | `unsupported_action`      |

mod errors;
mod request;
mod response;
mod router;

pub use self::errors::GatewayError;
pub use self::request::InboundFrame;
pub use self::router::HandlerRouter;
pub(crate) use self::response::{complete_frame, error_frame, update_frame};
pub(crate) use self::router::{DISPATCH_TARGET, log_failure};
