//! Call lifecycle around a hosted video SDK.
//!
//! Tokens come from the backend; everything media-related is delegated to an
//! `RtcEngine` implementation supplied by the embedder.

mod call;
mod engine;
mod state;

pub use call::VideoCall;
pub use engine::{ClientRole, RtcEngine};
pub use state::CallState;
