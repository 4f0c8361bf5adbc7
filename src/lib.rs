//! Client core for the classroom engagement platform: REST wrapper,
//! session-scoped realtime channel, session orchestration and video calls.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;
pub mod video;
pub mod ws;

pub use api::ApiClient;
pub use config::Config;
pub use error::{ClientError, Result};
pub use session::{StudentSession, TeacherSession};
pub use storage::TokenStore;
pub use ws::SessionConnection;
