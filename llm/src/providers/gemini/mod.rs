mod api;
mod live;
mod live_api;
mod model;

pub use api::sanitize_schema;
pub use live::{GeminiLiveClient, LiveClientOptions};
pub use model::GeminiChatModel;
