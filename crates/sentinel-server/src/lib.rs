pub mod api;
pub mod collaborators;
pub mod logging;
pub mod pipeline;
pub mod state;

pub use pipeline::AlertPipeline;
pub use state::AppState;
