pub mod achievements;
pub mod app;
pub mod config;
pub mod cravings;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod share_code;
pub mod state;
pub mod stats;
pub mod storage;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use storage::{load_state, open_store};
