pub mod activity;
pub mod app_state;
pub mod bootstrap;
pub mod circulation;
pub mod config;
pub mod errors;
pub mod fines;
pub mod handlers;
pub mod middleware_auth;
pub mod models;
pub mod routes;
pub mod settings;
pub mod utils;

pub use app_state::AppState;
pub use config::Config;
pub use errors::*;
pub use models::*;
pub use routes::build_router;
pub use utils::*;
