mod decoder;
mod routes;
mod server;
mod settings;

pub use server::{AppState, QUEUE_NAMES, run};
pub use settings::Settings;
