pub mod handlers;
pub mod overlay;
pub mod server;
pub mod store;

pub use server::{CollectorServer, ServerState};
pub use store::ImageStore;
