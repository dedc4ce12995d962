pub mod client;
pub mod settings;

pub use client::ClientConfig;
pub use settings::Settings;
