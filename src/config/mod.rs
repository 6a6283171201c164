pub mod settings;

pub use settings::{BotSettings, GhlSettings, OAuthSettings, ServerSettings, Settings, StorageBackend, StorageSettings};
