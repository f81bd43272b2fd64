use tracing::warn;

use trackstate::config;

pub fn load_settings() -> config::Settings {
    match config::Settings::load() {
        Ok(s) => {
            if let Err(msg) = s.validate() {
                warn!("Invalid config, using defaults: {msg}");
                config::Settings::default()
            } else {
                s
            }
        }
        Err(e) => {
            // Config is optional; failures should not prevent the scan.
            warn!("Failed to load config, using defaults: {e}");
            config::Settings::default()
        }
    }
}
