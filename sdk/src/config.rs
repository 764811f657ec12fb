use std::path::Path;

use codec::crypto::Method;

use crate::Error;

/// Client-side credentials, read from a `send_nsca` style config file:
/// newline-delimited `key=value` entries, `#` comments and blank lines
/// ignored. `password` and `encryption_method` are the recognized keys;
/// anything else is skipped the way the reference tooling skips it.
///
/// # Test
///
/// ```
/// use nsca_server_sdk::{codec::crypto::Method, config::Settings};
///
/// let settings = Settings::parse(
///     "# nsca host credentials\n\npassword = hunter2\nencryption_method = blowfish\n",
/// )
/// .unwrap();
///
/// assert_eq!(settings.password, "hunter2");
/// assert_eq!(settings.encryption_method, Method::Blowfish);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Settings {
    pub password: String,
    pub encryption_method: Method,
}

impl Settings {
    pub fn parse(source: &str) -> Result<Self, Error> {
        let mut settings = Self::default();

        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::InvalidConfig(line.to_string()));
            };

            let value = value.trim();
            match key.trim() {
                "password" => settings.password = value.to_string(),
                "encryption_method" => {
                    settings.encryption_method = value
                        .parse()
                        .map_err(|_| Error::InvalidConfig(line.to_string()))?;
                }
                key => log::debug!("ignoring unrecognized config key: {key}"),
            }
        }

        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}
