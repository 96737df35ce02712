use crate::paths::config_file;
use anyhow::Result;
use backit_core::FlowSettings;
use config::{Config, ConfigError, Environment, File, Map, Source, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, marker::PhantomData, time::Duration};
use url::Url;

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// identity backend address
    pub api_endpoint: Url,
    /// bearer token of the signed-in session
    pub session_token: Option<String>,
    /// per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// how often transient request failures are retried
    pub max_retries: u32,
    /// email change flow tunables
    pub flow: FlowSettings,
}

impl Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_endpoint", &self.api_endpoint)
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("flow", &self.flow)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_endpoint: Url::parse("http://localhost:3000").expect("Valid hardcoded server URL"),
            session_token: None,
            request_timeout_ms: 10_000,
            max_retries: 2,
            flow: FlowSettings::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let path = config_file();

        let s = Config::builder()
            .add_source(DefaultImplSource::<Settings>::new())
            .add_source(File::with_name(&path.as_path().display().to_string()).required(false))
            .add_source(
                Environment::with_prefix("BACKIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(s.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// Lets `config` fall back to the values of a type's `Default` implementation
// when there's no config file. The default is serialized into a `toml::Value`
// and converted into a `config::Value` source.

struct DefaultImplSource<T>(PhantomData<T>);

impl<T> Clone for DefaultImplSource<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Debug for DefaultImplSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DefaultImplSource").finish()
    }
}

impl<T> DefaultImplSource<T> {
    fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Default + Serialize + Send + Sync + 'static> Source for DefaultImplSource<T> {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let toml_value =
            toml::Value::try_from(T::default()).map_err(|e| ConfigError::Foreign(Box::new(e)))?;
        match from_toml_value(&toml_value).kind {
            ValueKind::Table(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

fn from_toml_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(value) => Value::new(None, value.to_string()),
        toml::Value::Float(value) => Value::new(None, *value),
        toml::Value::Integer(value) => Value::new(None, *value),
        toml::Value::Boolean(value) => Value::new(None, *value),
        toml::Value::Table(table) => {
            let map = table
                .iter()
                .map(|(key, value)| (key.clone(), from_toml_value(value)))
                .collect::<Map<_, _>>();
            Value::new(None, map)
        }
        toml::Value::Array(array) => {
            Value::new(None, array.iter().map(from_toml_value).collect::<Vec<_>>())
        }
        toml::Value::Datetime(datetime) => Value::new(None, datetime.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn test_defaults_survive_config_roundtrip() -> TestResult {
        let settings: Settings = Config::builder()
            .add_source(DefaultImplSource::<Settings>::new())
            .build()?
            .try_deserialize()?;

        assert_eq!(settings.api_endpoint.as_str(), "http://localhost:3000/");
        assert_eq!(settings.session_token, None);
        assert_eq!(settings.flow, FlowSettings::default());

        Ok(())
    }

    #[test]
    fn test_session_token_is_redacted() {
        let settings = Settings {
            session_token: Some("very-secret".to_string()),
            ..Settings::default()
        };
        assert!(!format!("{settings:?}").contains("very-secret"));
    }
}
