use async_trait::async_trait;
use dotenvy::dotenv;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use std::env;
use thiserror::Error;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z_][0-9a-zA-Z_]*)\}").expect("static env var pattern"));

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Error loading config: {0}")]
    ConfigError(String),
}

/// A config type that lives under its own section of a TOML file.
#[async_trait]
pub trait ConfigSectionLoader {
    type SectionType;

    async fn load_section_from_file(file_name: String) -> Result<Self::SectionType, LoadConfigError>;
}

pub async fn load_from_file<T: DeserializeOwned>(file_name: String) -> Result<T, LoadConfigError> {
    dotenv().ok();
    let contents = tokio::fs::read_to_string(file_name).await?;
    parse_with_env(&contents)
}

/// Parses TOML after substituting `${VAR}` references from the environment.
pub fn parse_with_env<T: DeserializeOwned>(raw_config: &str) -> Result<T, LoadConfigError> {
    let contents = expand_vars(raw_config);
    let config: T = toml::from_str(&contents)?;
    Ok(config)
}

fn expand_vars(raw_config: &str) -> String {
    // Unset variables are left verbatim so the TOML error points at them.
    ENV_VAR
        .replace_all(raw_config, |caps: &Captures| match env::var(&caps[1]) {
            Ok(val) => val,
            Err(_) => caps[0].to_string(),
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Section {
        key: String,
        other: String,
    }

    #[test]
    fn test_expand_known_and_unknown_vars() {
        // SAFETY: test-local variable name, no other test reads it.
        unsafe { env::set_var("SNX_SYNC_TEST_KEY", "secret") };
        let section: Section =
            parse_with_env("key = \"${SNX_SYNC_TEST_KEY}\"\nother = \"${SNX_SYNC_TEST_UNSET}\"").unwrap();
        assert_eq!(section.key, "secret");
        assert_eq!(section.other, "${SNX_SYNC_TEST_UNSET}");
    }
}
