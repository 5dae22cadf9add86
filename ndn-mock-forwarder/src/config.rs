use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use ndn_mock_core::control::RIB_REGISTER_PREFIX;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub forwarder: ForwarderSection,
    pub mock_face: MockFaceSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderSection {
    /// Identity of the key chain signing registration responses
    pub identity: String,
    /// Local FIB prefix answering RIB register commands
    pub registration_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockFaceSection {
    pub enable_packet_logging: bool,
    pub enable_registration_reply: bool,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ForwarderSection {
    fn default() -> Self {
        Self {
            identity: "/mock/forwarder".to_string(),
            registration_prefix: RIB_REGISTER_PREFIX.to_string(),
        }
    }
}

impl Default for MockFaceSection {
    fn default() -> Self {
        Self {
            enable_packet_logging: true,
            enable_registration_reply: true,
            identity: "/mock/key".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            forwarder: ForwarderSection::default(),
            mock_face: MockFaceSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ForwarderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
