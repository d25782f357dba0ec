use thiserror::Error;

#[derive(Debug, Error)]
pub enum MulticastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MulticastError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            MulticastError::Config(_) => "CONFIG_ERROR",
            MulticastError::Settings(_) => "SETTINGS_ERROR",
            MulticastError::Serialization(_) => "SERIALIZATION_ERROR",
            MulticastError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, MulticastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            MulticastError::Config("x".into()),
            MulticastError::Settings("x".into()),
            MulticastError::Io(std::io::Error::other("x")),
        ];
        let codes: Vec<_> = errors.iter().map(MulticastError::code).collect();
        assert_eq!(codes, ["CONFIG_ERROR", "SETTINGS_ERROR", "IO_ERROR"]);
    }

    #[test]
    fn io_error_converts() {
        let err: MulticastError = std::io::Error::other("disk gone").into();
        assert!(err.to_string().contains("disk gone"));
    }
}
