//! You can find the errors that can occur during server startup here

use std::fmt::{Display, Formatter};
use std::io;

/// The errors that can occur during server startup
#[derive(Debug)]
pub enum StartServerError {
    /// IO error that can occur
    IO(io::Error),
    /// The secret key from the configuration is unusable
    InvalidSecretKey,
}

impl Display for StartServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StartServerError::IO(err) => write!(f, "{err}"),
            StartServerError::InvalidSecretKey => write!(
                f,
                "Invalid parameter SecretKey: must be base64 encoded and at least 64 bytes long"
            ),
        }
    }
}

impl From<io::Error> for StartServerError {
    fn from(value: io::Error) -> Self {
        Self::IO(value)
    }
}
