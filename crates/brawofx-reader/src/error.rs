//! Reader errors and their host status codes.

use thiserror::Error;

/// OFX status code.
pub type OfxStatus = i32;

pub const OFX_STAT_OK: OfxStatus = 0;
pub const OFX_STAT_FAILED: OfxStatus = 1;
pub const OFX_STAT_ERR_FORMAT: OfxStatus = 7;
pub const OFX_STAT_ERR_VALUE: OfxStatus = 11;

#[derive(Debug, Error)]
pub enum ReaderError {
    /// The host asked for a pixel layout or render scale we cannot produce.
    #[error("Wrong input!")]
    WrongInput,
    #[error("Blackmagic RAW library not found")]
    LibraryNotFound,
    #[error("Unable to render image. Note that some footage may not be supported at the moment.")]
    UnsupportedFootage,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReaderError {
    /// Status the host receives for this error.
    pub fn status(&self) -> OfxStatus {
        match self {
            Self::WrongInput | Self::UnsupportedFootage => OFX_STAT_ERR_FORMAT,
            Self::InvalidParameter(_) => OFX_STAT_ERR_VALUE,
            Self::LibraryNotFound | Self::Config(_) => OFX_STAT_FAILED,
        }
    }

    /// Message shown to the user until the next successful call.
    pub fn persistent_message(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ReaderError::WrongInput.status(), OFX_STAT_ERR_FORMAT);
        assert_eq!(ReaderError::UnsupportedFootage.status(), OFX_STAT_ERR_FORMAT);
        assert_eq!(ReaderError::LibraryNotFound.status(), OFX_STAT_FAILED);
        assert_eq!(ReaderError::InvalidParameter("iso".into()).status(), OFX_STAT_ERR_VALUE);
    }

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(ReaderError::WrongInput.persistent_message(), "Wrong input!");
        assert!(ReaderError::UnsupportedFootage
            .persistent_message()
            .contains("some footage may not be supported"));
    }
}
