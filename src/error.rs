//! Error types for xbox-savegame-dl
//!
//! This module provides the error taxonomy of the save-download pipeline:
//! - Authentication errors (missing or unrecoverable credentials)
//! - Upstream HTTP failures carrying the status code
//! - Selection errors raised while mapping metadata blobs to binaries
//! - Machine-readable error codes and user-facing messages

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for xbox-savegame-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xbox-savegame-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "client_id")
        key: Option<String>,
    },

    /// Authentication failed or no usable credentials exist
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Selecting binary blobs from a metadata blob failed
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),

    /// A title-storage or identity endpoint answered with a non-2xx status
    #[error("upstream returned HTTP {status} for {url}")]
    Upstream {
        /// HTTP status code returned by the upstream service
        status: u16,
        /// The requested URL
        url: String,
    },

    /// No title of that name is registered
    #[error("unknown title: {name}")]
    UnknownTitle {
        /// The requested display name
        name: String,
    },

    /// The title has no blobs to download
    #[error("nothing to fetch for service config {scid}")]
    NothingToFetch {
        /// Service config id that was listed
        scid: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing the output archive failed
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Request signing failed
    #[error("signing error: {0}")]
    Signing(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Authentication-related errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential bundle is stored for the user
    #[error("no credentials stored for user {user_id}")]
    NoCredentials {
        /// The user the lookup was made for
        user_id: String,
    },

    /// The refreshed XSTS token does not identify an Xbox user
    #[error("credentials for user {user_id} carry no Xbox user identity")]
    MissingIdentity {
        /// The user whose credentials were evicted
        user_id: String,
    },

    /// The stored signing key could not be decoded
    #[error("invalid signing key: {reason}")]
    InvalidSigningKey {
        /// Why the key was rejected
        reason: String,
    },

    /// One stage of the token refresh chain failed
    #[error("token refresh failed at {stage}: {reason}")]
    RefreshFailed {
        /// Refresh stage (e.g., "oauth", "user", "device", "xsts")
        stage: String,
        /// The reason the stage failed
        reason: String,
    },
}

/// Errors raised while mapping metadata blobs to the binaries they reference
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The lookup expression matched nothing in a metadata blob
    #[error("lookup expression {expression} matched nothing in {blob}")]
    NoMatch {
        /// Remote name of the metadata blob
        blob: String,
        /// The lookup expression that was evaluated
        expression: String,
    },

    /// The single lookup match is not a blob name
    #[error("lookup match {key} in {blob} is not a blob name")]
    NotABlobName {
        /// Remote name of the metadata blob
        blob: String,
        /// Key of the offending match
        key: String,
    },

    /// The save layout expected a different number of matches
    #[error("save layout expects {expected} match(es) in {blob}, found {found}")]
    Cardinality {
        /// Remote name of the metadata blob
        blob: String,
        /// Number of matches the layout requires
        expected: usize,
        /// Number of matches the expression produced
        found: usize,
    },

    /// The configured save layout is not one of the known strategies
    #[error("unknown save layout: {value}")]
    UnknownSaveLayout {
        /// The configured value
        value: String,
    },

    /// A lookup expression failed to parse
    #[error("invalid lookup expression {expression}: {reason}")]
    InvalidExpression {
        /// The offending expression
        expression: String,
        /// Parser message
        reason: String,
    },

    /// A downloaded metadata blob is not a JSON document
    #[error("metadata blob {blob} is not valid JSON: {reason}")]
    InvalidDocument {
        /// Local path of the metadata file
        blob: PathBuf,
        /// Decoder message
        reason: String,
    },
}

impl SelectionError {
    /// Whether only the one metadata blob is skipped instead of failing the run
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            SelectionError::NoMatch { .. }
                | SelectionError::NotABlobName { .. }
                | SelectionError::InvalidDocument { .. }
        )
    }
}

impl Error {
    /// Whether the caller has to run the interactive authentication flow again
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::NoCredentials { .. } | AuthError::MissingIdentity { .. })
        )
    }

    /// Whether title storage answered 404, i.e. the title has no save data
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Upstream { status, .. } => *status == 404,
            Error::Network(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }

    /// Whether a selection error must abort the whole run
    ///
    /// Skippable errors only drop one metadata blob; everything else in the
    /// selection family points at a configuration defect.
    pub fn is_fatal_selection(&self) -> bool {
        matches!(self, Error::Selection(e) if !e.is_skippable())
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Auth(e) => match e {
                AuthError::NoCredentials { .. } => "no_credentials",
                AuthError::MissingIdentity { .. } => "missing_identity",
                AuthError::InvalidSigningKey { .. } => "invalid_signing_key",
                AuthError::RefreshFailed { .. } => "refresh_failed",
            },
            Error::Selection(e) => match e {
                SelectionError::NoMatch { .. } => "no_match",
                SelectionError::NotABlobName { .. } => "not_a_blob_name",
                SelectionError::Cardinality { .. } => "cardinality_violation",
                SelectionError::UnknownSaveLayout { .. } => "unknown_save_layout",
                SelectionError::InvalidExpression { .. } => "invalid_expression",
                SelectionError::InvalidDocument { .. } => "invalid_document",
            },
            Error::Upstream { status: 404, .. } => "not_found",
            Error::Upstream { .. } => "upstream_error",
            Error::UnknownTitle { .. } => "unknown_title",
            Error::NothingToFetch { .. } => "nothing_to_fetch",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Archive(_) => "archive_error",
            Error::Signing(_) => "signing_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Message suitable for showing to the person who asked for their saves
    pub fn user_message(&self) -> String {
        if self.is_not_found() || matches!(self, Error::NothingToFetch { .. }) {
            "No save data found for this title".to_string()
        } else if self.is_unauthenticated() {
            "Please authenticate with Xbox Live first".to_string()
        } else {
            "Failed to download save data".to_string()
        }
    }
}
