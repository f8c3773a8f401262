use thiserror::Error;

/// The precise reason why the authentication couldn't succeed,
/// from the methods the server offered and the configured credentials.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// The server offers no method at all for this user.
    #[error("the user is unknown to the server")]
    UnknownUser,

    /// The server wants a password, but only keys are configured.
    #[error("the server wants a password, but only a private key is configured")]
    MissingPassword,

    /// The server wants a key, but only a password is configured.
    #[error("the server wants a public key, but only a password is configured")]
    MissingKey,

    /// The server refused the credentials for a method it offered.
    #[error("the server rejected the credentials for method `{method}`")]
    Rejected {
        /// The last attempted method.
        method: &'static str,
    },

    /// None of the offered methods can be used with the configured credentials.
    #[error("no usable method among the offered `{}`", offered.join(","))]
    NoUsableMethod {
        /// The methods offered by the server.
        offered: Vec<String>,
    },
}

/// The error types that can occur when authenticating.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Session errors.
    #[error(transparent)]
    Session(#[from] sesh::Error),

    /// The authentication failed.
    #[error("Authentication of `{user}` failed: {diagnostic}")]
    Failed {
        /// The user attempting authentication.
        user: String,

        /// Why the authentication failed.
        #[source]
        diagnostic: Diagnostic,
    },

    /// The server requested a password change.
    #[error("The password of `{user}` has expired: {prompt}")]
    PasswordExpired {
        /// The user attempting authentication.
        user: String,

        /// The prompt sent by the server.
        prompt: String,
    },
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
