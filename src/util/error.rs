use kube::error::DiscoveryError;

/// All errors possible to occur during reconciliation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    /// Error in user input or Config resource definition, typically missing fields.
    #[error("Invalid Config CRD: {0}")]
    UserInputError(String),

    /// A manifest document could not be loaded or is malformed.
    #[error("Invalid manifest: {0}")]
    ManifestError(String),

    /// A transform rejected a manifest document.
    #[error("Failed to transform manifest: {0}")]
    TransformError(String),

    /// A bounded wait expired.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// An installation phase failed. Carries the phase name as context.
    #[error("{phase}: {source}")]
    PhaseError {
        phase: &'static str,
        source: Box<Error>,
    },

    #[error("Failed to parse YAML: {source}")]
    YamlError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Failed to (de)serialize JSON: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to fetch manifest: {source}")]
    HttpError {
        #[from]
        source: reqwest::Error,
    },
}

impl Error {
    /// Wraps the error with the name of the phase it occurred in.
    pub fn in_phase(self, phase: &'static str) -> Error {
        Error::PhaseError {
            phase,
            source: Box::new(self),
        }
    }

    /// HTTP status code reported by the Kubernetes API, if any.
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::KubeError {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            Error::PhaseError { source, .. } => source.api_code(),
            _ => None,
        }
    }

    /// Returns true if the Kubernetes API reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// Returns true if the Kubernetes API rejected the object as
    /// structurally invalid, e.g. a change to an immutable field.
    pub fn is_invalid(&self) -> bool {
        self.api_code() == Some(422)
    }

    /// Returns true if discovery found the API group but not the kind,
    /// e.g. while its CRD is being removed.
    pub fn is_missing_kind(&self) -> bool {
        match self {
            Error::KubeError {
                source: kube::Error::Discovery(DiscoveryError::MissingKind(_)),
            } => true,
            Error::PhaseError { source, .. } => source.is_missing_kind(),
            _ => false,
        }
    }

    /// Returns true if the object already exists.
    pub fn is_already_exists(&self) -> bool {
        self.api_code() == Some(409)
    }
}
