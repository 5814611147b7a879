use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid manifest: {0}")]
    Validation(String),

    #[error("Application already deployed as '{0}', reload or delete it first")]
    AlreadyDeployed(String),

    #[error("DNS domain {domain} is claimed by running service {claimant}, change it or force the launch configuration")]
    DomainClaimed { domain: String, claimant: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{provider} error: {message}")]
    ExternalProvider {
        provider: &'static str,
        message: String,
    },

    #[error("Process error: {0}")]
    Process(String),

    #[error("Source control error: {0}")]
    SourceControl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    ExternalProvider,
    Process,
    SourceControl,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::AlreadyDeployed(_) | Error::DomainClaimed { .. } => ErrorKind::Conflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ExternalProvider { .. } => ErrorKind::ExternalProvider,
            Error::Process(_) => ErrorKind::Process,
            Error::SourceControl(_) => ErrorKind::SourceControl,
            Error::Io(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn provider(provider: &'static str, message: impl ToString) -> Self {
        Error::ExternalProvider {
            provider,
            message: message.to_string(),
        }
    }
}
