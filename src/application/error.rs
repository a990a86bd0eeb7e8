use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{edge_modules::EdgeModuleError, repos::RepoError, vcl::VclError},
    config::LoadError,
    domain::error::DomainError,
    infra::{cdn::CdnError, error::InfraError, webhook::WebhookError},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cdn(#[from] CdnError),
    #[error(transparent)]
    Vcl(#[from] VclError),
    #[error(transparent)]
    EdgeModule(#[from] EdgeModuleError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the command-line binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_)
            | AppError::Validation(_)
            | AppError::Domain(DomainError::Validation { .. }) => 2,
            AppError::Cdn(err) if err.is_auth() => 3,
            _ => 1,
        }
    }

    /// The error followed by each of its sources, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = StdError::source(self);
        while let Some(inner) = current {
            let message = inner.to_string();
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_usage_and_auth_failures() {
        assert_eq!(AppError::validation("bad").exit_code(), 2);
        assert_eq!(
            AppError::from(CdnError::Unauthorized { status: 403 }).exit_code(),
            3
        );
        assert_eq!(AppError::unexpected("boom").exit_code(), 1);
    }

    #[test]
    fn chain_includes_sources() {
        let err = AppError::from(InfraError::from(std::io::Error::other("disk gone")));
        let chain = err.chain();
        assert!(chain.iter().any(|line| line.contains("disk gone")));
    }
}
