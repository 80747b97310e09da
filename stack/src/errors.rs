// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StackError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    #[error("policy too permissive: {0}")]
    PolicyTooPermissive(String),
    #[error("duplicate construct: {0}")]
    DuplicateConstruct(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for StackError {
    fn from(source: serde_json::Error) -> Self {
        tracing::error!("{:?}", source);
        StackError::SerializationError(source.to_string())
    }
}

impl From<validator::ValidationErrors> for StackError {
    fn from(source: validator::ValidationErrors) -> Self {
        StackError::ValidationError(source.to_string())
    }
}
