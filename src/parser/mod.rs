//! Request and settings parser (verb module)
//!
//! Transforms JSON or YAML documents into request and settings types. YAML
//! is a superset of JSON, so the `_str` functions accept either.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::config::Settings;
use crate::error::ParseError;
use crate::query::QueryRequest;

/// Parse a query request from a JSON or YAML file
pub fn parse_request_file<P: AsRef<Path>>(path: P) -> Result<QueryRequest, ParseError> {
    read_document(path)
}

/// Parse a query request from a JSON or YAML string
pub fn parse_request_str(text: &str) -> Result<QueryRequest, ParseError> {
    parse_document(text)
}

/// Parse settings from a JSON or YAML file
pub fn parse_config_file<P: AsRef<Path>>(path: P) -> Result<Settings, ParseError> {
    read_document(path)
}

/// Parse settings from a JSON or YAML string
pub fn parse_config_str(text: &str) -> Result<Settings, ParseError> {
    parse_document(text)
}

fn read_document<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, ParseError> {
    let path_str = path.as_ref().display().to_string();
    let contents = std::fs::read_to_string(&path).map_err(|e| ParseError::Io {
        path: path_str,
        source: e,
    })?;
    parse_document(&contents)
}

fn parse_document<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        serde_json::from_str(text).map_err(ParseError::from)
    } else {
        serde_yaml::from_str(text).map_err(ParseError::from)
    }
}
