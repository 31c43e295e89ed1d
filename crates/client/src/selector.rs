//! Equality-based label selectors.
//!
//! Supports the comma-separated subset `key=value`, `key==value`,
//! `key!=value`, `key` and `!key`. Set-based expressions are not
//! interpreted; transports that talk to a real store pass the raw string
//! through instead.

use std::collections::BTreeMap;

use crate::errors::ClientError;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    Absent(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::NotEquals(key, value) => labels.get(key) != Some(value),
            Self::Exists(key) => labels.contains_key(key),
            Self::Absent(key) => !labels.contains_key(key),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn parse(selector: &str) -> Result<Self, ClientError> {
        let mut requirements = Vec::new();

        for term in selector.split(',').map(str::trim) {
            if term.is_empty() {
                continue;
            }

            let requirement = if let Some((key, value)) = term.split_once("!=") {
                Requirement::NotEquals(label_key(key, selector)?, value.trim().to_owned())
            } else if let Some((key, value)) = term.split_once("==") {
                Requirement::Equals(label_key(key, selector)?, value.trim().to_owned())
            } else if let Some((key, value)) = term.split_once('=') {
                Requirement::Equals(label_key(key, selector)?, value.trim().to_owned())
            } else if let Some(key) = term.strip_prefix('!') {
                Requirement::Absent(label_key(key, selector)?)
            } else {
                Requirement::Exists(label_key(term, selector)?)
            };

            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }

    /// An empty selector matches everything.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

fn label_key(key: &str, selector: &str) -> Result<String, ClientError> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) || key.contains(['(', ')']) {
        return Err(ClientError::Validation(format!(
            "unsupported label selector `{selector}`"
        )));
    }
    Ok(key.to_owned())
}
