//! Raw responses and their classification.
//!
//! Every write the sync engine issues is judged by [`classify`], which folds
//! the controller's many ways of saying "that is already done" into a single
//! [`ResponseClass::AlreadyExists`].

use serde_json::Value;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// Status and body returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Create an empty "204 No Content" response.
    pub fn no_content() -> Self {
        Self::new(204, "")
    }

    /// Create a JSON response.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON. Empty bodies parse as `null`.
    pub fn json_body(&self) -> serde_json::Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body)
    }

    /// Classify this response.
    pub fn class(&self) -> ResponseClass {
        classify(self.status, &self.body)
    }
}

/// Outcome class of a controller response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx, including empty "no content" and "accepted" answers.
    Success,
    /// The object, membership or link is already there.
    AlreadyExists,
    /// 404.
    NotFound,
    /// Anything else.
    Fatal,
}

/// Phrases the controller uses when a create or association is a duplicate.
const DUPLICATE_MARKERS: &[&str] = &[
    "already exists",
    "already a member",
    "already associated",
    "already linked",
    "already assigned",
    "duplicate",
];

/// Map a transport status and body to a [`ResponseClass`].
pub fn classify(status: u16, body: &str) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        404 => ResponseClass::NotFound,
        400 | 409 => {
            let lowered = body.to_lowercase();
            if DUPLICATE_MARKERS.iter().any(|m| lowered.contains(m)) {
                ResponseClass::AlreadyExists
            } else {
                ResponseClass::Fatal
            }
        }
        _ => ResponseClass::Fatal,
    }
}
