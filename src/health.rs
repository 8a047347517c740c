//! Liveness report for the `health` command

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: String,
}

pub fn health(version: impl Into<String>) -> Health {
    Health {
        status: "ok",
        version: version.into(),
    }
}
