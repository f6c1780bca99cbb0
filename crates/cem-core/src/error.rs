use std::fmt;

#[derive(Debug)]
pub enum CemError {
    InvalidSpec(String),
    Parse(String),
    Json(serde_json::Error),
    UnknownMaterial(String),
    UnknownCurrency(String),
    UnknownUnit(String),
    UnknownMethod(String),
    Stl(String),
}

impl fmt::Display for CemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CemError::InvalidSpec(msg) => write!(f, "invalid specification: {msg}"),
            CemError::Parse(msg) => write!(f, "parse error: {msg}"),
            CemError::Json(e) => write!(f, "JSON error: {e}"),
            CemError::UnknownMaterial(name) => write!(f, "unknown material: {name}"),
            CemError::UnknownCurrency(code) => write!(f, "unsupported currency: {code}"),
            CemError::UnknownUnit(unit) => write!(f, "unsupported unit: {unit}"),
            CemError::UnknownMethod(m) => write!(f, "unknown manufacturing method: {m}"),
            CemError::Stl(msg) => write!(f, "STL error: {msg}"),
        }
    }
}

impl std::error::Error for CemError {}

impl From<serde_json::Error> for CemError {
    fn from(e: serde_json::Error) -> Self {
        CemError::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, CemError>;
