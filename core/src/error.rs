use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unrecognized {kind} option '{value}'")]
    UnknownScenario { kind: &'static str, value: String },

    #[error("Malformed hazard curve for {region}/{hazard}: {detail}")]
    MalformedCurve {
        region: String,
        hazard: String,
        detail: String,
    },

    #[error("No hazard ratio for household {hhid} in event {region}/{hazard}/rp={rp}")]
    MissingHazardRatio {
        region: String,
        hazard: String,
        rp: u32,
        hhid: String,
    },

    #[error("Numeric degeneracy: {0}")]
    Numeric(String),

    #[error("Mass conservation violated in {context}: expected {expected}, got {actual}")]
    MassConservation {
        context: &'static str,
        expected: f64,
        actual: f64,
    },

    #[error("Table '{0}' is empty after alignment")]
    EmptyTable(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;
