// Bars and regime labels
pub mod market;

// Feature layout, scaler and model artifacts
pub mod ml;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
