//! Custom error types for the simulator.
//!
//! `SimError` is the single error enum shared by the parameter store, the
//! stream device and the administrative surface. At the protocol boundary
//! every variant collapses into the configured mismatch payload; at the
//! admin boundary the variant's message is surfaced to the caller verbatim.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Referenced parameter does not exist in the store.
    #[error("parameter {0} not found")]
    ParamNotFound(String),

    /// Configuration declared a value of an unsupported kind.
    #[error("unknown parameter kind: {0}")]
    UnknownKind(String),

    /// `set` received a native value of an incompatible kind.
    #[error("received value with invalid type")]
    WrongType,

    /// String coercion to an integer kind failed.
    #[error("value cannot be converted to int")]
    WrongInt,

    /// String coercion to a float kind failed.
    #[error("value cannot be converted to float")]
    WrongFloat,

    /// Bool coercion accepts only the exact spellings `true` and `false`.
    #[error("value cannot be converted to bool")]
    WrongBool,

    /// Value cannot be represented as a string parameter.
    #[error("value cannot be converted to string")]
    WrongString,

    /// Post-coercion value is outside the parameter's allowed options.
    #[error("value outside opts - ignoring set")]
    ValueNotAllowed,

    /// Delay category outside `res` / `ack`.
    #[error("delay {0} not found")]
    UnknownDelayType(String),

    /// Mismatch payload exceeds the 255 byte limit.
    #[error("mismatch message of {0} bytes exceeds 255 byte limit")]
    MismatchTooLong(usize),

    /// Trigger deposit found no client ready to receive.
    #[error("no client available")]
    NoClient,

    /// Admin duration string did not parse.
    #[error("invalid duration: {0}")]
    BadDuration(String),
}
