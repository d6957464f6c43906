//! Typed parameter cells.
//!
//! Each parameter of a virtual device is one scalar value of a declared kind
//! plus an optional set of allowed values. Values arrive either natively
//! (from configuration) or as protocol/admin strings that are coerced under
//! the declared kind. Cells are shared between client connection tasks and
//! the admin surface, so reads take a shared lock and writes an exclusive
//! one; a rejected set leaves the committed value untouched.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;

use crate::error::SimError;

/// The seven scalar kinds a parameter may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
}

impl ParamKind {
    /// Resolve a configuration type name.
    pub fn from_name(name: &str) -> Result<Self, SimError> {
        match name {
            "int" => Ok(ParamKind::Int),
            "int32" => Ok(ParamKind::Int32),
            "int64" => Ok(ParamKind::Int64),
            "float32" => Ok(ParamKind::Float32),
            "float64" => Ok(ParamKind::Float64),
            "bool" => Ok(ParamKind::Bool),
            "string" => Ok(ParamKind::String),
            other => Err(SimError::UnknownKind(other.to_string())),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ParamKind::Int
                | ParamKind::Int32
                | ParamKind::Int64
                | ParamKind::Float32
                | ParamKind::Float64
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Int32 => "int32",
            ParamKind::Int64 => "int64",
            ParamKind::Float32 => "float32",
            ParamKind::Float64 => "float64",
            ParamKind::Bool => "bool",
            ParamKind::String => "string",
        }
    }
}

/// A scalar of one of the seven kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
}

impl Value {
    pub fn kind(&self) -> ParamKind {
        match self {
            Value::Int(_) => ParamKind::Int,
            Value::Int32(_) => ParamKind::Int32,
            Value::Int64(_) => ParamKind::Int64,
            Value::Float32(_) => ParamKind::Float32,
            Value::Float64(_) => ParamKind::Float64,
            Value::Bool(_) => ParamKind::Bool,
            Value::String(_) => ParamKind::String,
        }
    }

    /// Integer view for integer-conversion rendering; floats truncate.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) | Value::Int64(v) => Some(*v),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Float32(v) => Some(v.trunc() as i64),
            Value::Float64(v) => Some(v.trunc() as i64),
            _ => None,
        }
    }

    /// Float view for float-conversion rendering.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) | Value::Int64(v) => Some(*v as f64),
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

/// Coerce a string under the given kind. This is the single string-to-value
/// table shared by protocol sets, admin sets, option lists and initial
/// values.
pub fn coerce_str(kind: ParamKind, s: &str) -> Result<Value, SimError> {
    match kind {
        ParamKind::Int => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| SimError::WrongInt),
        ParamKind::Int32 => s
            .parse::<i32>()
            .map(Value::Int32)
            .map_err(|_| SimError::WrongInt),
        ParamKind::Int64 => s
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|_| SimError::WrongInt),
        ParamKind::Float32 => s
            .parse::<f32>()
            .map(Value::Float32)
            .map_err(|_| SimError::WrongFloat),
        ParamKind::Float64 => s
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|_| SimError::WrongFloat),
        ParamKind::Bool => match s {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(SimError::WrongBool),
        },
        ParamKind::String => Ok(Value::String(s.to_string())),
    }
}

fn default_value(kind: ParamKind) -> Value {
    match kind {
        ParamKind::Int => Value::Int(0),
        ParamKind::Int32 => Value::Int32(0),
        ParamKind::Int64 => Value::Int64(0),
        ParamKind::Float32 => Value::Float32(0.0),
        ParamKind::Float64 => Value::Float64(0.0),
        ParamKind::Bool => Value::Bool(false),
        ParamKind::String => Value::String(String::new()),
    }
}

/// A typed cell with an optional allowed-value set.
#[derive(Debug)]
pub struct Parameter {
    kind: ParamKind,
    cell: RwLock<Value>,
    opts: Vec<Value>,
}

impl Parameter {
    /// Build a cell of `kind` with the given initial value and option list.
    /// `opts_spec` is empty or a `|`-separated list of values; each entry is
    /// coerced under `kind` and a failure propagates the kind's coercion
    /// error. The initial value is assigned through [`Parameter::set`], so it
    /// is itself subject to coercion and the option check.
    pub fn new(kind: ParamKind, initial: Value, opts_spec: &str) -> Result<Self, SimError> {
        let mut opts = Vec::new();
        if !opts_spec.is_empty() {
            for entry in opts_spec.split('|') {
                opts.push(coerce_str(kind, entry)?);
            }
        }
        let param = Self {
            kind,
            cell: RwLock::new(default_value(kind)),
            opts,
        };
        param.set(initial)?;
        Ok(param)
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Last committed value.
    pub fn get(&self) -> Value {
        self.cell.read().clone()
    }

    /// Assign a value. Native values must match the cell's kind exactly;
    /// strings are coerced. With a non-empty option list the post-coercion
    /// value must be one of the options, otherwise the cell is unchanged and
    /// `ValueNotAllowed` is returned.
    pub fn set(&self, value: Value) -> Result<(), SimError> {
        let committed = if value.kind() == self.kind {
            value
        } else if let Value::String(s) = value {
            coerce_str(self.kind, &s)?
        } else {
            return Err(SimError::WrongType);
        };
        if !self.opts.is_empty() && !self.opts.contains(&committed) {
            return Err(SimError::ValueNotAllowed);
        }
        *self.cell.write() = committed;
        Ok(())
    }

    /// String renderings of the allowed values; empty when unrestricted.
    pub fn opts(&self) -> Vec<String> {
        self.opts.iter().map(Value::to_string).collect()
    }

    /// Default rendering of the current value.
    pub fn string(&self) -> String {
        self.cell.read().to_string()
    }
}

/// Parameter stores are keyed by name; a sorted map keeps listings and the
/// startup summary deterministic.
pub type ParameterMap = BTreeMap<String, Parameter>;
