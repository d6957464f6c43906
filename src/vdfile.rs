//! Virtual device configuration.
//!
//! A VDFile is the declarative TOML document a device is constructed from:
//! the parameter map, the command list with its four pattern slots, the
//! input/output terminators, the global delays and the mismatch payload.
//! Loading deserialises the raw document, converts initial values under the
//! declared kinds, lexes the pattern slots and validates the structural
//! invariants; a file that fails any check refuses to start the simulator.
//!
//! ```toml
//! in_terminator  = "\r\n"
//! out_terminator = "\r\n"
//! mismatch       = "ERR"
//! res_delay      = "500ms"
//!
//! [[parameter]]
//! name  = "volt"
//! type  = "float32"
//! value = 1.0
//! opts  = "1.0|2.5"
//!
//! [[command]]
//! param = "volt"
//! req   = "VOLT?"
//! res   = "VOLT %.3f"
//! set   = "VOLT %.3f"
//! ack   = "OK"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::error::SimError;
use crate::lexer::{lex, Item};
use crate::parameter::{coerce_str, ParamKind, Parameter, ParameterMap, Value};

const MISMATCH_LIMIT: usize = 255;

#[derive(Debug, Deserialize)]
struct RawVdFile {
    #[serde(default)]
    in_terminator: String,
    #[serde(default)]
    out_terminator: String,
    #[serde(default)]
    mismatch: String,
    #[serde(default)]
    res_delay: Option<String>,
    #[serde(default)]
    ack_delay: Option<String>,
    #[serde(default, rename = "parameter")]
    parameters: Vec<RawParameter>,
    #[serde(default, rename = "command")]
    commands: Vec<RawCommand>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    value: toml::Value,
    #[serde(default)]
    opts: String,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    param: String,
    #[serde(default)]
    req: String,
    #[serde(default)]
    res: String,
    #[serde(default)]
    set: String,
    #[serde(default)]
    ack: String,
    #[serde(default)]
    res_delay: Option<String>,
    #[serde(default)]
    ack_delay: Option<String>,
}

/// One command record with its pattern slots already lexed.
#[derive(Debug)]
pub struct CommandSpec {
    pub param: String,
    pub req: Vec<Item>,
    pub res: Vec<Item>,
    pub set: Vec<Item>,
    pub ack: Vec<Item>,
    pub res_delay: Duration,
    pub ack_delay: Duration,
}

/// A loaded, validated configuration ready to build a device from.
#[derive(Debug)]
pub struct VdFile {
    pub params: ParameterMap,
    pub commands: Vec<CommandSpec>,
    pub in_terminator: Vec<u8>,
    pub out_terminator: Vec<u8>,
    pub res_delay: Duration,
    pub ack_delay: Duration,
    pub mismatch: Vec<u8>,
}

impl VdFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vdfile {}", path.display()))?;
        Self::from_str(&text).with_context(|| format!("invalid vdfile {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self> {
        let raw: RawVdFile = toml::from_str(text).context("failed to parse vdfile document")?;

        let mut params: ParameterMap = BTreeMap::new();
        for p in &raw.parameters {
            let kind = ParamKind::from_name(&p.kind)
                .with_context(|| format!("parameter {}", p.name))?;
            let initial = initial_value(kind, &p.value)
                .with_context(|| format!("parameter {}", p.name))?;
            let param = Parameter::new(kind, initial, &p.opts)
                .with_context(|| format!("parameter {}", p.name))?;
            if params.insert(p.name.clone(), param).is_some() {
                bail!("parameter {} declared twice", p.name);
            }
        }

        let mut commands = Vec::with_capacity(raw.commands.len());
        for c in &raw.commands {
            commands.push(CommandSpec {
                param: c.param.clone(),
                req: lex(&c.req),
                res: lex(&c.res),
                set: lex(&c.set),
                ack: lex(&c.ack),
                res_delay: parse_delay(c.res_delay.as_deref())
                    .with_context(|| format!("command for {}", c.param))?,
                ack_delay: parse_delay(c.ack_delay.as_deref())
                    .with_context(|| format!("command for {}", c.param))?,
            });
        }

        let vdfile = VdFile {
            params,
            commands,
            in_terminator: raw.in_terminator.into_bytes(),
            out_terminator: raw.out_terminator.into_bytes(),
            res_delay: parse_delay(raw.res_delay.as_deref()).context("global res_delay")?,
            ack_delay: parse_delay(raw.ack_delay.as_deref()).context("global ack_delay")?,
            mismatch: raw.mismatch.into_bytes(),
        };
        vdfile.validate()?;
        Ok(vdfile)
    }

    fn validate(&self) -> Result<()> {
        if self.mismatch.len() > MISMATCH_LIMIT {
            bail!(SimError::MismatchTooLong(self.mismatch.len()));
        }

        let mut req_seen = Vec::new();
        let mut set_seen = Vec::new();
        for cmd in &self.commands {
            let Some(param) = self.params.get(&cmd.param) else {
                bail!(SimError::ParamNotFound(cmd.param.clone()));
            };
            if !cmd.req.is_empty() {
                if req_seen.contains(&cmd.param) {
                    bail!("parameter {} declares more than one request pattern", cmd.param);
                }
                req_seen.push(cmd.param.clone());
            }
            if !cmd.set.is_empty() {
                if set_seen.contains(&cmd.param) {
                    bail!("parameter {} declares more than one set pattern", cmd.param);
                }
                set_seen.push(cmd.param.clone());
            }
            for (slot, items) in [
                ("req", &cmd.req),
                ("res", &cmd.res),
                ("set", &cmd.set),
                ("ack", &cmd.ack),
            ] {
                check_placeholders(&cmd.param, slot, items, param.kind())?;
            }
        }
        Ok(())
    }
}

/// Numeric specifiers require a numeric kind; `%s` carries string values and
/// the exact `true`/`false` wire form of bool.
fn check_placeholders(param: &str, slot: &str, items: &[Item], kind: ParamKind) -> Result<()> {
    for item in items {
        match item {
            Item::NumberPlaceholder(spec) if !kind.is_numeric() => {
                bail!(
                    "command for {param}: {slot} placeholder {} incompatible with kind {}",
                    spec.raw(),
                    kind.name()
                );
            }
            Item::StringPlaceholder(spec)
                if !matches!(kind, ParamKind::String | ParamKind::Bool) =>
            {
                bail!(
                    "command for {param}: {slot} placeholder {} incompatible with kind {}",
                    spec.raw(),
                    kind.name()
                );
            }
            _ => {}
        }
    }
    Ok(())
}

/// Convert a TOML initial value under the declared kind.
fn initial_value(kind: ParamKind, value: &toml::Value) -> Result<Value, SimError> {
    match (kind, value) {
        (ParamKind::Int, toml::Value::Integer(v)) => Ok(Value::Int(*v)),
        (ParamKind::Int64, toml::Value::Integer(v)) => Ok(Value::Int64(*v)),
        (ParamKind::Int32, toml::Value::Integer(v)) => i32::try_from(*v)
            .map(Value::Int32)
            .map_err(|_| SimError::WrongInt),
        (ParamKind::Float32, toml::Value::Float(v)) => Ok(Value::Float32(*v as f32)),
        (ParamKind::Float32, toml::Value::Integer(v)) => Ok(Value::Float32(*v as f32)),
        (ParamKind::Float64, toml::Value::Float(v)) => Ok(Value::Float64(*v)),
        (ParamKind::Float64, toml::Value::Integer(v)) => Ok(Value::Float64(*v as f64)),
        (ParamKind::Bool, toml::Value::Boolean(v)) => Ok(Value::Bool(*v)),
        (ParamKind::String, toml::Value::String(v)) => Ok(Value::String(v.clone())),
        (kind, toml::Value::String(v)) => coerce_str(kind, v),
        (ParamKind::Int | ParamKind::Int32 | ParamKind::Int64, _) => Err(SimError::WrongInt),
        (ParamKind::Float32 | ParamKind::Float64, _) => Err(SimError::WrongFloat),
        (ParamKind::Bool, _) => Err(SimError::WrongBool),
        (ParamKind::String, _) => Err(SimError::WrongString),
    }
}

fn parse_delay(value: Option<&str>) -> Result<Duration> {
    match value {
        None => Ok(Duration::ZERO),
        Some(text) => humantime::parse_duration(text)
            .map_err(|_| SimError::BadDuration(text.to_string()).into()),
    }
}
