//! Stream device.
//!
//! The protocol engine behind a simulated instrument: frames inbound chunks
//! on the input terminator, dispatches each token through the matcher,
//! mutates the parameter store, renders replies with the configured latency,
//! and owns the mismatch payload and the asynchronous trigger channel. One
//! device instance is shared by every client connection task and by the
//! administrative surface.

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::SimError;
use crate::lexer::Item;
use crate::parameter::{ParameterMap, Value};
use crate::parser::{CommandKind, CommandParser, CommandPattern};
use crate::vdfile::VdFile;

const MISMATCH_LIMIT: usize = 255;

/// Delay category of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    Res,
    Ack,
}

impl DelayKind {
    pub fn from_name(name: &str) -> Result<Self, SimError> {
        match name {
            "res" => Ok(DelayKind::Res),
            "ack" => Ok(DelayKind::Ack),
            other => Err(SimError::UnknownDelayType(other.to_string())),
        }
    }
}

/// Per-parameter protocol record: the four lexed pattern slots plus the
/// per-command delay overrides (zero means fall back to the global delay).
pub struct StreamCommand {
    pub param: String,
    pub req_items: Vec<Item>,
    pub res_items: Vec<Item>,
    pub set_items: Vec<Item>,
    pub ack_items: Vec<Item>,
    res_delay: RwLock<Duration>,
    ack_delay: RwLock<Duration>,
}

pub struct StreamDevice {
    params: ParameterMap,
    commands: Vec<StreamCommand>,
    in_terminator: Vec<u8>,
    out_terminator: Vec<u8>,
    glob_res_delay: RwLock<Duration>,
    glob_ack_delay: RwLock<Duration>,
    mismatch: RwLock<Vec<u8>>,
    parser: CommandParser,
    trigger_tx: mpsc::Sender<Vec<u8>>,
    trigger_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl StreamDevice {
    /// Build a device from a loaded configuration. The VDFile has already
    /// been validated, so every command refers to an existing parameter.
    pub fn new(vdfile: VdFile) -> Self {
        let commands: Vec<StreamCommand> = vdfile
            .commands
            .into_iter()
            .map(|c| StreamCommand {
                param: c.param,
                req_items: c.req,
                res_items: c.res,
                set_items: c.set,
                ack_items: c.ack,
                res_delay: RwLock::new(c.res_delay),
                ack_delay: RwLock::new(c.ack_delay),
            })
            .collect();

        let parser = CommandParser::new(build_patterns(&commands, &vdfile.params));
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        Self {
            params: vdfile.params,
            commands,
            in_terminator: vdfile.in_terminator,
            out_terminator: vdfile.out_terminator,
            glob_res_delay: RwLock::new(vdfile.res_delay),
            glob_ack_delay: RwLock::new(vdfile.ack_delay),
            mismatch: RwLock::new(vdfile.mismatch),
            parser,
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        }
    }

    // -------------------------------------------------------------------------
    // Stream handler surface
    // -------------------------------------------------------------------------

    /// Process one inbound chunk. Every complete token (delimited by the
    /// input terminator) is dispatched in order and the replies are
    /// concatenated; unterminated trailing bytes are discarded. Without an
    /// input terminator no framing is possible and the chunk produces
    /// nothing.
    pub async fn handle(&self, chunk: &[u8]) -> Vec<u8> {
        if self.in_terminator.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = find_subsequence(rest, &self.in_terminator) {
            let token = &rest[..pos];
            debug!(token = %String::from_utf8_lossy(token), "rx");
            out.extend_from_slice(&self.handle_token(token).await);
            rest = &rest[pos + self.in_terminator.len()..];
        }
        if !rest.is_empty() {
            debug!(len = rest.len(), "discarding unterminated trailing bytes");
        }
        out
    }

    async fn handle_token(&self, token: &[u8]) -> Vec<u8> {
        let Ok(text) = std::str::from_utf8(token) else {
            return self.mismatch();
        };
        let Some(cmd) = self.parser.parse(text) else {
            debug!(token = text, "no pattern matched");
            return self.mismatch();
        };
        debug!(?cmd.kind, param = %cmd.param, "cmd");
        match cmd.kind {
            CommandKind::Req => self.make_response(&cmd.param).await,
            CommandKind::Set => {
                let Some(param) = self.params.get(&cmd.param) else {
                    return self.mismatch();
                };
                let Some(value) = cmd.value else {
                    return self.mismatch();
                };
                if let Err(err) = param.set(value) {
                    error!(param = %cmd.param, %err, "set rejected");
                    let opts = param.opts();
                    if !opts.is_empty() {
                        info!(?opts, "allowed values");
                    }
                    return self.mismatch();
                }
                let committed = param.get();
                self.make_ack(&cmd.param, &committed).await
            }
        }
    }

    /// The configured mismatch payload with the output terminator appended,
    /// or nothing when the payload is empty.
    pub fn mismatch(&self) -> Vec<u8> {
        let payload = self.mismatch.read().clone();
        if payload.is_empty() {
            return Vec::new();
        }
        debug!(payload = %String::from_utf8_lossy(&payload), "mismatch");
        let mut out = payload;
        out.extend_from_slice(&self.out_terminator);
        out
    }

    /// Claim the receive half of the trigger channel. The network layer
    /// calls this once; subsequent calls return `None`.
    pub fn take_triggered(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.trigger_rx.lock().take()
    }

    /// Emit the response payload for `param` out-of-band. The deposit is
    /// non-blocking: with no free slot on the trigger channel the payload is
    /// dropped and `NoClient` is returned.
    pub fn trigger(&self, param: &str) -> Result<(), SimError> {
        let cmd = self
            .find_command(param)
            .ok_or_else(|| SimError::ParamNotFound(param.to_string()))?;
        let value = self.params.get(param).map(|p| p.get());
        let out = construct_output(&cmd.res_items, value.as_ref());
        if out.is_empty() {
            return Ok(());
        }
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.out_terminator);
        self.trigger_tx
            .try_send(bytes)
            .map_err(|_| SimError::NoClient)
    }

    // -------------------------------------------------------------------------
    // Reply construction
    // -------------------------------------------------------------------------

    async fn make_response(&self, param: &str) -> Vec<u8> {
        let Some(cmd) = self.find_command(param) else {
            return Vec::new();
        };
        let value = self.params.get(param).map(|p| p.get());
        let out = construct_output(&cmd.res_items, value.as_ref());
        if out.is_empty() {
            return Vec::new();
        }
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.out_terminator);
        self.apply_delay(DelayKind::Res, cmd).await;
        debug!(payload = %String::from_utf8_lossy(&bytes), "tx");
        bytes
    }

    async fn make_ack(&self, param: &str, value: &Value) -> Vec<u8> {
        let Some(cmd) = self.find_command(param) else {
            return Vec::new();
        };
        let out = construct_output(&cmd.ack_items, Some(value));
        if out.is_empty() {
            return Vec::new();
        }
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.out_terminator);
        self.apply_delay(DelayKind::Ack, cmd).await;
        debug!(payload = %String::from_utf8_lossy(&bytes), "tx");
        bytes
    }

    async fn apply_delay(&self, kind: DelayKind, cmd: &StreamCommand) {
        let (global, per, op) = match kind {
            DelayKind::Res => (
                *self.glob_res_delay.read(),
                *cmd.res_delay.read(),
                "response",
            ),
            DelayKind::Ack => (
                *self.glob_ack_delay.read(),
                *cmd.ack_delay.read(),
                "acknowledge",
            ),
        };
        let delay = effective_delay(global, per);
        if delay > Duration::ZERO {
            debug!(op, ?delay, "delaying");
            tokio::time::sleep(delay).await;
        }
    }

    fn find_command(&self, param: &str) -> Option<&StreamCommand> {
        self.commands.iter().find(|c| c.param == param)
    }

    // -------------------------------------------------------------------------
    // Administrative surface
    // -------------------------------------------------------------------------

    pub fn get_parameter(&self, name: &str) -> Result<Value, SimError> {
        self.params
            .get(name)
            .map(|p| p.get())
            .ok_or_else(|| SimError::ParamNotFound(name.to_string()))
    }

    pub fn set_parameter(&self, name: &str, value: Value) -> Result<(), SimError> {
        self.params
            .get(name)
            .ok_or_else(|| SimError::ParamNotFound(name.to_string()))?
            .set(value)
    }

    pub fn get_global_delay(&self, kind: &str) -> Result<Duration, SimError> {
        match DelayKind::from_name(kind)? {
            DelayKind::Res => Ok(*self.glob_res_delay.read()),
            DelayKind::Ack => Ok(*self.glob_ack_delay.read()),
        }
    }

    pub fn set_global_delay(&self, kind: &str, value: &str) -> Result<(), SimError> {
        let kind = DelayKind::from_name(kind)?;
        let delay = parse_duration(value)?;
        match kind {
            DelayKind::Res => *self.glob_res_delay.write() = delay,
            DelayKind::Ack => *self.glob_ack_delay.write() = delay,
        }
        Ok(())
    }

    /// Effective delay of a command, resolved against the matching global.
    pub fn get_param_delay(&self, kind: &str, param: &str) -> Result<Duration, SimError> {
        let kind = DelayKind::from_name(kind)?;
        let cmd = self
            .find_command(param)
            .ok_or_else(|| SimError::ParamNotFound(param.to_string()))?;
        let delay = match kind {
            DelayKind::Res => effective_delay(*self.glob_res_delay.read(), *cmd.res_delay.read()),
            DelayKind::Ack => effective_delay(*self.glob_ack_delay.read(), *cmd.ack_delay.read()),
        };
        Ok(delay)
    }

    pub fn set_param_delay(&self, kind: &str, param: &str, value: &str) -> Result<(), SimError> {
        let kind = DelayKind::from_name(kind)?;
        let cmd = self
            .find_command(param)
            .ok_or_else(|| SimError::ParamNotFound(param.to_string()))?;
        let delay = parse_duration(value)?;
        match kind {
            DelayKind::Res => *cmd.res_delay.write() = delay,
            DelayKind::Ack => *cmd.ack_delay.write() = delay,
        }
        Ok(())
    }

    pub fn get_mismatch(&self) -> Vec<u8> {
        self.mismatch.read().clone()
    }

    pub fn set_mismatch(&self, value: &str) -> Result<(), SimError> {
        if value.len() > MISMATCH_LIMIT {
            return Err(SimError::MismatchTooLong(value.len()));
        }
        *self.mismatch.write() = value.as_bytes().to_vec();
        Ok(())
    }

    /// Table of parameters and their supported slots, logged at startup.
    pub fn command_summary(&self) -> String {
        let name_width = self
            .params
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max("Parameter".len());
        let mut out = format!("{:<name_width$}  Req Res Set Ack\n", "Parameter");
        for name in self.params.keys() {
            let (req, res, set, ack) = self.supported_slots(name);
            out.push_str(&format!(
                "{name:<name_width$}  {} {} {} {}\n",
                mark(req),
                mark(res),
                mark(set),
                mark(ack)
            ));
        }
        out
    }

    fn supported_slots(&self, param: &str) -> (bool, bool, bool, bool) {
        let (mut req, mut res, mut set, mut ack) = (false, false, false, false);
        for c in self.commands.iter().filter(|c| c.param == param) {
            req |= !c.req_items.is_empty();
            res |= !c.res_items.is_empty();
            set |= !c.set_items.is_empty();
            ack |= !c.ack_items.is_empty();
        }
        (req, res, set, ack)
    }
}

fn mark(supported: bool) -> &'static str {
    if supported {
        " ✓ "
    } else {
        "   "
    }
}

/// Request patterns first in declaration order, then set patterns, so a
/// token always prefers a request interpretation.
fn build_patterns(commands: &[StreamCommand], params: &ParameterMap) -> Vec<CommandPattern> {
    let mut patterns = Vec::new();
    for cmd in commands.iter().filter(|c| !c.req_items.is_empty()) {
        if let Some(param) = params.get(&cmd.param) {
            patterns.push(CommandPattern {
                items: cmd.req_items.clone(),
                kind: CommandKind::Req,
                param: cmd.param.clone(),
                param_kind: param.kind(),
            });
        }
    }
    for cmd in commands.iter().filter(|c| !c.set_items.is_empty()) {
        if let Some(param) = params.get(&cmd.param) {
            patterns.push(CommandPattern {
                items: cmd.set_items.clone(),
                kind: CommandKind::Set,
                param: cmd.param.clone(),
                param_kind: param.kind(),
            });
        }
    }
    patterns
}

/// Render an item sequence with the parameter value substituted into the
/// placeholders. An absent value short-circuits to empty output, the signal
/// that no reply is possible.
fn construct_output(items: &[Item], value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let mut out = String::new();
    for item in items {
        match item {
            Item::Literal(text) | Item::Whitespace(text) => out.push_str(text),
            Item::NumberPlaceholder(spec) | Item::StringPlaceholder(spec) => {
                out.push_str(&spec.render(value));
            }
        }
    }
    out
}

/// Per-command delay if positive, else the global delay, else zero.
fn effective_delay(global: Duration, per_command: Duration) -> Duration {
    if per_command > Duration::ZERO {
        per_command
    } else if global > Duration::ZERO {
        global
    } else {
        Duration::ZERO
    }
}

fn parse_duration(value: &str) -> Result<Duration, SimError> {
    humantime::parse_duration(value).map_err(|_| SimError::BadDuration(value.to_string()))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
