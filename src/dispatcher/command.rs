//! Command records and call-by-name resolution.
//!
//! A call name is either `<action>_<command>` or a bare command:
//!
//! | Action | Method |
//! |---|---|
//! | `get_`, `post_`, `critical_`, `status_`, `async_` | the matching method type |
//! | `set_` | post, with the command name kept as `set_<command>` |
//! | none | the explicit method if given, otherwise post |
//!
//! The command is then mapped to an rpc code through the [`Lookup`]
//! tables, falling back to the name itself when it is a 4-byte code.

use bytes::Bytes;

use crate::codec::Arg;
use crate::error::{DyioError, Result};
use crate::protocol::{encode_groups, BoardId, Lookup, MethodType, RpcName};

/// An rpc and the method it is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTarget {
    pub rpc: RpcName,
    pub method: MethodType,
}

/// Resolve a call name to its rpc and method.
///
/// `explicit` is only consulted for unqualified names.
pub fn resolve_call(lookup: &Lookup, name: &str, explicit: Option<MethodType>) -> Result<CallTarget> {
    let qualified = name.split_once('_').and_then(|(action, command)| {
        if command.is_empty() {
            return None;
        }
        match action {
            "set" => Some((MethodType::Post, format!("set_{}", command))),
            _ => MethodType::from_action(action).map(|method| (method, command.to_string())),
        }
    });

    let (method, command) = match qualified {
        Some((method, command)) => (method, command),
        None => (explicit.unwrap_or(MethodType::Post), name.to_string()),
    };

    let rpc = lookup
        .rpc_for(&command)
        .ok_or_else(|| DyioError::UnknownCommand(name.to_string()))?;
    Ok(CallTarget { rpc, method })
}

/// One command to send: rpc, method and the converted argument groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    rpc: RpcName,
    method: MethodType,
    args: Vec<Bytes>,
}

impl CommandRecord {
    pub fn new(rpc: RpcName, method: MethodType, args: &[Arg]) -> Self {
        Self {
            rpc,
            method,
            args: args.iter().map(|arg| Bytes::from(arg.to_bytes())).collect(),
        }
    }

    pub fn from_target(target: CallTarget, args: &[Arg]) -> Self {
        Self::new(target.rpc, target.method, args)
    }

    #[inline]
    pub fn rpc(&self) -> RpcName {
        self.rpc
    }

    #[inline]
    pub fn method(&self) -> MethodType {
        self.method
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Encode for the given board (transaction id 0).
    pub fn encode(&self, board_id: BoardId) -> Result<Vec<u8>> {
        encode_groups(self.rpc, self.method, board_id, 0, &self.args)
    }
}
