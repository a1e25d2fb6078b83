/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2025  Luis M. Santos, M.D.
 *
 * This library is free software; you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public
 * License as published by the Free Software Foundation; either
 * version 2.1 of the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA
 */
use crate::strings::RUMString;
use compact_str::format_compact;
pub use smallvec::{smallvec, SmallVec};
use std::fmt;

///
/// Type used for propagating results across the whole crate family. The error side is a
/// structured [GatewayError] rather than a bare string, so callers can match on `kind()`
/// instead of parsing messages, while every call site that used to build a message with
/// `format_compact!` still works via `GatewayError`'s `From<CompactString>` impl.
///
pub type RUMResult<T> = Result<T, GatewayError>;

pub type RUMVec<T> = Vec<T>;

///
/// Error kind taxonomy shared by every component in the gateway. Each variant carries the
/// context needed to log or to decide an ACK code without re-deriving it from a string.
///
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// MLLP frame malformed (bad start byte, oversize, embedded start byte). Session-fatal.
    Framing { context: RUMString },
    /// HL7 could not be parsed. Carries the byte offset and segment index where parsing gave up.
    Parse {
        context: RUMString,
        byte_offset: usize,
        segment_index: usize,
    },
    /// HL7 parsed but is missing required structure for its message type/trigger.
    Validation { context: RUMString },
    /// Could not produce the target representation (HL7<->MWL/MPPS). Non-fatal to the caller.
    Mapping { context: RUMString },
    /// Persistence (MWL/MPPS/queue store) failed.
    Storage { context: RUMString },
    /// MLLP connect/write/read failed.
    Transport {
        context: RUMString,
        destination: RUMString,
    },
    /// A configured deadline was crossed. Treated as a transport error by the router/sender.
    Timeout { context: RUMString },
    /// An MPPS (or other) state transition was attempted that the state machine forbids.
    StateTransition {
        context: RUMString,
        from: RUMString,
        to: RUMString,
    },
    /// The durable queue is beyond its configured high-water mark.
    Capacity { context: RUMString },
    /// Fatal error during process startup only.
    FatalInit { context: RUMString },
    /// Catch-all for errors that don't yet have a dedicated kind (e.g. ad-hoc
    /// `format_compact!` call sites ported from the teacher lineage).
    Other { context: RUMString },
}

///
/// The taxonomy name without payload, useful for metrics labels and match arms.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Framing,
    Parse,
    Validation,
    Mapping,
    Storage,
    Transport,
    Timeout,
    StateTransition,
    Capacity,
    FatalInit,
    Other,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Framing { .. } => ErrorKind::Framing,
            GatewayError::Parse { .. } => ErrorKind::Parse,
            GatewayError::Validation { .. } => ErrorKind::Validation,
            GatewayError::Mapping { .. } => ErrorKind::Mapping,
            GatewayError::Storage { .. } => ErrorKind::Storage,
            GatewayError::Transport { .. } => ErrorKind::Transport,
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::StateTransition { .. } => ErrorKind::StateTransition,
            GatewayError::Capacity { .. } => ErrorKind::Capacity,
            GatewayError::FatalInit { .. } => ErrorKind::FatalInit,
            GatewayError::Other { .. } => ErrorKind::Other,
        }
    }

    pub fn context(&self) -> &str {
        match self {
            GatewayError::Framing { context }
            | GatewayError::Validation { context }
            | GatewayError::Mapping { context }
            | GatewayError::Storage { context }
            | GatewayError::Timeout { context }
            | GatewayError::Capacity { context }
            | GatewayError::FatalInit { context }
            | GatewayError::Other { context } => context.as_str(),
            GatewayError::Parse { context, .. } => context.as_str(),
            GatewayError::Transport { context, .. } => context.as_str(),
            GatewayError::StateTransition { context, .. } => context.as_str(),
        }
    }

    pub fn parse(context: impl Into<RUMString>, byte_offset: usize, segment_index: usize) -> Self {
        GatewayError::Parse {
            context: context.into(),
            byte_offset,
            segment_index,
        }
    }

    pub fn transport(context: impl Into<RUMString>, destination: impl Into<RUMString>) -> Self {
        GatewayError::Transport {
            context: context.into(),
            destination: destination.into(),
        }
    }

    pub fn state_transition(
        context: impl Into<RUMString>,
        from: impl Into<RUMString>,
        to: impl Into<RUMString>,
    ) -> Self {
        GatewayError::StateTransition {
            context: context.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn validation(context: impl Into<RUMString>) -> Self {
        GatewayError::Validation {
            context: context.into(),
        }
    }

    pub fn mapping(context: impl Into<RUMString>) -> Self {
        GatewayError::Mapping {
            context: context.into(),
        }
    }

    pub fn storage(context: impl Into<RUMString>) -> Self {
        GatewayError::Storage {
            context: context.into(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Parse {
                context,
                byte_offset,
                segment_index,
            } => write!(
                f,
                "parse-error at byte {} (segment {}): {}",
                byte_offset, segment_index, context
            ),
            GatewayError::Transport {
                context,
                destination,
            } => write!(f, "transport-error to '{}': {}", destination, context),
            GatewayError::StateTransition { context, from, to } => write!(
                f,
                "state-transition-error {} -> {}: {}",
                from, to, context
            ),
            other => write!(f, "{:?}: {}", other.kind(), other.context()),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<RUMString> for GatewayError {
    fn from(context: RUMString) -> Self {
        GatewayError::Other { context }
    }
}

impl From<&str> for GatewayError {
    fn from(context: &str) -> Self {
        GatewayError::Other {
            context: RUMString::from(context),
        }
    }
}

impl From<String> for GatewayError {
    fn from(context: String) -> Self {
        GatewayError::Other {
            context: RUMString::from(context),
        }
    }
}

impl From<GatewayError> for RUMString {
    fn from(err: GatewayError) -> Self {
        format_compact!("{}", err)
    }
}

pub fn is_unique<T: std::cmp::Eq + std::hash::Hash>(data: &Vec<T>) -> bool {
    let mut keys = ahash::AHashSet::with_capacity(data.len());
    for itm in data {
        if !keys.insert(itm) {
            return false;
        }
    }
    true
}

///
/// Take a requested index and the maximum size of the item container.
/// Check if the index is valid and return an error if it is.
/// The purpose of this function is to enable handling of out of bounds without triggering a panic.
/// Also, add negative indices like Python does when doing a reverse search!
///
/// * If the index is 0, return Error
/// * If the index is below 0, return the max - index iff max - index > 0
/// * If the index is bigger than the defined max, return Error.
/// * Otherwise, return the given index.
///
/// # Examples
///
/// ## Min
/// ```
/// use ::rumtk_core::core::clamp_index;
/// let max: isize = 5;
/// let i: isize = 1;
/// let result = clamp_index(&i, &max).unwrap();
/// assert_eq!(1, result);
/// ```
///
/// ## Max
/// ```
/// use ::rumtk_core::core::clamp_index;
/// let max: isize = 5;
/// let i: isize = 5;
/// let result = clamp_index(&i, &max).unwrap();
/// assert_eq!(5, result);
/// ```
///
/// ## Valid Negative Index (reverse lookup)
/// ```
/// use ::rumtk_core::core::clamp_index;
/// let max: isize = 5;
/// let i: isize = -1;
/// let result = clamp_index(&i, &max).unwrap();
/// assert_eq!(5, result);
/// ```
#[inline(always)]
pub fn clamp_index(given_indx: &isize, max_size: &isize) -> RUMResult<usize> {
    let neg_max_indx = *max_size * -1;
    if *given_indx == 0 {
        return Err(GatewayError::from(format_compact!(
            "Index {} is invalid! Use 1-indexed values if using positive indices.",
            given_indx
        )));
    }

    if *given_indx >= neg_max_indx && *given_indx < 0 {
        return Ok((max_size + given_indx + 1) as usize);
    }

    if *given_indx > 0 && given_indx <= max_size {
        return Ok(*given_indx as usize);
    }

    Err(GatewayError::from(format_compact!(
        "Index {} is outside {} < x < {} boundary!",
        given_indx,
        neg_max_indx,
        max_size
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_index_rejects_zero() {
        assert!(clamp_index(&0, &5).is_err());
    }

    #[test]
    fn test_clamp_index_negative_reverse() {
        assert_eq!(clamp_index(&-1, &5).unwrap(), 5);
        assert_eq!(clamp_index(&-5, &5).unwrap(), 1);
    }

    #[test]
    fn test_error_kind_roundtrips() {
        let err = GatewayError::state_transition("bad transition", "in-progress", "scheduled");
        assert_eq!(err.kind(), ErrorKind::StateTransition);
        assert!(err.to_string().contains("in-progress"));
    }
}
