//! The host control-query surface (§6): position/time get/set, capability
//! queries answered locally, and the handful of queries forwarded verbatim
//! to the inner demuxer.

use vsl_core::{PassthroughControl, PassthroughValue};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlQuery {
    GetPosition,
    SetPosition(f64),
    GetTime,
    SetTime(u64),
    GetLength,
    CanPause,
    CanSeek,
    CanControlPace,
    CanControlRate,
    CanFastSeek,
    SetPauseState(bool),
    GetPtsDelay,
    GetContentType,
    GetTitleInfo,
    SetTitle(u32),
    SetSeekpoint(u32),
    SetPrivateIdState(u32, bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Position(f64),
    Time(u64),
    Length(u64),
    Bool(bool),
    PtsDelayUs(u64),
    ContentType(Option<String>),
    Unit,
}

impl ControlQuery {
    /// Queries this layer doesn't answer itself — forwarded verbatim to the
    /// inner demuxer, matching the original `Control()`'s `default:` branch
    /// calling `demux_vaControl` on the segment demuxer.
    pub fn passthrough(&self) -> Option<PassthroughControl> {
        match *self {
            ControlQuery::CanFastSeek => Some(PassthroughControl::CanFastSeek),
            ControlQuery::GetContentType => Some(PassthroughControl::GetContentType),
            ControlQuery::GetTitleInfo => Some(PassthroughControl::GetTitleInfo),
            ControlQuery::SetTitle(title) => Some(PassthroughControl::SetTitle(title)),
            ControlQuery::SetSeekpoint(point) => Some(PassthroughControl::SetSeekpoint(point)),
            ControlQuery::SetPrivateIdState(id, state) => {
                Some(PassthroughControl::SetPrivateIdState(id, state))
            }
            _ => None,
        }
    }
}

impl From<PassthroughValue> for ControlValue {
    fn from(value: PassthroughValue) -> Self {
        match value {
            PassthroughValue::Bool(b) => ControlValue::Bool(b),
            PassthroughValue::ContentType(c) => ControlValue::ContentType(c),
            PassthroughValue::Unit => ControlValue::Unit,
        }
    }
}
