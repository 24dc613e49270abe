//! X-MAC crate prelude
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub use crate::{Address, NodeId, Ts};

pub use crate::error::{ConfigError, MacError, PayloadError};
pub use crate::frame::{Frame, FrameKind, Payload};
pub use crate::phy::{Phy, RadioEvent, RadioState};
pub use crate::timer::{MacTimer, Timer};

pub use crate::mac::{Mac, Notification, Upper, XMac, MacStats, Config as XmacConfig};
pub use crate::mac::{SendReport, XmacState};
pub use crate::mac::{Aligned, Fixed, RandomStart, Schedule};
