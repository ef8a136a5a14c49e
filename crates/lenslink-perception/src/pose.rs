//! Line-oriented pose protocol.
//!
//! Each inbound message is UTF-8 text holding zero or more records, one per
//! line (`\n`, `\r` or any mix of both), tokenised on whitespace:
//!
//! ```text
//! T <x> <y> <z>      translation
//! R <rx> <ry> <rz>   rotation, Euler angles in radians
//! ```
//!
//! Parsing is best effort.  Lines with any other leading token, or with
//! fewer than four tokens, are skipped.  Each numeric token is parsed on its
//! own: a token that is not a finite float leaves that single axis unset,
//! and the remaining axes of the record still apply.  When a message holds
//! several records of the same kind, the last one wins axis by axis.
//!
//! # Example
//!
//! ```rust
//! use lenslink_perception::pose::PoseUpdate;
//!
//! let update = PoseUpdate::parse("T abc 1.0 2.0\n");
//! let t = update.translation.unwrap();
//! assert_eq!(t.x, None);
//! assert_eq!(t.y, Some(1.0));
//! assert!(update.rotation_rad.is_none());
//! ```

use tracing::trace;

/// Leading token of a translation record.
pub const TRANSLATION_TAG: &str = "T";
/// Leading token of a rotation record.
pub const ROTATION_TAG: &str = "R";

/// Per-axis values of one record; `None` marks an axis whose token was
/// malformed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

impl AxisUpdate {
    /// Overlay the axes present in `later` onto `self`.
    fn overlay(self, later: Self) -> Self {
        Self {
            x: later.x.or(self.x),
            y: later.y.or(self.y),
            z: later.z.or(self.z),
        }
    }

    /// Fill unset axes from `previous`.
    pub fn resolve(self, previous: [f32; 3]) -> [f32; 3] {
        [
            self.x.unwrap_or(previous[0]),
            self.y.unwrap_or(previous[1]),
            self.z.unwrap_or(previous[2]),
        ]
    }
}

/// The fields one inbound pose message carried.
///
/// A missing record leaves the corresponding field `None`; consumers must
/// leave the matching state untouched rather than resetting it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseUpdate {
    pub translation: Option<AxisUpdate>,
    /// Euler angles in radians.
    pub rotation_rad: Option<AxisUpdate>,
}

impl PoseUpdate {
    /// Parse one message.  Never fails; unrecognised content is dropped.
    pub fn parse(text: &str) -> Self {
        let mut update = Self::default();

        for line in text.split(['\n', '\r']) {
            let mut tokens = line.split_whitespace();
            let Some(tag) = tokens.next() else {
                continue;
            };
            let rest: Vec<&str> = tokens.collect();
            if rest.len() < 3 {
                trace!(line, "pose record too short; skipped");
                continue;
            }
            let axes = AxisUpdate {
                x: parse_axis(rest[0]),
                y: parse_axis(rest[1]),
                z: parse_axis(rest[2]),
            };
            match tag {
                TRANSLATION_TAG => {
                    update.translation =
                        Some(update.translation.unwrap_or_default().overlay(axes));
                }
                ROTATION_TAG => {
                    update.rotation_rad =
                        Some(update.rotation_rad.unwrap_or_default().overlay(axes));
                }
                _ => trace!(tag, "unrecognised pose record; skipped"),
            }
        }

        update
    }

    /// `true` when the message carried no usable record.
    pub fn is_empty(&self) -> bool {
        self.translation.is_none() && self.rotation_rad.is_none()
    }
}

fn parse_axis(token: &str) -> Option<f32> {
    token.parse::<f32>().ok().filter(|v| v.is_finite())
}
