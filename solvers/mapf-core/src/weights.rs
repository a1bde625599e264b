//! Directed 4-channel edge-weight format: the companion file to a [`crate::GridMap`].
//!
//! Channel order is fixed: `0 = +y, 1 = -x, 2 = -y, 3 = +x`. A negative weight
//! in the text form means "impassable in that direction" and is stored as
//! [`MAX_WEIGHT`].

use thiserror::Error;

/// Sentinel for "impassable" — `i32::MAX / 2` represented as `f32`, matching
/// the reference implementation's integer sentinel widened to float.
pub const MAX_WEIGHT: f32 = (i32::MAX / 2) as f32;

/// Number of directed edge channels per cell (one per cardinal direction).
pub const CHANNELS: u32 = 4;

/// Errors from parsing a weights file.
#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("missing header field: {0}")]
    MissingHeader(&'static str),

    #[error("invalid header value for {field}: {value}")]
    InvalidHeader { field: &'static str, value: String },

    #[error("unsupported channel count {got}; only {CHANNELS} is supported")]
    UnsupportedChannels { got: u32 },

    #[error("dimension mismatch: header declares {header_width}x{header_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        header_width: u32,
        header_height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("malformed entry on line {line}: {reason}")]
    MalformedEntry { line: usize, reason: String },
}

/// A parsed `x y w0 w1 w2 w3` weights table, flattened row-major with
/// `CHANNELS` floats per cell.
#[derive(Debug, Clone)]
pub struct WeightsTable {
    width: u32,
    height: u32,
    weights: Vec<f32>,
}

impl WeightsTable {
    /// Parse weights text, checking that its declared dimensions match the
    /// map it is meant to accompany.
    pub fn parse(input: &str, expected_width: u32, expected_height: u32) -> Result<Self, WeightsError> {
        let mut lines = input.lines().enumerate();

        let mut height: Option<u32> = None;
        let mut width: Option<u32> = None;
        let mut channels: Option<u32> = None;

        for (_, line) in lines.by_ref() {
            let line = Self::trim_cr(line).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("height ") {
                height = Some(rest.trim().parse().map_err(|_| WeightsError::InvalidHeader {
                    field: "height",
                    value: rest.to_string(),
                })?);
            } else if let Some(rest) = line.strip_prefix("width ") {
                width = Some(rest.trim().parse().map_err(|_| WeightsError::InvalidHeader {
                    field: "width",
                    value: rest.to_string(),
                })?);
            } else if let Some(rest) = line.strip_prefix("channels ") {
                let c: u32 = rest.trim().parse().map_err(|_| WeightsError::InvalidHeader {
                    field: "channels",
                    value: rest.to_string(),
                })?;
                channels = Some(c);
                break;
            }
        }

        let height = height.ok_or(WeightsError::MissingHeader("height"))?;
        let width = width.ok_or(WeightsError::MissingHeader("width"))?;
        let channels = channels.ok_or(WeightsError::MissingHeader("channels"))?;
        if channels != CHANNELS {
            return Err(WeightsError::UnsupportedChannels { got: channels });
        }
        if width != expected_width || height != expected_height {
            return Err(WeightsError::DimensionMismatch {
                header_width: width,
                header_height: height,
                expected_width,
                expected_height,
            });
        }

        let mut weights = vec![MAX_WEIGHT; (width * height * channels) as usize];
        let cell = |x: u32, y: u32, ch: u32| ((y * width + x) * channels + ch) as usize;

        for (line_no, line) in lines {
            let line = Self::trim_cr(line).trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != (2 + channels) as usize {
                return Err(WeightsError::MalformedEntry {
                    line: line_no + 1,
                    reason: format!("expected {} columns, got {}", 2 + channels, parts.len()),
                });
            }
            let x: u32 = parts[0].parse().map_err(|_| WeightsError::MalformedEntry {
                line: line_no + 1,
                reason: format!("invalid x: {}", parts[0]),
            })?;
            let y: u32 = parts[1].parse().map_err(|_| WeightsError::MalformedEntry {
                line: line_no + 1,
                reason: format!("invalid y: {}", parts[1]),
            })?;
            if x >= width || y >= height {
                return Err(WeightsError::MalformedEntry {
                    line: line_no + 1,
                    reason: format!("cell ({x},{y}) out of bounds"),
                });
            }
            for ch in 0..channels {
                let raw: f32 = parts[(2 + ch) as usize]
                    .parse()
                    .map_err(|_| WeightsError::MalformedEntry {
                        line: line_no + 1,
                        reason: format!("invalid weight: {}", parts[(2 + ch) as usize]),
                    })?;
                weights[cell(x, y, ch)] = if raw < 0.0 { MAX_WEIGHT } else { raw };
            }
        }

        Ok(Self { width, height, weights })
    }

    /// Build a table directly from a flat, already-validated weight array.
    pub fn from_flat(width: u32, height: u32, weights: Vec<f32>) -> Self {
        debug_assert_eq!(weights.len(), (width * height * CHANNELS) as usize);
        Self { width, height, weights }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Outgoing weight of cell `(x, y)` in channel `ch`.
    pub fn get(&self, x: u32, y: u32, ch: u32) -> f32 {
        self.weights[((y * self.width + x) * CHANNELS + ch) as usize]
    }

    /// Render back to the `height`/`width`/`channels`/rows text format,
    /// substituting `-1` for impassable channels. Only rows for the cells the
    /// caller marks present are written, matching the reference writer's
    /// "skip obstacle cells" behavior.
    pub fn to_text<F: Fn(u32, u32) -> bool>(&self, cell_exists: F) -> String {
        let mut out = String::new();
        out.push_str(&format!("height {}\n", self.height));
        out.push_str(&format!("width {}\n", self.width));
        out.push_str(&format!("channels {}\n", CHANNELS));
        for y in 0..self.height {
            for x in 0..self.width {
                if !cell_exists(x, y) {
                    continue;
                }
                out.push_str(&format!("{x} {y}"));
                for ch in 0..CHANNELS {
                    let w = self.get(x, y, ch);
                    if w >= MAX_WEIGHT {
                        out.push_str(" -1");
                    } else {
                        out.push_str(&format!(" {w}"));
                    }
                }
                out.push('\n');
            }
        }
        out
    }

    fn trim_cr(line: &str) -> &str {
        line.strip_suffix('\r').unwrap_or(line)
    }
}
