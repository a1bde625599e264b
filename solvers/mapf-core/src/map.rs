//! MovingAI-style `.map` format parser.

use thiserror::Error;

/// A single cell in a grid map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    /// Agent can traverse this cell.
    Passable,
    /// Obstacle; agent cannot enter.
    Blocked,
}

/// Errors from parsing a map file.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("missing header field: {0}")]
    MissingHeader(&'static str),

    #[error("invalid header value for {field}: {value}")]
    InvalidHeader { field: &'static str, value: String },

    #[error("dimension mismatch: expected {expected} rows, got {got}")]
    DimensionMismatch { expected: u32, got: u32 },

    #[error("row {row} width mismatch: expected {expected}, got {got}")]
    RowWidthMismatch { row: u32, expected: u32, got: u32 },
}

/// A parsed grid map.
#[derive(Debug, Clone)]
pub struct GridMap {
    width: u32,
    height: u32,
    /// Row-major; index = y * width + x
    tiles: Vec<Tile>,
}

impl GridMap {
    /// Parse a map file's contents.
    ///
    /// Expected format:
    /// ```text
    /// height N
    /// width M
    /// map
    /// <N lines of M characters>
    /// ```
    ///
    /// A leading `type ...` header line (as used by the MovingAI benchmark
    /// suite) is tolerated but not required. `T` and `@` mark obstacles;
    /// every other character is passable. A trailing `\r` is stripped from
    /// each line.
    pub fn parse(input: &str) -> Result<Self, MapError> {
        let mut lines = input.lines();

        let mut height: Option<u32> = None;
        let mut width: Option<u32> = None;

        for line in lines.by_ref() {
            let line = Self::trim_cr(line).trim();
            if line.eq_ignore_ascii_case("map") {
                break;
            }
            if let Some(rest) = line.strip_prefix("height ") {
                height = Some(rest.trim().parse().map_err(|_| MapError::InvalidHeader {
                    field: "height",
                    value: rest.to_string(),
                })?);
            } else if let Some(rest) = line.strip_prefix("width ") {
                width = Some(rest.trim().parse().map_err(|_| MapError::InvalidHeader {
                    field: "width",
                    value: rest.to_string(),
                })?);
            }
            // Any other header line (e.g. `type octile`) is ignored.
        }

        let height = height.ok_or(MapError::MissingHeader("height"))?;
        let width = width.ok_or(MapError::MissingHeader("width"))?;

        let mut tiles = Vec::with_capacity((width * height) as usize);
        let mut row_count: u32 = 0;

        for line in lines {
            if row_count >= height {
                break; // ignore trailing lines
            }
            let line = Self::trim_cr(line);
            let chars: Vec<char> = line.chars().collect();
            if chars.len() != width as usize {
                return Err(MapError::RowWidthMismatch {
                    row: row_count,
                    expected: width,
                    got: chars.len() as u32,
                });
            }
            for ch in chars {
                tiles.push(Self::char_to_tile(ch));
            }
            row_count += 1;
        }

        if row_count < height {
            return Err(MapError::DimensionMismatch {
                expected: height,
                got: row_count,
            });
        }

        Ok(Self { width, height, tiles })
    }

    fn trim_cr(line: &str) -> &str {
        line.strip_suffix('\r').unwrap_or(line)
    }

    fn char_to_tile(ch: char) -> Tile {
        match ch {
            'T' | '@' => Tile::Blocked,
            _ => Tile::Passable,
        }
    }

    /// Width of the map (x dimension).
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the map (y dimension).
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get tile at (x, y). Returns `None` if out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<Tile> {
        if x < self.width && y < self.height {
            Some(self.tiles[(y * self.width + x) as usize])
        } else {
            None
        }
    }

    /// Check if cell (x, y) is passable (returns false for out-of-bounds).
    pub fn is_passable(&self, x: u32, y: u32) -> bool {
        self.get(x, y) == Some(Tile::Passable)
    }
}
