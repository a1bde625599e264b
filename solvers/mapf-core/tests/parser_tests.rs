//! Tests for map and edge-weight text parsing.

use mapf_core::{GridMap, MapError, Tile, WeightsError, WeightsTable, MAX_WEIGHT};
use pretty_assertions::assert_eq;

// ─────────────────────────────────────────────────────────────────────────────
// GridMap tests
// ─────────────────────────────────────────────────────────────────────────────

const EMPTY_8X8_MAP: &str = r#"type octile
height 8
width 8
map
........
........
........
........
........
........
........
........
"#;

const MAZE_SNIPPET: &str = r#"height 4
width 6
map
@@@@@@
@....@
@.@@.@
@@@@@@
"#;

#[test]
fn parse_empty_8x8_map() {
    let map = GridMap::parse(EMPTY_8X8_MAP).expect("parse failed");
    assert_eq!(map.width(), 8);
    assert_eq!(map.height(), 8);
    for y in 0..8 {
        for x in 0..8 {
            assert_eq!(map.get(x, y), Some(Tile::Passable), "({x},{y}) should be passable");
        }
    }
}

#[test]
fn parse_maze_with_walls() {
    let map = GridMap::parse(MAZE_SNIPPET).expect("parse failed");
    assert_eq!(map.width(), 6);
    assert_eq!(map.height(), 4);
    assert_eq!(map.get(0, 0), Some(Tile::Blocked));
    assert_eq!(map.get(5, 0), Some(Tile::Blocked));
    assert_eq!(map.get(1, 1), Some(Tile::Passable));
    assert_eq!(map.get(2, 1), Some(Tile::Passable));
    assert_eq!(map.get(2, 2), Some(Tile::Blocked));
}

#[test]
fn only_t_and_at_are_obstacles() {
    let input = "height 1\nwidth 5\nmap\nT@GSx\n";
    let map = GridMap::parse(input).unwrap();
    assert_eq!(map.get(0, 0), Some(Tile::Blocked)); // T
    assert_eq!(map.get(1, 0), Some(Tile::Blocked)); // @
    assert_eq!(map.get(2, 0), Some(Tile::Passable)); // G is passable per spec
    assert_eq!(map.get(3, 0), Some(Tile::Passable)); // S is passable per spec
    assert_eq!(map.get(4, 0), Some(Tile::Passable)); // anything else passable
}

#[test]
fn map_get_out_of_bounds() {
    let map = GridMap::parse(MAZE_SNIPPET).unwrap();
    assert_eq!(map.get(100, 100), None);
}

#[test]
fn map_is_passable() {
    let map = GridMap::parse(MAZE_SNIPPET).unwrap();
    assert!(map.is_passable(1, 1));
    assert!(!map.is_passable(0, 0));
    assert!(!map.is_passable(100, 100)); // out of bounds = not passable
}

#[test]
fn map_parse_missing_header() {
    let bad = "map\n....";
    let err = GridMap::parse(bad).unwrap_err();
    assert!(matches!(err, MapError::MissingHeader(_)));
}

#[test]
fn map_parse_dimension_mismatch() {
    let bad = r#"height 2
width 4
map
....
"#;
    let err = GridMap::parse(bad).unwrap_err();
    assert!(matches!(err, MapError::DimensionMismatch { .. }));
}

#[test]
fn map_parse_row_width_mismatch() {
    let bad = "height 2\nwidth 4\nmap\n...\n....\n";
    let err = GridMap::parse(bad).unwrap_err();
    assert!(matches!(err, MapError::RowWidthMismatch { .. }));
}

#[test]
fn map_tolerates_trailing_cr() {
    let input = "height 1\r\nwidth 3\r\nmap\r\n.@.\r\n";
    let map = GridMap::parse(input).unwrap();
    assert_eq!(map.width(), 3);
    assert_eq!(map.get(1, 0), Some(Tile::Blocked));
}

// ─────────────────────────────────────────────────────────────────────────────
// WeightsTable tests
// ─────────────────────────────────────────────────────────────────────────────

const SIMPLE_WEIGHTS: &str = r#"height 2
width 2
channels 4
0 0 1.0 -1 -1 2.5
1 0 1.0 1.0 -1 -1
0 1 -1 -1 1.0 1.0
1 1 -1 1.0 1.0 -1
"#;

#[test]
fn parse_simple_weights() {
    let table = WeightsTable::parse(SIMPLE_WEIGHTS, 2, 2).expect("parse failed");
    assert_eq!(table.width(), 2);
    assert_eq!(table.height(), 2);
    assert_eq!(table.get(0, 0, 0), 1.0);
    assert_eq!(table.get(0, 0, 1), MAX_WEIGHT); // negative -> impassable
    assert_eq!(table.get(0, 0, 3), 2.5);
}

#[test]
fn weights_dimension_mismatch_is_rejected() {
    let err = WeightsTable::parse(SIMPLE_WEIGHTS, 3, 3).unwrap_err();
    assert!(matches!(err, WeightsError::DimensionMismatch { .. }));
}

#[test]
fn weights_rejects_non_four_channels() {
    let bad = "height 1\nwidth 1\nchannels 3\n0 0 1.0 1.0 1.0\n";
    let err = WeightsTable::parse(bad, 1, 1).unwrap_err();
    assert!(matches!(err, WeightsError::UnsupportedChannels { got: 3 }));
}

#[test]
fn weights_malformed_entry_is_rejected() {
    let bad = "height 1\nwidth 1\nchannels 4\n0 0 1.0 1.0\n";
    let err = WeightsTable::parse(bad, 1, 1).unwrap_err();
    assert!(matches!(err, WeightsError::MalformedEntry { .. }));
}

#[test]
fn weights_roundtrip_through_text() {
    let table = WeightsTable::parse(SIMPLE_WEIGHTS, 2, 2).unwrap();
    let text = table.to_text(|_, _| true);
    let reparsed = WeightsTable::parse(&text, 2, 2).unwrap();
    for y in 0..2 {
        for x in 0..2 {
            for ch in 0..4 {
                assert_eq!(table.get(x, y, ch), reparsed.get(x, y, ch));
            }
        }
    }
}
