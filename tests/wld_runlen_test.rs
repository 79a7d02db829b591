// Run-length WLD driver against a game-accurate 2-piece database.
mod common;

use common::{two_piece_slices, Oracle, WldDbBuilder, WldFormat};
use damdb::db::Value;
use damdb::engine::movegen::can_jump;
use damdb::engine::{square_bit as sq, Color, Position};
use damdb::indexing::{index_to_position, slice_size, Slice};
use damdb::search::WldSearch;
use damdb::{open_type, DbType, Driver};
use std::path::Path;

fn build_db2(dir: &Path, oracle: &Oracle) {
    let mut b = WldDbBuilder::new(WldFormat::Runlen);
    for s in two_piece_slices() {
        for color in [Color::Black, Color::White] {
            let size = slice_size(&s);
            let values: Vec<Value> = (0..size).map(|i| oracle.stored(&s, color, i)).collect();
            b.add_values(&s, color, &values);
        }
    }
    b.write(dir, "db2");
}

fn check_against_oracle(driver: &Driver, oracle: &Oracle) {
    for s in two_piece_slices() {
        for color in [Color::Black, Color::White] {
            for idx in 0..slice_size(&s) {
                let pos = index_to_position(idx, &s);
                if can_jump(&pos, color) {
                    // Capture positions are don't-care in this format.
                    continue;
                }
                assert_eq!(
                    driver.lookup_wld(&pos, color, false),
                    oracle.value(&pos, color),
                    "slice {} color {:?} index {}",
                    s,
                    color,
                    idx
                );
            }
        }
    }
}

#[test]
fn db2_matches_oracle_autoloaded() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &oracle);
    let driver = open_type(DbType::WldRunlen, "maxpieces=2", 100, dir.path()).unwrap();
    check_against_oracle(&driver, &oracle);
    let stats = driver.get_stats();
    assert!(stats.autoload_hits > 0);
    assert_eq!(stats.lru_cache_loads, 0);
}

#[test]
fn db2_matches_oracle_through_lru() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &oracle);
    let driver = open_type(DbType::WldRunlen, "maxpieces=2;autoload=0", 100, dir.path()).unwrap();
    check_against_oracle(&driver, &oracle);
    let stats = driver.get_stats();
    assert_eq!(stats.autoload_hits, 0);
    assert!(stats.lru_cache_loads > 0);
    assert!(stats.lru_cache_hits > 0);
}

#[test]
fn conditional_lookup_misses_then_hits() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &oracle);
    let driver = open_type(DbType::WldRunlen, "maxpieces=2;autoload=0", 100, dir.path()).unwrap();

    let s = Slice::new(0, 1, 0, 1);
    let pos = index_to_position(7, &s);
    assert_eq!(driver.lookup_wld(&pos, Color::Black, true), Value::NotInCache);
    let value = driver.lookup_wld(&pos, Color::Black, false);
    assert!(value.is_exact() || value == Value::Unknown);
    // The covering block is now resident.
    assert_eq!(driver.lookup_wld(&pos, Color::Black, true), value);
}

#[test]
fn zero_material_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &Oracle::build());
    let driver = open_type(DbType::WldRunlen, "maxpieces=2", 100, dir.path()).unwrap();

    let p = Position::new(0, sq(1) | sq(2), 0);
    assert_eq!(driver.lookup_wld(&p, Color::Black, false), Value::Loss);
    assert_eq!(driver.lookup_wld(&p, Color::White, false), Value::Win);
    let p = Position::new(sq(30), 0, 0);
    assert_eq!(driver.lookup_wld(&p, Color::Black, false), Value::Win);
}

#[test]
fn piece_count_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &Oracle::build());
    let driver = open_type(DbType::WldRunlen, "maxpieces=2", 100, dir.path()).unwrap();

    // Six black men against one white man exceeds one side's limit.
    let black = sq(6) | sq(7) | sq(8) | sq(12) | sq(13) | sq(14);
    let p = Position::new(black, sq(30), 0);
    assert_eq!(driver.lookup_wld(&p, Color::Black, false), Value::SubdbUnavailable);
}

#[test]
fn reversal_symmetry() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &oracle);
    let driver = open_type(DbType::WldRunlen, "maxpieces=2", 100, dir.path()).unwrap();

    let s = Slice::new(1, 0, 0, 1);
    for idx in (0..slice_size(&s)).step_by(17) {
        let pos = index_to_position(idx, &s);
        if can_jump(&pos, Color::Black) || can_jump(&pos, Color::White) {
            continue;
        }
        let rev = pos.reverse();
        assert_eq!(
            driver.lookup_wld(&pos, Color::Black, false),
            driver.lookup_wld(&rev, Color::White, false),
        );
        assert_eq!(
            driver.lookup_wld(&pos, Color::White, false),
            driver.lookup_wld(&rev, Color::Black, false),
        );
    }
}

#[test]
fn search_resolves_capture_positions() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &oracle);
    let driver = open_type(DbType::WldRunlen, "maxpieces=2", 100, dir.path()).unwrap();

    let mut search = WldSearch::new(&driver);
    let mut tested = 0;
    for s in two_piece_slices() {
        for color in [Color::Black, Color::White] {
            for idx in (0..slice_size(&s)).step_by(11) {
                let pos = index_to_position(idx, &s);
                if !can_jump(&pos, color) {
                    continue;
                }
                let value = search.lookup_with_search(&pos, color, false);
                assert_eq!(value, oracle.value(&pos, color), "capture at {} {:?}", s, color);
                tested += 1;
            }
        }
    }
    assert!(tested > 50, "expected plenty of capture positions");
}

#[test]
fn self_verify_agrees_or_gives_up() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &oracle);
    let driver = open_type(DbType::WldRunlen, "maxpieces=2", 100, dir.path()).unwrap();

    let mut search = WldSearch::new(&driver);
    let s = Slice::new(0, 1, 1, 0);
    for idx in (0..slice_size(&s)).step_by(23) {
        let pos = index_to_position(idx, &s);
        for color in [Color::Black, Color::White] {
            if can_jump(&pos, color) {
                continue;
            }
            let stored = driver.lookup_wld(&pos, color, false);
            if !stored.is_exact() {
                continue;
            }
            let searched = search.lookup_with_search(&pos, color, true);
            assert!(
                searched == stored || searched == Value::Unknown,
                "self-verify disagreed: stored {:?}, searched {:?}",
                stored,
                searched
            );
        }
    }
}

#[test]
fn concurrent_lookups() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    build_db2(dir.path(), &oracle);
    let driver = open_type(DbType::WldRunlen, "maxpieces=2;autoload=0", 100, dir.path()).unwrap();

    let s = Slice::new(1, 0, 1, 0);
    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let driver = &driver;
            let oracle = &oracle;
            scope.spawn(move || {
                for idx in (t..slice_size(&s)).step_by(4) {
                    let pos = index_to_position(idx, &s);
                    if can_jump(&pos, Color::Black) {
                        continue;
                    }
                    assert_eq!(
                        driver.lookup_wld(&pos, Color::Black, false),
                        oracle.value(&pos, Color::Black)
                    );
                }
            });
        }
    });
}

#[test]
fn single_value_subdb() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = WldDbBuilder::new(WldFormat::Runlen);
    let kings = Slice::new(0, 1, 0, 1);
    b.add_single(&kings, Color::Black, '=');
    let men = Slice::new(1, 0, 1, 0);
    let draws = vec![Value::Draw; slice_size(&men) as usize];
    b.add_values(&men, Color::Black, &draws);
    b.write(dir.path(), "db2");

    let driver = open_type(DbType::WldRunlen, "maxpieces=2", 100, dir.path()).unwrap();
    let pos = index_to_position(100, &kings);
    assert_eq!(driver.lookup_wld(&pos, Color::Black, false), Value::Draw);
    // The other side to move was never catalogued.
    assert_eq!(driver.lookup_wld(&pos, Color::White, false), Value::Unknown);
}
