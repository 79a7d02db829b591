// DTW driver: per-subdb codebooks, packed mini-block lengths, and the
// distance search over a consistent WLD/DTW pair.
mod common;

use common::{two_piece_slices, DtwDbBuilder, Oracle, WldDbBuilder, WldFormat};
use damdb::db::Value;
use damdb::engine::movegen::can_jump;
use damdb::engine::{square_bit as sq, Color, Position};
use damdb::indexing::{index_to_position, slice_size, Slice};
use damdb::search::dtw::DtwSearch;
use damdb::search::{MoveDistance, WldSearch};
use damdb::{open_type, DbType, Driver};

fn depth_at(seed: u64, idx: u64) -> u16 {
    let mut x = seed ^ idx.wrapping_mul(0x9e3779b97f4a7c15);
    x ^= x >> 29;
    (x % 200) as u16
}

#[test]
fn depths_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = DtwDbBuilder::new();
    let slices = [
        (Slice::new(1, 0, 1, 0), Color::Black, 3u64),
        (Slice::new(1, 0, 1, 0), Color::White, 4),
        (Slice::new(0, 1, 0, 1), Color::Black, 5),
    ];
    for (s, color, seed) in &slices {
        let depths: Vec<u16> = (0..slice_size(s)).map(|i| depth_at(*seed, i)).collect();
        b.add_values(s, *color, 0, &depths);
    }
    b.write(dir.path(), "db2");

    let driver = open_type(DbType::Dtw, "maxpieces=2", 50, dir.path()).unwrap();
    let Driver::Dtw(dtw) = &driver else {
        panic!("wrong driver family");
    };
    for (s, color, seed) in &slices {
        for idx in 0..slice_size(s) {
            let pos = index_to_position(idx, s);
            assert_eq!(
                dtw.lookup(&pos, *color, false),
                depth_at(*seed, idx) as i32,
                "slice {} {:?} index {}",
                s,
                color,
                idx
            );
        }
    }
}

#[test]
fn absent_slice_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = DtwDbBuilder::new();
    let s = Slice::new(1, 0, 1, 0);
    let depths: Vec<u16> = (0..slice_size(&s)).map(|_| 0).collect();
    b.add_values(&s, Color::Black, 0, &depths);
    b.write(dir.path(), "db2");

    let driver = open_type(DbType::Dtw, "maxpieces=2", 50, dir.path()).unwrap();
    let Driver::Dtw(dtw) = &driver else {
        panic!("wrong driver family");
    };
    let pos = index_to_position(0, &Slice::new(0, 1, 0, 1));
    assert_eq!(dtw.lookup(&pos, Color::Black, false), Value::SubdbUnavailable.to_i32());
}

#[test]
fn search_resolves_immediate_win() {
    let oracle = Oracle::build();

    let wld_dir = tempfile::tempdir().unwrap();
    let mut wb = WldDbBuilder::new(WldFormat::TunV2);
    for s in two_piece_slices() {
        for color in [Color::Black, Color::White] {
            let values: Vec<Value> =
                (0..slice_size(&s)).map(|i| oracle.stored(&s, color, i)).collect();
            wb.add_values(&s, color, &values);
        }
    }
    wb.write(wld_dir.path(), "db2");
    let wld = open_type(DbType::WldTunV2, "maxpieces=2", 100, wld_dir.path()).unwrap();

    // Any DTW data will do: the searched line only probes positions where
    // one side is already bare.
    let dtw_dir = tempfile::tempdir().unwrap();
    let mut db = DtwDbBuilder::new();
    let s = Slice::new(1, 0, 1, 0);
    let depths: Vec<u16> = (0..slice_size(&s)).map(|_| 0).collect();
    db.add_values(&s, Color::Black, 0, &depths);
    db.write(dtw_dir.path(), "db2");
    let dtw_driver = open_type(DbType::Dtw, "maxpieces=2", 50, dtw_dir.path()).unwrap();
    let Driver::Dtw(dtw) = &dtw_driver else {
        panic!("wrong driver family");
    };

    // Black man on 6 jumps the lone white man and wins in one ply.
    let pos = Position::new(sq(6), sq(11), 0);
    assert!(can_jump(&pos, Color::Black));

    let mut wld_search = WldSearch::new(&wld);
    let mut search = DtwSearch::new(&mut wld_search, dtw);
    let mut dists: Vec<MoveDistance> = Vec::new();
    let plies = search.lookup_with_search(&pos, Color::Black, &mut dists);
    assert_eq!(plies, 1);
    assert_eq!(dists.len(), 1);
}
