//! # Database Identification
//!
//! Databases are distinguished by the CRC-32 of a canonical index file,
//! not by filename alone: several formats reuse the same `.idx` names, and
//! some slices were re-generated over the years with new checksums.  The
//! find table lists, for each published database, the newest index file
//! and its checksum; identification probes from the largest piece count
//! down and returns the first match.
//!
//! The same checksum tables back `verify`.

use super::{DbType, OpenError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

struct FindInfo {
    db_type: DbType,
    name: &'static str,
    pieces: u32,
    crc: u32,
}

/// Newest entries first within a piece count; a zero CRC matches any file
/// content (used for formats identified by name only).
static FIND_TABLE: &[FindInfo] = &[
    FindInfo { db_type: DbType::WldTunV2, name: "db9-5040.idx1", pieces: 9, crc: 0xef847fc5 },
    FindInfo { db_type: DbType::WldTunV1, name: "db9-5040.idx", pieces: 9, crc: 0x1f866ec6 },
    FindInfo { db_type: DbType::WldRunlen, name: "db9-5040.idx", pieces: 9, crc: 0xa6c3208e },
    FindInfo { db_type: DbType::WldRunlen, name: "db9-5040.idx", pieces: 9, crc: 0xa473f0eb },
    FindInfo { db_type: DbType::WldTunV2, name: "db8-4040.idx1", pieces: 8, crc: 0x40993827 },
    FindInfo { db_type: DbType::WldTunV1, name: "db8-4040.idx", pieces: 8, crc: 0x97ed951e },
    FindInfo { db_type: DbType::WldTunV1, name: "db8-4040.idx", pieces: 8, crc: 0xad6ccff2 },
    FindInfo { db_type: DbType::WldRunlen, name: "db8-4040.idx", pieces: 8, crc: 0x9a9df5bc },
    FindInfo { db_type: DbType::MtcRunlen, name: "db8-0503.idx_mtc", pieces: 8, crc: 0x7493956f },
    FindInfo { db_type: DbType::WldTunV2, name: "db7-4030.idx1", pieces: 7, crc: 0x713fa989 },
    FindInfo { db_type: DbType::WldTunV1, name: "db7-4030.idx", pieces: 7, crc: 0xa1067e2b },
    FindInfo { db_type: DbType::WldRunlen, name: "db7-4030.idx", pieces: 7, crc: 0x68913d08 },
    FindInfo { db_type: DbType::MtcRunlen, name: "db7-0412.idx_mtc", pieces: 7, crc: 0xb4c92c3e },
    FindInfo { db_type: DbType::Dtw, name: "db7-4030.idx_dtw", pieces: 7, crc: 0 },
    FindInfo { db_type: DbType::WldTunV2, name: "db6-3030.idx1", pieces: 6, crc: 0xc07467f2 },
    FindInfo { db_type: DbType::WldTunV1, name: "db6-3030.idx", pieces: 6, crc: 0xf3693c6c },
    FindInfo { db_type: DbType::WldRunlen, name: "db6-3030.idx", pieces: 6, crc: 0xd661d188 },
    FindInfo { db_type: DbType::MtcRunlen, name: "db6-0312.idx_mtc", pieces: 6, crc: 0xd764c8ec },
    FindInfo { db_type: DbType::WldRunlen, name: "db6-3030.idx", pieces: 6, crc: 0x947dff31 },
    FindInfo { db_type: DbType::Dtw, name: "db6-3030.idx_dtw", pieces: 6, crc: 0 },
    FindInfo { db_type: DbType::WldTunV2, name: "db5.idx1", pieces: 5, crc: 0xc5912d8f },
    FindInfo { db_type: DbType::WldTunV1, name: "db5-3020.idx", pieces: 5, crc: 0xc008c727 },
    FindInfo { db_type: DbType::WldRunlen, name: "db5-3020.idx", pieces: 5, crc: 0xeee459ed },
    FindInfo { db_type: DbType::MtcRunlen, name: "db5-0311.idx_mtc", pieces: 5, crc: 0x582faed7 },
    FindInfo { db_type: DbType::Dtw, name: "db5.idx_dtw", pieces: 5, crc: 0 },
    FindInfo { db_type: DbType::WldTunV2, name: "db4.idx1", pieces: 4, crc: 0xc3a84295 },
    FindInfo { db_type: DbType::WldTunV1, name: "db4.idx", pieces: 4, crc: 0x66389130 },
    FindInfo { db_type: DbType::WldRunlen, name: "db4.idx", pieces: 4, crc: 0xc5f47d67 },
    FindInfo { db_type: DbType::MtcRunlen, name: "db4.idx_mtc", pieces: 4, crc: 0x2d675cd2 },
    FindInfo { db_type: DbType::Dtw, name: "db4.idx_dtw", pieces: 4, crc: 0 },
    FindInfo { db_type: DbType::WldTunV2, name: "db3.idx1", pieces: 3, crc: 0x8e96b77d },
    FindInfo { db_type: DbType::WldTunV1, name: "db3.idx", pieces: 3, crc: 0x85aade3a },
    FindInfo { db_type: DbType::WldRunlen, name: "db3.idx", pieces: 3, crc: 0x82f1a44e },
    FindInfo { db_type: DbType::MtcRunlen, name: "db3.idx_mtc", pieces: 3, crc: 0x2aebac80 },
    FindInfo { db_type: DbType::Dtw, name: "db3.idx_dtw", pieces: 3, crc: 0 },
    FindInfo { db_type: DbType::WldTunV2, name: "db2.idx1", pieces: 2, crc: 0x07a9f0f3 },
    FindInfo { db_type: DbType::WldTunV1, name: "db2.idx", pieces: 2, crc: 0x1b731f71 },
    FindInfo { db_type: DbType::WldRunlen, name: "db2.idx", pieces: 2, crc: 0xa833eebf },
    FindInfo { db_type: DbType::Dtw, name: "db2.idx_dtw", pieces: 2, crc: 0 },
];

/// Identify the database in `dir`: its format and maximum piece count.
pub fn identify(dir: &Path) -> Result<(DbType, u32), OpenError> {
    if !dir.is_dir() {
        return Err(OpenError::OpenFailed(dir.to_path_buf()));
    }
    for pieces in (2..=9u32).rev() {
        for info in FIND_TABLE.iter().filter(|i| i.pieces == pieces) {
            let path = dir.join(info.name);
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            if info.crc == 0 || crc::crc32::checksum_ieee(&bytes) == info.crc {
                return Ok((info.db_type, info.pieces));
            }
        }
    }
    Err(OpenError::Unidentified(dir.to_path_buf()))
}

/// Per-format verify manifests: file name to expected CRC-32.  Files that
/// do not appear here are skipped by `verify`.
pub(crate) fn file_crc_table(db_type: DbType) -> &'static HashMap<&'static str, u32> {
    static V1: OnceLock<HashMap<&'static str, u32>> = OnceLock::new();
    static V2: OnceLock<HashMap<&'static str, u32>> = OnceLock::new();
    static RUNLEN: OnceLock<HashMap<&'static str, u32>> = OnceLock::new();
    static EMPTY: OnceLock<HashMap<&'static str, u32>> = OnceLock::new();

    match db_type {
        DbType::WldTunV1 => V1.get_or_init(|| {
            HashMap::from([
                ("db2.cpr", 0xc8d8bd1bu32),
                ("db2.idx", 0x1b731f71),
                ("db3.cpr", 0xa851b439),
                ("db3.idx", 0x85aade3a),
                ("db4.cpr", 0x72a76eab),
                ("db4.idx", 0x66389130),
                ("db5-0302.cpr", 0x7c4320c3),
                ("db5-0302.idx", 0x1dc7d0dd),
                ("db5-0311.cpr", 0xcbc9771e),
                ("db5-0311.idx", 0x1cbecb4f),
                ("db5-0320.cpr", 0x459d077d),
                ("db5-0320.idx", 0xcd1c0ac4),
                ("db5-0401.cpr", 0xcbc5d458),
                ("db5-0401.idx", 0xcfb8c3d6),
                ("db5-0410.cpr", 0x78dccccb),
                ("db5-0410.idx", 0x3c24e626),
                ("db5-1202.cpr", 0x64634caa),
                ("db5-1202.idx", 0xadc595ab),
                ("db5-1211.cpr", 0x4986d7e0),
                ("db5-1211.idx", 0xc8366e17),
                ("db5-1220.cpr", 0x75a7805a),
                ("db5-1220.idx", 0x0233b28e),
                ("db5-1301.cpr", 0x30ece849),
                ("db5-1301.idx", 0x6922ee27),
                ("db5-1310.cpr", 0xd79080d3),
                ("db5-1310.idx", 0xfb1e3bd6),
                ("db5-2102.cpr", 0xb275501a),
                ("db5-2102.idx", 0x488da6a5),
                ("db5-2111.cpr", 0xb42a2adc),
                ("db5-2111.idx", 0xc2821c39),
                ("db5-2120.cpr", 0xebca7abf),
                ("db5-2120.idx", 0xae73b105),
                ("db5-2201.cpr", 0xad304e52),
                ("db5-2201.idx", 0x1f2cfc55),
                ("db5-2210.cpr", 0x83a01c75),
                ("db5-2210.idx", 0x738f8f3d),
                ("db5-3002.cpr", 0xd935e924),
                ("db5-3002.idx", 0xe1b95b9b),
                ("db5-3011.cpr", 0x5aa94fe0),
                ("db5-3011.idx", 0xa4230c3e),
                ("db5-3020.cpr", 0x67aadf7f),
                ("db5-3020.idx", 0xc008c727),
                ("db5-3101.cpr", 0x6fc7920c),
                ("db5-3101.idx", 0xa22adee0),
                ("db5-3110.cpr", 0x930c0b16),
                ("db5-3110.idx", 0x10b7e8c6),
                ("db5-4001.cpr", 0x8bbc15c2),
                ("db5-4001.idx", 0x8d65f3f8),
                ("db5-4010.cpr", 0xc80cd147),
                ("db5-4010.idx", 0xb64c312f),
                ("db6-3030.cpr", 0x3ebcc072),
                ("db6-3030.idx", 0xf3693c6c),
                ("db7-4030.cpr", 0x105a6319),
                ("db7-4030.idx", 0xa1067e2b),
                ("db8-4040.cpr", 0x649c774d),
                ("db8-4040.idx", 0x97ed951e),
                ("db9-5040.cpr", 0x83e06934),
                ("db9-5040.idx", 0x1f866ec6),
            ])
        }),
        DbType::WldTunV2 => V2.get_or_init(|| {
            HashMap::from([
                ("db2.cpr1", 0x0319ba8cu32),
                ("db2.idx1", 0x07a9f0f3),
                ("db3.cpr1", 0x098b476b),
                ("db3.idx1", 0x8e96b77d),
                ("db4.cpr1", 0x08b0249a),
                ("db4.idx1", 0xc3a84295),
                ("db5.cpr1", 0x3cda0517),
                ("db5.idx1", 0xc5912d8f),
                ("db6-0303.cpr1", 0x0857bd2e),
                ("db6-0303.idx1", 0x66a77b5e),
                ("db6-0312.cpr1", 0x4a7f099c),
                ("db6-0312.idx1", 0x2a6a803a),
                ("db6-0321.cpr1", 0x4a75f62a),
                ("db6-0321.idx1", 0xff3099f2),
                ("db6-0330.cpr1", 0x6d77cb4e),
                ("db6-0330.idx1", 0x17e6a321),
                ("db6-0402.cpr1", 0x7b9fdcbb),
                ("db6-0402.idx1", 0xc35bb8dd),
                ("db6-0411.cpr1", 0xaec0e214),
                ("db6-0411.idx1", 0x0901c9f3),
                ("db6-0420.cpr1", 0xfe951e16),
                ("db6-0420.idx1", 0x34d576d2),
                ("db6-0501.cpr1", 0xedbe6c56),
                ("db6-0501.idx1", 0xa13a3c37),
                ("db6-0510.cpr1", 0xadb50394),
                ("db6-0510.idx1", 0x4e29b458),
                ("db6-1212.cpr1", 0x5167eef6),
                ("db6-1212.idx1", 0x7e75ccbf),
                ("db6-1221.cpr1", 0x1f74f152),
                ("db6-1221.idx1", 0x3eb4b297),
                ("db6-1230.cpr1", 0xc3a0f6af),
                ("db6-1230.idx1", 0xe2b14f1c),
                ("db6-1302.cpr1", 0xe35159b9),
                ("db6-1302.idx1", 0x007d2e9a),
                ("db6-1311.cpr1", 0x11905cee),
                ("db6-1311.idx1", 0x2d9a34b4),
                ("db6-1320.cpr1", 0xf0a72015),
                ("db6-1320.idx1", 0x0491fc2d),
                ("db6-1401.cpr1", 0x09f88b44),
                ("db6-1401.idx1", 0x412ec755),
                ("db6-1410.cpr1", 0x3d6936d6),
                ("db6-1410.idx1", 0xbb08a038),
                ("db6-2121.cpr1", 0xf146e765),
                ("db6-2121.idx1", 0x684a1d48),
                ("db6-2130.cpr1", 0xb3eb7f42),
                ("db6-2130.idx1", 0x14d7317a),
                ("db6-2202.cpr1", 0x694cac31),
                ("db6-2202.idx1", 0xc9283792),
                ("db6-2211.cpr1", 0x1ad66915),
                ("db6-2211.idx1", 0x0c4de703),
                ("db6-2220.cpr1", 0xeb9ebd8f),
                ("db6-2220.idx1", 0xb1d6290c),
                ("db6-2301.cpr1", 0x5306ff65),
                ("db6-2301.idx1", 0x00d6ab62),
                ("db6-2310.cpr1", 0x448164de),
                ("db6-2310.idx1", 0xf0ccc1d5),
                ("db6-3030.cpr1", 0x5f3edd36),
                ("db6-3030.idx1", 0xc07467f2),
                ("db6-3102.cpr1", 0x82a1136a),
                ("db6-3102.idx1", 0xb4a44365),
                ("db6-3111.cpr1", 0x983163ba),
                ("db6-3111.idx1", 0x00382c88),
                ("db6-3120.cpr1", 0x01fe8f1f),
                ("db6-3120.idx1", 0x4685b1ea),
                ("db6-3201.cpr1", 0x50fef962),
                ("db6-3201.idx1", 0x5986a829),
                ("db6-3210.cpr1", 0x5a67ceeb),
                ("db6-3210.idx1", 0xe9099a66),
                ("db6-4002.cpr1", 0x8b84d19f),
                ("db6-4002.idx1", 0x3966bbcb),
                ("db6-4011.cpr1", 0x9d26720f),
                ("db6-4011.idx1", 0xc411faa6),
                ("db6-4020.cpr1", 0xd990979e),
                ("db6-4020.idx1", 0xfd0dc2b0),
                ("db6-4101.cpr1", 0x393fadf8),
                ("db6-4101.idx1", 0xa73e5449),
                ("db6-4110.cpr1", 0xdc0dc90a),
                ("db6-4110.idx1", 0x34b8cf3d),
                ("db6-5001.cpr1", 0x70de9ad7),
                ("db6-5001.idx1", 0x606b81c8),
                ("db6-5010.cpr1", 0x81f0431e),
                ("db6-5010.idx1", 0xd3903db1),
                ("db7-4030.cpr1", 0x09c4ad17),
                ("db7-4030.idx1", 0x713fa989),
                ("db8-4040.cpr1", 0x43c27c60),
                ("db8-4040.idx1", 0x40993827),
                ("db9-5040.cpr1", 0xa1391053),
                ("db9-5040.idx1", 0xef847fc5),
            ])
        }),
        DbType::WldRunlen | DbType::WldHuffman => RUNLEN.get_or_init(|| {
            HashMap::from([
                ("db2.idx", 0xa833eebfu32),
                ("db3.idx", 0x82f1a44e),
                ("db4.idx", 0xc5f47d67),
                ("db5-0302.idx", 0xedd66a70),
                ("db5-3020.idx", 0xeee459ed),
            ])
        }),
        DbType::MtcRunlen | DbType::Dtw => EMPTY.get_or_init(HashMap::new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_directory_is_unidentified() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(identify(dir.path()), Err(OpenError::Unidentified(_))));
    }

    #[test]
    fn zero_crc_matches_any_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db4.idx_dtw"), b"anything").unwrap();
        let (t, pieces) = identify(dir.path()).unwrap();
        assert_eq!(t, DbType::Dtw);
        assert_eq!(pieces, 4);
    }

    #[test]
    fn crc_gate_rejects_wrong_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db2.idx1"), b"not the real file").unwrap();
        assert!(identify(dir.path()).is_err());
    }
}
