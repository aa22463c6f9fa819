//! Schema fingerprint: an order-independent FNV-1a-32 hash over the
//! index layout, stored in SQLite `user_version`. Equality with the
//! stored value is the sole signal that the index layout is current.

use crate::config::{SqlColumn, SqlIndex};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

struct Fnv32(u32);

impl Fnv32 {
    fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u32::from(b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn write_u8(&mut self, b: u8) {
        self.write(&[b]);
    }
}

/// Fingerprint the full index layout: table name, every column
/// (sorted by name), every index (sorted by canonical form).
///
/// Invariant under permutation of declarations; changes under any
/// semantic change (rename, type, not-null flip, pk flip, index
/// add/remove, unique flip).
pub fn schema_fingerprint(table: &str, columns: &[SqlColumn], indexes: &[SqlIndex]) -> u32 {
    let mut h = Fnv32::new();
    h.write(table.as_bytes());
    h.write_u8(0);

    let mut cols: Vec<&SqlColumn> = columns.iter().collect();
    cols.sort_by(|a, b| a.name.cmp(&b.name));
    for c in cols {
        h.write(c.name.as_bytes());
        h.write_u8(0);
        h.write_u8(c.ty.tag());
        h.write_u8(u8::from(c.not_null));
        h.write_u8(u8::from(c.primary_key));
    }

    let mut idxs: Vec<(String, bool)> = indexes
        .iter()
        .map(|i| (i.canonical(), i.unique))
        .collect();
    idxs.sort();
    for (canonical, unique) in idxs {
        h.write(canonical.as_bytes());
        h.write_u8(0);
        h.write_u8(u8::from(unique));
    }

    h.0
}
