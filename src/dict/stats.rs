use super::{
    entry::chain_len,
    table::{Table, Tables},
};

use std::fmt;

/// Chains this long or longer are counted in the last histogram slot.
pub const CHAIN_LENGTH_SLOTS: usize = 50;

/// Chain length statistics of one table of a [`Dict`][dict-struct].
///
/// [dict-struct]: ./struct.Dict.html
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableStats {
    pub table: usize,
    pub size: usize,
    pub used: usize,
    pub non_empty_buckets: usize,
    pub max_chain_len: usize,
    pub total_chain_len: usize,
    /// `histogram[n]` is the number of buckets holding a chain of length `n`.
    pub histogram: [usize; CHAIN_LENGTH_SLOTS],
}

impl TableStats {
    fn collect<K, V>(table_no: usize, table: &Table<K, V>) -> Self {
        let mut stats = Self {
            table: table_no,
            size: table.size(),
            used: table.used,
            non_empty_buckets: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            histogram: [0; CHAIN_LENGTH_SLOTS],
        };

        for head in table.buckets.iter() {
            let len = chain_len(head);
            stats.histogram[len.min(CHAIN_LENGTH_SLOTS - 1)] += 1;
            if len > 0 {
                stats.non_empty_buckets += 1;
                stats.total_chain_len += len;
                stats.max_chain_len = stats.max_chain_len.max(len);
            }
        }
        stats
    }

    /// The average length of the non-empty chains, as counted.
    pub fn avg_chain_len_counted(&self) -> f64 {
        if self.non_empty_buckets == 0 {
            0.0
        } else {
            self.total_chain_len as f64 / self.non_empty_buckets as f64
        }
    }

    /// The average length of the non-empty chains, computed from the element
    /// count.
    pub fn avg_chain_len_computed(&self) -> f64 {
        if self.non_empty_buckets == 0 {
            0.0
        } else {
            self.used as f64 / self.non_empty_buckets as f64
        }
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.table == 0 {
            "main hash table"
        } else {
            "rehashing target"
        };
        writeln!(f, "Hash table {} stats ({}):", self.table, role)?;
        writeln!(f, " table size: {}", self.size)?;
        writeln!(f, " number of elements: {}", self.used)?;
        if self.used == 0 {
            return writeln!(f, "No stats available for empty dictionaries");
        }
        writeln!(f, " different slots: {}", self.non_empty_buckets)?;
        writeln!(f, " max chain length: {}", self.max_chain_len)?;
        writeln!(
            f,
            " avg chain length (counted): {:.02}",
            self.avg_chain_len_counted()
        )?;
        writeln!(
            f,
            " avg chain length (computed): {:.02}",
            self.avg_chain_len_computed()
        )?;
        writeln!(f, " Chain length distribution:")?;
        for (len, &buckets) in self.histogram.iter().enumerate() {
            if buckets == 0 {
                continue;
            }
            writeln!(
                f,
                "   {}: {} ({:.02}%)",
                len,
                buckets,
                buckets as f64 / self.size as f64 * 100.0
            )?;
        }
        Ok(())
    }
}

/// Chain length statistics of a [`Dict`][dict-struct], returned by
/// [`Dict::stats`][stats-method].
///
/// [dict-struct]: ./struct.Dict.html
/// [stats-method]: ./struct.Dict.html#method.stats
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DictStats {
    pub tables: Vec<TableStats>,
}

impl DictStats {
    pub(crate) fn collect<K, V>(tables: &Tables<K, V>) -> Self {
        let tables = (0..tables.count())
            .filter_map(|i| tables.get(i).map(|table| TableStats::collect(i, table)))
            .collect();
        Self { tables }
    }
}

impl fmt::Display for DictStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in &self.tables {
            write!(f, "{}", table)?;
        }
        Ok(())
    }
}
