use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use keel_model::TaskRecord;

/// Host ports pinned by `records`; dynamic (`0`) mappings claim nothing.
pub fn used_host_ports<'a, I>(records: I) -> BTreeSet<u32>
where
    I: IntoIterator<Item = &'a TaskRecord>,
{
    records
        .into_iter()
        .filter(|r| !r.is_terminal())
        .flat_map(|r| r.container.ports.iter())
        .filter(|p| !p.is_dynamic())
        .map(|p| p.host_port)
        .collect()
}

/// Lowest port in `range` not in `used`.
pub fn allocate_host_port(range: RangeInclusive<u32>, used: &BTreeSet<u32>) -> Option<u32> {
    range.into_iter().find(|p| !used.contains(p))
}
