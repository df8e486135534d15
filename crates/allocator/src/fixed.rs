//! Fixed allocation: every item split into the same number of parts.

use crate::{JobDescriptor, Mode, UnitRange, WorkItem};

/// Split each item's outstanding work into `parts` contiguous ranges.
///
/// Ranges have size `ceil(remaining / parts)`, the last one ending exactly at
/// the item's end. Parts that would start at or past the end are omitted, so
/// an item with fewer outstanding units than `parts` yields fewer jobs.
pub fn allocate_fixed(items: &[WorkItem], parts: u64, mode: Mode) -> Vec<JobDescriptor> {
    let mut jobs = Vec::new();
    for item in items {
        let remaining = item.remaining(mode);
        if remaining == 0 || parts == 0 {
            continue;
        }
        let base = item.start_offset(mode);
        let end = base.saturating_add(remaining);
        let chunk = remaining.div_ceil(parts);
        for i in 0..parts {
            let start = base.saturating_add(i.saturating_mul(chunk));
            if start >= end {
                break;
            }
            let stop = if i == parts - 1 {
                end
            } else {
                start.saturating_add(chunk).min(end)
            };
            jobs.push(item.job(UnitRange::new(start, stop), mode));
        }
    }
    jobs
}
