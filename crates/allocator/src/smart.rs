//! Smart allocation: uniform chunks over a capped job count.

use tracing::debug;

use crate::{JobDescriptor, Mode, UnitRange, WorkItem};

/// Split `items` into at most `job_cap` jobs of a uniform target size.
///
/// The job count is `total_remaining / min_units_per_job` capped at
/// `job_cap`, or `job_cap` itself when that quotient is zero. Every job carries
/// at most `ceil(total_remaining / job_count)` units and never spans two
/// items. Items are visited in descending order of outstanding work (ties keep
/// input order), so when the cap is reached the smallest backlogs are the ones
/// left for a later run.
pub fn allocate_smart(
    items: &[WorkItem],
    job_cap: u64,
    min_units_per_job: u64,
    mode: Mode,
) -> Vec<JobDescriptor> {
    let total_remaining = items
        .iter()
        .map(|i| i.remaining(mode))
        .fold(0, u64::saturating_add);
    if total_remaining == 0 || job_cap == 0 {
        return Vec::new();
    }

    let natural = total_remaining / min_units_per_job.max(1);
    let job_count = match natural.min(job_cap) {
        0 => job_cap,
        n => n,
    };
    let chunk = total_remaining.div_ceil(job_count);
    debug!(total_remaining, job_count, chunk, "smart_allocation");

    let mut sorted: Vec<&WorkItem> = items.iter().filter(|i| i.remaining(mode) > 0).collect();
    // Stable: equal backlogs keep their input order.
    sorted.sort_by(|a, b| b.remaining(mode).cmp(&a.remaining(mode)));

    let mut jobs = Vec::new();
    'items: for item in sorted {
        let end = item.total_units;
        let mut start = item.start_offset(mode);
        while start < end {
            if jobs.len() as u64 >= job_count {
                break 'items;
            }
            let next = start.saturating_add(chunk).min(end);
            jobs.push(item.job(UnitRange::new(start, next), mode));
            start = next;
        }
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(jobs: &[JobDescriptor], locator: &str) -> Vec<(u64, u64)> {
        jobs.iter()
            .filter(|j| j.locator == locator)
            .map(|j| (j.range.start, j.range.end))
            .collect()
    }

    #[test]
    fn empty_when_nothing_outstanding() {
        let items = vec![
            WorkItem::new("p/a", "a", 30, 30),
            WorkItem::new("p/b", "b", 0, 0),
        ];
        assert!(allocate_smart(&items, 10, 5, Mode::Normal).is_empty());
        assert!(allocate_smart(&[], 10, 5, Mode::Normal).is_empty());
    }

    #[test]
    fn zero_cap_emits_nothing() {
        let items = vec![WorkItem::new("p/a", "a", 30, 0)];
        assert!(allocate_smart(&items, 0, 5, Mode::Normal).is_empty());
    }

    #[test]
    fn cap_bounds_job_count_and_largest_goes_first() {
        // 110 outstanding, five jobs of at most 22 units.
        let items = vec![
            WorkItem::new("p/small", "small", 10, 0),
            WorkItem::new("p/big", "big", 100, 0),
        ];
        let jobs = allocate_smart(&items, 5, 5, Mode::Normal);
        assert!(jobs.len() <= 5);
        assert_eq!(jobs[0].locator, "p/big");
        assert!(jobs.iter().all(|j| j.range.len() <= 22));
        assert_eq!(
            ranges(&jobs, "p/big"),
            vec![(0, 22), (22, 44), (44, 66), (66, 88), (88, 100)]
        );
        // The cap is exhausted by the larger backlog.
        assert!(ranges(&jobs, "p/small").is_empty());
    }

    #[test]
    fn covers_all_work_when_cap_is_loose() {
        let items = vec![
            WorkItem::new("p/a", "a", 100, 0),
            WorkItem::new("p/b", "b", 10, 0),
        ];
        let jobs = allocate_smart(&items, 1000, 5, Mode::Normal);
        let total: u64 = jobs.iter().map(|j| j.range.len()).sum();
        assert_eq!(total, 110);
        // 22 jobs of 5 units each.
        assert_eq!(jobs.len(), 22);
        assert!(jobs.iter().all(|j| j.range.len() == 5));
    }

    #[test]
    fn normal_mode_starts_at_completed_offset() {
        let items = vec![WorkItem::new("p/a", "a", 100, 40)];
        let jobs = allocate_smart(&items, 3, 5, Mode::Normal);
        assert_eq!(ranges(&jobs, "p/a"), vec![(40, 60), (60, 80), (80, 100)]);
    }

    #[test]
    fn other_modes_cover_whole_item() {
        let items = vec![WorkItem::new("p/a", "a", 100, 100)];
        let jobs = allocate_smart(&items, 2, 5, Mode::Expire);
        assert_eq!(ranges(&jobs, "p/a"), vec![(0, 50), (50, 100)]);
        assert!(jobs.iter().all(|j| j.mode == Mode::Expire));
    }

    #[test]
    fn small_backlog_falls_back_to_cap() {
        // 3 units < min_units_per_job: job count falls back to the cap.
        let items = vec![WorkItem::new("p/a", "a", 3, 0)];
        let jobs = allocate_smart(&items, 2, 5, Mode::Normal);
        assert_eq!(ranges(&jobs, "p/a"), vec![(0, 2), (2, 3)]);
    }

    #[test]
    fn huge_totals_saturate() {
        let items = vec![
            WorkItem::new("p/a", "a", u64::MAX, 0),
            WorkItem::new("p/b", "b", u64::MAX, 0),
        ];
        let jobs = allocate_smart(&items, 4, 1, Mode::Normal);
        assert_eq!(jobs.len(), 4);
        assert!(jobs.iter().all(|j| j.locator == "p/a"));
        assert_eq!(jobs[0].range.start, 0);
        assert_eq!(jobs[3].range.end, u64::MAX);
    }

    #[test]
    fn ties_keep_input_order() {
        let items = vec![
            WorkItem::new("p/first", "1", 10, 0),
            WorkItem::new("p/second", "2", 10, 0),
        ];
        let jobs = allocate_smart(&items, 2, 5, Mode::Normal);
        assert_eq!(jobs[0].locator, "p/first");
        assert_eq!(jobs[1].locator, "p/second");
    }

    #[test]
    fn ranges_never_overlap_or_escape() {
        let items = vec![
            WorkItem::new("p/a", "a", 97, 13),
            WorkItem::new("p/b", "b", 41, 40),
            WorkItem::new("p/c", "c", 7, 0),
        ];
        for cap in 1..40 {
            let jobs = allocate_smart(&items, cap, 3, Mode::Normal);
            assert!(jobs.len() as u64 <= cap);
            for item in &items {
                let mut rs = ranges(&jobs, &item.locator);
                rs.sort();
                for w in rs.windows(2) {
                    assert!(w[0].1 <= w[1].0);
                }
                for (s, e) in rs {
                    assert!(s < e && e <= item.total_units && s >= item.completed_units);
                }
            }
        }
    }
}
