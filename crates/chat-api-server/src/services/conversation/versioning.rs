//! Pair arithmetic for version groups.
//!
//! A group's `versions` array holds message ids appended two at a time
//! (user id then assistant id). `index` is the even offset of the active
//! pair. Everything here is pure so the invariants stay testable without a
//! database.

use serde::Serialize;

use crate::models::chat::NavigateDirection;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// 1-based pair number currently selected.
    pub current: usize,
    pub total: usize,
}

/// Round an index down to the nearest even offset. `index` should already be
/// even under the invariant; odd values are tolerated defensively.
pub fn normalized_index(index: i32) -> usize {
    let index = index.max(0) as usize;
    index - (index % 2)
}

pub fn total_pairs(versions_len: usize) -> usize {
    versions_len / 2
}

pub fn has_multiple_versions(versions_len: usize) -> bool {
    versions_len > 2
}

/// Whether `index` is a valid active-pair offset for a group with
/// `versions_len` entries. An empty group only admits 0.
pub fn is_valid_index(index: i32, versions_len: usize) -> bool {
    if index < 0 || index % 2 != 0 {
        return false;
    }
    let index = index as usize;
    if versions_len == 0 {
        return index == 0;
    }
    index + 2 <= versions_len
}

pub fn version_info(index: i32, versions_len: usize) -> VersionInfo {
    VersionInfo {
        current: normalized_index(index) / 2 + 1,
        total: total_pairs(versions_len),
    }
}

/// Compute the index after stepping one pair in `direction`, clamped to the
/// group's bounds. Stepping past either end is a no-op.
pub fn navigate(index: i32, versions_len: usize, direction: NavigateDirection) -> i32 {
    let pairs = total_pairs(versions_len);
    if pairs == 0 {
        return 0;
    }

    let current_pair = normalized_index(index) / 2;
    let target_pair = match direction {
        NavigateDirection::Prev => current_pair.saturating_sub(1),
        NavigateDirection::Next => (current_pair + 1).min(pairs - 1),
    };

    (target_pair * 2) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_group_has_single_pair_at_zero() {
        assert!(is_valid_index(0, 2));
        assert_eq!(version_info(0, 2), VersionInfo { current: 1, total: 1 });
        assert!(!has_multiple_versions(2));
    }

    #[test]
    fn edited_group_selects_appended_pair() {
        // One edit on a one-pair group: versions grows to 4, index to 2.
        assert!(is_valid_index(2, 4));
        assert!(has_multiple_versions(4));
        assert_eq!(version_info(2, 4), VersionInfo { current: 2, total: 2 });
    }

    #[test]
    fn prev_from_last_pair_steps_back() {
        let index = navigate(2, 4, NavigateDirection::Prev);
        assert_eq!(index, 0);
        assert_eq!(version_info(index, 4), VersionInfo { current: 1, total: 2 });
    }

    #[test]
    fn navigation_is_idempotent_at_boundaries() {
        assert_eq!(navigate(0, 4, NavigateDirection::Prev), 0);
        assert_eq!(navigate(2, 4, NavigateDirection::Next), 2);
        assert_eq!(navigate(0, 2, NavigateDirection::Next), 0);
        assert_eq!(navigate(0, 2, NavigateDirection::Prev), 0);
    }

    #[test]
    fn odd_index_normalizes_down() {
        assert_eq!(normalized_index(3), 2);
        assert_eq!(normalized_index(0), 0);
        assert_eq!(version_info(3, 4), VersionInfo { current: 2, total: 2 });
    }

    #[test]
    fn rejects_out_of_range_or_odd_indices() {
        assert!(!is_valid_index(4, 4));
        assert!(!is_valid_index(1, 4));
        assert!(!is_valid_index(-2, 4));
        assert!(is_valid_index(0, 0));
        assert!(!is_valid_index(2, 0));
    }

    #[test]
    fn empty_group_navigates_to_zero() {
        assert_eq!(navigate(0, 0, NavigateDirection::Next), 0);
    }
}
