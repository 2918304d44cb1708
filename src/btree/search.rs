//! The search primitive shared by routing and leaf positioning.

/// Index of the greatest element of `keys` that is `<= target`, or
/// `None` when every element is greater.
///
/// `keys` must be sorted ascending. Binary search, so O(log n).
pub fn find_last_leq(keys: &[i32], target: i32) -> Option<usize> {
    let mut low = 0usize;
    let mut high = keys.len();
    let mut found = None;

    while low < high {
        let mid = low + (high - low) / 2;
        if keys[mid] <= target {
            found = Some(mid);
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    found
}
