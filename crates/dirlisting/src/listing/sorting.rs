//! Name ordering for sorted listings.

use std::cmp::Ordering;

/// Compares two entry names byte-wise, like `strcmp`.
pub fn compare_names(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

// ============================================================================
// Comb sort
// ============================================================================

/// Sorts in place with comb sort: the gap shrinks by 10/13 each pass, and gaps of 9
/// or 10 jump to 11. Runs until a pass with gap 1 makes no swap.
/// Not stable; names within one directory are unique.
pub fn comb_sort<T, F>(items: &mut [T], mut compare: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    let len = items.len();
    if len < 2 {
        return;
    }
    let mut gap = len;
    loop {
        gap = gap * 10 / 13;
        if gap == 9 || gap == 10 {
            gap = 11;
        }
        if gap < 1 {
            gap = 1;
        }
        let mut swapped = false;
        for i in 0..len.saturating_sub(gap) {
            let j = i + gap;
            if compare(&items[i], &items[j]) == Ordering::Greater {
                items.swap(i, j);
                swapped = true;
            }
        }
        if gap == 1 && !swapped {
            break;
        }
    }
}
