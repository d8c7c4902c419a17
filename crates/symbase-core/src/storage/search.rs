//! Floor search over sorted indices.

use std::cmp::Ordering;

use tracing::error;

/// Rounds the search may spend at step width one before giving up.
///
/// A consistent index converges long before this; running out means the
/// index is not sorted by the comparator it is searched with.
pub const MAX_SEARCH_ROUNDS: u32 = 100;

/// Find the position of the entry matching `target`, or of the largest entry below it
///
/// `compare(pos)` orders the entry at `pos` against the target, i.e. it
/// returns [`Ordering::Less`] if the entry sorts before the target.
///
/// ## Returns
///
/// - `Some(pos)` of an equal entry. With duplicates this can be any member
///   of the run of equal entries; callers walk neighbours to find the rest.
/// - `Some(pos)` of the largest entry below the target if none is equal
/// - `None` if the target sorts before every entry, the index is empty, or
///   the index turned out not to be sorted (logged as an internal error)
pub(crate) fn floor_search<F>(len: usize, mut compare: F) -> Option<usize>
where
    F: FnMut(usize) -> Ordering,
{
    if len == 0 {
        return None;
    }

    let mut pos = len / 2;
    let mut step = (pos / 2).max(1);
    let mut rounds_at_one = 0;

    loop {
        match compare(pos) {
            Ordering::Equal => return Some(pos),
            Ordering::Less => {
                if pos + 1 == len || compare(pos + 1) == Ordering::Greater {
                    return Some(pos);
                }
                pos = (pos + step).min(len - 1);
            }
            Ordering::Greater => {
                if pos == 0 {
                    return None;
                }
                if compare(pos - 1) == Ordering::Less {
                    return Some(pos - 1);
                }
                pos = pos.saturating_sub(step);
            }
        }

        if step > 1 {
            step /= 2;
        } else {
            rounds_at_one += 1;
            if rounds_at_one > MAX_SEARCH_ROUNDS {
                error!(len, pos, "sorted index is inconsistent, search did not converge");
                return None;
            }
        }
    }
}
