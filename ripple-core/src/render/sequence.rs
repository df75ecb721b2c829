//! Longest increasing subsequence, used to find the children that can stay
//! in place during a keyed move.

/// Indices of one longest strictly increasing subsequence of `values`.
///
/// Zero entries stand for "no old node" and are skipped. Runs in
/// `O(n log n)`.
///
/// ```rust
/// use ripple_core::render::longest_increasing_subsequence;
///
/// assert_eq!(longest_increasing_subsequence(&[2, 3, 1, 5, 6, 8, 7, 9, 4]), vec![0, 1, 3, 4, 6, 7]);
/// assert_eq!(longest_increasing_subsequence(&[0, 4, 0, 2, 3]), vec![3, 4]);
/// ```
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    // result[k] is the index of the smallest tail of an increasing run of
    // length k + 1; predecessor links let us rebuild the run at the end.
    let mut result: Vec<usize> = Vec::new();
    let mut predecessor = vec![usize::MAX; values.len()];

    for (i, &value) in values.iter().enumerate() {
        if value == 0 {
            continue;
        }
        match result.last() {
            None => {
                result.push(i);
                continue;
            }
            Some(&last) if values[last] < value => {
                predecessor[i] = last;
                result.push(i);
                continue;
            }
            Some(_) => {}
        }

        let pos = result.partition_point(|&r| values[r] < value);
        if value < values[result[pos]] {
            if pos > 0 {
                predecessor[i] = result[pos - 1];
            }
            result[pos] = i;
        }
    }

    if let Some(&tail) = result.last() {
        let mut current = tail;
        for slot in result.iter_mut().rev() {
            *slot = current;
            current = predecessor[current];
        }
    }
    result
}
