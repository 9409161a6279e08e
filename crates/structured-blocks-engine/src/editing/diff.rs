//! Minimal edit scripts between two sequences.
//!
//! [`diff`] produces an LCS-based edit script; [`diff_to_changes`] folds it
//! into contiguous insert and remove runs whose indexes can be replayed in
//! order against the old sequence to obtain the new one.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

/// A contiguous run of the edit script.
///
/// `index` is relative to the sequence as it stands after every earlier run
/// has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceChange {
    Insert { index: usize, count: usize },
    Remove { index: usize, count: usize },
}

/// Edit script turning `old` into `new`.
///
/// Within every gap between common elements, deletions come before
/// insertions.
pub fn diff<T: PartialEq>(old: &[T], new: &[T]) -> Vec<DiffOp> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = vec![DiffOp::Equal; prefix];
    ops.extend(lcs_script(old_mid, new_mid));
    ops.extend(std::iter::repeat_n(DiffOp::Equal, suffix));
    ops
}

fn lcs_script<T: PartialEq>(old: &[T], new: &[T]) -> Vec<DiffOp> {
    if old.is_empty() {
        return vec![DiffOp::Insert; new.len()];
    }
    if new.is_empty() {
        return vec![DiffOp::Delete; old.len()];
    }

    // lengths[i][j]: LCS length of old[i..] and new[j..]
    let width = new.len() + 1;
    let mut lengths = vec![0usize; (old.len() + 1) * width];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lengths[i * width + j] = if old[i] == new[j] {
                lengths[(i + 1) * width + j + 1] + 1
            } else {
                lengths[(i + 1) * width + j].max(lengths[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(old.len() + new.len());
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            ops.push(DiffOp::Equal);
            i += 1;
            j += 1;
        } else if lengths[(i + 1) * width + j] >= lengths[i * width + j + 1] {
            ops.push(DiffOp::Delete);
            i += 1;
        } else {
            ops.push(DiffOp::Insert);
            j += 1;
        }
    }
    ops.extend(std::iter::repeat_n(DiffOp::Delete, old.len() - i));
    ops.extend(std::iter::repeat_n(DiffOp::Insert, new.len() - j));
    ops
}

/// Fold an edit script into contiguous runs
pub fn diff_to_changes(ops: &[DiffOp]) -> Vec<SequenceChange> {
    let mut changes: Vec<SequenceChange> = Vec::new();
    let mut index = 0;

    for op in ops {
        match op {
            DiffOp::Equal => index += 1,
            DiffOp::Insert => {
                match changes.last_mut() {
                    Some(SequenceChange::Insert { index: start, count })
                        if *start + *count == index =>
                    {
                        *count += 1;
                    }
                    _ => changes.push(SequenceChange::Insert { index, count: 1 }),
                }
                index += 1;
            }
            DiffOp::Delete => match changes.last_mut() {
                Some(SequenceChange::Remove { index: start, count }) if *start == index => {
                    *count += 1;
                }
                _ => changes.push(SequenceChange::Remove { index, count: 1 }),
            },
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn replay(old: &[char], new: &[char]) -> Vec<char> {
        let mut current = old.to_vec();
        let mut source = new.iter();
        let ops = diff(old, new);
        // Inserted elements come from `new` in order; walk it alongside the ops
        let mut inserted = Vec::new();
        for op in &ops {
            match op {
                DiffOp::Equal => {
                    source.next();
                }
                DiffOp::Insert => inserted.push(*source.next().unwrap()),
                DiffOp::Delete => {}
            }
        }
        let mut inserted = inserted.into_iter();
        for change in diff_to_changes(&ops) {
            match change {
                SequenceChange::Remove { index, count } => {
                    current.drain(index..index + count);
                }
                SequenceChange::Insert { index, count } => {
                    let items: Vec<char> = inserted.by_ref().take(count).collect();
                    current.splice(index..index, items);
                }
            }
        }
        current
    }

    #[rstest]
    #[case("", "abc")]
    #[case("abc", "")]
    #[case("abc", "abc")]
    #[case("abc", "ac")]
    #[case("abc", "axbyc")]
    #[case("abcd", "dcba")]
    #[case("abcdef", "xbcdey")]
    #[case("aaab", "abaa")]
    fn test_replaying_changes_reproduces_new(#[case] old: &str, #[case] new: &str) {
        let old: Vec<char> = old.chars().collect();
        let new: Vec<char> = new.chars().collect();
        assert_eq!(replay(&old, &new), new);
    }

    #[test]
    fn test_remove_middle() {
        let ops = diff(&[1, 2, 3], &[1, 3]);
        assert_eq!(
            diff_to_changes(&ops),
            vec![SequenceChange::Remove { index: 1, count: 1 }]
        );
    }

    #[test]
    fn test_bulk_insert_is_one_run() {
        let ops = diff(&[], &[1, 2, 3]);
        assert_eq!(
            diff_to_changes(&ops),
            vec![SequenceChange::Insert { index: 0, count: 3 }]
        );
    }

    #[test]
    fn test_replacement_removes_before_inserting() {
        let ops = diff(&[1, 2, 3], &[1, 4, 3]);
        assert_eq!(
            ops,
            vec![DiffOp::Equal, DiffOp::Delete, DiffOp::Insert, DiffOp::Equal]
        );
        assert_eq!(
            diff_to_changes(&ops),
            vec![
                SequenceChange::Remove { index: 1, count: 1 },
                SequenceChange::Insert { index: 1, count: 1 },
            ]
        );
    }

    #[test]
    fn test_move_is_remove_plus_insert() {
        let ops = diff(&[1, 2, 3], &[2, 3, 1]);
        assert_eq!(
            diff_to_changes(&ops),
            vec![
                SequenceChange::Remove { index: 0, count: 1 },
                SequenceChange::Insert { index: 2, count: 1 },
            ]
        );
    }
}
