//! Splice Arithmetic
//!
//! Pure functions over [`Splice`] lists:
//!
//! - [`merge_splice`] folds one raw splice into an index-sorted list of
//!   non-overlapping splices, shifting later entries as lengths change.
//! - [`merge_records`] runs that fold over a listener's record batch.
//! - [`calc_splices`] / [`diff`] compute a minimal edit script between two
//!   arrays with an edit-distance table.
//! - [`project_splices`] refines merged splices against the current array.
//! - [`apply_splices`] replays a splice list onto a copy of the old array.
//!
//! # Coordinates
//!
//! Every splice in a merged list is expressed in *final* coordinates:
//! `index` is a position in the post-mutation array, `removed` holds the
//! elements the pre-mutation array had there. Replaying a merged list in
//! order against the original array yields the final array.

use std::ops::Range;

use super::record::{ChangeKind, ChangeRecord, Splice};
use super::value::{same_value, Value};

/// Overlap of two half-open ranges.
///
/// `None` when disjoint, `Some(0)` when they only touch, otherwise the
/// length of the shared part.
pub fn intersect(a: Range<usize>, b: Range<usize>) -> Option<usize> {
    if a.end < b.start || b.end < a.start {
        return None;
    }
    if a.end == b.start || b.end == a.start {
        return Some(0);
    }
    if a.start < b.start {
        Some(a.end.min(b.end) - b.start)
    } else {
        Some(a.end.min(b.end) - a.start)
    }
}

fn offset_index(index: usize, offset: isize) -> usize {
    (index as isize + offset).max(0) as usize
}

/// Fold `incoming` into `splices`.
///
/// `splices` must be sorted by index and non-overlapping; it stays that way.
pub fn merge_splice(splices: &mut Vec<Splice>, incoming: Splice) {
    let mut splice = incoming;
    let mut inserted = false;
    let mut insertion_offset: isize = 0;
    let mut i = 0;

    while i < splices.len() {
        let current_index = offset_index(splices[i].index, insertion_offset);
        splices[i].index = current_index;
        if inserted {
            i += 1;
            continue;
        }

        let current = &splices[i];
        let dirty = current.index..current.index + current.added_count;
        let overlap = intersect(splice.index..splice.index + splice.removed.len(), dirty);

        match overlap {
            Some(overlap) => {
                let current = splices.remove(i);
                insertion_offset -= current.length_delta();

                splice.added_count += current.added_count - overlap;
                let delete_count = splice.removed.len() + current.removed.len() - overlap;

                if splice.added_count == 0 && delete_count == 0 {
                    // Cancelled out.
                    inserted = true;
                } else {
                    let mut removed = current.removed;
                    if splice.index < current.index {
                        let mut prefix = splice.removed[..current.index - splice.index].to_vec();
                        prefix.append(&mut removed);
                        removed = prefix;
                    }
                    let current_end = current.index + current.added_count;
                    if splice.index + splice.removed.len() > current_end {
                        removed.extend_from_slice(&splice.removed[current_end - splice.index..]);
                    }
                    splice.removed = removed;
                    splice.index = splice.index.min(current.index);
                }
                // The next entry has shifted into slot `i`.
            }
            None if splice.index < current.index => {
                inserted = true;
                let delta = splice.length_delta();
                splices.insert(i, std::mem::take(&mut splice));
                i += 1;
                splices[i].index = offset_index(splices[i].index, delta);
                insertion_offset += delta;
                i += 1;
            }
            None => i += 1,
        }
    }

    if !inserted {
        splices.push(splice);
    }
}

/// Coalesce a record batch into merged splices.
///
/// Splice records merge as-is. Index `Add` becomes `(i, [], 1)`; index
/// `Update`/`Delete` become `(i, [old], 1)`. Other records are ignored.
pub fn merge_records(records: &[ChangeRecord]) -> Vec<Splice> {
    let mut splices = Vec::new();
    for record in records {
        let splice = match &record.kind {
            ChangeKind::Splice(splice) => splice.clone(),
            ChangeKind::Add { name } => match name.as_index() {
                Some(index) => Splice::new(index, Vec::new(), 1),
                None => continue,
            },
            ChangeKind::Update { name, old_value } | ChangeKind::Delete { name, old_value } => {
                match name.as_index() {
                    Some(index) => Splice::new(index, vec![old_value.clone()], 1),
                    None => continue,
                }
            }
            _ => continue,
        };
        merge_splice(&mut splices, splice);
    }
    splices
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Leave,
    Update,
    Add,
    Delete,
}

fn edit_distances(current: &[Value], old: &[Value]) -> Vec<Vec<usize>> {
    let rows = old.len() + 1;
    let columns = current.len() + 1;
    let mut distances = vec![vec![0; columns]; rows];
    for (i, row) in distances.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in distances[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..rows {
        for j in 1..columns {
            distances[i][j] = if same_value(&current[j - 1], &old[i - 1]) {
                distances[i - 1][j - 1]
            } else {
                (distances[i - 1][j] + 1).min(distances[i][j - 1] + 1)
            };
        }
    }
    distances
}

fn edits_from_distances(distances: &[Vec<usize>]) -> Vec<Edit> {
    let mut i = distances.len() - 1;
    let mut j = distances[0].len() - 1;
    let mut current = distances[i][j];
    let mut edits = Vec::with_capacity(i + j);

    while i > 0 || j > 0 {
        if i == 0 {
            edits.push(Edit::Add);
            j -= 1;
            continue;
        }
        if j == 0 {
            edits.push(Edit::Delete);
            i -= 1;
            continue;
        }

        let diagonal = distances[i - 1][j - 1];
        let deleted = distances[i - 1][j];
        let added = distances[i][j - 1];
        let min = if deleted < added {
            deleted.min(diagonal)
        } else {
            added.min(diagonal)
        };

        if min == diagonal {
            edits.push(if diagonal == current { Edit::Leave } else { Edit::Update });
            current = diagonal;
            i -= 1;
            j -= 1;
        } else if min == deleted {
            edits.push(Edit::Delete);
            current = deleted;
            i -= 1;
        } else {
            edits.push(Edit::Add);
            current = added;
            j -= 1;
        }
    }

    edits.reverse();
    edits
}

fn shared_prefix(current: &[Value], old: &[Value], limit: usize) -> usize {
    current
        .iter()
        .zip(old)
        .take(limit)
        .take_while(|(a, b)| same_value(a, b))
        .count()
}

fn shared_suffix(current: &[Value], old: &[Value], limit: usize) -> usize {
    current
        .iter()
        .rev()
        .zip(old.iter().rev())
        .take(limit)
        .take_while(|(a, b)| same_value(a, b))
        .count()
}

/// Minimal splices turning `old[old_range]` into `current[current_range]`.
///
/// Shared prefixes are trimmed only when both ranges start at 0, shared
/// suffixes only when both ranges reach their array's end.
pub fn calc_splices(
    current: &[Value],
    current_range: Range<usize>,
    old: &[Value],
    old_range: Range<usize>,
) -> Vec<Splice> {
    let Range {
        start: mut current_start,
        end: mut current_end,
    } = current_range;
    let Range {
        start: mut old_start,
        end: mut old_end,
    } = old_range;

    let min_length = (current_end - current_start).min(old_end - old_start);
    let prefix = if current_start == 0 && old_start == 0 {
        shared_prefix(current, old, min_length)
    } else {
        0
    };
    let suffix = if current_end == current.len() && old_end == old.len() {
        shared_suffix(&current[current_start..current_end], &old[old_start..old_end], min_length - prefix)
    } else {
        0
    };

    current_start += prefix;
    old_start += prefix;
    current_end -= suffix;
    old_end -= suffix;

    if current_start == current_end && old_start == old_end {
        return Vec::new();
    }
    if current_start == current_end {
        return vec![Splice::new(current_start, old[old_start..old_end].to_vec(), 0)];
    }
    if old_start == old_end {
        return vec![Splice::new(current_start, Vec::new(), current_end - current_start)];
    }

    let edits = edits_from_distances(&edit_distances(
        &current[current_start..current_end],
        &old[old_start..old_end],
    ));

    let mut splices = Vec::new();
    let mut open: Option<Splice> = None;
    let mut index = current_start;
    let mut old_index = old_start;

    for edit in edits {
        match edit {
            Edit::Leave => {
                splices.extend(open.take());
                index += 1;
                old_index += 1;
            }
            Edit::Update => {
                let splice = open.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                splice.added_count += 1;
                splice.removed.push(old[old_index].clone());
                index += 1;
                old_index += 1;
            }
            Edit::Add => {
                let splice = open.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                splice.added_count += 1;
                index += 1;
            }
            Edit::Delete => {
                let splice = open.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                splice.removed.push(old[old_index].clone());
                old_index += 1;
            }
        }
    }
    splices.extend(open);
    splices
}

/// Minimal splices turning `old` into `new`.
pub fn diff(old: &[Value], new: &[Value]) -> Vec<Splice> {
    calc_splices(new, 0..new.len(), old, 0..old.len())
}

/// Merge a record batch, then tighten each merged splice against `current`.
///
/// One-element updates that wrote back the same value disappear, and wide
/// splices such as those from `sort` shrink to the elements that actually
/// moved.
pub fn project_splices(current: &[Value], records: &[ChangeRecord]) -> Vec<Splice> {
    let mut splices = Vec::new();
    for splice in merge_records(records) {
        if splice.added_count == 1 && splice.removed.len() == 1 {
            let unchanged = current
                .get(splice.index)
                .is_some_and(|value| same_value(value, &splice.removed[0]));
            if !unchanged {
                splices.push(splice);
            }
            continue;
        }

        let start = splice.index.min(current.len());
        let end = (splice.index + splice.added_count).min(current.len());
        let removed_len = splice.removed.len();
        splices.extend(calc_splices(current, start..end, &splice.removed, 0..removed_len));
    }
    splices
}

/// Replay `splices` onto `previous`, taking inserted elements from `current`.
pub fn apply_splices(previous: &mut Vec<Value>, current: &[Value], splices: &[Splice]) {
    for splice in splices {
        let start = splice.index.min(previous.len());
        let end = (start + splice.removed.len()).min(previous.len());
        let added = (splice.index..splice.index + splice.added_count)
            .map(|i| current.get(i).cloned().unwrap_or_default());
        previous.splice(start..end, added);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::array::ObservableArray;
    use crate::reactive::callback::ChangeCallback;
    use crate::reactive::record::AcceptTypes;
    use crate::reactive::scheduler::Scheduler;
    use crate::reactive::value::Key;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn letters(s: &str) -> Vec<Value> {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    }

    fn numbers(items: &[i32]) -> Vec<Value> {
        items.iter().copied().map(Value::from).collect()
    }

    /// Undo final-coordinate splices, last first.
    fn undo(current: &[Value], splices: &[Splice]) -> Vec<Value> {
        let mut values = current.to_vec();
        for splice in splices.iter().rev() {
            let end = (splice.index + splice.added_count).min(values.len());
            values.splice(splice.index..end, splice.removed.iter().cloned());
        }
        values
    }

    #[test]
    fn intersect_cases() {
        assert_eq!(intersect(0..2, 5..7), None);
        assert_eq!(intersect(0..2, 2..4), Some(0));
        assert_eq!(intersect(0..3, 2..5), Some(1));
        assert_eq!(intersect(1..2, 0..5), Some(1));
        assert_eq!(intersect(2..6, 3..4), Some(1));
    }

    #[test]
    fn adjacent_splices_merge() {
        // a..j, splice(3, 4, A, B, C) then splice(6, 2, 0, 1, 2)
        let mut splices = Vec::new();
        merge_splice(&mut splices, Splice::new(3, letters("defg"), 3));
        merge_splice(&mut splices, Splice::new(6, letters("hi"), 3));

        assert_eq!(splices, vec![Splice::new(3, letters("defghi"), 6)]);
    }

    #[test]
    fn disjoint_splice_before_shifts_later_entries() {
        let mut splices = vec![Splice::new(5, vec![], 2)];
        merge_splice(&mut splices, Splice::new(1, numbers(&[9]), 0));
        assert_eq!(
            splices,
            vec![Splice::new(1, numbers(&[9]), 0), Splice::new(4, vec![], 2)]
        );
    }

    #[test]
    fn add_then_remove_cancels() {
        let mut splices = Vec::new();
        merge_splice(&mut splices, Splice::new(2, vec![], 1));
        merge_splice(&mut splices, Splice::new(2, numbers(&[7]), 0));
        assert!(splices.is_empty());
    }

    #[test]
    fn repeated_update_keeps_first_old_value() {
        let mut splices = Vec::new();
        merge_splice(&mut splices, Splice::new(1, numbers(&[1]), 1));
        merge_splice(&mut splices, Splice::new(1, numbers(&[2]), 1));
        assert_eq!(splices, vec![Splice::new(1, numbers(&[1]), 1)]);
    }

    #[test]
    fn diff_finds_minimal_edit() {
        let old = letters("abcde");
        let new = letters("abXde");
        assert_eq!(diff(&old, &new), vec![Splice::new(2, letters("c"), 1)]);

        let new = letters("abcdef");
        assert_eq!(diff(&old, &new), vec![Splice::new(5, vec![], 1)]);

        let new = letters("bcde");
        assert_eq!(diff(&old, &new), vec![Splice::new(0, letters("a"), 0)]);

        assert!(diff(&old, &old).is_empty());
    }

    #[test]
    fn projection_drops_same_value_update_and_tightens_sort() {
        let current = numbers(&[1, 2, 3, 5]);
        let object = Value::Null;
        let records = vec![
            // Position 0 rewritten to its original value.
            ChangeRecord::new(
                object.clone(),
                ChangeKind::Update {
                    name: Key::Index(0),
                    old_value: Value::from(1),
                },
            ),
        ];
        assert!(project_splices(&current, &records).is_empty());

        // A sort that only swapped the last two elements.
        let records = vec![ChangeRecord::new(
            object,
            ChangeKind::Splice(Splice::new(0, numbers(&[1, 2, 5, 3]), 4)),
        )];
        let projected = project_splices(&current, &records);
        let mut replay = numbers(&[1, 2, 5, 3]);
        apply_splices(&mut replay, &current, &projected);
        assert_eq!(replay, current);
        assert!(projected.iter().all(|s| s.index >= 2));
    }

    #[test]
    fn apply_splices_replays_merged_list() {
        let original = letters("abcdefghij");
        let current = letters("abcABC012j");
        let splices = vec![Splice::new(3, letters("defghi"), 6)];

        let mut replay = original.clone();
        apply_splices(&mut replay, &current, &splices);
        assert_eq!(replay, current);
        assert_eq!(undo(&current, &splices), original);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(i32),
        Pop,
        Shift,
        Unshift(i32),
        Splice(usize, usize, Vec<i32>),
        Set(usize, i32),
        SetLength(usize),
        Sort,
        Reverse,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..20i32).prop_map(Op::Push),
            Just(Op::Pop),
            Just(Op::Shift),
            (0..20i32).prop_map(Op::Unshift),
            (0..12usize, 0..4usize, prop::collection::vec(0..20i32, 0..4))
                .prop_map(|(i, n, items)| Op::Splice(i, n, items)),
            (0..12usize, 0..20i32).prop_map(|(i, v)| Op::Set(i, v)),
            (0..12usize).prop_map(Op::SetLength),
            Just(Op::Sort),
            Just(Op::Reverse),
        ]
    }

    fn run(array: &ObservableArray, op: Op) {
        match op {
            Op::Push(v) => {
                array.push(v);
            }
            Op::Pop => {
                array.pop();
            }
            Op::Shift => {
                array.shift();
            }
            Op::Unshift(v) => {
                array.unshift([Value::from(v)]);
            }
            Op::Splice(i, n, items) => {
                array.splice(i, n, numbers(&items));
            }
            Op::Set(i, v) => {
                array.set(i, v);
            }
            Op::SetLength(len) => {
                array.set_length(len);
            }
            Op::Sort => array.sort(),
            Op::Reverse => array.reverse(),
        }
    }

    proptest! {
        #[test]
        fn merged_splices_replay_to_final_array(
            initial in prop::collection::vec(0..20i32, 0..8),
            ops in prop::collection::vec(op(), 1..12),
        ) {
            let scheduler = Scheduler::new();
            let original = numbers(&initial);
            let array = ObservableArray::from(original.clone());
            let log = Rc::new(RefCell::new(Vec::new()));
            let log_clone = log.clone();
            let callback = ChangeCallback::new(&scheduler, move |records: &[ChangeRecord]| {
                log_clone.borrow_mut().extend_from_slice(records);
            });
            let _subscription = array.observe(&callback, AcceptTypes::ARRAY);

            for op in ops {
                run(&array, op);
            }
            scheduler.flush();

            let current = array.to_vec();
            let merged = merge_records(&log.borrow());

            let mut replay = original.clone();
            apply_splices(&mut replay, &current, &merged);
            prop_assert_eq!(&replay, &current);
            prop_assert_eq!(undo(&current, &merged), original.clone());

            for pair in merged.windows(2) {
                prop_assert!(pair[0].index + pair[0].added_count <= pair[1].index);
            }

            let projected = project_splices(&current, &log.borrow());
            let mut replay = original;
            apply_splices(&mut replay, &current, &projected);
            prop_assert_eq!(replay, current);
        }

        #[test]
        fn diff_replays(
            old in prop::collection::vec(0..5i32, 0..10),
            new in prop::collection::vec(0..5i32, 0..10),
        ) {
            let old = numbers(&old);
            let new = numbers(&new);
            let splices = diff(&old, &new);
            let mut replay = old;
            apply_splices(&mut replay, &new, &splices);
            prop_assert_eq!(replay, new);
        }
    }
}
