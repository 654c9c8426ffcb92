//! Per-channel timeline reconciliation.
//!
//! Turns the programs collected for one channel into a sorted,
//! non-overlapping sequence. When two programs start at the same time,
//! the two competing chains of back-to-back programs are followed until
//! one of them breaks, and the broken chain is dropped.

use std::cmp::Ordering;

use super::store::Program;

/// Orders programs by channel name (case-insensitive), then start time.
pub fn compare_programs<'n, F>(a: &Program, b: &Program, channel_name: F) -> Ordering
where
    F: Fn(u32) -> &'n str,
{
    let by_name = if a.channel_id == b.channel_id {
        Ordering::Equal
    } else {
        let left = channel_name(a.channel_id).chars().flat_map(char::to_lowercase);
        let right = channel_name(b.channel_id).chars().flat_map(char::to_lowercase);
        left.cmp(right)
    };
    by_name.then_with(|| a.start_time.cmp(&b.start_time))
}

/// Stable sort using [`compare_programs`].
pub fn sort_programs<'n, F>(programs: &mut [Program], channel_name: F)
where
    F: Fn(u32) -> &'n str,
{
    programs.sort_by(|a, b| compare_programs(a, b, &channel_name));
}

/// Gives every zero-length program the start of its successor as end.
pub fn close_zero_length(programs: &mut [Program]) {
    let next_starts: Vec<_> = programs.iter().skip(1).map(|p| p.start_time).collect();
    for (program, next_start) in programs.iter_mut().zip(next_starts) {
        if program.start_time == program.end_time {
            program.end_time = next_start;
        }
    }
}

/// Drops programs that are still zero-length and have a successor.
#[must_use]
pub fn absorb_zero_length(programs: Vec<Program>) -> Vec<Program> {
    let last = programs.len().saturating_sub(1);
    programs
        .into_iter()
        .enumerate()
        .filter(|(i, p)| {
            let keep = *i == last || p.start_time != p.end_time;
            if !keep {
                tracing::debug!(title = %p.title, start = %p.start_time, "zero-length program absorbed");
            }
            keep
        })
        .map(|(_, p)| p)
        .collect()
}

/// Outcome of following two chains that start at the same time.
#[derive(Debug, PartialEq, Eq)]
enum SyncOutcome {
    /// The new chain broke first; these indices are dropped.
    KeepPrevious(Vec<usize>),
    /// The previous chain broke first; these indices are dropped.
    KeepNew(Vec<usize>),
    /// Neither chain broke before the end; the new chain is dropped.
    Unsynchronized(Vec<usize>),
}

/// Follows the chain starting at `prev` and the one starting at `new`.
///
/// A chain is extended by a live program starting exactly where its
/// current tail ends. A chain breaks when the other chain is extended
/// past its tail end.
#[allow(clippy::indexing_slicing)]
fn find_sync_point(programs: &[Program], alive: &[bool], prev: usize, new: usize) -> SyncOutcome {
    // indices below programs.len() == alive.len()
    let mut prev_chain = vec![prev];
    let mut new_chain = vec![new];
    let (mut prev_tail, mut new_tail) = (prev, new);

    for j in new.saturating_add(1)..programs.len() {
        if !alive[j] {
            continue;
        }
        let candidate = &programs[j];
        if programs[prev_tail].end_time == candidate.start_time {
            prev_chain.push(j);
            prev_tail = j;
            if candidate.start_time > programs[new_tail].end_time {
                return SyncOutcome::KeepPrevious(new_chain);
            }
        } else if programs[new_tail].end_time == candidate.start_time {
            new_chain.push(j);
            new_tail = j;
            if candidate.start_time > programs[prev_tail].end_time {
                return SyncOutcome::KeepNew(prev_chain);
            }
        }
    }
    SyncOutcome::Unsynchronized(new_chain)
}

/// Removes overlapping programs from a sorted sequence.
///
/// A program starting strictly inside its predecessor is dropped. Two
/// programs with equal starts are resolved with [`find_sync_point`].
#[must_use]
#[allow(clippy::indexing_slicing)]
pub fn remove_overlapping(programs: Vec<Program>) -> Vec<Program> {
    // indices below programs.len() == alive.len()
    let mut alive = vec![true; programs.len()];
    let mut prev = 0usize;
    let mut i = 1usize;

    while i < programs.len() {
        if alive[i] {
            let (current, previous) = (&programs[i], &programs[prev]);
            if current.start_time < previous.end_time {
                if current.start_time > previous.start_time {
                    tracing::debug!(
                        title = %current.title,
                        start = %current.start_time,
                        overlaps = %previous.title,
                        "overlapping program removed"
                    );
                    alive[i] = false;
                } else {
                    match find_sync_point(&programs, &alive, prev, i) {
                        SyncOutcome::KeepPrevious(dropped)
                        | SyncOutcome::Unsynchronized(dropped) => {
                            for d in dropped {
                                alive[d] = false;
                            }
                        }
                        SyncOutcome::KeepNew(dropped) => {
                            for d in dropped {
                                alive[d] = false;
                            }
                            prev = i;
                        }
                    }
                }
            } else {
                prev = i;
            }
        }
        i = i.saturating_add(1);
    }

    programs
        .into_iter()
        .zip(alive)
        .filter_map(|(p, keep)| keep.then_some(p))
        .collect()
}

/// Extends programs without a feed stop time up to their successor.
pub fn close_open_ends(programs: &mut [Program]) {
    let next_starts: Vec<_> = programs.iter().skip(1).map(|p| p.start_time).collect();
    for (program, next_start) in programs.iter_mut().zip(next_starts) {
        if !program.has_explicit_stop {
            program.end_time = next_start;
        }
    }
}

/// Full reconciliation of one channel's programs.
///
/// The result is sorted and no program starts before its predecessor
/// ends.
#[must_use]
pub fn reconcile<'n, F>(mut programs: Vec<Program>, channel_name: F) -> Vec<Program>
where
    F: Fn(u32) -> &'n str,
{
    if programs.is_empty() {
        return programs;
    }
    let before = programs.len();

    sort_programs(&mut programs, channel_name);
    close_zero_length(&mut programs);
    let mut programs = remove_overlapping(absorb_zero_length(programs));
    close_open_ends(&mut programs);

    tracing::debug!(before, after = programs.len(), "programs reconciled");
    programs
}
