use crate::model::{Booking, Span};

// ── Conflict predicate ────────────────────────────────────────────
//
// Pure functions over booking slices. The engine snapshots a room's bookings
// and delegates here, so the overlap invariant is testable without storage.

/// First active booking whose interval overlaps `candidate`, if any.
///
/// Half-open semantics: a booking ending exactly at `candidate.start` does
/// not conflict. `exclude` skips one booking id — used when moving or
/// resizing a booking so it doesn't collide with itself. Cancelled bookings
/// never conflict.
pub fn find_conflict<'a>(
    existing: &'a [Booking],
    candidate: &Span,
    exclude: Option<&str>,
) -> Option<&'a Booking> {
    existing.iter().find(|b| {
        if exclude.is_some_and(|id| id == b.id) {
            return false;
        }
        b.blocks_room() && b.span.overlaps(candidate)
    })
}

/// `true` iff no active booking overlaps `candidate`.
pub fn is_available(existing: &[Booking], candidate: &Span, exclude: Option<&str>) -> bool {
    find_conflict(existing, candidate, exclude).is_none()
}

// ── Interval set algebra ─────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Subtract sorted `to_remove` intervals from sorted `base` intervals.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

/// Free slots inside `window`: the window minus every active booking's
/// interval, clamped to the window.
pub fn free_windows(bookings: &[Booking], window: &Span) -> Vec<Span> {
    let mut occupied: Vec<Span> = bookings
        .iter()
        .filter(|b| b.blocks_room() && b.span.overlaps(window))
        .map(|b| Span::new(b.span.start.max(window.start), b.span.end.min(window.end)))
        .collect();
    occupied.sort_by_key(|s| s.start);
    let occupied = merge_overlapping(&occupied);
    subtract_intervals(&[*window], &occupied)
}
