//! Position maintenance for collection memberships.
//!
//! Positions are non-negative, unique per collection, and dense after any
//! append/move/reorder. Removal does not renumber: position is a stable
//! sort key, so every computation here works off the stored values
//! (`max + 1`, never row count) and never assumes contiguity.
//!
//! These helpers run over a borrowed connection so callers control the
//! transaction boundary; a mid-sequence failure rolls the whole mutation
//! back.

use super::error::{StoreError, StoreResult};
use super::models::MoveOutcome;
use rusqlite::{params, Connection};
use std::collections::HashSet;

/// Membership rows for a collection, ascending by position. The sort is
/// explicit: storage iteration order is never trusted.
pub(crate) fn member_positions(
    conn: &Connection,
    collection_id: i64,
) -> StoreResult<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT lecture_id, position FROM collection_lectures
         WHERE collection_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map(params![collection_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn ordered_lecture_ids(conn: &Connection, collection_id: i64) -> StoreResult<Vec<i64>> {
    Ok(member_positions(conn, collection_id)?
        .into_iter()
        .map(|(lecture_id, _)| lecture_id)
        .collect())
}

pub(crate) fn is_member(conn: &Connection, collection_id: i64, lecture_id: i64) -> StoreResult<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM collection_lectures WHERE collection_id = ?1 AND lecture_id = ?2",
    )?;
    Ok(stmt.exists(params![collection_id, lecture_id])?)
}

fn max_position(conn: &Connection, collection_id: i64) -> StoreResult<Option<i64>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM collection_lectures WHERE collection_id = ?1",
        params![collection_id],
        |r| r.get(0),
    )?;
    Ok(max)
}

/// Insert a membership row at an explicit position. Used by the importer,
/// which replays recorded snapshot positions.
pub(crate) fn insert_member_at(
    conn: &Connection,
    collection_id: i64,
    lecture_id: i64,
    position: i64,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO collection_lectures (collection_id, lecture_id, position)
         VALUES (?1, ?2, ?3)",
        params![collection_id, lecture_id, position],
    )?;
    Ok(())
}

/// Bulk-add lectures to the end of a collection, preserving submission
/// order. IDs that are already members (or repeated in the request) are
/// rejected before any write.
pub(crate) fn append_lectures(
    conn: &Connection,
    collection_id: i64,
    lecture_ids: &[i64],
) -> StoreResult<usize> {
    let mut seen = HashSet::new();
    for lecture_id in lecture_ids {
        if !seen.insert(*lecture_id) {
            return Err(StoreError::Validation(format!(
                "lecture {} appears more than once in the request",
                lecture_id
            )));
        }
        if is_member(conn, collection_id, *lecture_id)? {
            return Err(StoreError::Validation(format!(
                "lecture {} is already in the collection",
                lecture_id
            )));
        }
    }

    let base = max_position(conn, collection_id)?.map_or(0, |max| max + 1);
    for (offset, lecture_id) in lecture_ids.iter().enumerate() {
        insert_member_at(conn, collection_id, *lecture_id, base + offset as i64)?;
    }
    Ok(lecture_ids.len())
}

/// Move one lecture to a new 0-based position, shifting the band of
/// members between the old and new slots. The band shifts first and the
/// target moves last, so positions stay unique even though rows update
/// one at a time.
pub(crate) fn move_lecture(
    conn: &Connection,
    collection_id: i64,
    lecture_id: i64,
    new_position: i64,
) -> StoreResult<MoveOutcome> {
    let members = member_positions(conn, collection_id)?;
    let current_position = members
        .iter()
        .find(|(id, _)| *id == lecture_id)
        .map(|(_, position)| *position)
        .ok_or_else(|| {
            StoreError::MembershipMismatch(format!(
                "lecture {} is not in the collection",
                lecture_id
            ))
        })?;

    if new_position < 0 || new_position >= members.len() as i64 {
        return Err(StoreError::Validation(format!(
            "position {} out of range 0..{}",
            new_position,
            members.len()
        )));
    }

    if new_position == current_position {
        return Ok(MoveOutcome::Unchanged);
    }

    if current_position < new_position {
        // Moving later: the band (current, new] shifts one slot earlier
        conn.execute(
            "UPDATE collection_lectures SET position = position - 1
             WHERE collection_id = ?1 AND position > ?2 AND position <= ?3",
            params![collection_id, current_position, new_position],
        )?;
    } else {
        // Moving earlier: the band [new, current) shifts one slot later
        conn.execute(
            "UPDATE collection_lectures SET position = position + 1
             WHERE collection_id = ?1 AND position >= ?2 AND position < ?3",
            params![collection_id, new_position, current_position],
        )?;
    }

    conn.execute(
        "UPDATE collection_lectures SET position = ?3
         WHERE collection_id = ?1 AND lecture_id = ?2",
        params![collection_id, lecture_id, new_position],
    )?;

    Ok(MoveOutcome::Moved)
}

/// Rewrite the full ordering from the supplied list. The list must be
/// exactly the current membership set; anything else is rejected before
/// any write.
pub(crate) fn reorder(
    conn: &Connection,
    collection_id: i64,
    lecture_ids: &[i64],
) -> StoreResult<()> {
    let current: HashSet<i64> = ordered_lecture_ids(conn, collection_id)?
        .into_iter()
        .collect();
    let supplied: HashSet<i64> = lecture_ids.iter().copied().collect();

    if supplied.len() != lecture_ids.len() {
        return Err(StoreError::MembershipMismatch(
            "reorder list contains duplicate lecture ids".to_string(),
        ));
    }
    if supplied != current {
        return Err(StoreError::MembershipMismatch(format!(
            "reorder list does not match collection content ({} supplied, {} members)",
            lecture_ids.len(),
            current.len()
        )));
    }

    for (position, lecture_id) in lecture_ids.iter().enumerate() {
        conn.execute(
            "UPDATE collection_lectures SET position = ?3
             WHERE collection_id = ?1 AND lecture_id = ?2",
            params![collection_id, lecture_id, position as i64],
        )?;
    }
    Ok(())
}

/// Delete one membership row. Remaining positions are left as they are:
/// gaps after removal are tolerated by every other operation.
pub(crate) fn remove_lecture(
    conn: &Connection,
    collection_id: i64,
    lecture_id: i64,
) -> StoreResult<bool> {
    let affected = conn.execute(
        "DELETE FROM collection_lectures WHERE collection_id = ?1 AND lecture_id = ?2",
        params![collection_id, lecture_id],
    )?;
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::CATALOG_VERSIONED_SCHEMAS;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS.last().unwrap().create(&conn).unwrap();
        conn.execute(
            "INSERT INTO collections (name, created_at) VALUES ('c', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        for i in 0..6 {
            conn.execute(
                "INSERT INTO lectures (title, youtube_id, publish_date)
                 VALUES (?1, ?2, '2024-01-01T00:00:00+00:00')",
                params![format!("lecture {}", i), format!("video-{:06}", i)],
            )
            .unwrap();
        }
        conn
    }

    fn positions_of(conn: &Connection) -> Vec<(i64, i64)> {
        member_positions(conn, 1).unwrap()
    }

    fn assert_dense(conn: &Connection) {
        let members = positions_of(conn);
        let positions: Vec<i64> = members.iter().map(|(_, p)| *p).collect();
        let expected: Vec<i64> = (0..members.len() as i64).collect();
        assert_eq!(positions, expected);
    }

    #[test]
    fn append_assigns_dense_positions_in_order() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[3, 1, 2]).unwrap();
        assert_eq!(positions_of(&conn), vec![(3, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn append_rejects_existing_member() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2]).unwrap();
        let err = append_lectures(&conn, 1, &[3, 2]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        // Nothing written
        assert_eq!(positions_of(&conn).len(), 2);
    }

    #[test]
    fn append_rejects_duplicate_in_request() {
        let conn = test_conn();
        let err = append_lectures(&conn, 1, &[1, 1]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn move_later_shifts_band_down() {
        // [1:0, 2:1, 3:2, 4:3], move 1 -> 2 gives [2:0, 3:1, 1:2, 4:3]
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2, 3, 4]).unwrap();
        assert_eq!(move_lecture(&conn, 1, 1, 2).unwrap(), MoveOutcome::Moved);
        assert_eq!(positions_of(&conn), vec![(2, 0), (3, 1), (1, 2), (4, 3)]);
    }

    #[test]
    fn move_earlier_shifts_band_up() {
        // [1:0, 2:1, 3:2, 4:3], move 4 -> 0 gives [4:0, 1:1, 2:2, 3:3]
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2, 3, 4]).unwrap();
        assert_eq!(move_lecture(&conn, 1, 4, 0).unwrap(), MoveOutcome::Moved);
        assert_eq!(positions_of(&conn), vec![(4, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn move_to_same_position_is_noop() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2, 3]).unwrap();
        let before = positions_of(&conn);
        assert_eq!(move_lecture(&conn, 1, 2, 1).unwrap(), MoveOutcome::Unchanged);
        assert_eq!(positions_of(&conn), before);
    }

    #[test]
    fn move_rejects_out_of_range_target() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2, 3]).unwrap();
        assert!(matches!(
            move_lecture(&conn, 1, 1, 3).unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            move_lecture(&conn, 1, 1, -1).unwrap_err(),
            StoreError::Validation(_)
        ));
    }

    #[test]
    fn move_rejects_non_member() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2]).unwrap();
        assert!(matches!(
            move_lecture(&conn, 1, 5, 0).unwrap_err(),
            StoreError::MembershipMismatch(_)
        ));
    }

    #[test]
    fn reorder_rewrites_all_positions() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2, 3, 4]).unwrap();
        reorder(&conn, 1, &[4, 2, 1, 3]).unwrap();
        assert_eq!(positions_of(&conn), vec![(4, 0), (2, 1), (1, 2), (3, 3)]);
    }

    #[test]
    fn reorder_rejects_mismatched_sets() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2, 3]).unwrap();
        let before = positions_of(&conn);

        // Extra id
        assert!(matches!(
            reorder(&conn, 1, &[1, 2, 3, 4]).unwrap_err(),
            StoreError::MembershipMismatch(_)
        ));
        // Missing id
        assert!(matches!(
            reorder(&conn, 1, &[1, 2]).unwrap_err(),
            StoreError::MembershipMismatch(_)
        ));
        // Duplicate id
        assert!(matches!(
            reorder(&conn, 1, &[1, 2, 2]).unwrap_err(),
            StoreError::MembershipMismatch(_)
        ));

        assert_eq!(positions_of(&conn), before);
    }

    #[test]
    fn remove_leaves_gap_and_append_uses_max_plus_one() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1, 2, 3]).unwrap();
        assert!(remove_lecture(&conn, 1, 2).unwrap());

        // Gap at position 1 is tolerated
        assert_eq!(positions_of(&conn), vec![(1, 0), (3, 2)]);

        // New members land after the highest position, not at the count
        append_lectures(&conn, 1, &[4]).unwrap();
        assert_eq!(positions_of(&conn), vec![(1, 0), (3, 2), (4, 3)]);
    }

    #[test]
    fn remove_missing_member_reports_false() {
        let conn = test_conn();
        append_lectures(&conn, 1, &[1]).unwrap();
        assert!(!remove_lecture(&conn, 1, 5).unwrap());
    }

    #[test]
    fn density_invariant_holds_across_mutation_sequence() {
        let conn = test_conn();

        append_lectures(&conn, 1, &[1, 2]).unwrap();
        assert_dense(&conn);

        append_lectures(&conn, 1, &[3, 4, 5]).unwrap();
        assert_dense(&conn);

        move_lecture(&conn, 1, 1, 4).unwrap();
        assert_dense(&conn);

        move_lecture(&conn, 1, 5, 0).unwrap();
        assert_dense(&conn);

        reorder(&conn, 1, &[2, 4, 1, 5, 3]).unwrap();
        assert_dense(&conn);

        move_lecture(&conn, 1, 3, 2).unwrap();
        assert_dense(&conn);
    }
}
