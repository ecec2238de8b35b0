//! MVCC isolation anomaly tests.
//!
//! Documents which anomalies snapshot isolation prevents and which it allows.
//!
//! ## Prevented
//! - Dirty reads (P1)
//! - Non-repeatable reads (P2)
//! - Phantom reads (P3)
//! - Lost updates (first committer wins)
//!
//! ## Allowed
//! - Write skew (A5B): disjoint writes based on overlapping reads both commit.
//!
//! References:
//! - "A Critique of ANSI SQL Isolation Levels" (Berenson et al., 1995)

#![allow(missing_docs)]

use std::time::Duration;

use graphcore::{GraphDb, GraphDbOptions, GraphError, Gid, PropertyId, PropertyValue, Result, View};

fn setup_db() -> GraphDb {
    GraphDb::new(GraphDbOptions::default().lock_timeout(Duration::from_millis(50)))
}

fn seed_vertex(db: &GraphDb, prop: PropertyId, value: i64) -> Result<Gid> {
    let dba = db.access();
    let v = dba.insert_vertex()?;
    v.props_set(prop, PropertyValue::Int(value))?;
    let gid = v.gid();
    drop(v);
    dba.commit()?;
    Ok(gid)
}

fn read_int(db: &GraphDb, gid: Gid, prop: PropertyId) -> Result<Option<i64>> {
    let dba = db.access();
    let value = match dba.find_vertex(gid, View::Old) {
        Some(v) => match v.props_at(prop)? {
            PropertyValue::Int(i) => Some(i),
            _ => None,
        },
        None => None,
    };
    dba.commit()?;
    Ok(value)
}

// ============================================================================
// ANOMALIES PREVENTED BY SNAPSHOT ISOLATION
// ============================================================================

/// P1: a reader never observes an uncommitted insert.
#[test]
fn si_prevents_dirty_read() -> Result<()> {
    let db = setup_db();
    let writer = db.access();
    let gid = writer.insert_vertex()?.gid();

    let reader = db.access();
    assert!(reader.find_vertex(gid, View::New).is_none());
    assert_eq!(reader.vertices_count(), 0);

    writer.commit()?;
    assert!(
        reader.find_vertex(gid, View::New).is_none(),
        "commit after the reader began stays invisible"
    );
    reader.commit()?;

    let late = db.access();
    assert!(late.find_vertex(gid, View::New).is_some());
    Ok(())
}

/// P2: repeated reads of one entity return the same value.
#[test]
fn si_prevents_non_repeatable_read() -> Result<()> {
    let db = setup_db();
    let balance = db.property("balance");
    let gid = seed_vertex(&db, balance, 100)?;

    let reader = db.access();
    let first = reader
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?
        .props_at(balance)?;

    {
        let writer = db.access();
        let v = writer
            .find_vertex(gid, View::Old)
            .ok_or(GraphError::NotFound("vertex"))?;
        v.props_set(balance, PropertyValue::Int(50))?;
        drop(v);
        writer.commit()?;
    }

    let second = reader
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?
        .props_at(balance)?;
    assert_eq!(first, second);
    assert_eq!(second, PropertyValue::Int(100));
    reader.commit()?;

    assert_eq!(read_int(&db, gid, balance)?, Some(50));
    Ok(())
}

/// P3: a label scan does not grow when another transaction inserts.
#[test]
fn si_prevents_phantom_read() -> Result<()> {
    let db = setup_db();
    let account = db.label("Account");
    {
        let dba = db.access();
        for _ in 0..3 {
            dba.insert_vertex()?.add_label(account)?;
        }
        dba.commit()?;
    }

    let reader = db.access();
    assert_eq!(reader.vertices_by_label(account, View::Old).len(), 3);

    {
        let writer = db.access();
        writer.insert_vertex()?.add_label(account)?;
        writer.commit()?;
    }

    assert_eq!(reader.vertices_by_label(account, View::Old).len(), 3);
    reader.commit()?;

    let fresh = db.access();
    assert_eq!(fresh.vertices_by_label(account, View::Old).len(), 4);
    Ok(())
}

/// Lost update: a concurrent writer blocks on the write intent and, once the
/// first writer commits, fails with a serialization error.
#[test]
fn si_prevents_lost_update_under_concurrency() -> Result<()> {
    let db = setup_db();
    let counter = db.property("counter");
    let gid = seed_vertex(&db, counter, 0)?;

    let first = db.access();
    let second = db.access();
    let v1 = first
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    let v2 = second
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;

    v1.props_set(counter, PropertyValue::Int(1))?;
    let blocked = v2.props_set(counter, PropertyValue::Int(1));
    assert!(matches!(blocked, Err(GraphError::LockTimeout { .. })));
    assert!(blocked.as_ref().is_err_and(GraphError::is_retryable));

    drop(v1);
    first.commit()?;

    let retried = v2.props_set(counter, PropertyValue::Int(1));
    assert!(matches!(retried, Err(GraphError::Serialization { .. })));
    drop(v2);
    assert!(matches!(second.commit(), Err(GraphError::Serialization { .. })));

    assert_eq!(read_int(&db, gid, counter)?, Some(1));
    Ok(())
}

/// First committer wins even when the loser touches the entity only after
/// the winner committed.
#[test]
fn si_first_committer_wins_sequential() -> Result<()> {
    let db = setup_db();
    let counter = db.property("counter");
    let gid = seed_vertex(&db, counter, 0)?;

    let loser = db.access();
    {
        let winner = db.access();
        let v = winner
            .find_vertex(gid, View::Old)
            .ok_or(GraphError::NotFound("vertex"))?;
        v.props_set(counter, PropertyValue::Int(10))?;
        drop(v);
        winner.commit()?;
    }

    let v = loser
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    assert_eq!(v.props_at(counter)?, PropertyValue::Int(0));
    let err = v.props_set(counter, PropertyValue::Int(20));
    assert!(matches!(err, Err(GraphError::Serialization { .. })));
    drop(v);
    loser.abort()?;

    assert_eq!(read_int(&db, gid, counter)?, Some(10));
    Ok(())
}

/// Deleting an entity another transaction already updated also conflicts.
#[test]
fn concurrent_delete_conflicts() -> Result<()> {
    let db = setup_db();
    let p = db.property("p");
    let gid = seed_vertex(&db, p, 1)?;

    let deleter = db.access();
    {
        let updater = db.access();
        let v = updater
            .find_vertex(gid, View::Old)
            .ok_or(GraphError::NotFound("vertex"))?;
        v.props_set(p, PropertyValue::Int(2))?;
        drop(v);
        updater.commit()?;
    }
    let v = deleter
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    assert!(matches!(
        deleter.remove_vertex(&v),
        Err(GraphError::Serialization { .. })
    ));
    drop(v);
    deleter.abort()?;
    assert_eq!(read_int(&db, gid, p)?, Some(2));
    Ok(())
}

// ============================================================================
// ANOMALIES ALLOWED BY SNAPSHOT ISOLATION
// ============================================================================

/// A5B write skew: both transactions read both doctors as on call and each
/// takes a different one off call. Both commit.
#[test]
fn si_allows_write_skew() -> Result<()> {
    let db = setup_db();
    let on_call = db.property("on_call");
    let alice = seed_vertex(&db, on_call, 1)?;
    let bob = seed_vertex(&db, on_call, 1)?;

    let t1 = db.access();
    let t2 = db.access();
    let on_call_count = |dba: &graphcore::GraphDbAccessor<'_>| -> Result<usize> {
        let mut count = 0;
        for gid in [alice, bob] {
            if let Some(v) = dba.find_vertex(gid, View::Old) {
                if v.props_at(on_call)? == PropertyValue::Int(1) {
                    count += 1;
                }
            }
        }
        Ok(count)
    };
    assert_eq!(on_call_count(&t1)?, 2);
    assert_eq!(on_call_count(&t2)?, 2);

    t1.find_vertex(alice, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?
        .props_set(on_call, PropertyValue::Int(0))?;
    t2.find_vertex(bob, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?
        .props_set(on_call, PropertyValue::Int(0))?;
    t1.commit()?;
    t2.commit()?;

    assert_eq!(read_int(&db, alice, on_call)?, Some(0));
    assert_eq!(read_int(&db, bob, on_call)?, Some(0));
    Ok(())
}

// ============================================================================
// OWN WRITES, COMMANDS, ABORTS
// ============================================================================

#[test]
fn own_writes_follow_command_boundaries() -> Result<()> {
    let db = setup_db();
    let p = db.property("p");
    let dba = db.access();
    let v = dba.insert_vertex()?;
    let gid = v.gid();
    v.props_set(p, PropertyValue::Int(1))?;
    drop(v);

    assert!(dba.find_vertex(gid, View::Old).is_none());
    assert!(dba.find_vertex(gid, View::New).is_some());

    dba.advance_command()?;
    let v = dba
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    v.props_set(p, PropertyValue::Int(2))?;
    assert_eq!(v.props_at(p)?, PropertyValue::Int(1), "old view predates this command");
    let mut v = v;
    v.switch_new();
    assert_eq!(v.props_at(p)?, PropertyValue::Int(2));

    dba.remove_vertex(&v)?;
    assert!(matches!(v.props_at(p), Err(GraphError::RecordDeleted)));
    v.switch_old();
    assert_eq!(v.props_at(p)?, PropertyValue::Int(1));
    drop(v);
    dba.commit()?;

    let after = db.access();
    assert!(after.find_vertex(gid, View::New).is_none());
    Ok(())
}

#[test]
fn old_view_removes_label_added_in_current_command() -> Result<()> {
    let db = setup_db();
    let p = db.property("p");
    let tagged = db.label("Tagged");
    let gid = seed_vertex(&db, p, 1)?;

    let dba = db.access();
    let mut v = dba
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    assert!(v.add_label(tagged)?);
    assert!(!v.has_label(tagged)?, "old view predates the label");
    assert!(v.remove_label(tagged)?);
    assert!(!v.remove_label(tagged)?);
    v.switch_new();
    assert!(!v.has_label(tagged)?);
    drop(v);
    dba.commit()?;

    let check = db.access();
    let v = check
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    assert!(v.labels()?.is_empty());
    Ok(())
}

#[test]
fn aborted_writes_are_invisible() -> Result<()> {
    let db = setup_db();
    let p = db.property("p");
    let gid = seed_vertex(&db, p, 1)?;

    let dba = db.access();
    let v = dba
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    v.props_set(p, PropertyValue::Int(99))?;
    drop(v);
    let orphan = dba.insert_vertex()?.gid();
    dba.abort()?;

    assert_eq!(read_int(&db, gid, p)?, Some(1));
    let check = db.access();
    assert!(check.find_vertex(orphan, View::New).is_none());

    let v = check
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    v.props_set(p, PropertyValue::Int(3))?;
    drop(v);
    check.commit()?;
    assert_eq!(read_int(&db, gid, p)?, Some(3));
    Ok(())
}

#[test]
fn dropped_accessor_aborts() -> Result<()> {
    let db = setup_db();
    let gid = {
        let dba = db.access();
        let gid = dba.insert_vertex()?.gid();
        gid
    };
    assert_eq!(db.engine().active_count(), 0);
    let dba = db.access();
    assert!(dba.find_vertex(gid, View::New).is_none());
    Ok(())
}

#[test]
fn vertex_with_edges_needs_detach() -> Result<()> {
    let db = setup_db();
    let knows = db.edge_type("KNOWS");
    let dba = db.access();
    let a = dba.insert_vertex()?;
    let b = dba.insert_vertex()?;
    let e = dba.insert_edge(&a, &b, knows)?;
    let edge_gid = e.gid();
    drop(e);

    assert!(matches!(dba.remove_vertex(&a), Err(GraphError::VertexHasEdges(_))));
    assert_eq!(a.out_degree()?, 1);
    assert_eq!(b.in_degree()?, 1);
    dba.detach_remove_vertex(&a)?;
    assert!(dba.find_edge(edge_gid, View::New).is_none());
    assert_eq!(b.in_degree()?, 0);
    drop(a);
    drop(b);
    dba.commit()?;

    let after = db.access();
    assert_eq!(after.vertices_count(), 1);
    assert_eq!(after.edges_count(), 0);
    Ok(())
}
