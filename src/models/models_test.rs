use std::collections::BTreeSet;

use anyhow::Result;
use maplit::btreeset;

use crate::models::{self, Assignment, Datastream, DatastreamGroup, DatastreamTask, SourcePartition};

#[test]
fn task_identity_ignores_partitions() -> Result<()> {
    let group = DatastreamGroup::new("ds0", vec![Datastream::new("ds0")]);
    let task = DatastreamTask::new(&group);
    let moved = task.with_partitions(btreeset! {"p1".to_string(), "p2".to_string()});

    assert_eq!(task, moved, "expected tasks with the same prefix & id to compare equal");
    assert_eq!(moved.id(), task.id(), "expected id to be carried over, got {} vs {}", moved.id(), task.id());
    assert!(task.partitions().is_empty(), "expected original task to be left untouched, got {:?}", task.partitions());
    assert_eq!(moved.partitions().len(), 2, "expected 2 partitions, got {:?}", moved.partitions());

    Ok(())
}

#[test]
fn fresh_tasks_get_distinct_ids() -> Result<()> {
    let group = DatastreamGroup::new("ds0", vec![Datastream::new("ds0"), Datastream::new("ds0-dup")]);
    let (t1, t2) = (DatastreamTask::new(&group), DatastreamTask::new(&group));

    assert_ne!(t1, t2, "expected fresh tasks to have distinct identities");
    assert_eq!(t1.task_prefix(), "ds0", "unexpected task prefix {}", t1.task_prefix());
    assert_eq!(t1.datastreams(), &["ds0".to_string(), "ds0-dup".to_string()], "unexpected datastreams {:?}", t1.datastreams());

    Ok(())
}

#[test]
fn source_partition_display_and_equality() -> Result<()> {
    let sp = SourcePartition::new("topic", 3);

    assert_eq!(sp.to_string(), "topic-3", "unexpected display form {}", sp);
    assert_eq!(sp, SourcePartition::new("topic", 3));
    assert_ne!(sp, SourcePartition::new("topic", 4));
    assert_ne!(sp, SourcePartition::new("other", 3));

    Ok(())
}

#[test]
fn instance_of_finds_owning_instance() -> Result<()> {
    let group = DatastreamGroup::new("ds0", vec![Datastream::new("ds0")]);
    let (t1, t2) = (DatastreamTask::new(&group), DatastreamTask::new(&group));
    let mut assignment = Assignment::new();
    assignment.insert("i1".into(), btreeset! {t1.clone()});
    assignment.insert("i2".into(), btreeset! {t2.clone()});
    assignment.insert("i3".into(), BTreeSet::new());

    assert_eq!(models::instance_of(&assignment, t1.task_id()), Some("i1"));
    assert_eq!(models::instance_of(&assignment, t2.task_id()), Some("i2"));
    assert_eq!(models::task_count(&assignment), 2, "unexpected task count");

    Ok(())
}
