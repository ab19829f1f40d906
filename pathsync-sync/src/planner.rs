//! Action planner: turns per-path actions into an executable order.
//!
//! Ordering rules:
//! 1. Deletions run first, deepest path first, so folders are emptied before
//!    they are removed and a delete always precedes a recreate of the same
//!    path.
//! 2. Creations (uploads and downloads) follow in path order, so a folder is
//!    created before anything inside it.
//! 3. Conflicts and index-only bookkeeping are set aside; they never block
//!    an executable step.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use pathsync_core::RelPath;

use crate::reconcile::{Action, ActionKind, Conflict};

/// Ordered sync plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Transfers and deletions, in execution order.
    pub steps: Vec<Action>,
    /// Paths waiting for an external decision.
    pub conflicts: Vec<Conflict>,
    /// `NoOp` and `RemoveFromIndex` entries; they only touch the manifest.
    pub bookkeeping: Vec<Action>,
}

impl Plan {
    /// `true` when nothing needs to be transferred, deleted or decided.
    pub fn is_settled(&self) -> bool {
        self.steps.is_empty()
            && self.conflicts.is_empty()
            && self
                .bookkeeping
                .iter()
                .all(|a| matches!(a, Action::NoOp { .. }))
    }

    /// Number of planned actions of each kind.
    pub fn counts(&self) -> BTreeMap<ActionKind, usize> {
        let mut counts = BTreeMap::new();
        for action in self.steps.iter().chain(&self.bookkeeping) {
            *counts.entry(action.kind()).or_insert(0) += 1;
        }
        if !self.conflicts.is_empty() {
            counts.insert(ActionKind::Conflict, self.conflicts.len());
        }
        counts
    }

    /// Split `steps` into stages that are safe to run concurrently.
    ///
    /// No two steps in one stage are the same path or ancestor/descendant of
    /// each other, and related steps keep their relative order across
    /// stages. Unrelated steps go into the earliest stage possible.
    pub fn stages(&self) -> Vec<Vec<Action>> {
        let mut stages: Vec<Vec<Action>> = Vec::new();
        // Last stage index that touched each path.
        let mut placed: BTreeMap<String, usize> = BTreeMap::new();

        for step in &self.steps {
            let path = step.path();
            let mut after: Option<usize> = placed.get(path.as_str()).copied();
            for ancestor in path.ancestors() {
                if let Some(&stage) = placed.get(ancestor.as_str()) {
                    after = Some(after.map_or(stage, |a| a.max(stage)));
                }
            }
            if let Some(stage) = latest_descendant_stage(&placed, path) {
                after = Some(after.map_or(stage, |a| a.max(stage)));
            }

            let stage = after.map_or(0, |a| a + 1);
            if stage == stages.len() {
                stages.push(Vec::new());
            }
            stages[stage].push(step.clone());
            placed.insert(path.as_str().to_string(), stage);
        }
        stages
    }
}

fn latest_descendant_stage(placed: &BTreeMap<String, usize>, path: &RelPath) -> Option<usize> {
    // Every descendant key sorts within ["<path>/", "<path>0"), '0' being '/' + 1.
    let lower = format!("{}/", path.as_str());
    let upper = format!("{}0", path.as_str());
    placed.range(lower..upper).map(|(_, &stage)| stage).max()
}

fn component_order(a: &RelPath, b: &RelPath) -> Ordering {
    a.as_str().split('/').cmp(b.as_str().split('/'))
}

/// Build a [`Plan`] from reconciler (or resolver) output.
pub fn plan(actions: Vec<Action>) -> Plan {
    let mut deletions = Vec::new();
    let mut creations = Vec::new();
    let mut plan = Plan::default();

    for action in actions {
        match action {
            Action::Conflict(conflict) => plan.conflicts.push(conflict),
            Action::NoOp { .. } | Action::RemoveFromIndex { .. } => plan.bookkeeping.push(action),
            Action::DeleteLocal { .. } | Action::DeleteRemote { .. } => deletions.push(action),
            Action::Upload { .. } | Action::Download { .. } => creations.push(action),
        }
    }

    // Deepest first; ties broken by reverse path order for determinism.
    deletions.sort_by(|a, b| {
        b.path()
            .depth()
            .cmp(&a.path().depth())
            .then_with(|| component_order(b.path(), a.path()))
    });
    // Component-wise order places every folder before its contents.
    creations.sort_by(|a, b| component_order(a.path(), b.path()));
    plan.conflicts.sort_by(|a, b| a.path.cmp(&b.path));
    plan.bookkeeping.sort_by(|a, b| a.path().cmp(b.path()));

    plan.steps = deletions;
    plan.steps.extend(creations);

    tracing::debug!(
        "planned {} steps, {} conflicts, {} bookkeeping entries",
        plan.steps.len(),
        plan.conflicts.len(),
        plan.bookkeeping.len()
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ConflictKind;
    use pathsync_core::PathRecord;

    fn rel(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    fn upload(s: &str) -> Action {
        Action::Upload { path: rel(s), local: PathRecord::file(rel(s), "aa", 1, None) }
    }

    fn upload_dir(s: &str) -> Action {
        Action::Upload { path: rel(s), local: PathRecord::directory(rel(s), None) }
    }

    fn paths(actions: &[Action]) -> Vec<String> {
        actions.iter().map(|a| format!("{}:{}", a.kind(), a.path())).collect()
    }

    #[test]
    fn folders_are_created_before_their_contents() {
        let plan = plan(vec![upload("a/b/c.txt"), upload_dir("a/b"), upload("a.txt"), upload_dir("a")]);
        assert_eq!(
            paths(&plan.steps),
            vec!["upload:a", "upload:a/b", "upload:a/b/c.txt", "upload:a.txt"]
        );
    }

    #[test]
    fn deletions_come_first_deepest_first() {
        let plan = plan(vec![
            upload("x.txt"),
            Action::DeleteLocal { path: rel("d") },
            Action::DeleteLocal { path: rel("d/e/f.txt") },
            Action::DeleteLocal { path: rel("d/e") },
        ]);
        assert_eq!(
            paths(&plan.steps),
            vec!["delete-local:d/e/f.txt", "delete-local:d/e", "delete-local:d", "upload:x.txt"]
        );
    }

    #[test]
    fn delete_precedes_recreate_at_same_path() {
        let plan = plan(vec![upload("same.txt"), Action::DeleteRemote { path: rel("same.txt") }]);
        assert_eq!(paths(&plan.steps), vec!["delete-remote:same.txt", "upload:same.txt"]);

        let stages = plan.stages();
        assert_eq!(stages.len(), 2, "same-path steps must not share a stage");
    }

    #[test]
    fn conflicts_and_bookkeeping_are_set_aside() {
        let conflict = Action::Conflict(Conflict {
            path: rel("c.txt"),
            kind: ConflictKind::BothModified,
            index: None,
            local: None,
            remote: None,
        });
        let plan = plan(vec![
            conflict,
            upload("u.txt"),
            Action::NoOp { path: rel("n.txt"), record: None },
            Action::RemoveFromIndex { path: rel("r.txt") },
        ]);
        assert_eq!(paths(&plan.steps), vec!["upload:u.txt"]);
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.bookkeeping.len(), 2);
        assert!(!plan.is_settled());
        assert_eq!(plan.counts()[&ActionKind::Conflict], 1);
    }

    #[test]
    fn unrelated_paths_share_a_stage() {
        let plan = plan(vec![upload("a.txt"), upload("b.txt"), upload("c/d.txt")]);
        let stages = plan.stages();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].len(), 3);
    }

    #[test]
    fn stages_respect_ancestry() {
        let plan = plan(vec![
            upload_dir("a"),
            upload_dir("a/b"),
            upload("a/b/c.txt"),
            upload("a/x.txt"),
            upload("ab.txt"),
        ]);
        let stages = plan.stages();
        let stage_of = |p: &str| {
            stages
                .iter()
                .position(|s| s.iter().any(|a| a.path().as_str() == p))
                .unwrap()
        };
        assert!(stage_of("a") < stage_of("a/b"));
        assert!(stage_of("a/b") < stage_of("a/b/c.txt"));
        assert!(stage_of("a") < stage_of("a/x.txt"));
        assert_eq!(stage_of("ab.txt"), 0, "sibling prefix is not a descendant");

        for stage in &stages {
            for (i, x) in stage.iter().enumerate() {
                for y in &stage[i + 1..] {
                    assert!(!x.path().is_related_to(y.path()), "{} vs {}", x.path(), y.path());
                }
            }
        }
    }

    #[test]
    fn parent_delete_waits_for_child_deletes() {
        let plan = plan(vec![
            Action::DeleteRemote { path: rel("d") },
            Action::DeleteRemote { path: rel("d/1.txt") },
            Action::DeleteRemote { path: rel("d/2.txt") },
        ]);
        let stages = plan.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].len(), 2);
        assert_eq!(stages[1][0].path(), &rel("d"));
    }

    #[test]
    fn empty_plan_is_settled() {
        let plan = plan(vec![Action::NoOp { path: rel("a"), record: None }]);
        assert!(plan.is_settled());
        assert!(plan.stages().is_empty());
    }
}
