//! Event taxonomy built from flat marker labels.
//!
//! Labels follow the convention `<phase>_<sub-phase>[-_]<detail>`, e.g.
//! `ast_stim-control_rain.wav`. Every unique label receives a dense integer
//! id in lexicographic order, so the mapping does not depend on the order
//! markers were recorded in.
//!
//! Labels of a *split* phase are further grouped per sub-phase into
//! `neutral` (label contains the control marker), `trigger` (everything
//! else) and `all`.
use std::collections::{BTreeMap, BTreeSet};

use crate::config::Disposition;

/// Label → id map for one group of labels.
pub type LabelIds = BTreeMap<String, i32>;

/// Whether `label` denotes a neutral (control) stimulus.
///
/// Case-insensitive substring test on `control_marker`. All
/// neutral/trigger decisions go through this one predicate.
pub fn is_neutral(label: &str, control_marker: &str) -> bool {
    label.to_lowercase().contains(&control_marker.to_lowercase())
}

/// Neutral / trigger partition of one sub-phase. `neutral` and `trigger`
/// are disjoint and their union is `all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispositionSplit {
    pub neutral: LabelIds,
    pub trigger: LabelIds,
    pub all: LabelIds,
}

impl DispositionSplit {
    pub fn get(&self, disposition: Disposition) -> &LabelIds {
        match disposition {
            Disposition::Neutral => &self.neutral,
            Disposition::Trigger => &self.trigger,
        }
    }
}

/// Grouping of the labels that start with one phase prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseGroup {
    /// All labels of the phase, no further structure.
    Flat(LabelIds),
    /// Sub-phase → disposition split.
    Split(BTreeMap<String, DispositionSplit>),
}

/// Which phases to group and how.
#[derive(Debug, Clone)]
pub struct TaxonomySpec<'a> {
    pub phases: &'a [String],
    pub split_phases: &'a [String],
    pub sub_phases: &'a [String],
    pub control_marker: &'a str,
}

/// Immutable per-session taxonomy: label ↔ id bijection plus groupings.
#[derive(Debug, Clone, PartialEq)]
pub struct Taxonomy {
    ids: LabelIds,
    labels: Vec<String>,
    groups: BTreeMap<String, PhaseGroup>,
}

impl Taxonomy {
    /// Build the taxonomy from every marker label of a session.
    pub fn build<S: AsRef<str>>(labels: &[S], spec: &TaxonomySpec<'_>) -> Self {
        let unique: BTreeSet<&str> = labels.iter().map(AsRef::as_ref).collect();
        let labels: Vec<String> = unique.into_iter().map(str::to_string).collect();
        let ids: LabelIds = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i as i32))
            .collect();

        let with_prefix = |prefix: &str| -> LabelIds {
            ids.iter()
                .filter(|(l, _)| l.starts_with(prefix))
                .map(|(l, &id)| (l.clone(), id))
                .collect()
        };

        let mut groups = BTreeMap::new();
        for phase in spec.phases {
            let group = if spec.split_phases.contains(phase) {
                let split = spec
                    .sub_phases
                    .iter()
                    .map(|sub| {
                        let all = with_prefix(&format!("{phase}_{sub}"));
                        let (neutral, trigger): (LabelIds, LabelIds) = all
                            .iter()
                            .map(|(l, &id)| (l.clone(), id))
                            .partition(|(l, _)| is_neutral(l, spec.control_marker));
                        (sub.clone(), DispositionSplit { neutral, trigger, all })
                    })
                    .collect();
                PhaseGroup::Split(split)
            } else {
                PhaseGroup::Flat(with_prefix(phase))
            };
            groups.insert(phase.clone(), group);
        }

        log::debug!("taxonomy: {} unique labels, {} phase groups", labels.len(), groups.len());
        Self { ids, labels, groups }
    }

    /// Dense id of `label`.
    pub fn id(&self, label: &str) -> Option<i32> {
        self.ids.get(label).copied()
    }

    /// Label text of `id` (inverse of [`Taxonomy::id`]).
    pub fn label(&self, id: i32) -> Option<&str> {
        usize::try_from(id).ok().and_then(|i| self.labels.get(i)).map(String::as_str)
    }

    pub fn ids(&self) -> &LabelIds {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn group(&self, phase: &str) -> Option<&PhaseGroup> {
        self.groups.get(phase)
    }

    /// Labels of `phase`/`sub_phase` with the given disposition. `None`
    /// when the phase is unknown, not split, or the sub-phase is not
    /// configured; an empty map when nothing matched.
    pub fn split(&self, phase: &str, sub_phase: &str, disposition: Disposition) -> Option<&LabelIds> {
        match self.groups.get(phase)? {
            PhaseGroup::Split(subs) => subs.get(sub_phase).map(|s| s.get(disposition)),
            PhaseGroup::Flat(_) => None,
        }
    }
}

/// Labels starting with `prefix` that occur in every one of `sessions`.
pub fn common_labels<S: AsRef<str>>(sessions: &[Vec<S>], prefix: &str) -> BTreeSet<String> {
    let mut sets = sessions.iter().map(|labels| {
        labels
            .iter()
            .map(AsRef::as_ref)
            .filter(|l| l.starts_with(prefix))
            .map(str::to_string)
            .collect::<BTreeSet<String>>()
    });
    let Some(first) = sets.next() else {
        return BTreeSet::new();
    };
    sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_owned() -> (Vec<String>, Vec<String>, Vec<String>) {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        (s(&["pmt", "ast"]), s(&["ast"]), s(&["prestim", "stim", "poststim"]))
    }

    fn build(labels: &[&str]) -> Taxonomy {
        let (phases, split, subs) = spec_owned();
        let spec = TaxonomySpec {
            phases: &phases,
            split_phases: &split,
            sub_phases: &subs,
            control_marker: "control",
        };
        Taxonomy::build(labels, &spec)
    }

    #[test]
    fn ids_follow_sorted_order() {
        let t = build(&["b", "a", "c", "a"]);
        assert_eq!(t.id("a"), Some(0));
        assert_eq!(t.id("b"), Some(1));
        assert_eq!(t.id("c"), Some(2));
        assert_eq!(t.label(2), Some("c"));
        assert_eq!(t.label(3), None);
        assert_eq!(t.label(-1), None);
    }

    #[test]
    fn neutral_predicate_is_case_insensitive() {
        assert!(is_neutral("ast_stim-Control_rain", "control"));
        assert!(!is_neutral("ast_stim-chewing", "control"));
    }

    #[test]
    fn unmatched_label_gets_id_but_no_group() {
        let t = build(&["range-black", "pmt_stim"]);
        assert!(t.id("range-black").is_some());
        match t.group("pmt").unwrap() {
            PhaseGroup::Flat(m) => assert_eq!(m.keys().collect::<Vec<_>>(), vec!["pmt_stim"]),
            other => panic!("expected flat group, got {other:?}"),
        }
    }

    #[test]
    fn empty_prefix_gives_empty_group() {
        let t = build(&["pmt_stim"]);
        let neutral = t.split("ast", "stim", Disposition::Neutral).unwrap();
        assert!(neutral.is_empty());
    }

    #[test]
    fn prestim_is_not_captured_by_stim_prefix() {
        let t = build(&["ast_prestim", "ast_stim-control_a", "ast_poststim-b"]);
        let Some(PhaseGroup::Split(subs)) = t.group("ast") else {
            panic!("ast should be split");
        };
        assert_eq!(subs["stim"].all.keys().collect::<Vec<_>>(), vec!["ast_stim-control_a"]);
        assert_eq!(subs["prestim"].all.keys().collect::<Vec<_>>(), vec!["ast_prestim"]);
    }

    #[test]
    fn common_labels_intersects_sessions() {
        let sessions = vec![
            vec!["ast_stim-a", "ast_stim-b", "pmt_stim"],
            vec!["ast_stim-b", "ast_stim-c"],
        ];
        let common = common_labels(&sessions, "ast_stim");
        assert_eq!(common.into_iter().collect::<Vec<_>>(), vec!["ast_stim-b"]);
        assert!(common_labels::<&str>(&[], "ast").is_empty());
    }
}
