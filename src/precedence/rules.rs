//! The 17-rule ordered precedence comparator.
//!
//! Grounded on `fs_lookup.c`'s `precedence_checks[]` array and
//! `precedence_comparator`: an ordered list of independent rule functions,
//! tried in sequence until one returns a non-`Equal` [`Ordering`]. This is
//! §9's "typed list of `(name, cmp_fn, explain_fn)`" design note, expressed
//! directly as a `const` slice of [`PrecedenceRule`] rather than a dynamic
//! dispatch table.

use std::cmp::Ordering;

use super::Candidate;

pub struct PrecedenceRule {
    pub name: &'static str,
    pub compare: fn(&Candidate, &Candidate) -> Ordering,
    pub explain: fn(&Candidate, &Candidate) -> Option<String>,
}

/// `Ordering::Greater` means `a` is preferred over `b`, matching the
/// convention that the precedence engine sorts candidates best-first.
fn cmp_bool_prefer_true(a: bool, b: bool) -> Ordering {
    // `true > false`, so preferring `true` is just descending bool order.
    b.cmp(&a)
}

pub const PRECEDENCE_RULES: &[PrecedenceRule] = &[
    PrecedenceRule {
        name: "disabled vs enabled",
        compare: |a, b| cmp_bool_prefer_true(!a.disabled, !b.disabled),
        explain: |a, b| {
            (a.disabled != b.disabled)
                .then(|| format!("{} over {}: one is disabled", if a.disabled { &b.display_path } else { &a.display_path }, if a.disabled { &a.display_path } else { &b.display_path }))
        },
    },
    PrecedenceRule {
        name: "special shader",
        compare: |a, b| cmp_bool_prefer_true(a.is_special_shader, b.is_special_shader),
        explain: |a, b| (a.is_special_shader != b.is_special_shader).then(|| "special shader beats plain shader".to_string()),
    },
    PrecedenceRule {
        name: "server pure-list position",
        compare: |a, b| match (a.pure_list_position, b.pure_list_position) {
            (Some(x), Some(y)) => y.cmp(&x), // lower position wins -> prefer smaller
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        },
        explain: |a, b| (a.pure_list_position != b.pure_list_position).then(|| "earlier pure-list position wins".to_string()),
    },
    PrecedenceRule {
        name: "mod-dir priority >= 2",
        compare: |a, b| {
            if a.mod_dir_rank >= 2 || b.mod_dir_rank >= 2 {
                a.mod_dir_rank.cmp(&b.mod_dir_rank)
            } else {
                Ordering::Equal
            }
        },
        explain: |a, b| (a.mod_dir_rank != b.mod_dir_rank && (a.mod_dir_rank >= 2 || b.mod_dir_rank >= 2)).then(|| "higher mod-dir priority wins".to_string()),
    },
    PrecedenceRule {
        name: "native code module vs VM bytecode",
        compare: |a, b| cmp_bool_prefer_true(a.is_native_code_module, b.is_native_code_module),
        explain: |a, b| (a.is_native_code_module != b.is_native_code_module).then(|| "native code module beats VM bytecode".to_string()),
    },
    PrecedenceRule {
        name: "system-pak rank",
        compare: |a, b| a.system_pak_rank.cmp(&b.system_pak_rank),
        explain: |a, b| (a.system_pak_rank != b.system_pak_rank).then(|| "higher system-pak rank wins".to_string()),
    },
    PrecedenceRule {
        name: "same archive as current map",
        compare: |a, b| cmp_bool_prefer_true(a.is_current_map_pak, b.is_current_map_pak),
        explain: |a, b| (a.is_current_map_pak != b.is_current_map_pak).then(|| "matches current map's archive".to_string()),
    },
    PrecedenceRule {
        name: "shader vs image",
        compare: |a, b| cmp_bool_prefer_true(a.is_shader, b.is_shader),
        explain: |a, b| (a.is_shader != b.is_shader).then(|| "shader beats plain image".to_string()),
    },
    PrecedenceRule {
        name: "mod-dir priority 1 vs 0",
        compare: |a, b| {
            if a.mod_dir_rank <= 1 && b.mod_dir_rank <= 1 {
                a.mod_dir_rank.cmp(&b.mod_dir_rank)
            } else {
                Ordering::Equal
            }
        },
        explain: |a, b| (a.mod_dir_rank != b.mod_dir_rank && a.mod_dir_rank <= 1 && b.mod_dir_rank <= 1).then(|| "basegame beats inactive mod".to_string()),
    },
    PrecedenceRule {
        name: "loose file vs archive subfile",
        compare: |a, b| cmp_bool_prefer_true(a.is_loose_file, b.is_loose_file),
        explain: |a, b| (a.is_loose_file != b.is_loose_file).then(|| "loose file beats archive subfile".to_string()),
    },
    PrecedenceRule {
        name: "download-folder",
        compare: |a, b| cmp_bool_prefer_true(!a.in_download_folder, !b.in_download_folder),
        explain: |a, b| (a.in_download_folder != b.in_download_folder).then(|| "not-in-downloads beats in-downloads".to_string()),
    },
    PrecedenceRule {
        name: "archive base-name",
        compare: |a, b| {
            let ci = a.archive_base_name.to_ascii_lowercase().cmp(&b.archive_base_name.to_ascii_lowercase());
            if ci != Ordering::Equal {
                ci
            } else {
                a.archive_base_name.cmp(&b.archive_base_name)
            }
        },
        explain: |a, b| (a.archive_base_name != b.archive_base_name).then(|| "higher-sorting archive name wins".to_string()),
    },
    PrecedenceRule {
        name: "query extension index",
        compare: |a, b| b.extension_priority.cmp(&a.extension_priority), // lower index wins
        explain: |a, b| (a.extension_priority != b.extension_priority).then(|| "earlier query extension wins".to_string()),
    },
    PrecedenceRule {
        name: "source-dir id",
        compare: |a, b| b.source_dir_id.cmp(&a.source_dir_id), // lower id wins
        explain: |a, b| (a.source_dir_id != b.source_dir_id).then(|| "lower source-dir id wins".to_string()),
    },
    PrecedenceRule {
        name: "intra-archive position",
        compare: |a, b| a.intra_archive_position.cmp(&b.intra_archive_position), // later position wins
        explain: |a, b| (a.intra_archive_position != b.intra_archive_position).then(|| "later intra-archive position wins".to_string()),
    },
    PrecedenceRule {
        name: "intra-shader-file start",
        compare: |a, b| b.intra_shader_file_start.cmp(&a.intra_shader_file_start), // earlier start wins
        explain: |a, b| (a.intra_shader_file_start != b.intra_shader_file_start).then(|| "earlier intra-shader-file offset wins".to_string()),
    },
    PrecedenceRule {
        name: "case-exact match",
        compare: |a, b| cmp_bool_prefer_true(a.case_exact_match, b.case_exact_match),
        explain: |a, b| (a.case_exact_match != b.case_exact_match).then(|| "case-exact match wins".to_string()),
    },
];

/// Run the ordered rule list, short-circuiting on the first non-`Equal`
/// result. `Ordering::Equal` at the end means no rule decided; the caller
/// breaks remaining ties with arena offset order.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    for rule in PRECEDENCE_RULES {
        let result = (rule.compare)(a, b);
        if result != Ordering::Equal {
            return result;
        }
    }
    Ordering::Equal
}

/// The name and explanation of the rule that decided between `a` and `b`,
/// if any did.
pub fn decisive_rule(a: &Candidate, b: &Candidate) -> Option<(&'static str, String)> {
    for rule in PRECEDENCE_RULES {
        if (rule.compare)(a, b) != Ordering::Equal {
            return (rule.explain)(a, b).map(|msg| (rule.name, msg));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::Candidate;

    fn base() -> Candidate {
        Candidate {
            display_path: "test".to_string(),
            disabled: false,
            is_special_shader: false,
            pure_list_position: None,
            mod_dir_rank: 1,
            is_native_code_module: false,
            system_pak_rank: 0,
            is_current_map_pak: false,
            is_shader: false,
            is_loose_file: false,
            in_download_folder: false,
            archive_base_name: String::new(),
            extension_priority: 0,
            source_dir_id: 0,
            intra_archive_position: 0,
            intra_shader_file_start: 0,
            case_exact_match: false,
            offset_tiebreak: 0,
            entry_offset: None,
        }
    }

    #[test]
    fn disabled_loses_to_enabled_regardless_of_other_fields() {
        let mut a = base();
        a.disabled = true;
        a.mod_dir_rank = 3;
        let mut b = base();
        b.mod_dir_rank = 0;
        assert_eq!(compare_candidates(&a, &b), Ordering::Less);
    }

    #[test]
    fn higher_mod_dir_rank_wins_when_both_above_threshold() {
        let mut a = base();
        a.mod_dir_rank = 3;
        let mut b = base();
        b.mod_dir_rank = 2;
        assert_eq!(compare_candidates(&a, &b), Ordering::Greater);
    }

    #[test]
    fn no_rule_decides_gives_equal() {
        let a = base();
        let b = base();
        assert_eq!(compare_candidates(&a, &b), Ordering::Equal);
    }
}
