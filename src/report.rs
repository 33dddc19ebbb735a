// src/report.rs

use ahash::AHashMap;
use std::fmt::Write as _;

use crate::config::BinningConfig;
use crate::taxdb::ClassificationTree;
use crate::types::{
    sentinel_label, ClassId, ClassificationReportRow, CountTable, CONTAMINANTS_ID, LOW_COMPLEXITY_ID, NOHITS_ID,
    UNASSIGNED_ID,
};

/// Sinks in the order they are listed at the top of a report.
const SENTINEL_ORDER: [ClassId; 4] = [UNASSIGNED_ID, NOHITS_ID, LOW_COMPLEXITY_ID, CONTAMINANTS_ID];

/// Per-node weights:
///   - weight assigned to the node itself
///   - weight of the node and all its descendants
#[derive(Default, Debug, Clone, Copy)]
pub struct NodeStats {
    pub own_weight: f64,
    pub clade_weight: f64,
}

/// Initialize each NodeStats from a count table; clade starts equal to own.
pub fn init_node_stats(counts: &CountTable) -> AHashMap<ClassId, NodeStats> {
    counts
        .iter()
        .filter(|(&id, _)| id > 0)
        .map(|(&id, &weight)| {
            (
                id,
                NodeStats {
                    own_weight: weight,
                    clade_weight: weight,
                },
            )
        })
        .collect()
}

/// Recursively sum children's weights into the parent.
pub fn accumulate_clade_stats(
    id: ClassId,
    tree: &ClassificationTree,
    stats_map: &mut AHashMap<ClassId, NodeStats>,
) -> f64 {
    let mut total = stats_map.get(&id).map(|s| s.own_weight).unwrap_or(0.0);
    for child in tree.children(id) {
        total += accumulate_clade_stats(child, tree, stats_map);
    }
    if total > 0.0 {
        stats_map.entry(id).or_default().clade_weight = total;
    }
    total
}

/// Generate a clade report (both structured rows and text). Nodes without
/// weight in their subtree are left out.
pub fn generate_classification_report(
    tree: &ClassificationTree,
    counts: &CountTable,
    stats_map: &AHashMap<ClassId, NodeStats>,
    total_weight: f64,
) -> (Vec<ClassificationReportRow>, String) {
    let mut rows = Vec::new();
    let mut text = String::new();
    text.push_str("%\tweight\townWeight\tid\trank\tname\n");

    let pct_of = |weight: f64| {
        if total_weight > 0.0 {
            100.0 * weight / total_weight
        } else {
            0.0
        }
    };

    for id in SENTINEL_ORDER {
        let Some(&weight) = counts.get(&id).filter(|&&w| w > 0.0) else {
            continue;
        };
        let name = sentinel_label(id).unwrap_or_default().to_string();
        let row = ClassificationReportRow {
            pct: pct_of(weight),
            clade_weight: weight,
            own_weight: weight,
            class_id: id,
            rank: String::new(),
            name,
            depth: 0,
            parent_id: None,
        };
        write_row(&mut text, &row);
        rows.push(row);
    }

    fn dfs(
        id: ClassId,
        parent_id: Option<ClassId>,
        depth: usize,
        tree: &ClassificationTree,
        stats_map: &AHashMap<ClassId, NodeStats>,
        pct_of: &dyn Fn(f64) -> f64,
        rows: &mut Vec<ClassificationReportRow>,
        text: &mut String,
    ) {
        let stats = stats_map.get(&id).copied().unwrap_or_default();
        if stats.clade_weight <= 0.0 {
            return;
        }

        let row = ClassificationReportRow {
            pct: pct_of(stats.clade_weight),
            clade_weight: stats.clade_weight,
            own_weight: stats.own_weight,
            class_id: id,
            rank: tree.rank(id).as_str().to_string(),
            name: tree.node_name(id).unwrap_or_default().to_string(),
            depth,
            parent_id,
        };
        write_row(text, &row);
        rows.push(row);

        // Sort children by clade weight desc; ties by id
        let mut kids = tree.children(id);
        kids.sort_by(|a, b| {
            let wa = stats_map.get(a).map(|s| s.clade_weight).unwrap_or(0.0);
            let wb = stats_map.get(b).map(|s| s.clade_weight).unwrap_or(0.0);
            wb.total_cmp(&wa).then(a.cmp(b))
        });
        for child in kids {
            dfs(child, Some(id), depth + 1, tree, stats_map, pct_of, rows, text);
        }
    }

    if !tree.is_empty() {
        dfs(tree.root_id(), None, 0, tree, stats_map, &pct_of, &mut rows, &mut text);
    }

    (rows, text)
}

fn write_row(text: &mut String, row: &ClassificationReportRow) {
    let mut indented_name = String::new();
    for _ in 0..row.depth {
        indented_name.push_str("  ");
    }
    indented_name.push_str(&row.name);
    let _ = writeln!(
        text,
        "{:.4}\t{}\t{}\t{}\t{}\t{}",
        row.pct, row.clade_weight, row.own_weight, row.class_id, row.rank, indented_name
    );
}

/// Builds a clade report for one classification:
///  1) init_node_stats
///  2) accumulate_clade_stats
///  3) generate_classification_report
pub fn build_classification_report(
    tree: &ClassificationTree,
    counts: &CountTable,
) -> (Vec<ClassificationReportRow>, String) {
    let missing = counts.keys().filter(|&&id| id > 0 && !tree.contains(id)).count();
    if missing > 0 {
        log::warn!("{}: {} ids are not in the tree and are left out of the report", tree.name(), missing);
    }
    let total_weight: f64 = counts.values().sum();
    let mut stats_map = init_node_stats(counts);
    if !tree.is_empty() {
        accumulate_clade_stats(tree.root_id(), tree, &mut stats_map);
    }
    generate_classification_report(tree, counts, &stats_map, total_weight)
}

/// `id\tweight` lines sorted by id.
pub fn format_count_table(counts: &CountTable) -> String {
    let mut entries: Vec<(ClassId, f64)> = counts.iter().map(|(&id, &w)| (id, w)).collect();
    entries.sort_unstable_by_key(|&(id, _)| id);
    let mut text = String::new();
    for (id, weight) in entries {
        let _ = writeln!(text, "{}\t{}", id, weight);
    }
    text
}

/// Comment line recording the parameters of a run.
pub fn format_parameter_header(config: &BinningConfig) -> String {
    format!("# parameters: {}\n", config)
}

/// Reads the parameters back from a report's first line.
pub fn parse_parameter_header(line: &str) -> Option<BinningConfig> {
    line.trim().strip_prefix("# parameters:")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LcaAlgorithm;
    use crate::taxdb::tests::small_tree;

    fn counts(entries: &[(ClassId, f64)]) -> CountTable {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_clade_weights_and_order() {
        let tree = small_tree();
        let table = counts(&[(10, 2.0), (100, 1.0), (11, 5.0), (4, 1.0), (NOHITS_ID, 1.0)]);
        let (rows, text) = build_classification_report(&tree, &table);

        assert_eq!(rows[0].class_id, NOHITS_ID);
        assert_eq!(rows[0].name, "No hits");
        assert_eq!(rows[1].class_id, 1);
        assert_eq!(rows[1].clade_weight, 9.0);
        assert_eq!(rows[1].pct, 90.0);

        let ids: Vec<ClassId> = rows.iter().map(|r| r.class_id).collect();
        // Salmonella (5) before E. coli (3); Bacteria before Archaea
        assert_eq!(ids, vec![NOHITS_ID, 1, 2, 3, 11, 10, 100, 4]);
        let ecoli = rows.iter().find(|r| r.class_id == 10).unwrap();
        assert_eq!(ecoli.own_weight, 2.0);
        assert_eq!(ecoli.clade_weight, 3.0);
        assert_eq!(ecoli.parent_id, Some(3));
        assert_eq!(ecoli.rank, "species");

        assert!(text.starts_with("%\tweight"));
        assert_eq!(text.lines().count(), rows.len() + 1);
    }

    #[test]
    fn test_empty_nodes_left_out() {
        let tree = small_tree();
        let (rows, _) = build_classification_report(&tree, &counts(&[(11, 1.0)]));
        let ids: Vec<ClassId> = rows.iter().map(|r| r.class_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 11]);
    }

    #[test]
    fn test_count_table_sorted() {
        let text = format_count_table(&counts(&[(10, 2.0), (UNASSIGNED_ID, 1.5), (3, 1.0)]));
        assert_eq!(text, "-2\t1.5\n3\t1\n10\t2\n");
    }

    #[test]
    fn test_parameter_header_round_trip() {
        let mut config = BinningConfig::default();
        config.lca_algorithm = LcaAlgorithm::Coverage;
        let header = format_parameter_header(&config);
        assert_eq!(parse_parameter_header(&header), Some(config));
    }
}
