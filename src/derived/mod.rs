//! Concrete implementations of the two derived computations the Analysis Cache memoizes:
//! backlink collection and link-graph analysis. Both operate purely over a [`NoteReader`], so
//! they share the freshness guarantees of whatever backs it, and carry no cache of their own —
//! all memoization is [`crate::analysis::AnalysisCache`]'s job.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::adapter::NoteReader;
use crate::error::CacheResult;
use crate::extract;

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `![[target#anchor|alias]]` — leading `!` marks an embed, `#anchor` and `|alias` optional.
    RE.get_or_init(|| {
        Regex::new(r"(!?)\[\[([^\]|#]+)(#[^\]|]*)?(?:\|[^\]]*)?\]\]").unwrap()
    })
}

struct WikiLink {
    target: String,
    is_embed: bool,
    has_anchor: bool,
}

fn parse_wikilinks(content: &str) -> Vec<WikiLink> {
    wikilink_re()
        .captures_iter(content)
        .map(|cap| WikiLink {
            is_embed: !cap[1].is_empty(),
            target: cap[2].trim().to_string(),
            has_anchor: cap.get(3).is_some(),
        })
        .collect()
}

/// Options affecting backlink collection that are also part of the Analysis Cache's key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BacklinkOptions {
    pub skip_anchor: bool,
    pub skip_embed: bool,
}

/// A single reference from `source` to `target` discovered in `source`'s content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backlink {
    pub source: String,
    pub target: String,
    pub is_embed: bool,
}

/// Scans every note's content for `[[wikilink]]`/`![[embed]]` references to any of `targets`,
/// grouping referrers by resolved target.
///
/// A source note carrying any tag in `suppressed_tags` (matched against its own hashtags) is
/// excluded entirely: none of its links are recorded.
pub async fn collect_backlinks(
    vault_path: &str,
    note_reader: &dyn NoteReader,
    targets: &[String],
    options: &BacklinkOptions,
    suppressed_tags: &[String],
) -> CacheResult<BTreeMap<String, Vec<Backlink>>> {
    let normalized_targets: BTreeSet<String> = targets
        .iter()
        .map(|t| extract::normalize_path(t))
        .collect();
    let suppressed: BTreeSet<String> = suppressed_tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut result: BTreeMap<String, Vec<Backlink>> = normalized_targets
        .iter()
        .map(|t| (t.clone(), Vec::new()))
        .collect();

    let sources = note_reader.get_notes_list(vault_path).await?;
    for source in sources {
        let content = note_reader.get_contents(vault_path, &source).await?;

        if !suppressed.is_empty() {
            let tags = extract::extract_hashtags(&content);
            if tags.iter().any(|t| suppressed.contains(t)) {
                continue;
            }
        }

        for link in parse_wikilinks(&content) {
            if options.skip_embed && link.is_embed {
                continue;
            }
            if options.skip_anchor && link.has_anchor {
                continue;
            }
            let target = extract::normalize_path(&link.target);
            if let Some(bucket) = result.get_mut(&target) {
                bucket.push(Backlink {
                    source: source.clone(),
                    target,
                    is_embed: link.is_embed,
                });
            }
        }
    }

    Ok(result)
}

/// Options affecting graph analysis that are also part of the Analysis Cache's key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GraphOptions {
    pub skip_anchor: bool,
    pub skip_embed: bool,
    /// Fold tag co-membership into the graph as additional mutual edges.
    pub include_tags: bool,
    /// Drop nodes whose degree (after all other filters) is below this threshold.
    pub min_degree: u32,
    /// Keep only edges that exist in both directions.
    pub mutual_only: bool,
    /// If non-empty, only these paths are considered.
    pub include_paths: Vec<String>,
    /// These paths are never considered, regardless of `include_paths`.
    pub exclude_paths: Vec<String>,
}

/// Per-node summary in a [`GraphAnalysis`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub neighbors: Vec<String>,
    pub tags: Vec<String>,
    pub degree: usize,
}

/// Full link-graph summary produced by [`compute_graph_analysis`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphAnalysis {
    pub nodes: BTreeMap<String, NodeInfo>,
    pub components: Vec<Vec<String>>,
}

/// Builds a directed graph over every retained note (nodes = paths, edges = wikilink
/// references, optionally folded with tag co-membership), then derives neighbor lists, weakly
/// connected components, and degree statistics, applying the include/exclude/min-degree/
/// mutual-only filters.
pub async fn compute_graph_analysis(
    vault_path: &str,
    note_reader: &dyn NoteReader,
    options: &GraphOptions,
) -> CacheResult<GraphAnalysis> {
    let include: BTreeSet<String> = options
        .include_paths
        .iter()
        .map(|p| extract::normalize_path(p))
        .collect();
    let exclude: BTreeSet<String> = options
        .exclude_paths
        .iter()
        .map(|p| extract::normalize_path(p))
        .collect();

    let candidates: Vec<String> = note_reader
        .get_notes_list(vault_path)
        .await?
        .into_iter()
        .filter(|p| (include.is_empty() || include.contains(p)) && !exclude.contains(p))
        .collect();

    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut node_idx: FxHashMap<String, NodeIndex> = FxHashMap::default();
    for path in &candidates {
        let idx = graph.add_node(path.clone());
        node_idx.insert(path.clone(), idx);
    }

    let mut tags_by_path: FxHashMap<String, BTreeSet<String>> = FxHashMap::default();
    for source in &candidates {
        let content = note_reader.get_contents(vault_path, source).await?;
        tags_by_path.insert(source.clone(), extract::extract_hashtags(&content));

        for link in parse_wikilinks(&content) {
            if options.skip_embed && link.is_embed {
                continue;
            }
            if options.skip_anchor && link.has_anchor {
                continue;
            }
            let target = extract::normalize_path(&link.target);
            if let (Some(&src), Some(&dst)) = (node_idx.get(source), node_idx.get(&target)) {
                if src != dst {
                    graph.update_edge(src, dst, ());
                }
            }
        }
    }

    if options.include_tags {
        let mut by_tag: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for (path, tags) in &tags_by_path {
            for tag in tags {
                by_tag.entry(tag.as_str()).or_default().push(path.as_str());
            }
        }
        for members in by_tag.values() {
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    if let (Some(&a), Some(&b)) =
                        (node_idx.get(members[i]), node_idx.get(members[j]))
                    {
                        graph.update_edge(a, b, ());
                        graph.update_edge(b, a, ());
                    }
                }
            }
        }
    }

    if options.mutual_only {
        let non_mutual: Vec<_> = graph
            .edge_indices()
            .filter(|&e| {
                let (a, b) = graph.edge_endpoints(e).unwrap();
                graph.find_edge(b, a).is_none()
            })
            .collect();
        for e in non_mutual {
            graph.remove_edge(e);
        }
    }

    let components = weakly_connected_components(&graph);

    let mut nodes = BTreeMap::new();
    for path in &candidates {
        let idx = node_idx[path];
        let neighbors: Vec<String> = graph.neighbors(idx).map(|n| graph[n].clone()).collect();
        let degree = neighbors.len();
        if degree < options.min_degree as usize {
            continue;
        }
        let mut tags: Vec<String> = tags_by_path
            .get(path)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        tags.sort();
        let mut sorted_neighbors = neighbors;
        sorted_neighbors.sort();
        nodes.insert(
            path.clone(),
            NodeInfo {
                neighbors: sorted_neighbors,
                tags,
                degree,
            },
        );
    }

    Ok(GraphAnalysis { nodes, components })
}

/// Groups nodes into weakly connected components (edge direction ignored), each sorted and the
/// whole list sorted, for deterministic output.
fn weakly_connected_components(graph: &DiGraph<String, ()>) -> Vec<Vec<String>> {
    let mut uf = UnionFind::new(graph.node_count());
    for edge in graph.edge_indices() {
        let (a, b) = graph.edge_endpoints(edge).unwrap();
        uf.union(a.index(), b.index());
    }

    let mut groups: FxHashMap<usize, Vec<String>> = FxHashMap::default();
    for idx in graph.node_indices() {
        let root = uf.find(idx.index());
        groups.entry(root).or_default().push(graph[idx].clone());
    }

    let mut components: Vec<Vec<String>> = groups.into_values().collect();
    for component in &mut components {
        component.sort();
    }
    components.sort();
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubReader {
        notes: Mutex<HashMap<String, String>>,
    }

    impl StubReader {
        fn new(notes: &[(&str, &str)]) -> Self {
            Self {
                notes: Mutex::new(
                    notes
                        .iter()
                        .map(|(p, c)| (p.to_string(), c.to_string()))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl NoteReader for StubReader {
        async fn get_contents(&self, _vault_path: &str, name: &str) -> CacheResult<String> {
            Ok(self.notes.lock().unwrap().get(name).cloned().unwrap_or_default())
        }

        async fn get_notes_list(&self, _vault_path: &str) -> CacheResult<Vec<String>> {
            let mut paths: Vec<String> = self.notes.lock().unwrap().keys().cloned().collect();
            paths.sort();
            Ok(paths)
        }

        async fn move_note(&self, _: &str, _: &str, _: &str) -> CacheResult<()> {
            unimplemented!()
        }
        async fn delete_note(&self, _: &str, _: &str) -> CacheResult<()> {
            unimplemented!()
        }
        async fn update_links(&self, _: &str, _: &str, _: &str) -> CacheResult<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn collects_backlinks_for_plain_wikilinks() {
        let reader = StubReader::new(&[
            ("A.md", "see [[B]] and [[B#heading]]"),
            ("C.md", "no links here"),
        ]);

        let result = collect_backlinks(
            "vault",
            &reader,
            &["B.md".to_string()],
            &BacklinkOptions::default(),
            &[],
        )
        .await
        .unwrap();

        assert_eq!(result["B.md"].len(), 2);
        assert!(result["B.md"].iter().all(|b| b.source == "A.md"));
    }

    #[tokio::test]
    async fn skip_anchor_excludes_anchored_links() {
        let reader = StubReader::new(&[("A.md", "[[B]] [[B#heading]]")]);

        let options = BacklinkOptions {
            skip_anchor: true,
            skip_embed: false,
        };
        let result = collect_backlinks("vault", &reader, &["B.md".to_string()], &options, &[])
            .await
            .unwrap();

        assert_eq!(result["B.md"].len(), 1);
    }

    #[tokio::test]
    async fn suppressed_tag_excludes_entire_source() {
        let reader = StubReader::new(&[("A.md", "#private [[B]]")]);

        let result = collect_backlinks(
            "vault",
            &reader,
            &["B.md".to_string()],
            &BacklinkOptions::default(),
            &["private".to_string()],
        )
        .await
        .unwrap();

        assert!(result["B.md"].is_empty());
    }

    #[tokio::test]
    async fn embeds_are_distinguished_from_links() {
        let reader = StubReader::new(&[("A.md", "![[B]]")]);

        let result = collect_backlinks(
            "vault",
            &reader,
            &["B.md".to_string()],
            &BacklinkOptions::default(),
            &[],
        )
        .await
        .unwrap();

        assert!(result["B.md"][0].is_embed);
    }

    #[tokio::test]
    async fn graph_analysis_builds_neighbors_and_components() {
        let reader = StubReader::new(&[
            ("A.md", "[[B]]"),
            ("B.md", "no links"),
            ("C.md", "isolated"),
        ]);

        let analysis = compute_graph_analysis("vault", &reader, &GraphOptions::default())
            .await
            .unwrap();

        assert_eq!(analysis.nodes["A.md"].neighbors, vec!["B.md".to_string()]);
        assert_eq!(analysis.components.len(), 2);
    }

    #[tokio::test]
    async fn mutual_only_drops_one_directional_edges() {
        let reader = StubReader::new(&[("A.md", "[[B]]"), ("B.md", "no links back")]);

        let options = GraphOptions {
            mutual_only: true,
            ..GraphOptions::default()
        };
        let analysis = compute_graph_analysis("vault", &reader, &options).await.unwrap();

        assert!(analysis.nodes["A.md"].neighbors.is_empty());
    }

    #[tokio::test]
    async fn min_degree_filters_low_degree_nodes() {
        let reader = StubReader::new(&[("A.md", "[[B]]"), ("B.md", "")]);

        let options = GraphOptions {
            min_degree: 1,
            ..GraphOptions::default()
        };
        let analysis = compute_graph_analysis("vault", &reader, &options).await.unwrap();

        assert!(analysis.nodes.contains_key("A.md"));
        assert!(!analysis.nodes.contains_key("B.md"));
    }

    #[tokio::test]
    async fn include_tags_links_notes_sharing_a_tag() {
        let reader = StubReader::new(&[("A.md", "#shared"), ("B.md", "#shared")]);

        let options = GraphOptions {
            include_tags: true,
            ..GraphOptions::default()
        };
        let analysis = compute_graph_analysis("vault", &reader, &options).await.unwrap();

        assert_eq!(analysis.nodes["A.md"].neighbors, vec!["B.md".to_string()]);
        assert_eq!(analysis.nodes["B.md"].neighbors, vec!["A.md".to_string()]);
    }
}
