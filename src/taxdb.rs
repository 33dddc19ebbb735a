//src/taxdb.rs

use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::addressing::{common_prefix, Address, MAX_CHILD_INDEX};
use crate::error::{BinningError, Result};
use crate::types::ClassId;

pub type ParentMap = AHashMap<ClassId, ClassId>;
pub type NameMap = AHashMap<ClassId, String>;
pub type RankMap = AHashMap<ClassId, String>;

/// Parses a taxDB file in the format:
/// ```text
/// <taxid>\t<parentid>\t<taxname>\t<rank>
/// ```
/// Returns:
/// - a `ParentMap` mapping child_taxid -> parent_taxid
/// - a `NameMap` mapping taxid -> taxname
/// - a `RankMap` mapping taxid -> rank
pub fn parse_taxdb<P: AsRef<Path>>(filepath: P) -> Result<(ParentMap, NameMap, RankMap)> {
    let path = filepath.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut parent_map = ParentMap::new();
    let mut name_map = NameMap::new();
    let mut rank_map = RankMap::new();

    for (line_no, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();

        // Skip malformed lines
        if parts.len() < 4 {
            log::warn!("{}:{}: expected 4 columns, skipping", path.display(), line_no + 1);
            continue;
        }

        let taxid: ClassId = match parts[0].trim().parse() {
            Ok(id) if id > 0 => id,
            _ => {
                log::warn!("{}:{}: bad taxid {:?}, skipping", path.display(), line_no + 1, parts[0]);
                continue;
            }
        };
        let parentid: ClassId = parts[1].trim().parse().unwrap_or(0);

        parent_map.insert(taxid, parentid);
        name_map.insert(taxid, parts[2].trim().to_string());
        rank_map.insert(taxid, parts[3].trim().to_string());
    }
    Ok((parent_map, name_map, rank_map))
}

/// Taxonomic rank, as far as the assignment rules care about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonRank {
    Domain,
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    SpeciesGroup,
    Species,
    Subspecies,
    Unranked,
}

impl TaxonRank {
    pub fn parse(rank: &str) -> Self {
        match rank.trim().to_ascii_lowercase().as_str() {
            "superkingdom" | "domain" | "d" => TaxonRank::Domain,
            "kingdom" | "k" => TaxonRank::Kingdom,
            "phylum" | "p" => TaxonRank::Phylum,
            "class" | "c" => TaxonRank::Class,
            "order" | "o" => TaxonRank::Order,
            "family" | "f" => TaxonRank::Family,
            "genus" | "g" => TaxonRank::Genus,
            "species group" | "species_group" | "species subgroup" => TaxonRank::SpeciesGroup,
            "species" | "s" => TaxonRank::Species,
            "subspecies" => TaxonRank::Subspecies,
            _ => TaxonRank::Unranked,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonRank::Domain => "domain",
            TaxonRank::Kingdom => "kingdom",
            TaxonRank::Phylum => "phylum",
            TaxonRank::Class => "class",
            TaxonRank::Order => "order",
            TaxonRank::Family => "family",
            TaxonRank::Genus => "genus",
            TaxonRank::SpeciesGroup => "species group",
            TaxonRank::Species => "species",
            TaxonRank::Subspecies => "subspecies",
            TaxonRank::Unranked => "no rank",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: ClassId,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub name: String,
    pub rank: TaxonRank,
    pub address: Address,
}

/// A rooted classification tree stored as an arena. Every node carries its
/// address, so the LCA of any node set is a prefix computation followed by
/// a reverse lookup.
#[derive(Debug, Clone)]
pub struct ClassificationTree {
    name: String,
    nodes: Vec<TreeNode>,
    index_of: AHashMap<ClassId, usize>,
    address_index: AHashMap<Address, usize>,
    disabled: AHashSet<ClassId>,
}

/// Build a map of `parent -> Vec<child>` for traversing the taxonomy.
pub fn build_children_map(parent_map: &ParentMap) -> AHashMap<ClassId, Vec<ClassId>> {
    let mut children_map: AHashMap<ClassId, Vec<ClassId>> = AHashMap::new();

    for &taxid in parent_map.keys() {
        children_map.entry(taxid).or_default();
    }

    for (&child, &parent) in parent_map {
        if parent > 0 && child != parent {
            children_map.entry(parent).or_default().push(child);
        }
    }
    // sorted children give stable addresses across runs
    for kids in children_map.values_mut() {
        kids.sort_unstable();
    }
    children_map
}

impl ClassificationTree {
    /// Loads a tree from a taxDB file.
    pub fn from_taxdb<P: AsRef<Path>>(name: &str, path: P) -> Result<Self> {
        let (parent_map, name_map, rank_map) = parse_taxdb(path)?;
        Self::from_maps(name, &parent_map, &name_map, &rank_map)
    }

    /// Builds a tree from `(id, parent, name, rank)` rows; the root has
    /// parent 0 or itself.
    pub fn from_rows(name: &str, rows: &[(ClassId, ClassId, &str, &str)]) -> Result<Self> {
        let mut parent_map = ParentMap::new();
        let mut name_map = NameMap::new();
        let mut rank_map = RankMap::new();
        for &(id, parent, node_name, rank) in rows {
            parent_map.insert(id, parent);
            name_map.insert(id, node_name.to_string());
            rank_map.insert(id, rank.to_string());
        }
        Self::from_maps(name, &parent_map, &name_map, &rank_map)
    }

    pub fn from_maps(
        name: &str,
        parent_map: &ParentMap,
        name_map: &NameMap,
        rank_map: &RankMap,
    ) -> Result<Self> {
        let mut roots: Vec<ClassId> = parent_map
            .iter()
            .filter(|(&id, &parent)| parent == 0 || parent == id)
            .map(|(&id, _)| id)
            .collect();
        roots.sort_unstable();
        let root_id = match roots.as_slice() {
            [root] => *root,
            [] => return Err(BinningError::Tree(format!("{}: tree has no root", name))),
            _ => {
                return Err(BinningError::Tree(format!(
                    "{}: tree has {} roots ({:?}...)",
                    name,
                    roots.len(),
                    &roots[..roots.len().min(3)]
                )))
            }
        };

        // nodes whose parent is unknown hang off the root
        let known: AHashSet<ClassId> = parent_map.keys().copied().collect();
        let mut parent_map = parent_map.clone();
        for (id, parent) in parent_map.iter_mut() {
            if *id != root_id && !known.contains(parent) {
                log::warn!("{}: parent {} of node {} is unknown, attaching to root", name, parent, id);
                *parent = root_id;
            }
        }
        let children_map = build_children_map(&parent_map);

        let mut nodes: Vec<TreeNode> = Vec::with_capacity(parent_map.len());
        let mut index_of = AHashMap::with_capacity(parent_map.len());
        let mut address_index = AHashMap::with_capacity(parent_map.len());

        let mut queue: VecDeque<(ClassId, Option<usize>, Address)> = VecDeque::new();
        queue.push_back((root_id, None, Address::root()));
        while let Some((id, parent, address)) = queue.pop_front() {
            let index = nodes.len();
            if let Some(p) = parent {
                nodes[p].children.push(index);
            }
            let kids = children_map.get(&id).map(Vec::as_slice).unwrap_or(&[]);
            if kids.len() > MAX_CHILD_INDEX {
                return Err(BinningError::Tree(format!(
                    "{}: node {} has {} children, more than addresses can encode",
                    name,
                    id,
                    kids.len()
                )));
            }
            for (i, &kid) in kids.iter().enumerate() {
                queue.push_back((kid, Some(index), address.child(i + 1)));
            }
            index_of.insert(id, index);
            address_index.insert(address.clone(), index);
            nodes.push(TreeNode {
                id,
                parent,
                children: Vec::with_capacity(kids.len()),
                name: name_map.get(&id).cloned().unwrap_or_default(),
                rank: rank_map.get(&id).map(|r| TaxonRank::parse(r)).unwrap_or(TaxonRank::Unranked),
                address,
            });
        }

        if nodes.len() < parent_map.len() {
            log::warn!(
                "{}: {} nodes are not connected to root {} and were dropped",
                name,
                parent_map.len() - nodes.len(),
                root_id
            );
        }
        log::info!("Loaded classification {} with {} nodes", name, nodes.len());

        Ok(Self {
            name: name.to_string(),
            nodes,
            index_of,
            address_index,
            disabled: AHashSet::new(),
        })
    }

    /// Disables the given nodes and their subtrees.
    pub fn set_disabled(&mut self, ids: &[ClassId]) {
        self.disabled.clear();
        for &id in ids {
            let Some(&start) = self.index_of.get(&id) else {
                log::warn!("{}: cannot disable unknown node {}", self.name, id);
                continue;
            };
            let mut stack = vec![start];
            while let Some(index) = stack.pop() {
                let node = &self.nodes[index];
                if self.disabled.insert(node.id) {
                    stack.extend(node.children.iter().copied());
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_id(&self) -> ClassId {
        self.nodes[0].id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.index_of.contains_key(&id)
    }

    pub fn node(&self, id: ClassId) -> Option<&TreeNode> {
        self.index_of.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn address(&self, id: ClassId) -> Option<&Address> {
        self.node(id).map(|n| &n.address)
    }

    pub fn address_to_id(&self, address: &[u16]) -> Option<ClassId> {
        self.address_index.get(address).map(|&i| self.nodes[i].id)
    }

    pub fn is_disabled(&self, id: ClassId) -> bool {
        self.disabled.contains(&id)
    }

    pub fn parent(&self, id: ClassId) -> Option<ClassId> {
        self.node(id)?.parent.map(|p| self.nodes[p].id)
    }

    pub fn children(&self, id: ClassId) -> Vec<ClassId> {
        self.node(id)
            .map(|n| n.children.iter().map(|&c| self.nodes[c].id).collect())
            .unwrap_or_default()
    }

    pub fn rank(&self, id: ClassId) -> TaxonRank {
        self.node(id).map(|n| n.rank).unwrap_or(TaxonRank::Unranked)
    }

    pub fn node_name(&self, id: ClassId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Number of edges between the node and the root.
    pub fn depth(&self, id: ClassId) -> Option<usize> {
        let mut index = *self.index_of.get(&id)?;
        let mut depth = 0;
        while let Some(p) = self.nodes[index].parent {
            index = p;
            depth += 1;
        }
        Some(depth)
    }

    /// True if `ancestor` is `descendant` or lies on its path to the root.
    pub fn is_ancestor_or_self(&self, ancestor: ClassId, descendant: ClassId) -> bool {
        match (self.address(ancestor), self.address(descendant)) {
            (Some(a), Some(d)) => a.is_prefix_of(d),
            _ => false,
        }
    }

    /// Lowest common ancestor of two nodes.
    pub fn lca(&self, a: ClassId, b: ClassId) -> Option<ClassId> {
        let addresses = [self.address(a)?, self.address(b)?];
        let prefix = common_prefix(&addresses, false);
        self.address_to_id(prefix.units())
    }

    /// Nearest ancestor-or-self with species rank, or the node itself when
    /// it does not sit below a species.
    pub fn species_or_self(&self, id: ClassId) -> ClassId {
        let Some(&start) = self.index_of.get(&id) else {
            return id;
        };
        let mut index = start;
        loop {
            let node = &self.nodes[index];
            if node.rank == TaxonRank::Species {
                return node.id;
            }
            match node.parent {
                Some(p) => index = p,
                None => return id,
            }
        }
    }

    /// All node ids in breadth-first order from the root.
    pub fn node_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// All node ids in post-order (children before parents).
    pub fn post_order(&self) -> Vec<ClassId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, bool)> = vec![(0, false)];
        while let Some((index, expanded)) = stack.pop() {
            if expanded {
                order.push(self.nodes[index].id);
            } else {
                stack.push((index, true));
                for &child in self.nodes[index].children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        order
    }
}
