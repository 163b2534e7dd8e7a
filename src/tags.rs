//! Region tags: one base tag per (part, component) pair, one tag per
//! sub-surface, and the registry of tag combinations seen on triangles.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagRegistry {
    base_tags: BTreeMap<(usize, i32), i32>,
    tag_names: BTreeMap<i32, String>,
    sub_surface_tags: Vec<i32>,
    tag_combos: BTreeSet<Vec<i32>>,
    single_tag_map: BTreeMap<Vec<i32>, i32>,
}

impl TagRegistry {
    pub fn new() -> TagRegistry {
        TagRegistry::default()
    }

    pub fn clear(&mut self) {
        *self = TagRegistry::default();
    }

    /// Base tag of a (part, component) pair, allocating the next number on
    /// first sight.
    pub fn base_tag(&mut self, part_index: usize, comp_id: i32, name: &str) -> i32 {
        if let Some(tag) = self.base_tags.get(&(part_index, comp_id)) {
            return *tag;
        }
        let tag = self.base_tags.len() as i32 + 1;
        self.base_tags.insert((part_index, comp_id), tag);
        self.tag_names.insert(tag, name.to_owned());
        tag
    }

    /// Numbers sub-surfaces right after the last base tag.
    pub fn assign_sub_surface_tags<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let first = self.base_tags.len() as i32 + 1;
        self.sub_surface_tags.clear();
        for (i, name) in names.into_iter().enumerate() {
            let tag = first + i as i32;
            self.sub_surface_tags.push(tag);
            self.tag_names.insert(tag, name.to_owned());
        }
    }

    pub fn sub_surface_tag(&self, ss_index: usize) -> Option<i32> {
        self.sub_surface_tags.get(ss_index).copied()
    }

    pub fn record_combo(&mut self, tags: &[i32]) {
        if !tags.is_empty() && !self.tag_combos.contains(tags) {
            self.tag_combos.insert(tags.to_vec());
        }
    }

    pub fn combos(&self) -> impl Iterator<Item = &Vec<i32>> {
        self.tag_combos.iter()
    }

    /// Singletons keep their tag; every multi-tag combination gets a fresh
    /// number above all existing tags, in sorted combination order.
    pub fn build_single_tag_map(&mut self) {
        self.single_tag_map.clear();
        let mut next = self.tag_names.keys().max().copied().unwrap_or(0) + 1;
        for combo in &self.tag_combos {
            if combo.len() == 1 {
                self.single_tag_map.insert(combo.clone(), combo[0]);
            } else {
                self.single_tag_map.insert(combo.clone(), next);
                next += 1;
            }
        }
    }

    pub fn single_tag(&self, tags: &[i32]) -> Option<i32> {
        self.single_tag_map.get(tags).copied()
    }

    /// Sub-surface owning a triangle with these tags. With several
    /// overlapping sub-surfaces the last defined one wins.
    pub fn sub_surface_index(&self, tags: &[i32]) -> Option<usize> {
        if tags.len() < 2 {
            return None;
        }
        tags[1..]
            .iter()
            .filter_map(|t| self.sub_surface_tags.iter().position(|s| s == t))
            .max()
    }

    pub fn tag_name(&self, tag: i32) -> Option<&str> {
        self.tag_names.get(&tag).map(|s| s.as_str())
    }

    pub fn combo_name(&self, tags: &[i32]) -> String {
        tags.iter()
            .map(|t| self.tag_name(*t).unwrap_or("unnamed"))
            .collect::<Vec<_>>()
            .join("_")
    }
}
