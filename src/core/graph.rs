use crate::core::models::ModuleNode;
use crate::utils::{BuildError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Resolved module graph of one build: one node per module path, rooted at the entry
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    entry: PathBuf,
    modules: BTreeMap<PathBuf, ModuleNode>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl BuildGraph {
    pub fn new(entry: PathBuf) -> Self {
        Self {
            entry,
            modules: BTreeMap::new(),
        }
    }

    pub fn entry(&self) -> &Path {
        &self.entry
    }

    /// Insert a module; an existing node with the same id is replaced
    pub fn insert(&mut self, node: ModuleNode) {
        self.modules.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &Path) -> Option<&ModuleNode> {
        self.modules.get(id)
    }

    pub fn get_mut(&mut self, id: &Path) -> Option<&mut ModuleNode> {
        self.modules.get_mut(id)
    }

    pub fn contains(&self, id: &Path) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in path order
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut ModuleNode> {
        self.modules.values_mut()
    }

    /// Fails with the offending path sequence if any import chain loops
    pub fn check_acyclic(&self) -> Result<()> {
        self.post_order().map(|_| ())
    }

    /// Every module after all of its dependencies; the entry comes last
    pub fn dependency_order(&self) -> Result<Vec<&ModuleNode>> {
        let order = self.post_order()?;
        Ok(order
            .into_iter()
            .filter_map(|id| self.modules.get(id))
            .collect())
    }

    // Iterative DFS so import chains of any depth cannot exhaust the stack.
    // Each frame holds the module and the index of its next import to visit.
    fn post_order(&self) -> Result<Vec<&Path>> {
        let mut marks: HashMap<&Path, Mark> = HashMap::with_capacity(self.modules.len());
        let mut order: Vec<&Path> = Vec::with_capacity(self.modules.len());
        let mut stack: Vec<(&Path, usize)> = Vec::new();

        let roots = self
            .modules
            .get_key_value(self.entry.as_path())
            .map(|(id, _)| id.as_path())
            .into_iter()
            .chain(self.modules.keys().map(PathBuf::as_path));

        for root in roots {
            if marks.contains_key(root) {
                continue;
            }
            marks.insert(root, Mark::Visiting);
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let current = frame.0;
                let next = self
                    .modules
                    .get(current)
                    .and_then(|node| node.imports.get(frame.1))
                    .map(|record| record.resolved.as_path());

                let Some(dependency) = next else {
                    marks.insert(current, Mark::Done);
                    order.push(current);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                match marks.get(dependency) {
                    None => {
                        if let Some((id, _)) = self.modules.get_key_value(dependency) {
                            marks.insert(id.as_path(), Mark::Visiting);
                            stack.push((id.as_path(), 0));
                        }
                    }
                    Some(Mark::Visiting) => {
                        let start = stack
                            .iter()
                            .position(|(id, _)| *id == dependency)
                            .unwrap_or(0);
                        let mut cycle_paths: Vec<PathBuf> = stack[start..]
                            .iter()
                            .map(|(id, _)| id.to_path_buf())
                            .collect();
                        cycle_paths.push(dependency.to_path_buf());
                        return Err(BuildError::Cycle { cycle_paths });
                    }
                    Some(Mark::Done) => {}
                }
            }
        }

        Ok(order)
    }
}
