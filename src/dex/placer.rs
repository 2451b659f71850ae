//! Dependency ordering of class definitions.
//!
//! A class definition must appear after the definitions of its superclass and of every
//! interface it implements, whenever those are defined in the same container. The placer
//! walks the implicit "extends / implements" graph depth first and emits each definition
//! once all of its local dependencies have been emitted.
//!
//! Superclasses and interfaces defined elsewhere (in the platform or another container) do
//! not constrain the order. A definition reachable from itself is a [`crate::Error::Format`]
//! error naming the class.

use std::collections::HashMap;

use crate::{
    dex::{
        item::SortContext,
        items::{ClassDefItem, TypeIdItem},
        section::Id,
        DexFile,
    },
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Placed,
}

/// Topological ordering of a container's class definitions.
pub struct ClassDefPlacer<'a> {
    dex: &'a DexFile,
    roots: Vec<Id<ClassDefItem>>,
    by_type: HashMap<Id<TypeIdItem>, Id<ClassDefItem>>,
}

impl<'a> ClassDefPlacer<'a> {
    /// Prepares a walk over the class definitions of `dex`.
    ///
    /// With `presort`, roots are visited in type order instead of insertion order, so the
    /// result does not depend on how the container was built.
    #[must_use]
    pub fn new(dex: &'a DexFile, presort: bool) -> Self {
        let mut roots = dex.class_defs.ids().to_vec();
        if presort {
            let cx = SortContext::new(dex);
            roots.sort_by(|&a, &b| cx.cmp(a, b));
        }

        let mut by_type = HashMap::with_capacity(roots.len());
        for &id in &roots {
            by_type.entry(dex.class_defs[id].class).or_insert(id);
        }

        ClassDefPlacer {
            dex,
            roots,
            by_type,
        }
    }

    fn dependencies(&self, id: Id<ClassDefItem>) -> Vec<Id<ClassDefItem>> {
        let def = &self.dex.class_defs[id];
        let interfaces = def
            .interfaces
            .map(|list| self.dex.type_lists[list].types.as_slice())
            .unwrap_or_default();

        def.superclass
            .iter()
            .chain(interfaces)
            .filter_map(|ty| self.by_type.get(ty).copied())
            .collect()
    }

    /// Every class definition, each after its local superclass and interfaces.
    ///
    /// # Errors
    /// Returns [`crate::Error::Format`] naming the class at which an inheritance cycle closes.
    pub fn order(&self) -> Result<Vec<Id<ClassDefItem>>> {
        let mut marks: HashMap<Id<ClassDefItem>, Mark> = HashMap::with_capacity(self.roots.len());
        let mut placed = Vec::with_capacity(self.roots.len());

        for &root in &self.roots {
            if marks.contains_key(&root) {
                continue;
            }

            marks.insert(root, Mark::Visiting);
            let mut stack = vec![(root, self.dependencies(root), 0_usize)];

            while let Some((id, dependencies, next)) = stack.last_mut() {
                let Some(&dependency) = dependencies.get(*next) else {
                    marks.insert(*id, Mark::Placed);
                    placed.push(*id);
                    stack.pop();
                    continue;
                };
                *next += 1;

                match marks.get(&dependency) {
                    Some(Mark::Placed) => {}
                    Some(Mark::Visiting) => {
                        return Err(format_error!(
                            "cyclic class hierarchy: {} inherits from itself",
                            self.dex.type_descriptor(self.dex.class_defs[dependency].class)
                        ));
                    }
                    None => {
                        marks.insert(dependency, Mark::Visiting);
                        let dependencies = self.dependencies(dependency);
                        stack.push((dependency, dependencies, 0));
                    }
                }
            }
        }

        Ok(placed)
    }
}
