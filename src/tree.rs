// Pure lookups over an in-memory project forest
// All traversals are depth-first pre-order and recurse to any depth

use crate::models::ProjectNode;

pub fn findById<'a>(projects: &'a [ProjectNode], id: &str) -> Option<&'a ProjectNode> {
    for project in projects {
        if project.id == id {
            return Some(project);
        }
        if let Some(found) = findById(&project.subprojects, id) {
            return Some(found);
        }
    }
    None
}

pub fn findByIdMut<'a>(projects: &'a mut [ProjectNode], id: &str) -> Option<&'a mut ProjectNode> {
    for project in projects {
        if project.id == id {
            return Some(project);
        }
        if let Some(found) = findByIdMut(&mut project.subprojects, id) {
            return Some(found);
        }
    }
    None
}

pub fn findByExternalFile<'a>(projects: &'a [ProjectNode], path: &str) -> Option<&'a ProjectNode> {
    for project in projects {
        if project.externalFile == path {
            return Some(project);
        }
        if let Some(found) = findByExternalFile(&project.subprojects, path) {
            return Some(found);
        }
    }
    None
}

pub fn findByExternalFileMut<'a>(
    projects: &'a mut [ProjectNode],
    path: &str,
) -> Option<&'a mut ProjectNode> {
    for project in projects {
        if project.externalFile == path {
            return Some(project);
        }
        if let Some(found) = findByExternalFileMut(&mut project.subprojects, path) {
            return Some(found);
        }
    }
    None
}

/// Visit every node mutably, parents before children
pub fn forEachMut(projects: &mut [ProjectNode], visit: &mut impl FnMut(&mut ProjectNode)) {
    for project in projects {
        visit(project);
        forEachMut(&mut project.subprojects, visit);
    }
}

/// Lazy depth-first walk yielding (node, depth). Top-level nodes have depth 0.
pub struct FlattenWithDepth<'a> {
    stack: Vec<(&'a ProjectNode, usize)>,
}

impl<'a> Iterator for FlattenWithDepth<'a> {
    type Item = (&'a ProjectNode, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        self.stack
            .extend(node.subprojects.iter().rev().map(|sub| (sub, depth + 1)));
        Some((node, depth))
    }
}

/// Restartable: call again for a fresh walk over the same forest
pub fn flattenWithDepth(projects: &[ProjectNode]) -> FlattenWithDepth<'_> {
    FlattenWithDepth {
        stack: projects.iter().rev().map(|p| (p, 0)).collect(),
    }
}

/// Number of direct children of `parentId`, or of top-level projects when empty.
/// Unknown parents count as 0.
pub fn countDirectChildren(projects: &[ProjectNode], parentId: &str) -> usize {
    if parentId.is_empty() {
        return projects.len();
    }
    findById(projects, parentId)
        .map(|parent| parent.subprojects.len())
        .unwrap_or(0)
}
