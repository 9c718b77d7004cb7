//! Dependency graph between resource bindings

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in declaration order
    nodes: Vec<String>,
    /// Node -> bindings it depends on
    edges: HashMap<String, Vec<String>>,
    /// Node -> bindings that depend on it
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Into<String>) {
        let node = node.into();
        if !self.edges.contains_key(&node) {
            self.edges.insert(node.clone(), Vec::new());
            self.nodes.push(node);
        }
    }

    /// Record that `from` depends on `to`
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let (from, to) = (from.into(), to.into());
        self.add_node(from.clone());
        self.add_node(to.clone());
        self.edges.entry(from.clone()).or_default().push(to.clone());
        self.reverse_edges.entry(to).or_default().push(from);
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn contains(&self, node: &str) -> bool {
        self.edges.contains_key(node)
    }

    pub fn dependencies_of(&self, node: &str) -> &[String] {
        self.edges.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn dependents_of(&self, node: &str) -> &[String] {
        self.reverse_edges
            .get(node)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes with no dependencies
    pub fn root_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| self.dependencies_of(n).is_empty())
            .map(|n| n.as_str())
            .collect()
    }

    pub fn has_cycle(&self) -> bool {
        self.topological_order().is_err()
    }

    /// Dependencies before dependents, declaration order as the tie-breaker.
    ///
    /// On a cycle, returns the path that closes it (first node repeated at the end).
    pub fn topological_order(&self) -> Result<Vec<String>, Vec<String>> {
        let position: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        for node in &self.nodes {
            self.visit(node, &position, &mut visited, &mut stack, &mut sorted)?;
        }
        Ok(sorted)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        position: &HashMap<&str, usize>,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        sorted: &mut Vec<String>,
    ) -> Result<(), Vec<String>> {
        if visited.contains(node) {
            return Ok(());
        }
        if let Some(start) = stack.iter().position(|n| *n == node) {
            let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Err(cycle);
        }

        stack.push(node);
        let mut deps: Vec<&str> = self.dependencies_of(node).iter().map(|d| d.as_str()).collect();
        deps.sort_by_key(|d| position.get(d).copied().unwrap_or(usize::MAX));
        deps.dedup();
        for dep in deps {
            self.visit(dep, position, visited, stack, sorted)?;
        }
        stack.pop();

        visited.insert(node);
        sorted.push(node.to_string());
        Ok(())
    }
}
