//! Write-then-read dependencies between components.

use std::collections::BTreeMap;

use crate::error::{IceError, Result};

/// Producer and readers of every declared field.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    components: Vec<String>,
    producers: BTreeMap<&'static str, usize>,
    readers: BTreeMap<&'static str, Vec<usize>>,
    lagged: Vec<(String, &'static str)>,
}

impl DependencyGraph {
    /// Build from `(name, inputs, outputs)` in execution order.
    pub fn build(declarations: &[(String, Vec<&'static str>, Vec<&'static str>)]) -> Result<Self> {
        let mut graph = Self::default();
        for (idx, (name, _, outputs)) in declarations.iter().enumerate() {
            graph.components.push(name.clone());
            for &field in outputs {
                if let Some(&other) = graph.producers.get(field) {
                    return Err(IceError::config(format!(
                        "field '{}' is written by both '{}' and '{}'",
                        field, graph.components[other], name
                    )));
                }
                graph.producers.insert(field, idx);
            }
        }
        for (idx, (name, inputs, _)) in declarations.iter().enumerate() {
            for &field in inputs {
                graph.readers.entry(field).or_default().push(idx);
                if let Some(&p) = graph.producers.get(field)
                    && p > idx
                {
                    graph.lagged.push((name.clone(), field));
                }
            }
        }
        Ok(graph)
    }

    pub fn producer_of(&self, field: &str) -> Option<&str> {
        self.producers.get(field).map(|&i| self.components[i].as_str())
    }

    pub fn readers_of(&self, field: &str) -> Vec<&str> {
        self.readers
            .get(field)
            .map(|r| r.iter().map(|&i| self.components[i].as_str()).collect())
            .unwrap_or_default()
    }

    /// Fields a component reads from the previous step because their
    /// producer runs later.
    pub fn lagged(&self) -> &[(String, &'static str)] {
        &self.lagged
    }

    /// Fields written by the component at `index`.
    pub fn outputs_of(&self, index: usize) -> Vec<&'static str> {
        self.producers
            .iter()
            .filter(|&(_, &p)| p == index)
            .map(|(&f, _)| f)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, inputs: &[&'static str], outputs: &[&'static str]) -> (String, Vec<&'static str>, Vec<&'static str>) {
        (name.to_string(), inputs.to_vec(), outputs.to_vec())
    }

    #[test]
    fn test_single_producer_enforced() {
        let d = [decl("a", &[], &["thk"]), decl("b", &[], &["thk"])];
        assert!(DependencyGraph::build(&d).is_err());
    }

    #[test]
    fn test_lagged_readers() {
        let d = [
            decl("stress", &["thk", "bmelt"], &["uvel"]),
            decl("energy", &["uvel"], &["bmelt"]),
            decl("mass", &["uvel"], &["thk"]),
        ];
        let g = DependencyGraph::build(&d).unwrap();
        assert_eq!(g.producer_of("bmelt"), Some("energy"));
        assert_eq!(g.readers_of("uvel"), vec!["energy", "mass"]);
        let lagged: Vec<_> = g.lagged().iter().map(|(c, f)| (c.as_str(), *f)).collect();
        assert_eq!(lagged, vec![("stress", "thk"), ("stress", "bmelt")]);
        assert_eq!(g.outputs_of(2), vec!["thk"]);
    }
}
