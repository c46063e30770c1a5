// SPDX-License-Identifier: MIT

use crate::flow::graph::Node;
use crate::flow::state::GraphState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Named nodes that graph definitions can refer to
pub struct NodeRegistry<S: GraphState> {
    nodes: Arc<RwLock<HashMap<String, Arc<dyn Node<S>>>>>,
}

impl<S: GraphState> Clone for NodeRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
        }
    }
}

impl<S: GraphState> NodeRegistry<S> {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, node: Arc<dyn Node<S>>) {
        let mut nodes = self.nodes.write().await;
        nodes.insert(node.name().to_string(), node);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Node<S>>> {
        let nodes = self.nodes.read().await;
        nodes.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let nodes = self.nodes.read().await;
        let mut names: Vec<String> = nodes.keys().cloned().collect();
        names.sort();
        names
    }
}

impl<S: GraphState> Default for NodeRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::graph::testing::{counter_node, Counter};

    #[tokio::test]
    async fn test_register_and_get_node() {
        let registry: NodeRegistry<Counter> = NodeRegistry::new();
        registry.register(counter_node("profile")).await;

        let retrieved = registry.get("profile").await;
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().name(), "profile");
        assert!(registry.get("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_register_overwrites_existing() {
        let registry: NodeRegistry<Counter> = NodeRegistry::new();
        registry.register(counter_node("same")).await;
        registry.register(counter_node("same")).await;

        assert_eq!(registry.names().await, vec!["same".to_string()]);
    }

    #[tokio::test]
    async fn test_registry_is_clone() {
        let registry: NodeRegistry<Counter> = NodeRegistry::new();
        registry.register(counter_node("a")).await;

        let cloned = registry.clone();
        assert!(cloned.get("a").await.is_some());

        cloned.register(counter_node("b")).await;
        assert_eq!(
            registry.names().await,
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
