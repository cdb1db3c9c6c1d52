//! Immutable arena over a parsed pipeline definition.
//!
//! The definition (pipeline → stages → execution → steps / parallel blocks /
//! step groups, each execution optionally with rollback steps) is flattened
//! into a `Vec` of nodes with explicit parent and ordered-children links.
//! Array constructs (`steps`, `rollbackSteps`, `parallel`) become nodes of
//! their own so that sibling and ancestor questions are plain index walks.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AdvisersError, TreeError};
use crate::failure::FailurePolicy;
use crate::plan::WhenCondition;

/// Stable identifier of a pipeline node, shared by the tree and the plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of an unnamed child reached through `field` of this node.
    pub fn child(&self, field: &str) -> Self {
        Self(format!("{}.{field}", self.0))
    }

    /// Id of the unnamed element at `position` of this array node.
    pub fn element(&self, position: usize) -> Self {
        Self(format!("{}[{position}]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}{suffix}", self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Definition (serde form)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    pub identifier: String,
    #[serde(default)]
    pub uuid: Option<NodeId>,
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub identifier: String,
    #[serde(default)]
    pub uuid: Option<NodeId>,
    #[serde(default)]
    pub failure_strategies: FailurePolicy,
    pub execution: ExecutionDefinition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDefinition {
    #[serde(default)]
    pub steps_uuid: Option<NodeId>,
    pub steps: Vec<ExecutionElement>,
    #[serde(default)]
    pub rollback_steps_uuid: Option<NodeId>,
    #[serde(default)]
    pub rollback_steps: Option<Vec<ExecutionElement>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionElement {
    Step(StepConfig),
    Parallel(Vec<ExecutionElement>),
    StepGroup(StepGroupDefinition),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepGroupDefinition {
    pub identifier: String,
    #[serde(default)]
    pub uuid: Option<NodeId>,
    #[serde(default)]
    pub failure_strategies: FailurePolicy,
    #[serde(flatten)]
    pub execution: ExecutionDefinition,
}

/// Author-facing configuration of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    pub identifier: String,
    #[serde(default)]
    pub uuid: Option<NodeId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default, with = "crate::duration::text_opt")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub skip_condition: Option<String>,
    #[serde(default)]
    pub when: Option<WhenCondition>,
    #[serde(default)]
    pub failure_strategies: FailurePolicy,
}

impl StepConfig {
    pub fn new(identifier: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            uuid: None,
            name: None,
            step_type: step_type.into(),
            timeout: None,
            skip_condition: None,
            when: None,
            failure_strategies: FailurePolicy::default(),
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(NodeId::new(uuid));
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_strategies = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl PipelineDefinition {
    /// Loads a definition from JSON (`.json`) or TOML (anything else).
    pub fn load(path: &Path) -> Result<Self, AdvisersError> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(toml::from_str(&contents)?)
        }
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Pipeline,
    Stage,
    StepGroup,
    Step,
    Steps,
    RollbackSteps,
    Parallel,
}

impl NodeKind {
    pub fn is_array(self) -> bool {
        matches!(self, NodeKind::Steps | NodeKind::RollbackSteps | NodeKind::Parallel)
    }
}

/// Position of a node inside its [`PipelineTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(usize);

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Identifier of the stage, step group or step; `None` for array nodes.
    pub identifier: Option<String>,
    /// Policy declared on a stage or step group. Steps keep theirs in `step`.
    pub policy: FailurePolicy,
    pub step: Option<StepConfig>,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

#[derive(Debug, Clone)]
pub struct PipelineTree {
    nodes: Vec<TreeNode>,
    by_id: HashMap<NodeId, NodeIndex>,
}

impl PipelineTree {
    pub fn from_definition(definition: &PipelineDefinition) -> Result<Self, TreeError> {
        let mut tree = Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
        };
        let root_id = definition
            .uuid
            .clone()
            .unwrap_or_else(|| NodeId::new(definition.identifier.as_str()));
        let root = tree.push(
            None,
            NodeKind::Pipeline,
            root_id,
            Some(definition.identifier.clone()),
            FailurePolicy::default(),
            None,
        )?;
        let stages_id = tree.node(root).id.child("stages");
        for (position, stage) in definition.stages.iter().enumerate() {
            let stage_index = tree.push(
                Some(root),
                NodeKind::Stage,
                stage
                    .uuid
                    .clone()
                    .unwrap_or_else(|| stages_id.element(position)),
                Some(stage.identifier.clone()),
                stage.failure_strategies.clone(),
                None,
            )?;
            tree.push_execution(stage_index, &stage.execution)?;
        }
        Ok(tree)
    }

    fn push(
        &mut self,
        parent: Option<NodeIndex>,
        kind: NodeKind,
        id: NodeId,
        identifier: Option<String>,
        policy: FailurePolicy,
        step: Option<StepConfig>,
    ) -> Result<NodeIndex, TreeError> {
        let index = NodeIndex(self.nodes.len());
        if self.by_id.insert(id.clone(), index).is_some() {
            return Err(TreeError::DuplicateNodeId(id));
        }
        self.nodes.push(TreeNode {
            id,
            kind,
            identifier,
            policy,
            step,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(index);
        }
        Ok(index)
    }

    fn push_execution(
        &mut self,
        owner: NodeIndex,
        execution: &ExecutionDefinition,
    ) -> Result<(), TreeError> {
        let owner_id = self.node(owner).id.clone();
        let steps = self.push(
            Some(owner),
            NodeKind::Steps,
            execution
                .steps_uuid
                .clone()
                .unwrap_or_else(|| owner_id.child("steps")),
            None,
            FailurePolicy::default(),
            None,
        )?;
        self.push_elements(steps, &execution.steps)?;

        if let Some(rollback_steps) = &execution.rollback_steps {
            let rollback = self.push(
                Some(owner),
                NodeKind::RollbackSteps,
                execution
                    .rollback_steps_uuid
                    .clone()
                    .unwrap_or_else(|| owner_id.child("rollbackSteps")),
                None,
                FailurePolicy::default(),
                None,
            )?;
            self.push_elements(rollback, rollback_steps)?;
        }
        Ok(())
    }

    fn push_elements(
        &mut self,
        array: NodeIndex,
        elements: &[ExecutionElement],
    ) -> Result<(), TreeError> {
        let array_id = self.node(array).id.clone();
        for (position, element) in elements.iter().enumerate() {
            let derived = || array_id.element(position);
            match element {
                ExecutionElement::Step(step) => {
                    self.push(
                        Some(array),
                        NodeKind::Step,
                        step.uuid.clone().unwrap_or_else(derived),
                        Some(step.identifier.clone()),
                        FailurePolicy::default(),
                        Some(step.clone()),
                    )?;
                }
                ExecutionElement::Parallel(branches) => {
                    let parallel = self.push(
                        Some(array),
                        NodeKind::Parallel,
                        derived(),
                        None,
                        FailurePolicy::default(),
                        None,
                    )?;
                    self.push_elements(parallel, branches)?;
                }
                ExecutionElement::StepGroup(group) => {
                    let group_index = self.push(
                        Some(array),
                        NodeKind::StepGroup,
                        group.uuid.clone().unwrap_or_else(derived),
                        Some(group.identifier.clone()),
                        group.failure_strategies.clone(),
                        None,
                    )?;
                    self.push_execution(group_index, &group.execution)?;
                }
            }
        }
        Ok(())
    }

    /// Panics if `index` comes from a different tree.
    pub fn node(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, id: &NodeId) -> Option<NodeIndex> {
        self.by_id.get(id).copied()
    }

    /// First step (in document order) with the given identifier.
    pub fn find_step(&self, identifier: &str) -> Option<NodeIndex> {
        self.steps()
            .find(|&index| self.node(index).identifier.as_deref() == Some(identifier))
    }

    /// Every step in document order.
    pub fn steps(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.kind == NodeKind::Step)
            .map(|(position, _)| NodeIndex(position))
    }

    /// Every stage in document order.
    pub fn stages(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.kind == NodeKind::Stage)
            .map(|(position, _)| NodeIndex(position))
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.node(index).parent
    }

    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.node(index).children
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        std::iter::successors(self.parent(index), move |&current| self.parent(current))
    }

    pub fn nearest_ancestor_of_kind(&self, index: NodeIndex, kind: NodeKind) -> Option<NodeIndex> {
        self.ancestors(index)
            .find(|&ancestor| self.node(ancestor).kind == kind)
    }

    pub fn child_of_kind(&self, index: NodeIndex, kind: NodeKind) -> Option<NodeIndex> {
        self.children(index)
            .iter()
            .copied()
            .find(|&child| self.node(child).kind == kind)
    }

    /// The element after `index` in its parent array, if any.
    pub fn next_sibling(&self, index: NodeIndex) -> Option<NodeIndex> {
        let parent = self.parent(index)?;
        if !self.node(parent).kind.is_array() {
            return None;
        }
        let siblings = self.children(parent);
        let position = siblings.iter().position(|&sibling| sibling == index)?;
        siblings.get(position + 1).copied()
    }

    pub fn is_inside_rollback(&self, index: NodeIndex) -> bool {
        self.nearest_ancestor_of_kind(index, NodeKind::RollbackSteps)
            .is_some()
    }

    /// Whether the nearest array ancestor of `index` is a parallel block.
    pub fn is_in_parallel(&self, index: NodeIndex) -> bool {
        self.ancestors(index)
            .find(|&ancestor| self.node(ancestor).kind.is_array())
            .is_some_and(|array| self.node(array).kind == NodeKind::Parallel)
    }
}
